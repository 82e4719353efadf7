//! Static registry of probe commands.
//!
//! Every entry names a tool, its taxonomy category, and the commands that
//! extract structured facts from it. Command templates are plain argv
//! strings (split on whitespace by the probe engine); anything needing a
//! shell must go through the guardian's explicit shell mode instead.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::platform::Platform;
use crate::taxonomy::tool_allowed_on;

/// Expected output shape of a probe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    Json,
    Yaml,
    KeyValue,
    #[default]
    Auto,
}

/// Registry entry for a single tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub category: String,
    /// Probe kind (`version`, `config`, `list`, ...) to command template.
    pub commands: IndexMap<String, String>,
    #[serde(default)]
    pub format_hint: FormatHint,
    /// When present, the tool is only probed on these platforms; when
    /// absent, availability falls back to the taxonomy exclusion table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<Platform>>,
}

impl ToolSpec {
    fn new(name: &str, category: &str, hint: FormatHint, commands: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            commands: commands
                .iter()
                .map(|(kind, template)| (kind.to_string(), template.to_string()))
                .collect(),
            format_hint: hint,
            platforms: None,
        }
    }

    fn on(mut self, platforms: &[Platform]) -> Self {
        self.platforms = Some(platforms.to_vec());
        self
    }

    /// Whether this tool may be probed on `platform`.
    pub fn allowed_on(&self, platform: &Platform) -> bool {
        match &self.platforms {
            Some(platforms) => platforms.contains(platform),
            None => tool_allowed_on(&self.name, platform),
        }
    }
}

static REGISTRY: Lazy<Vec<ToolSpec>> = Lazy::new(build_registry);

/// The full built-in registry, platform-unfiltered.
pub fn builtin_registry() -> &'static [ToolSpec] {
    &REGISTRY
}

/// Registry entries valid on `platform`.
pub fn commands_for(platform: &Platform) -> Vec<&'static ToolSpec> {
    REGISTRY
        .iter()
        .filter(|spec| spec.allowed_on(platform))
        .collect()
}

/// Registry entries whose category equals `prefix` or nests under it (in
/// either direction, so `package_managers` finds pip and
/// `package_managers.language.python.pip`-style requests still match the
/// pip entry).
pub fn commands_in_category(prefix: &str) -> Vec<&'static ToolSpec> {
    REGISTRY
        .iter()
        .filter(|spec| {
            spec.category == prefix
                || spec.category.starts_with(&format!("{prefix}."))
                || prefix.starts_with(&format!("{}.", spec.category))
        })
        .collect()
}

#[allow(clippy::too_many_lines)]
fn build_registry() -> Vec<ToolSpec> {
    use FormatHint::{Auto, Json, KeyValue};
    let macos = [Platform::Macos];
    let linux = [Platform::Linux];
    let windows = [Platform::Windows];

    vec![
        // Version control
        ToolSpec::new(
            "git",
            "version_control",
            Auto,
            &[
                ("version", "git --version"),
                ("config_user_name", "git config --global user.name"),
                ("config_user_email", "git config --global user.email"),
                ("remote_origin", "git remote get-url origin"),
                ("current_branch", "git rev-parse --abbrev-ref HEAD"),
            ],
        ),
        ToolSpec::new(
            "hg",
            "version_control",
            Auto,
            &[("version", "hg --version"), ("paths", "hg paths")],
        ),
        ToolSpec::new(
            "svn",
            "version_control",
            Auto,
            &[("version", "svn --version --quiet"), ("info", "svn info")],
        ),
        // Language runtimes
        ToolSpec::new(
            "python",
            "language_runtimes",
            Auto,
            &[
                ("version", "python --version"),
                ("packages", "python -m pip list --format=json"),
            ],
        ),
        ToolSpec::new(
            "python3",
            "language_runtimes",
            Auto,
            &[
                ("version", "python3 --version"),
                ("packages", "python3 -m pip list --format=json"),
            ],
        ),
        ToolSpec::new(
            "node",
            "language_runtimes",
            Auto,
            &[
                ("version", "node --version"),
                ("npm_version", "npm --version"),
                ("executable", "node -p process.execPath"),
            ],
        ),
        ToolSpec::new(
            "java",
            "language_runtimes",
            Auto,
            &[("version", "java -version")],
        ),
        ToolSpec::new(
            "ruby",
            "language_runtimes",
            Auto,
            &[
                ("version", "ruby --version"),
                ("gem_version", "gem --version"),
            ],
        ),
        ToolSpec::new(
            "go",
            "language_runtimes",
            KeyValue,
            &[
                ("version", "go version"),
                ("gopath", "go env GOPATH"),
                ("goroot", "go env GOROOT"),
            ],
        ),
        ToolSpec::new(
            "rust",
            "language_runtimes",
            Auto,
            &[
                ("version", "rustc --version"),
                ("toolchains", "rustup toolchain list"),
                ("default_toolchain", "rustup default"),
            ],
        ),
        // Language package managers
        ToolSpec::new(
            "pip",
            "package_managers.language.python",
            Json,
            &[
                ("version", "pip --version"),
                ("list", "pip list --format=json"),
                ("config", "pip config list"),
            ],
        ),
        ToolSpec::new(
            "pip3",
            "package_managers.language.python",
            Json,
            &[
                ("version", "pip3 --version"),
                ("list", "pip3 list --format=json"),
            ],
        ),
        ToolSpec::new(
            "uv",
            "package_managers.language.python",
            Auto,
            &[
                ("version", "uv --version"),
                ("pip_list", "uv pip list --format=json"),
                ("tool_list", "uv tool list"),
                ("python_list", "uv python list"),
            ],
        ),
        ToolSpec::new(
            "poetry",
            "package_managers.language.python",
            KeyValue,
            &[
                ("version", "poetry --version"),
                ("config", "poetry config --list"),
            ],
        ),
        ToolSpec::new(
            "pipenv",
            "package_managers.language.python",
            Auto,
            &[("version", "pipenv --version")],
        ),
        ToolSpec::new(
            "npm",
            "package_managers.language.javascript",
            Json,
            &[
                ("version", "npm --version"),
                ("registry", "npm config get registry"),
                ("config", "npm config list --json"),
            ],
        ),
        ToolSpec::new(
            "yarn",
            "package_managers.language.javascript",
            Auto,
            &[("version", "yarn --version")],
        ),
        ToolSpec::new(
            "pnpm",
            "package_managers.language.javascript",
            Json,
            &[("version", "pnpm --version")],
        ),
        ToolSpec::new(
            "cargo",
            "package_managers.language.rust",
            Auto,
            &[
                ("version", "cargo --version"),
                ("installed", "cargo install --list"),
            ],
        ),
        ToolSpec::new(
            "gem",
            "package_managers.language.ruby",
            Auto,
            &[
                ("version", "gem --version"),
                ("environment", "gem environment"),
            ],
        ),
        ToolSpec::new(
            "bundler",
            "package_managers.language.ruby",
            Auto,
            &[("version", "bundle --version")],
        ),
        ToolSpec::new(
            "maven",
            "package_managers.language.java",
            Auto,
            &[("version", "mvn --version")],
        ),
        ToolSpec::new(
            "gradle",
            "package_managers.language.java",
            Auto,
            &[("version", "gradle --version")],
        ),
        // System package managers
        ToolSpec::new(
            "brew",
            "package_managers.system.macos",
            Auto,
            &[
                ("version", "brew --version"),
                ("prefix", "brew --prefix"),
                ("taps", "brew tap"),
            ],
        )
        .on(&macos),
        ToolSpec::new(
            "macports",
            "package_managers.system.macos",
            Auto,
            &[("version", "port version")],
        )
        .on(&macos),
        ToolSpec::new(
            "apt",
            "package_managers.system.linux",
            Auto,
            &[
                ("version", "apt --version"),
                ("sources", "apt-cache policy"),
            ],
        )
        .on(&linux),
        ToolSpec::new(
            "apt-get",
            "package_managers.system.linux",
            Auto,
            &[("version", "apt-get --version")],
        )
        .on(&linux),
        ToolSpec::new(
            "yum",
            "package_managers.system.linux",
            Auto,
            &[("version", "yum --version"), ("repolist", "yum repolist")],
        )
        .on(&linux),
        ToolSpec::new(
            "dnf",
            "package_managers.system.linux",
            Auto,
            &[("version", "dnf --version"), ("repolist", "dnf repolist")],
        )
        .on(&linux),
        ToolSpec::new(
            "zypper",
            "package_managers.system.linux",
            Auto,
            &[("version", "zypper --version"), ("repos", "zypper repos")],
        )
        .on(&linux),
        ToolSpec::new(
            "pacman",
            "package_managers.system.linux",
            Auto,
            &[("version", "pacman --version"), ("list", "pacman -Q")],
        )
        .on(&linux),
        ToolSpec::new(
            "choco",
            "package_managers.system.windows",
            Auto,
            &[
                ("version", "choco --version"),
                ("sources", "choco source list"),
            ],
        )
        .on(&windows),
        ToolSpec::new(
            "scoop",
            "package_managers.system.windows",
            Auto,
            &[
                ("version", "scoop --version"),
                ("buckets", "scoop bucket list"),
            ],
        )
        .on(&windows),
        ToolSpec::new(
            "winget",
            "package_managers.system.windows",
            Auto,
            &[
                ("version", "winget --version"),
                ("sources", "winget source list"),
            ],
        )
        .on(&windows),
        // Build tools
        ToolSpec::new("make", "build_tools", Auto, &[("version", "make --version")]),
        ToolSpec::new(
            "cmake",
            "build_tools",
            Auto,
            &[("version", "cmake --version")],
        ),
        ToolSpec::new(
            "ninja",
            "build_tools",
            Auto,
            &[("version", "ninja --version")],
        ),
        ToolSpec::new(
            "bazel",
            "build_tools",
            Auto,
            &[("version", "bazel --version"), ("info", "bazel info")],
        ),
        ToolSpec::new(
            "meson",
            "build_tools",
            Auto,
            &[("version", "meson --version")],
        ),
        // Compilers
        ToolSpec::new(
            "gcc",
            "compilers",
            Auto,
            &[("version", "gcc --version"), ("target", "gcc -dumpmachine")],
        ),
        ToolSpec::new(
            "g++",
            "compilers",
            Auto,
            &[("version", "g++ --version"), ("target", "g++ -dumpmachine")],
        ),
        ToolSpec::new(
            "clang",
            "compilers",
            Auto,
            &[
                ("version", "clang --version"),
                ("target", "clang -print-target-triple"),
            ],
        ),
        ToolSpec::new(
            "clang++",
            "compilers",
            Auto,
            &[
                ("version", "clang++ --version"),
                ("target", "clang++ -print-target-triple"),
            ],
        ),
        ToolSpec::new(
            "rustc",
            "compilers",
            Auto,
            &[
                ("version", "rustc --version"),
                ("host", "rustc --print host"),
            ],
        ),
        ToolSpec::new("javac", "compilers", Auto, &[("version", "javac -version")]),
        ToolSpec::new("msvc", "compilers", Auto, &[("version", "cl.exe")]).on(&windows),
        ToolSpec::new("tsc", "compilers", Auto, &[("version", "tsc --version")]),
        // Containers and virtualization
        ToolSpec::new(
            "docker",
            "containers_virtualization",
            Json,
            &[
                ("version", "docker --version"),
                ("info", "docker info --format json"),
                ("images", "docker images --format json"),
            ],
        ),
        ToolSpec::new(
            "podman",
            "containers_virtualization",
            Json,
            &[
                ("version", "podman --version"),
                ("info", "podman info --format json"),
            ],
        ),
        ToolSpec::new(
            "kubectl",
            "containers_virtualization",
            Json,
            &[
                ("version", "kubectl version --client --output=json"),
                ("contexts", "kubectl config get-contexts"),
            ],
        ),
        ToolSpec::new(
            "helm",
            "containers_virtualization",
            Json,
            &[
                ("version", "helm version --short"),
                ("repo_list", "helm repo list -o json"),
            ],
        ),
        ToolSpec::new(
            "minikube",
            "containers_virtualization",
            Json,
            &[
                ("version", "minikube version"),
                ("status", "minikube status -o json"),
            ],
        ),
        ToolSpec::new(
            "kind",
            "containers_virtualization",
            Auto,
            &[
                ("version", "kind --version"),
                ("clusters", "kind get clusters"),
            ],
        ),
        // Cloud tools
        ToolSpec::new(
            "aws",
            "cloud_tools",
            Json,
            &[
                ("version", "aws --version"),
                ("configure_list", "aws configure list"),
            ],
        ),
        ToolSpec::new(
            "gcloud",
            "cloud_tools",
            Json,
            &[
                ("version", "gcloud --version"),
                ("config_list", "gcloud config list --format=json"),
            ],
        ),
        ToolSpec::new(
            "az",
            "cloud_tools",
            Json,
            &[("version", "az --version"), ("account_show", "az account show")],
        ),
        ToolSpec::new(
            "terraform",
            "cloud_tools",
            Json,
            &[("version", "terraform version -json")],
        ),
        ToolSpec::new(
            "ansible",
            "cloud_tools",
            Auto,
            &[("version", "ansible --version")],
        ),
        ToolSpec::new(
            "github",
            "cloud_tools",
            Auto,
            &[
                ("version", "gh --version"),
                ("auth_status", "gh auth status"),
            ],
        ),
        // Network tools
        ToolSpec::new("curl", "network_tools", Auto, &[("version", "curl --version")]),
        ToolSpec::new("wget", "network_tools", Auto, &[("version", "wget --version")]),
        ToolSpec::new(
            "openssl",
            "network_tools",
            Auto,
            &[("version", "openssl version -a")],
        ),
        ToolSpec::new("ssh", "network_tools", Auto, &[("version", "ssh -V")]),
        ToolSpec::new(
            "rsync",
            "network_tools",
            Auto,
            &[("version", "rsync --version")],
        ),
        // Testing tools
        ToolSpec::new(
            "pytest",
            "testing_tools",
            Auto,
            &[("version", "pytest --version"), ("markers", "pytest --markers")],
        ),
        ToolSpec::new("tox", "testing_tools", Auto, &[("version", "tox --version")]),
        ToolSpec::new("jest", "testing_tools", Auto, &[("version", "jest --version")]),
        ToolSpec::new(
            "mocha",
            "testing_tools",
            Auto,
            &[("version", "mocha --version")],
        ),
        // System, archive and text tools
        ToolSpec::new(
            "systemctl",
            "system_tools",
            Auto,
            &[("version", "systemctl --version")],
        )
        .on(&linux),
        ToolSpec::new(
            "wsl",
            "system_tools",
            Auto,
            &[("version", "wsl --version"), ("list", "wsl --list --verbose")],
        )
        .on(&windows),
        ToolSpec::new("tar", "system_tools", Auto, &[("version", "tar --version")]),
        ToolSpec::new("gzip", "system_tools", Auto, &[("version", "gzip --version")]),
        ToolSpec::new("zip", "system_tools", Auto, &[("version", "zip --version")]),
        ToolSpec::new("unzip", "system_tools", Auto, &[("version", "unzip -v")]),
        ToolSpec::new("7z", "system_tools", Auto, &[("version", "7z i")]),
        ToolSpec::new("jq", "system_tools", Auto, &[("version", "jq --version")]),
        ToolSpec::new("yq", "system_tools", Auto, &[("version", "yq --version")]),
        ToolSpec::new(
            "xmllint",
            "system_tools",
            Auto,
            &[("version", "xmllint --version")],
        ),
        ToolSpec::new(
            "pandoc",
            "system_tools",
            Auto,
            &[
                ("version", "pandoc --version"),
                ("list_input_formats", "pandoc --list-input-formats"),
            ],
        ),
        ToolSpec::new(
            "sqlite3",
            "system_tools",
            Auto,
            &[("version", "sqlite3 --version")],
        ),
        ToolSpec::new("psql", "system_tools", Auto, &[("version", "psql --version")]),
        ToolSpec::new("mysql", "system_tools", Auto, &[("version", "mysql --version")]),
    ]
}
