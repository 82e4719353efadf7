//! Use-case driven taxonomy of development tools.
//!
//! The taxonomy is the single source of truth for which categories exist,
//! which facts each tool can report, and where a tool is valid. Category
//! paths are dotted (`package_managers.language.python`) and every fact
//! published under them has a unique, predictable path in the tool tree.

use crate::platform::Platform;

/// Declared fields for one tool inside a category.
#[derive(Debug, Clone, Copy)]
pub struct ToolFields {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

/// One category node, addressed by its full dotted path.
#[derive(Debug, Clone, Copy)]
pub struct CategoryInfo {
    pub path: &'static str,
    pub description: &'static str,
    pub tools: &'static [ToolFields],
}

macro_rules! tool {
    ($name:literal, [$($field:literal),* $(,)?]) => {
        ToolFields { name: $name, fields: &[$($field),*] }
    };
}

/// Tools that are never valid on a given platform. Everything not listed
/// here, and not claimed by a `ToolSpec::platforms` restriction, defaults to
/// available.
fn excluded_on(platform: &Platform) -> &'static [&'static str] {
    match platform {
        Platform::Macos => &[
            "apt", "apt-get", "yum", "dnf", "zypper", "pacman", "msvc", "wsl", "choco", "scoop",
            "winget",
        ],
        Platform::Windows => &[
            "brew",
            "macports",
            "apt",
            "apt-get",
            "yum",
            "dnf",
            "zypper",
            "pacman",
            "systemctl",
            "systemd",
        ],
        Platform::Linux => &[
            "brew", "macports", "msvc", "choco", "scoop", "winget", "wsl",
        ],
        Platform::Other(_) => &[],
    }
}

/// Cross-platform essentials that are available everywhere regardless of the
/// exclusion table.
const CROSS_PLATFORM_TOOLS: &[&str] = &[
    // Version control
    "git",
    "hg",
    "svn",
    // Language runtimes
    "python",
    "python3",
    "node",
    "java",
    "ruby",
    "go",
    "rust",
    "dotnet",
    // Language package managers
    "pip",
    "pip3",
    "uv",
    "npm",
    "yarn",
    "pnpm",
    "cargo",
    "maven",
    "gradle",
    "bundler",
    "gem",
    "poetry",
    "pipenv",
    "pdm",
    "hatch",
    // Build tools
    "make",
    "cmake",
    "ninja",
    "bazel",
    "meson",
    // Compilers
    "gcc",
    "g++",
    "clang",
    "clang++",
    "rustc",
    "javac",
    "tsc",
    // Containers
    "docker",
    "podman",
    "kubectl",
    "helm",
    "minikube",
    "kind",
    // Cloud tools
    "aws",
    "gcloud",
    "az",
    "terraform",
    "ansible",
    // Archives
    "tar",
    "gzip",
    "zip",
    "unzip",
    "7z",
    // Network tools
    "curl",
    "wget",
    "openssl",
    "ssh",
    "rsync",
    // Testing tools
    "pytest",
    "tox",
    "jest",
    "mocha",
    // Text processing
    "jq",
    "yq",
    "xmllint",
    "pandoc",
];

/// Checks whether a tool may be probed on the given platform.
///
/// The exclusion table wins over everything; unknown tools default to
/// allowed so that newly registered tools do not need a taxonomy change to
/// be probed.
pub fn tool_allowed_on(tool: &str, platform: &Platform) -> bool {
    debug_assert!(
        !(is_cross_platform(tool) && excluded_on(platform).contains(&tool)),
        "{tool} is both cross-platform and excluded on {platform}"
    );
    !excluded_on(platform).contains(&tool)
}

/// Whether a tool belongs to the cross-platform essentials set.
pub fn is_cross_platform(tool: &str) -> bool {
    CROSS_PLATFORM_TOOLS.contains(&tool)
}

pub const TAXONOMY: &[CategoryInfo] = &[
    CategoryInfo {
        path: "version_control",
        description: "Source code management and version control systems",
        tools: &[
            tool!("git", ["version", "config_user_name", "config_user_email", "remote_origin", "current_branch"]),
            tool!("hg", ["version", "config", "paths"]),
            tool!("svn", ["version", "info"]),
        ],
    },
    CategoryInfo {
        path: "language_runtimes",
        description: "Programming language interpreters and runtimes",
        tools: &[
            tool!("python", ["version", "path", "packages"]),
            tool!("python3", ["version", "path", "packages"]),
            tool!("node", ["version", "npm_version", "executable"]),
            tool!("java", ["version", "home", "vendor"]),
            tool!("ruby", ["version", "gem_version", "executable"]),
            tool!("go", ["version", "gopath", "goroot"]),
            tool!("rust", ["version", "default_toolchain", "toolchains"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.language.python",
        description: "Python package managers and lockers",
        tools: &[
            tool!("pip", ["version", "list", "config"]),
            tool!("pip3", ["version", "list", "config"]),
            tool!("uv", ["version", "pip_list", "tool_list", "python_list"]),
            tool!("poetry", ["version", "config"]),
            tool!("pipenv", ["version"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.language.javascript",
        description: "JavaScript package managers",
        tools: &[
            tool!("npm", ["version", "registry", "config"]),
            tool!("yarn", ["version", "config"]),
            tool!("pnpm", ["version", "config"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.language.rust",
        description: "Rust package managers",
        tools: &[tool!("cargo", ["version", "installed"])],
    },
    CategoryInfo {
        path: "package_managers.language.ruby",
        description: "Ruby package managers",
        tools: &[
            tool!("gem", ["version", "list", "environment"]),
            tool!("bundler", ["version", "config"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.language.java",
        description: "JVM build and dependency managers",
        tools: &[
            tool!("maven", ["version"]),
            tool!("gradle", ["version"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.system.macos",
        description: "macOS system package managers",
        tools: &[
            tool!("brew", ["version", "prefix", "list", "taps"]),
            tool!("macports", ["version", "installed"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.system.linux",
        description: "Linux system package managers",
        tools: &[
            tool!("apt", ["version", "sources"]),
            tool!("apt-get", ["version", "sources"]),
            tool!("yum", ["version", "repolist"]),
            tool!("dnf", ["version", "repolist"]),
            tool!("zypper", ["version", "repos"]),
            tool!("pacman", ["version", "list"]),
        ],
    },
    CategoryInfo {
        path: "package_managers.system.windows",
        description: "Windows system package managers",
        tools: &[
            tool!("choco", ["version", "sources"]),
            tool!("scoop", ["version", "buckets"]),
            tool!("winget", ["version", "sources"]),
        ],
    },
    CategoryInfo {
        path: "build_tools",
        description: "Project building and compilation orchestration tools",
        tools: &[
            tool!("make", ["version"]),
            tool!("cmake", ["version", "generators"]),
            tool!("ninja", ["version"]),
            tool!("bazel", ["version"]),
            tool!("meson", ["version"]),
        ],
    },
    CategoryInfo {
        path: "compilers",
        description: "Code compilation tools for various languages",
        tools: &[
            tool!("gcc", ["version", "target"]),
            tool!("g++", ["version", "target"]),
            tool!("clang", ["version", "target"]),
            tool!("clang++", ["version", "target"]),
            tool!("rustc", ["version", "host"]),
            tool!("javac", ["version"]),
            tool!("msvc", ["version"]),
            tool!("tsc", ["version"]),
        ],
    },
    CategoryInfo {
        path: "containers_virtualization",
        description: "Container and virtualization technologies",
        tools: &[
            tool!("docker", ["version", "info", "images"]),
            tool!("podman", ["version", "info"]),
            tool!("kubectl", ["version", "contexts"]),
            tool!("helm", ["version", "repo_list"]),
            tool!("minikube", ["version", "status"]),
            tool!("kind", ["version", "clusters"]),
        ],
    },
    CategoryInfo {
        path: "cloud_tools",
        description: "Cloud platform CLIs and infrastructure tools",
        tools: &[
            tool!("aws", ["version", "configure_list"]),
            tool!("gcloud", ["version", "config_list"]),
            tool!("az", ["version", "account_show"]),
            tool!("terraform", ["version"]),
            tool!("ansible", ["version", "config"]),
            tool!("github", ["version", "auth_status"]),
        ],
    },
    CategoryInfo {
        path: "network_tools",
        description: "Network connectivity and debugging tools",
        tools: &[
            tool!("curl", ["version"]),
            tool!("wget", ["version"]),
            tool!("openssl", ["version", "ciphers"]),
            tool!("ssh", ["version"]),
            tool!("rsync", ["version"]),
        ],
    },
    CategoryInfo {
        path: "testing_tools",
        description: "Testing frameworks and test runners",
        tools: &[
            tool!("pytest", ["version", "markers"]),
            tool!("tox", ["version"]),
            tool!("jest", ["version"]),
            tool!("mocha", ["version"]),
        ],
    },
    CategoryInfo {
        path: "system_tools",
        description: "System administration, archive and text utilities",
        tools: &[
            tool!("systemctl", ["version"]),
            tool!("wsl", ["version", "list"]),
            tool!("tar", ["version"]),
            tool!("gzip", ["version"]),
            tool!("zip", ["version"]),
            tool!("unzip", ["version"]),
            tool!("7z", ["version"]),
            tool!("jq", ["version"]),
            tool!("yq", ["version"]),
            tool!("xmllint", ["version"]),
            tool!("pandoc", ["version", "list_input_formats"]),
            tool!("sqlite3", ["version"]),
            tool!("psql", ["version"]),
            tool!("mysql", ["version"]),
        ],
    },
];

/// Flattened list of every category path, in declaration order.
pub fn all_categories() -> Vec<&'static str> {
    TAXONOMY.iter().map(|category| category.path).collect()
}

/// Declared field names for `tool` inside `category`, if any. The category
/// may be given as the exact path or as an ancestor prefix.
pub fn fields_of(category: &str, tool: &str) -> Option<&'static [&'static str]> {
    TAXONOMY
        .iter()
        .filter(|info| info.path == category || info.path.starts_with(&format!("{category}.")))
        .flat_map(|info| info.tools.iter())
        .find(|fields| fields.name == tool)
        .map(|fields| fields.fields)
}

/// Taxonomy filtered to the tools valid on `platform`. Categories whose tool
/// list filters down to empty are dropped.
pub fn categories_for(platform: &Platform) -> Vec<(&'static CategoryInfo, Vec<&'static ToolFields>)> {
    TAXONOMY
        .iter()
        .filter_map(|info| {
            let tools: Vec<_> = info
                .tools
                .iter()
                .filter(|fields| tool_allowed_on(fields.name, platform))
                .collect();
            if tools.is_empty() {
                None
            } else {
                Some((info, tools))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusions_apply_per_platform() {
        assert!(!tool_allowed_on("brew", &Platform::Linux));
        assert!(!tool_allowed_on("apt", &Platform::Macos));
        assert!(!tool_allowed_on("choco", &Platform::Linux));
        assert!(!tool_allowed_on("systemctl", &Platform::Windows));
        assert!(!tool_allowed_on("wsl", &Platform::Linux));
        assert!(tool_allowed_on("apt", &Platform::Linux));
        assert!(tool_allowed_on("brew", &Platform::Macos));
    }

    #[test]
    fn cross_platform_tools_available_everywhere() {
        for platform in [Platform::Macos, Platform::Linux, Platform::Windows] {
            for tool in ["git", "python", "node", "docker", "curl", "openssl", "tar"] {
                assert!(tool_allowed_on(tool, &platform), "{tool} on {platform}");
            }
        }
    }

    #[test]
    fn unknown_tools_default_to_available() {
        assert!(tool_allowed_on("some-new-tool", &Platform::Linux));
        assert!(tool_allowed_on("anything", &Platform::Other("freebsd".into())));
    }

    #[test]
    fn fields_resolve_through_nested_categories() {
        let fields = fields_of("package_managers.language.python", "pip").unwrap();
        assert!(fields.contains(&"version"));
        // Ancestor prefix also resolves.
        let fields = fields_of("package_managers", "brew").unwrap();
        assert!(fields.contains(&"prefix"));
        assert!(fields_of("version_control", "pip").is_none());
    }

    #[test]
    fn category_paths_are_unique() {
        let mut paths = all_categories();
        let total = paths.len();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), total);
    }

    #[test]
    fn platform_filter_drops_foreign_system_managers() {
        let linux = categories_for(&Platform::Linux);
        assert!(!linux
            .iter()
            .any(|(info, _)| info.path == "package_managers.system.macos"));
        assert!(linux
            .iter()
            .any(|(info, _)| info.path == "package_managers.system.linux"));
    }
}
