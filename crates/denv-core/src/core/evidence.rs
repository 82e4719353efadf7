//! Evidence collection for project classification.
//!
//! Walks a project tree (capped depth and file count), extracts Python
//! imports, and reads the dependency manifests of every ecosystem we
//! recognize. Collection is tolerant by construction: unreadable files and
//! broken manifests shrink the evidence, they never abort classification.

use std::collections::BTreeSet;
use std::path::Path;

use denv_domain::{Evidence, EvidenceDependencies};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

const MAX_DEPTH: usize = 5;
const MAX_PYTHON_FILES: usize = 100;

const SKIP_DIRECTORIES: &[&str] = &[
    "venv",
    "env",
    ".venv",
    ".env",
    "__pycache__",
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    ".tox",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    "target",
    "dist",
    "build",
];

const ENTRY_POINT_NAMES: &[&str] = &[
    "manage.py",
    "app.py",
    "main.py",
    "application.py",
    "wsgi.py",
    "asgi.py",
    "cli.py",
    "__main__.py",
];

static IMPORT_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:from|import)\s+([A-Za-z_][\w\.]*)").expect("valid regex"));

/// Collects all classification evidence for `root`.
pub fn collect_evidence(root: &Path) -> Evidence {
    let mut evidence = Evidence {
        root_path: root.display().to_string(),
        name: root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.display().to_string()),
        ..Evidence::default()
    };

    walk_tree(root, &mut evidence);

    read_requirements(root, &mut evidence);
    read_pyproject(root, &mut evidence);
    read_setup_files(root, &mut evidence);
    read_package_json(root, &mut evidence);
    read_cargo_toml(root, &mut evidence);
    read_go_mod(root, &mut evidence);
    read_gemfile(root, &mut evidence);
    read_jvm_manifests(root, &mut evidence);

    evidence.uses_poetry = root.join("poetry.lock").exists();
    evidence.uses_pipenv = root.join("Pipfile.lock").exists();
    evidence.uses_conda = root.join("environment.yml").exists();

    // Declared dependencies count as import evidence even before any
    // source file imports them.
    let dependency_names: Vec<String> = evidence
        .dependencies
        .values()
        .flat_map(|deps| deps.runtime.iter().chain(deps.development.iter()))
        .map(|name| name.to_lowercase())
        .collect();
    evidence.imports.extend(dependency_names);

    debug!(
        project = %evidence.name,
        files = evidence.file_paths.len(),
        imports = evidence.imports.len(),
        "collected classification evidence"
    );
    evidence
}

fn walk_tree(root: &Path, evidence: &mut Evidence) {
    let mut python_files = 0usize;
    let walker = WalkDir::new(root)
        .max_depth(MAX_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_dir() && SKIP_DIRECTORIES.contains(&name.as_ref()))
        });

    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        evidence.file_paths.push(relative.clone());

        let file_name = entry.file_name().to_string_lossy();
        if file_name.ends_with(".ipynb") {
            evidence.has_notebooks = true;
        }
        if ENTRY_POINT_NAMES.contains(&file_name.as_ref()) {
            evidence.entry_points.push(relative.clone());
        }
        if file_name.ends_with(".py") && python_files < MAX_PYTHON_FILES {
            python_files += 1;
            scan_python_file(entry.path(), evidence);
        }
    }
}

fn scan_python_file(path: &Path, evidence: &mut Evidence) {
    let Some(source) = read_lossy(path) else {
        return;
    };
    for line in source.lines() {
        if let Some(captures) = IMPORT_LINE.captures(line) {
            let module = captures[1].to_string();
            // Parent modules participate in matching too.
            let mut prefix = String::new();
            for part in module.split('.') {
                if !prefix.is_empty() {
                    prefix.push('.');
                }
                prefix.push_str(part);
                evidence.imports.insert(prefix.clone());
            }
        }
        if line.contains("async def") {
            evidence.has_async = true;
        }
    }
}

/// Reads a file tolerating invalid encodings; returns `None` only when the
/// file cannot be read at all.
fn read_lossy(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) => {
            debug!(path = %path.display(), %error, "skipping unreadable file");
            None
        }
    }
}

/// Strips a requirement spec down to its distribution name.
fn requirement_name(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
        return None;
    }
    let name: String = line
        .chars()
        .take_while(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        .collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn python_deps(evidence: &mut Evidence) -> &mut EvidenceDependencies {
    evidence.dependencies.entry("python".to_string()).or_default()
}

fn read_requirements(root: &Path, evidence: &mut Evidence) {
    let candidates = ["requirements.txt", "requirements-dev.txt", "requirements.in"];
    for (index, candidate) in candidates.iter().enumerate() {
        let path = root.join(candidate);
        if !path.exists() {
            continue;
        }
        let Some(content) = read_lossy(&path) else {
            continue;
        };
        let names: Vec<String> = content.lines().filter_map(requirement_name).collect();
        let deps = python_deps(evidence);
        if index == 0 {
            deps.runtime.extend(names);
        } else {
            deps.development.extend(names);
        }
    }
}

fn read_pyproject(root: &Path, evidence: &mut Evidence) {
    let path = root.join("pyproject.toml");
    if !path.exists() {
        return;
    }
    let Some(content) = read_lossy(&path) else {
        return;
    };
    let document: toml_edit::DocumentMut = match content.parse() {
        Ok(document) => document,
        Err(error) => {
            warn!(path = %path.display(), %error, "skipping malformed pyproject.toml");
            return;
        }
    };

    if document.get("build-system").is_some() {
        evidence.has_build_backend = true;
    }

    let mut runtime = Vec::new();
    let mut development = Vec::new();
    if let Some(project) = document.get("project").and_then(|item| item.as_table()) {
        if let Some(deps) = project.get("dependencies").and_then(|item| item.as_array()) {
            runtime.extend(
                deps.iter()
                    .filter_map(|value| value.as_str())
                    .filter_map(requirement_name),
            );
        }
        if let Some(groups) = project
            .get("optional-dependencies")
            .and_then(|item| item.as_table())
        {
            for (_, group) in groups {
                if let Some(deps) = group.as_array() {
                    development.extend(
                        deps.iter()
                            .filter_map(|value| value.as_str())
                            .filter_map(requirement_name),
                    );
                }
            }
        }
    }
    if let Some(poetry) = document
        .get("tool")
        .and_then(|item| item.get("poetry"))
        .and_then(|item| item.as_table())
    {
        if let Some(deps) = poetry.get("dependencies").and_then(|item| item.as_table()) {
            runtime.extend(
                deps.iter()
                    .map(|(name, _)| name.to_string())
                    .filter(|name| name != "python"),
            );
        }
    }
    let deps = python_deps(evidence);
    deps.runtime.extend(runtime);
    deps.development.extend(development);
}

fn read_setup_files(root: &Path, evidence: &mut Evidence) {
    if root.join("setup.py").exists() || root.join("setup.cfg").exists() {
        evidence.has_build_backend = true;
    }
}

fn read_package_json(root: &Path, evidence: &mut Evidence) {
    let path = root.join("package.json");
    if !path.exists() {
        return;
    }
    let Some(content) = read_lossy(&path) else {
        return;
    };
    let parsed: serde_json::Value = match serde_json::from_str(&content) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(path = %path.display(), %error, "skipping malformed package.json");
            return;
        }
    };
    let mut runtime = Vec::new();
    let mut development = Vec::new();
    if let Some(deps) = parsed.get("dependencies").and_then(|value| value.as_object()) {
        for name in deps.keys() {
            runtime.push(name.clone());
            evidence.package_json_dependencies.insert(name.clone());
        }
    }
    if let Some(deps) = parsed
        .get("devDependencies")
        .and_then(|value| value.as_object())
    {
        development.extend(deps.keys().cloned());
    }
    let entry = evidence
        .dependencies
        .entry("javascript".to_string())
        .or_default();
    entry.runtime.extend(runtime);
    entry.development.extend(development);
}

fn read_cargo_toml(root: &Path, evidence: &mut Evidence) {
    let path = root.join("Cargo.toml");
    if !path.exists() {
        return;
    }
    let Some(content) = read_lossy(&path) else {
        return;
    };
    let document: toml_edit::DocumentMut = match content.parse() {
        Ok(document) => document,
        Err(error) => {
            warn!(path = %path.display(), %error, "skipping malformed Cargo.toml");
            return;
        }
    };
    let Some(deps) = document.get("dependencies").and_then(|item| item.as_table()) else {
        return;
    };
    let entry = evidence.dependencies.entry("rust".to_string()).or_default();
    entry
        .runtime
        .extend(deps.iter().map(|(name, _)| name.to_string()));
}

fn read_go_mod(root: &Path, evidence: &mut Evidence) {
    let path = root.join("go.mod");
    if !path.exists() {
        return;
    }
    let Some(content) = read_lossy(&path) else {
        return;
    };
    let mut names = Vec::new();
    let mut in_require = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with("require (") {
            in_require = true;
            continue;
        }
        if in_require && line == ")" {
            in_require = false;
            continue;
        }
        let module = if in_require {
            line.split_whitespace().next()
        } else {
            line.strip_prefix("require ")
                .and_then(|rest| rest.split_whitespace().next())
        };
        if let Some(module) = module.filter(|module| !module.is_empty()) {
            names.push(module.to_string());
        }
    }
    if !names.is_empty() {
        let entry = evidence.dependencies.entry("go".to_string()).or_default();
        entry.runtime.extend(names);
    }
}

static GEM_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*gem\s+['"]([\w\-]+)['"]"#).expect("valid regex"));

fn read_gemfile(root: &Path, evidence: &mut Evidence) {
    let path = root.join("Gemfile");
    if !path.exists() {
        return;
    }
    let Some(content) = read_lossy(&path) else {
        return;
    };
    let names: Vec<String> = content
        .lines()
        .filter_map(|line| GEM_LINE.captures(line))
        .map(|captures| captures[1].to_string())
        .collect();
    if !names.is_empty() {
        let entry = evidence.dependencies.entry("ruby".to_string()).or_default();
        entry.runtime.extend(names);
    }
}

static MAVEN_ARTIFACT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<artifactId>([^<]+)</artifactId>").expect("valid regex"));
static GRADLE_DEP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:implementation|api|testImplementation)\s*[\(]?\s*['"]([^:'"]+):([^:'"]+)"#)
        .expect("valid regex")
});

fn read_jvm_manifests(root: &Path, evidence: &mut Evidence) {
    let mut names: BTreeSet<String> = BTreeSet::new();
    let pom = root.join("pom.xml");
    if pom.exists() {
        if let Some(content) = read_lossy(&pom) {
            names.extend(
                MAVEN_ARTIFACT
                    .captures_iter(&content)
                    .map(|captures| captures[1].to_string()),
            );
        }
    }
    for gradle in ["build.gradle", "build.gradle.kts"] {
        let path = root.join(gradle);
        if !path.exists() {
            continue;
        }
        if let Some(content) = read_lossy(&path) {
            names.extend(
                GRADLE_DEP
                    .captures_iter(&content)
                    .map(|captures| captures[2].to_string()),
            );
        }
    }
    if !names.is_empty() {
        let entry = evidence.dependencies.entry("java".to_string()).or_default();
        entry.runtime.extend(names);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn collects_files_imports_and_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "manage.py",
            "import django\nfrom django.conf import settings\n",
        );
        write(dir.path(), "myapp/models.py", "from django.db import models\n");
        let evidence = collect_evidence(dir.path());
        assert!(evidence.file_paths.contains(&"manage.py".to_string()));
        assert!(evidence.file_paths.contains(&"myapp/models.py".to_string()));
        assert!(evidence.imports.contains("django"));
        assert!(evidence.imports.contains("django.conf"));
        assert!(evidence.imports.contains("django.db"));
        assert!(evidence.entry_points.contains(&"manage.py".to_string()));
    }

    #[test]
    fn skip_directories_are_not_walked() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/react/index.js", "x");
        write(dir.path(), ".venv/lib/site.py", "import secret_module\n");
        write(dir.path(), "app.py", "import flask\n");
        let evidence = collect_evidence(dir.path());
        assert!(!evidence
            .file_paths
            .iter()
            .any(|path| path.contains("node_modules")));
        assert!(!evidence.imports.contains("secret_module"));
        assert!(evidence.imports.contains("flask"));
    }

    #[test]
    fn requirements_and_pyproject_merge_into_python_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "requirements.txt",
            "Django>=4.2\n# comment\nrequests==2.31.0\n",
        );
        write(
            dir.path(),
            "pyproject.toml",
            "[build-system]\nrequires = [\"hatchling\"]\n\n[project]\nname = \"x\"\ndependencies = [\"click>=8\"]\n",
        );
        let evidence = collect_evidence(dir.path());
        let python = &evidence.dependencies["python"];
        assert!(python.runtime.contains(&"Django".to_string()));
        assert!(python.runtime.contains(&"requests".to_string()));
        assert!(python.runtime.contains(&"click".to_string()));
        assert!(evidence.has_build_backend);
        // Declared dependencies double as import evidence.
        assert!(evidence.imports.contains("django"));
    }

    #[test]
    fn package_json_feeds_frontend_evidence() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"dependencies": {"react": "^18.0.0"}, "devDependencies": {"vite": "^5.0.0"}}"#,
        );
        let evidence = collect_evidence(dir.path());
        assert!(evidence.package_json_dependencies.contains("react"));
        let javascript = &evidence.dependencies["javascript"];
        assert!(javascript.runtime.contains(&"react".to_string()));
        assert!(javascript.development.contains(&"vite".to_string()));
    }

    #[test]
    fn malformed_manifests_never_abort_collection() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "pyproject.toml", "not [ valid toml {{{{");
        write(dir.path(), "package.json", "{broken json");
        write(dir.path(), "app.py", "import flask\n");
        let evidence = collect_evidence(dir.path());
        assert!(evidence.imports.contains("flask"));
    }

    #[test]
    fn lock_files_set_migration_flags() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "poetry.lock", "");
        write(dir.path(), "environment.yml", "name: test\n");
        let evidence = collect_evidence(dir.path());
        assert!(evidence.uses_poetry);
        assert!(evidence.uses_conda);
        assert!(!evidence.uses_pipenv);
    }

    #[test]
    fn notebooks_and_async_are_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notebooks/analysis.ipynb", "{}");
        write(dir.path(), "server.py", "async def handle():\n    pass\n");
        let evidence = collect_evidence(dir.path());
        assert!(evidence.has_notebooks);
        assert!(evidence.has_async);
    }

    #[test]
    fn go_and_gem_manifests_parse() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "go.mod",
            "module example.com/app\n\nrequire (\n\tgithub.com/pkg/errors v0.9.1\n)\n",
        );
        write(dir.path(), "Gemfile", "gem \"rails\"\ngem 'puma'\n");
        let evidence = collect_evidence(dir.path());
        assert!(evidence.dependencies["go"]
            .runtime
            .contains(&"github.com/pkg/errors".to_string()));
        assert!(evidence.dependencies["ruby"]
            .runtime
            .contains(&"rails".to_string()));
    }
}
