//! Project classification.
//!
//! Pure scoring over evidence collected from a project tree. The evidence
//! collector (filesystem walking, manifest parsing) lives in denv-core;
//! everything here is a deterministic function of the [`Evidence`] value.

mod rules;
mod sysdeps;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub use rules::{FrameworkRule, FRAMEWORK_RULES};
pub use sysdeps::infer_system_packages;

use rules::{
    API_IMPORTS, CLI_FRAMEWORKS, CONFIG_WEIGHT, DATABASE_IMPORTS, DATA_SCIENCE_IMPORTS,
    FULL_CONFIDENCE_SCORE, IMPORT_WEIGHT, ML_FRAMEWORKS, PRIMARY_DEPENDENCY_HINTS,
    STRONG_MARKER_WEIGHT, STRUCTURE_WEIGHT, WEB_FRAMEWORK_IMPORTS,
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectType {
    #[default]
    Generic,
    Django,
    DjangoRest,
    Flask,
    Fastapi,
    Streamlit,
    DataScience,
    Library,
    Cli,
    React,
    Vue,
    Hybrid,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectCategory {
    #[default]
    Unknown,
    WebFramework,
    WebApi,
    MachineLearning,
    DataAnalysis,
    CommandLine,
    Package,
    FullStack,
}

impl ProjectType {
    fn category(self) -> ProjectCategory {
        match self {
            Self::Django | Self::Flask | Self::React | Self::Vue => ProjectCategory::WebFramework,
            Self::DjangoRest | Self::Fastapi => ProjectCategory::WebApi,
            Self::Streamlit => ProjectCategory::DataAnalysis,
            Self::DataScience => ProjectCategory::MachineLearning,
            Self::Cli => ProjectCategory::CommandLine,
            Self::Library => ProjectCategory::Package,
            Self::Hybrid => ProjectCategory::FullStack,
            Self::Generic => ProjectCategory::Unknown,
        }
    }

    fn is_backend_web(self) -> bool {
        matches!(
            self,
            Self::Django | Self::DjangoRest | Self::Flask | Self::Fastapi
        )
    }
}

/// Per-ecosystem dependency lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvidenceDependencies {
    #[serde(default)]
    pub runtime: Vec<String>,
    #[serde(default)]
    pub development: Vec<String>,
}

impl EvidenceDependencies {
    pub fn all(&self) -> BTreeSet<&str> {
        self.runtime
            .iter()
            .chain(self.development.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Everything the scorer knows about a project tree. Collected once,
/// reused across scoring passes.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub root_path: String,
    pub name: String,
    /// Relative paths with forward slashes.
    pub file_paths: Vec<String>,
    /// Python imports, including parent modules of dotted imports, merged
    /// with dependency names so that a declared dependency counts as
    /// evidence even before it is imported anywhere.
    pub imports: BTreeSet<String>,
    /// Ecosystem name ("python", "javascript", ...) to dependency lists.
    pub dependencies: BTreeMap<String, EvidenceDependencies>,
    /// Runtime dependency names from package.json.
    pub package_json_dependencies: BTreeSet<String>,
    pub entry_points: Vec<String>,
    pub has_build_backend: bool,
    pub uses_poetry: bool,
    pub uses_pipenv: bool,
    pub uses_conda: bool,
    pub has_notebooks: bool,
    pub has_async: bool,
}

impl Evidence {
    fn all_dependencies(&self) -> BTreeSet<&str> {
        self.dependencies
            .values()
            .flat_map(|deps| deps.all())
            .collect()
    }

    fn has_path_with_file_name(&self, marker: &str) -> bool {
        if marker.contains('/') {
            return self.file_paths.iter().any(|path| path.contains(marker));
        }
        self.file_paths
            .iter()
            .any(|path| path.rsplit('/').next() == Some(marker))
    }

    fn has_path_containing(&self, fragment: &str) -> bool {
        self.file_paths.iter().any(|path| path.contains(fragment))
    }
}

/// Per-ecosystem dependency report as it appears in the analysis output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyReport {
    pub runtime: Vec<String>,
    pub development: Vec<String>,
    /// Sorted, deduplicated union of the two.
    pub all: Vec<String>,
}

impl DependencyReport {
    fn from_evidence(deps: &EvidenceDependencies) -> Self {
        let mut all: Vec<String> = deps.all().iter().map(ToString::to_string).collect();
        all.sort_unstable();
        all.dedup();
        Self {
            runtime: deps.runtime.clone(),
            development: deps.development.clone(),
            all,
        }
    }
}

/// Classification result for one project tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub root_path: String,
    pub name: String,
    pub primary_type: ProjectType,
    pub category: ProjectCategory,
    pub confidence: f64,
    pub detected_types: Vec<ProjectType>,
    pub markers: Vec<String>,
    pub dependencies: BTreeMap<String, DependencyReport>,
    pub primary_dependencies: Vec<String>,
    pub frameworks: Vec<String>,
    pub ml_frameworks: Vec<String>,
    pub cli_frameworks: Vec<String>,
    pub characteristics: Vec<String>,
    pub uses_poetry: bool,
    pub uses_pipenv: bool,
    pub uses_conda: bool,
    pub migration_paths: Vec<String>,
    pub has_notebooks: bool,
    pub is_publishable: bool,
    pub suggested_system_packages: Vec<String>,
}

#[derive(Debug, Clone)]
struct RuleScore {
    name: &'static str,
    score: u32,
    matches: Vec<String>,
    strong_marker: bool,
}

fn score_rule(rule: &FrameworkRule, evidence: &Evidence) -> RuleScore {
    let mut score = 0;
    let mut matches = Vec::new();
    let mut strong_marker = false;

    for (marker, weight) in rule.marker_files {
        if evidence.has_path_with_file_name(marker) {
            score += weight;
            if *weight >= STRONG_MARKER_WEIGHT {
                strong_marker = true;
            }
            matches.push(format!("file:{marker}"));
        }
    }
    for pattern in rule.import_patterns {
        if evidence.imports.contains(*pattern) {
            score += IMPORT_WEIGHT;
            matches.push(format!("import:{pattern}"));
        }
    }
    for hint in rule.structure_hints {
        if evidence.has_path_containing(hint) {
            score += STRUCTURE_WEIGHT;
            matches.push(format!("structure:{hint}"));
        }
    }
    for config in rule.config_files {
        if evidence.has_path_with_file_name(config) {
            score += CONFIG_WEIGHT;
            matches.push(format!("config:{config}"));
        }
    }

    RuleScore {
        name: rule.name,
        score,
        matches,
        strong_marker,
    }
}

fn detect_characteristics(evidence: &Evidence) -> Vec<String> {
    let mut characteristics = Vec::new();
    let imports = &evidence.imports;

    if evidence.has_path_containing("test") {
        characteristics.push("testing".to_string());
        if imports.contains("pytest") {
            characteristics.push("pytest".to_string());
        } else if imports.contains("unittest") {
            characteristics.push("unittest".to_string());
        }
    }
    if DATA_SCIENCE_IMPORTS.iter().any(|ml| imports.contains(*ml)) {
        characteristics.push("data_science".to_string());
        if evidence.has_notebooks {
            characteristics.push("notebooks".to_string());
        }
    }
    if CLI_FRAMEWORKS.iter().any(|cli| imports.contains(*cli)) {
        characteristics.push("cli".to_string());
    }
    if API_IMPORTS.iter().any(|api| imports.contains(*api)) {
        characteristics.push("api".to_string());
    }
    if DATABASE_IMPORTS.iter().any(|db| imports.contains(*db)) || imports.contains("django.db") {
        characteristics.push("database".to_string());
    }
    if evidence.has_async {
        characteristics.push("async".to_string());
    }
    if evidence.has_path_with_file_name("Dockerfile") || evidence.has_path_containing("docker-compose")
    {
        characteristics.push("containerized".to_string());
    }
    if evidence.has_build_backend
        && !WEB_FRAMEWORK_IMPORTS.iter().any(|web| imports.contains(*web))
    {
        characteristics.push("library".to_string());
    }
    characteristics
}

/// Classifies a project from its collected evidence.
#[allow(clippy::too_many_lines)]
pub fn classify_evidence(evidence: &Evidence) -> ProjectAnalysis {
    let mut scored: Vec<RuleScore> = FRAMEWORK_RULES
        .iter()
        .map(|rule| score_rule(rule, evidence))
        .filter(|rule| rule.score > 0)
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.name.cmp(b.name)));

    let characteristics = detect_characteristics(evidence);
    let has_characteristic = |name: &str| characteristics.iter().any(|c| c == name);

    let top = scored.first();
    let mut primary_type = match top.map(|rule| rule.name) {
        Some("django") => ProjectType::Django,
        Some("flask") => ProjectType::Flask,
        Some("fastapi") => ProjectType::Fastapi,
        Some("streamlit") => ProjectType::Streamlit,
        _ => ProjectType::Generic,
    };
    let mut detected_types = vec![primary_type];

    // Frontend frameworks come from package.json, not from the rule table.
    if evidence.package_json_dependencies.contains("react") {
        detected_types.push(ProjectType::React);
    }
    if evidence.package_json_dependencies.contains("vue") {
        detected_types.push(ProjectType::Vue);
    }

    let all_dependencies = evidence.all_dependencies();
    let dependency_names_lower: BTreeSet<String> = all_dependencies
        .iter()
        .map(|dep| dep.to_lowercase())
        .collect();

    if primary_type == ProjectType::Django
        && dependency_names_lower.contains("djangorestframework")
    {
        primary_type = ProjectType::DjangoRest;
        detected_types[0] = ProjectType::DjangoRest;
    }

    if has_characteristic("data_science") {
        if primary_type == ProjectType::Generic {
            primary_type = ProjectType::DataScience;
            detected_types[0] = ProjectType::DataScience;
        } else {
            detected_types.push(ProjectType::DataScience);
        }
    }
    if has_characteristic("library") && primary_type == ProjectType::Generic {
        primary_type = ProjectType::Library;
        detected_types[0] = ProjectType::Library;
    }
    if has_characteristic("cli") {
        if primary_type == ProjectType::Generic {
            primary_type = ProjectType::Cli;
            detected_types[0] = ProjectType::Cli;
        } else {
            detected_types.push(ProjectType::Cli);
        }
    }

    let has_frontend = detected_types
        .iter()
        .any(|ty| matches!(ty, ProjectType::React | ProjectType::Vue));
    if has_frontend && detected_types.iter().any(|ty| ty.is_backend_web()) {
        primary_type = ProjectType::Hybrid;
    }

    let category = primary_type.category();

    let mut confidence = match top {
        Some(rule) => f64::from(rule.score.min(FULL_CONFIDENCE_SCORE))
            / f64::from(FULL_CONFIDENCE_SCORE),
        None => 0.0,
    };
    if let Some(rule) = top {
        // Many independent markers plus the framework's signature file is
        // as certain as this classifier gets.
        if rule.strong_marker && rule.matches.len() >= 4 {
            confidence = confidence.max(0.9);
        }
    }
    if scored.is_empty() {
        confidence = confidence.min(0.5);
    }

    let mut markers: Vec<String> = scored
        .iter()
        .flat_map(|rule| rule.matches.iter().cloned())
        .collect();
    markers.extend(evidence.entry_points.iter().cloned());
    markers.sort_unstable();
    markers.dedup();

    let primary_dependencies: Vec<String> = all_dependencies
        .iter()
        .filter(|dep| {
            let lower = dep.to_lowercase();
            PRIMARY_DEPENDENCY_HINTS.iter().any(|hint| lower.contains(hint))
        })
        .map(ToString::to_string)
        .collect();

    let ml_frameworks: Vec<String> = all_dependencies
        .iter()
        .filter(|dep| {
            let lower = dep.to_lowercase();
            ML_FRAMEWORKS.iter().any(|ml| lower.contains(ml))
        })
        .map(ToString::to_string)
        .collect();

    let cli_frameworks: Vec<String> = CLI_FRAMEWORKS
        .iter()
        .copied()
        .filter(|cli| dependency_names_lower.contains(*cli) || evidence.imports.contains(*cli))
        .map(ToString::to_string)
        .collect();

    let mut migration_paths = Vec::new();
    if evidence.uses_poetry {
        migration_paths.push("poetry_to_uv".to_string());
    }
    if evidence.uses_pipenv {
        migration_paths.push("pipenv_to_uv".to_string());
    }
    if evidence.uses_conda {
        migration_paths.push("conda_to_uv".to_string());
    }

    let frameworks = scored.iter().map(|rule| rule.name.to_string()).collect();
    let suggested_system_packages =
        infer_system_packages(evidence.imports.iter().map(String::as_str));

    tracing::debug!(
        project = %evidence.name,
        primary = %primary_type,
        confidence,
        "classified project"
    );

    ProjectAnalysis {
        root_path: evidence.root_path.clone(),
        name: evidence.name.clone(),
        primary_type,
        category,
        confidence,
        detected_types,
        markers,
        dependencies: evidence
            .dependencies
            .iter()
            .map(|(ecosystem, deps)| (ecosystem.clone(), DependencyReport::from_evidence(deps)))
            .collect(),
        primary_dependencies,
        frameworks,
        ml_frameworks,
        cli_frameworks,
        characteristics,
        uses_poetry: evidence.uses_poetry,
        uses_pipenv: evidence.uses_pipenv,
        uses_conda: evidence.uses_conda,
        migration_paths,
        has_notebooks: evidence.has_notebooks,
        is_publishable: primary_type == ProjectType::Library && evidence.has_build_backend,
        suggested_system_packages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_evidence(files: &[&str], deps: &[&str]) -> Evidence {
        let mut evidence = Evidence {
            root_path: "/tmp/project".into(),
            name: "project".into(),
            file_paths: files.iter().map(ToString::to_string).collect(),
            ..Evidence::default()
        };
        evidence.dependencies.insert(
            "python".into(),
            EvidenceDependencies {
                runtime: deps.iter().map(ToString::to_string).collect(),
                development: Vec::new(),
            },
        );
        for dep in deps {
            evidence.imports.insert(dep.to_lowercase());
        }
        evidence
    }

    #[test]
    fn django_project_scores_high_confidence() {
        let evidence = python_evidence(
            &[
                "manage.py",
                "myproj/settings.py",
                "myproj/urls.py",
                "myapp/models.py",
                "requirements.txt",
            ],
            &["Django"],
        );
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Django);
        assert_eq!(analysis.category, ProjectCategory::WebFramework);
        assert!(analysis.confidence >= 0.9, "{}", analysis.confidence);
        assert!(analysis.markers.contains(&"file:manage.py".to_string()));
        assert!(analysis
            .primary_dependencies
            .iter()
            .any(|dep| dep.eq_ignore_ascii_case("django")));
    }

    #[test]
    fn removing_the_strong_marker_decreases_confidence() {
        let with_manage = python_evidence(
            &[
                "manage.py",
                "myproj/settings.py",
                "myproj/urls.py",
                "myapp/models.py",
            ],
            &["Django"],
        );
        let without_manage = python_evidence(
            &["myproj/settings.py", "myproj/urls.py", "myapp/models.py"],
            &["Django"],
        );
        let confident = classify_evidence(&with_manage).confidence;
        let less_confident = classify_evidence(&without_manage).confidence;
        assert!(confident > less_confident);
    }

    #[test]
    fn django_plus_react_is_a_full_stack_hybrid() {
        let mut evidence = python_evidence(
            &["manage.py", "backend/settings.py", "package.json"],
            &["django"],
        );
        evidence.package_json_dependencies.insert("react".into());
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Hybrid);
        assert_eq!(analysis.category, ProjectCategory::FullStack);
        assert!(analysis.detected_types.contains(&ProjectType::Django));
        assert!(analysis.detected_types.contains(&ProjectType::React));
    }

    #[test]
    fn signature_file_plus_many_markers_floors_confidence_for_any_framework() {
        let evidence = python_evidence(
            &[
                "streamlit_app.py",
                "pages/home.py",
                ".streamlit/config.toml",
            ],
            &["streamlit"],
        );
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Streamlit);
        assert_eq!(analysis.category, ProjectCategory::DataAnalysis);
        assert!(analysis.confidence >= 0.9, "{}", analysis.confidence);
    }

    #[test]
    fn rest_framework_upgrades_django_to_web_api() {
        let evidence = python_evidence(
            &["manage.py", "api/settings.py"],
            &["django", "djangorestframework"],
        );
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::DjangoRest);
        assert_eq!(analysis.category, ProjectCategory::WebApi);
    }

    #[test]
    fn library_requires_build_backend_and_no_web_imports() {
        let mut evidence = python_evidence(&["pyproject.toml", "src/lib/core.py"], &["requests"]);
        evidence.has_build_backend = true;
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Library);
        assert_eq!(analysis.category, ProjectCategory::Package);
        assert!(analysis.is_publishable);

        // Same tree with a flask import stops being a library.
        let mut web = python_evidence(&["pyproject.toml", "src/lib/core.py"], &["flask"]);
        web.has_build_backend = true;
        let analysis = classify_evidence(&web);
        assert_ne!(analysis.primary_type, ProjectType::Library);
    }

    #[test]
    fn cli_project_from_imports() {
        let mut evidence = python_evidence(&["cli.py"], &["click"]);
        evidence.imports.insert("click".into());
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Cli);
        assert_eq!(analysis.category, ProjectCategory::CommandLine);
        assert_eq!(analysis.cli_frameworks, vec!["click".to_string()]);
    }

    #[test]
    fn data_science_from_imports_and_notebooks() {
        let mut evidence = python_evidence(
            &["notebooks/analysis.ipynb", "train.py"],
            &["pandas", "numpy", "scikit-learn"],
        );
        evidence.imports.insert("sklearn".into());
        evidence.has_notebooks = true;
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::DataScience);
        assert_eq!(analysis.category, ProjectCategory::MachineLearning);
        assert!(analysis.has_notebooks);
        assert!(analysis.characteristics.contains(&"notebooks".to_string()));
        assert!(!analysis.ml_frameworks.is_empty());
    }

    #[test]
    fn empty_tree_is_generic_with_low_confidence() {
        let evidence = python_evidence(&[], &[]);
        let analysis = classify_evidence(&evidence);
        assert_eq!(analysis.primary_type, ProjectType::Generic);
        assert_eq!(analysis.category, ProjectCategory::Unknown);
        assert!(analysis.confidence <= 0.5);
    }

    #[test]
    fn confidence_is_always_in_unit_interval() {
        let evidence = python_evidence(
            &[
                "manage.py",
                "a/settings.py",
                "a/urls.py",
                "a/models.py",
                "a/wsgi.py",
                "a/asgi.py",
                "templates/x.html",
                "static/app.css",
            ],
            &["django"],
        );
        let analysis = classify_evidence(&evidence);
        assert!(analysis.confidence <= 1.0);
        assert!(analysis.confidence >= 0.0);
    }

    #[test]
    fn dependency_report_includes_the_union() {
        let mut evidence = python_evidence(&[], &["requests"]);
        evidence
            .dependencies
            .get_mut("python")
            .unwrap()
            .development
            .push("pytest".into());
        let analysis = classify_evidence(&evidence);
        let python = &analysis.dependencies["python"];
        assert_eq!(python.runtime, vec!["requests".to_string()]);
        assert_eq!(python.development, vec!["pytest".to_string()]);
        assert_eq!(
            python.all,
            vec!["pytest".to_string(), "requests".to_string()]
        );
    }

    #[test]
    fn migration_paths_follow_lock_files() {
        let mut evidence = python_evidence(&["poetry.lock", "environment.yml"], &[]);
        evidence.uses_poetry = true;
        evidence.uses_conda = true;
        let analysis = classify_evidence(&evidence);
        assert_eq!(
            analysis.migration_paths,
            vec!["poetry_to_uv".to_string(), "conda_to_uv".to_string()]
        );
    }
}
