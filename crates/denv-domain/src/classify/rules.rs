//! Framework detection rules and weights.
//!
//! One consistent weight table is used everywhere: a strong marker file
//! (weight >= STRONG_MARKER_WEIGHT) dominates, imports count more than
//! structural hints, and generic entry points (`main.py`, `app.py`) count
//! barely above noise because several frameworks share them.

/// Weight at and above which a marker file alone identifies a framework.
pub const STRONG_MARKER_WEIGHT: u32 = 10;
pub const IMPORT_WEIGHT: u32 = 3;
pub const STRUCTURE_WEIGHT: u32 = 2;
pub const CONFIG_WEIGHT: u32 = 2;

/// Score a rule must reach for full confidence.
pub const FULL_CONFIDENCE_SCORE: u32 = 30;

#[derive(Debug, Clone, Copy)]
pub struct FrameworkRule {
    pub name: &'static str,
    /// Marker files with individual weights.
    pub marker_files: &'static [(&'static str, u32)],
    pub import_patterns: &'static [&'static str],
    pub structure_hints: &'static [&'static str],
    pub config_files: &'static [&'static str],
}

pub const FRAMEWORK_RULES: &[FrameworkRule] = &[
    FrameworkRule {
        name: "django",
        marker_files: &[
            ("manage.py", 15),
            ("wsgi.py", 6),
            ("asgi.py", 6),
            ("settings.py", 3),
            ("urls.py", 3),
            ("models.py", 3),
        ],
        import_patterns: &["django", "django.conf", "django.urls", "django.db"],
        structure_hints: &["apps/", "templates/", "static/", "media/"],
        config_files: &[],
    },
    FrameworkRule {
        name: "flask",
        marker_files: &[("application.py", 6), ("app.py", 2), ("wsgi.py", 2)],
        import_patterns: &["flask", "flask_sqlalchemy", "flask_migrate"],
        structure_hints: &["templates/", "static/"],
        config_files: &[".flaskenv"],
    },
    FrameworkRule {
        name: "fastapi",
        marker_files: &[("main.py", 2), ("app.py", 2)],
        import_patterns: &["fastapi", "uvicorn", "pydantic"],
        structure_hints: &["routers/", "schemas/"],
        config_files: &[],
    },
    FrameworkRule {
        name: "streamlit",
        marker_files: &[("streamlit_app.py", 10), ("app.py", 2)],
        import_patterns: &["streamlit"],
        structure_hints: &["pages/", ".streamlit/"],
        config_files: &[".streamlit/config.toml"],
    },
    FrameworkRule {
        name: "pytest",
        marker_files: &[("conftest.py", 6), ("pytest.ini", 6), ("tox.ini", 3)],
        import_patterns: &["pytest", "unittest"],
        structure_hints: &["tests/"],
        config_files: &["pytest.ini", "tox.ini"],
    },
    FrameworkRule {
        name: "library",
        marker_files: &[("setup.py", 6), ("setup.cfg", 6), ("pyproject.toml", 3)],
        import_patterns: &["setuptools", "hatchling", "flit"],
        structure_hints: &["src/"],
        config_files: &["setup.cfg", "MANIFEST.in"],
    },
    FrameworkRule {
        name: "data_science",
        marker_files: &[("train.py", 4), ("model.py", 3)],
        import_patterns: &[
            "pandas",
            "numpy",
            "sklearn",
            "tensorflow",
            "torch",
            "keras",
            "matplotlib",
        ],
        structure_hints: &["notebooks/", "data/", "models/", "experiments/"],
        config_files: &["environment.yml", "conda.yml"],
    },
];

/// Framework-ish dependency names considered primary for a project.
pub const PRIMARY_DEPENDENCY_HINTS: &[&str] = &[
    "django",
    "flask",
    "fastapi",
    "streamlit",
    "gradio",
    "uvicorn",
    "gunicorn",
    "celery",
];

pub const ML_FRAMEWORKS: &[&str] = &[
    "tensorflow",
    "torch",
    "pytorch",
    "keras",
    "scikit-learn",
    "sklearn",
    "xgboost",
    "lightgbm",
];

pub const CLI_FRAMEWORKS: &[&str] = &["click", "typer", "fire", "argparse"];

/// Web frameworks whose presence disqualifies a tree from being a plain
/// library.
pub const WEB_FRAMEWORK_IMPORTS: &[&str] = &[
    "django", "flask", "fastapi", "streamlit", "tornado", "aiohttp",
];

pub const DATA_SCIENCE_IMPORTS: &[&str] =
    &["sklearn", "tensorflow", "torch", "keras", "pandas", "numpy"];

pub const API_IMPORTS: &[&str] = &["fastapi", "flask", "graphene", "djangorestframework"];

pub const DATABASE_IMPORTS: &[&str] = &["sqlalchemy", "pymongo", "redis", "psycopg2", "psycopg"];
