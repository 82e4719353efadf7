//! Import to system-package inference.
//!
//! Maps Python imports to the system packages they typically need at build
//! or run time. Advisory output only; nothing installs these.

use std::collections::BTreeSet;

const IMPORT_TO_SYSTEM_PACKAGES: &[(&str, &[&str])] = &[
    // Database drivers
    ("psycopg2", &["postgresql-client", "libpq-dev"]),
    ("psycopg", &["postgresql-client", "libpq-dev"]),
    ("mysqlclient", &["mysql-client", "libmysqlclient-dev"]),
    ("pymongo", &["mongodb-clients"]),
    ("redis", &["redis-tools"]),
    // Scientific computing
    ("numpy", &["libopenblas-dev", "gfortran"]),
    ("scipy", &["liblapack-dev", "libblas-dev", "gfortran"]),
    ("pandas", &["libhdf5-dev"]),
    ("matplotlib", &["libfreetype6-dev", "libpng-dev"]),
    ("cv2", &["libopencv-dev"]),
    // Machine learning
    ("tensorflow", &["cuda-toolkit", "cudnn"]),
    ("torch", &["cuda-toolkit", "cudnn"]),
    ("jax", &["cuda-toolkit", "cudnn"]),
    // Image processing
    ("PIL", &["libjpeg-dev", "zlib1g-dev", "libtiff-dev"]),
    ("Pillow", &["libjpeg-dev", "zlib1g-dev", "libtiff-dev"]),
    // Audio / video
    ("pyaudio", &["portaudio19-dev"]),
    ("pydub", &["ffmpeg"]),
    ("moviepy", &["ffmpeg", "imagemagick"]),
    // Cryptography
    ("cryptography", &["libssl-dev", "libffi-dev"]),
    // Markup
    ("lxml", &["libxml2-dev", "libxslt-dev"]),
    ("beautifulsoup4", &["libxml2-dev", "libxslt-dev"]),
    // Geographic
    ("geopandas", &["libgdal-dev", "gdal-bin"]),
    ("shapely", &["libgeos-dev"]),
    ("fiona", &["libgdal-dev"]),
    // Servers
    ("uwsgi", &["build-essential", "python3-dev"]),
    ("gunicorn", &["build-essential"]),
    ("python-ldap", &["libldap2-dev", "libsasl2-dev"]),
];

/// Infers the sorted set of system packages suggested by the given imports.
/// Dotted imports match through their base module.
pub fn infer_system_packages<'a>(imports: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut packages = BTreeSet::new();
    for import in imports {
        let base = import.split('.').next().unwrap_or(import);
        for (known, deps) in IMPORT_TO_SYSTEM_PACKAGES {
            if *known == import || *known == base {
                packages.extend(deps.iter().map(ToString::to_string));
            }
        }
    }
    packages.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_and_submodule_imports_match() {
        let imports = ["psycopg2", "lxml.etree", "unrelated"];
        let packages = infer_system_packages(imports.iter().copied());
        assert!(packages.contains(&"libpq-dev".to_string()));
        assert!(packages.contains(&"libxml2-dev".to_string()));
    }

    #[test]
    fn output_is_sorted_and_deduplicated() {
        let imports = ["tensorflow", "torch"];
        let packages = infer_system_packages(imports.iter().copied());
        assert_eq!(packages, vec!["cuda-toolkit".to_string(), "cudnn".to_string()]);
    }

    #[test]
    fn no_known_imports_yields_empty() {
        let imports = ["os", "sys"];
        assert!(infer_system_packages(imports.iter().copied()).is_empty());
    }
}
