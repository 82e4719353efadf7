use std::fmt;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Host platform, normalized to the lowercase names used throughout reports
/// and snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Macos,
    Linux,
    Windows,
    Other(String),
}

impl Platform {
    /// Detects the platform the current process is running on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Macos
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other(std::env::consts::OS.to_string())
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "macos" | "darwin" => Self::Macos,
            "linux" => Self::Linux,
            "windows" => Self::Windows,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Macos => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Other(name) => name,
        }
    }

    /// Short tag embedded into snapshot identifiers.
    pub fn short_tag(&self) -> &str {
        match self {
            Self::Macos => "mac",
            Self::Linux => "lin",
            Self::Windows => "win",
            Self::Other(name) => {
                let end = name
                    .char_indices()
                    .nth(3)
                    .map_or(name.len(), |(idx, _)| idx);
                &name[..end]
            }
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name.is_empty() {
            return Err(de::Error::custom("platform name must not be empty"));
        }
        Ok(Self::from_name(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for platform in [Platform::Macos, Platform::Linux, Platform::Windows] {
            assert_eq!(Platform::from_name(platform.as_str()), platform);
        }
        assert_eq!(
            Platform::from_name("freebsd"),
            Platform::Other("freebsd".into())
        );
    }

    #[test]
    fn darwin_normalizes_to_macos() {
        assert_eq!(Platform::from_name("Darwin"), Platform::Macos);
    }

    #[test]
    fn short_tags() {
        assert_eq!(Platform::Macos.short_tag(), "mac");
        assert_eq!(Platform::Linux.short_tag(), "lin");
        assert_eq!(Platform::Windows.short_tag(), "win");
        assert_eq!(Platform::Other("freebsd".into()).short_tag(), "fre");
        assert_eq!(Platform::Other("os".into()).short_tag(), "os");
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&Platform::Macos).unwrap();
        assert_eq!(json, "\"macos\"");
        let back: Platform = serde_json::from_str("\"linux\"").unwrap();
        assert_eq!(back, Platform::Linux);
    }
}
