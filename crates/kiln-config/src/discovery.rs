//! File-based config discovery.
//!
//! Looks for `kiln.toml` in the project root, falling back to a `kiln` field
//! in `package.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{ConfigError, Result};

pub const CONFIG_FILE: &str = "kiln.toml";
pub const PACKAGE_JSON_FIELD: &str = "kiln";

/// Where a configuration was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Toml(PathBuf),
    /// `package.json` with a non-null `kiln` field
    PackageJson(PathBuf),
}

impl ConfigSource {
    /// Classify an explicitly given config path by its file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.file_name() == Some(std::ffi::OsStr::new("package.json")) {
            ConfigSource::PackageJson(path)
        } else {
            ConfigSource::Toml(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Toml(path) | ConfigSource::PackageJson(path) => path,
        }
    }
}

/// Searches a project root for configuration.
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Find a config source in the root directory.
    ///
    /// Searches in this order:
    /// 1. `kiln.toml`
    /// 2. `package.json` (`kiln` field)
    pub fn find(&self) -> Option<ConfigSource> {
        let toml_path = self.root.join(CONFIG_FILE);
        if toml_path.is_file() {
            return Some(ConfigSource::Toml(toml_path));
        }

        let pkg_path = self.root.join("package.json");
        if let Ok(content) = fs::read_to_string(&pkg_path) {
            if let Ok(parsed) = serde_json::from_str::<Value>(&content) {
                if parsed
                    .get(PACKAGE_JSON_FIELD)
                    .is_some_and(|value| !value.is_null())
                {
                    return Some(ConfigSource::PackageJson(pkg_path));
                }
            }
        }

        None
    }
}

/// Extract the `kiln` field from a `package.json`.
pub fn read_package_json_field(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;

    let parsed: Value = serde_json::from_str(&content)
        .map_err(|e| ConfigError::invalid("package.json", format!("Invalid JSON: {e}")))?;

    match parsed.get(PACKAGE_JSON_FIELD) {
        Some(Value::Object(_)) => Ok(parsed[PACKAGE_JSON_FIELD].clone()),
        Some(Value::Null) | None => Err(ConfigError::invalid(
            PACKAGE_JSON_FIELD,
            "Add a 'kiln' object to your package.json",
        )),
        Some(_) => Err(ConfigError::invalid(
            PACKAGE_JSON_FIELD,
            "The 'kiln' field must be an object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn toml_wins_over_package_json() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiln.toml"), "dist = \"out\"\n").unwrap();
        fs::write(dir.path().join("package.json"), r#"{"kiln": {"dist": "www"}}"#).unwrap();

        let found = ConfigDiscovery::new(dir.path()).find().unwrap();
        assert_eq!(found, ConfigSource::Toml(dir.path().join("kiln.toml")));
    }

    #[test]
    fn package_json_without_field_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"name": "site", "kiln": null}"#).unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    fn package_json_field_must_be_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, r#"{"kiln": "dist"}"#).unwrap();

        let err = read_package_json_field(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "kiln"));
    }

    #[test]
    fn source_from_path_detects_package_json() {
        assert!(matches!(
            ConfigSource::from_path("site/package.json"),
            ConfigSource::PackageJson(_)
        ));
        assert!(matches!(
            ConfigSource::from_path("site/kiln.prod.toml"),
            ConfigSource::Toml(_)
        ));
    }
}
