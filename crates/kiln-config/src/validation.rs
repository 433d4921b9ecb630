use indexmap::IndexMap;
use path_clean::PathClean;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{DevOptions, KilnConfig};
use crate::error::{ConfigError, Result};

impl KilnConfig {
    /// Validate configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_roots()?;
        self.dev.validate()?;

        if let Some(images) = &self.modules.images {
            non_empty_path("modules.images.entry", &images.entry)?;
            non_empty_path("modules.images.dist", &images.dist)?;
        }

        if let Some(sprites) = &self.modules.sprites {
            non_empty_path("modules.sprites.entry", &sprites.entry)?;
            non_empty_path("modules.sprites.dist", &sprites.dist)?;
            validate_icon_selector(&sprites.sprite_icon_selector)?;
        }

        Ok(())
    }

    fn validate_roots(&self) -> Result<()> {
        let mut roots: Vec<(String, &Path)> = vec![
            ("html".to_string(), self.html.as_path()),
            ("sass".to_string(), self.sass.as_path()),
            ("js".to_string(), self.js.as_path()),
        ];
        roots.extend(
            self.static_folders
                .iter()
                .enumerate()
                .map(|(i, folder)| (format!("staticFolders[{i}]"), folder.as_path())),
        );

        // cleaned root -> field that declared it first
        let mut seen: IndexMap<PathBuf, String> = IndexMap::new();
        for (field, root) in roots {
            non_empty_path(&field, root)?;
            let cleaned = root.clean();
            if let Some(first) = seen.get(&cleaned) {
                return Err(ConfigError::invalid(
                    field,
                    format!(
                        "'{}' is already used by '{}'; every source root must be distinct",
                        root.display(),
                        first
                    ),
                ));
            }
            seen.insert(cleaned, field);
        }

        self.validate_static_targets()?;

        non_empty_path("dist", &self.dist)?;
        let dist = self.dist.clean();
        if let Some(field) = seen.get(&dist) {
            return Err(ConfigError::invalid(
                "dist",
                format!("output directory cannot be the source root '{field}'"),
            ));
        }

        Ok(())
    }

    /// Static folders are copied to `dist/<folder name>`, so those names
    /// must be unique.
    fn validate_static_targets(&self) -> Result<()> {
        let mut targets: IndexMap<OsString, usize> = IndexMap::new();

        for (i, folder) in self.static_folders.iter().enumerate() {
            let field = format!("staticFolders[{i}]");
            let cleaned = folder.clean();
            let Some(name) = cleaned.file_name() else {
                return Err(ConfigError::invalid(
                    field,
                    format!("'{}' does not name a directory", folder.display()),
                ));
            };
            if let Some(first) = targets.get(name) {
                return Err(ConfigError::invalid(
                    field,
                    format!(
                        "'{}' would be copied to the same output folder as staticFolders[{}]",
                        folder.display(),
                        first
                    ),
                ));
            }
            targets.insert(name.to_os_string(), i);
        }

        Ok(())
    }
}

impl DevOptions {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("dev.host", "Host cannot be empty"));
        }

        if !Self::DEBOUNCE_RANGE.contains(&self.debounce_ms) {
            return Err(ConfigError::invalid(
                "dev.debounceMs",
                format!(
                    "{} is out of range ({} to {})",
                    self.debounce_ms,
                    Self::DEBOUNCE_RANGE.start(),
                    Self::DEBOUNCE_RANGE.end()
                ),
            ));
        }

        if self.stop_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "dev.stopTimeoutMs",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Validate the sprite symbol id prefix is usable at the start of an XML
/// name.
pub fn validate_icon_selector(selector: &str) -> Result<()> {
    let field = "modules.sprites.spriteIconSelector";

    let Some(first) = selector.chars().next() else {
        return Err(ConfigError::invalid(field, "Selector cannot be empty"));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ConfigError::invalid(
            field,
            format!("Must start with a letter or underscore (got '{first}')"),
        ));
    }

    if let Some(c) = selector
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '-' | '.'))
    {
        return Err(ConfigError::invalid(
            field,
            format!("Invalid character '{c}' in selector"),
        ));
    }

    Ok(())
}

fn non_empty_path(field: &str, path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(field, "Path cannot be empty"));
    }
    Ok(())
}
