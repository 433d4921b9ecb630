//! Layered configuration loading.
//!
//! Priority: CLI overrides > `KILN_` environment > config file > defaults

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::Serialize;

use crate::config::KilnConfig;
use crate::discovery::{ConfigDiscovery, ConfigSource, read_package_json_field};
use crate::error::{ConfigError, Result};

pub const ENV_PREFIX: &str = "KILN_";

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,

    #[serde(skip_serializing_if = "DevOverrides::is_empty")]
    pub dev: DevOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DevOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,
}

impl DevOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.open.is_none()
    }
}

/// Builder for loading a [`KilnConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
    config_path: Option<PathBuf>,
    overrides: CliOverrides,
    use_env: bool,
}

impl ConfigLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config_path: None,
            overrides: CliOverrides::default(),
            use_env: true,
        }
    }

    /// Use this file instead of discovering one. It must exist.
    pub fn config_path(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.config_path = path.map(|p| {
            let p = p.as_ref();
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                self.root.join(p)
            }
        });
        self
    }

    pub fn overrides(mut self, overrides: CliOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Skip the environment layer.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    /// The config source that will be used, if any.
    pub fn source(&self) -> Result<Option<ConfigSource>> {
        match &self.config_path {
            Some(path) if path.is_file() => Ok(Some(ConfigSource::from_path(path))),
            Some(path) => Err(ConfigError::NotFound(path.clone())),
            None => Ok(ConfigDiscovery::new(&self.root).find()),
        }
    }

    /// Merge every layer and validate the result.
    pub fn load(&self) -> Result<KilnConfig> {
        let mut figment = Figment::new().merge(Serialized::defaults(KilnConfig::default()));

        match self.source()? {
            Some(ConfigSource::Toml(path)) => {
                tracing::debug!("Loading config from {}", path.display());
                figment = figment.merge(Toml::file_exact(path));
            }
            Some(ConfigSource::PackageJson(path)) => {
                tracing::debug!("Loading config from {} (kiln field)", path.display());
                figment = figment.merge(Serialized::defaults(read_package_json_field(&path)?));
            }
            None => tracing::debug!("No config file found, using defaults"),
        }

        if self.use_env {
            // KILN_DEV__DEBOUNCE_MS -> dev.debounceMs
            figment = figment.merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| env_key(key.as_str()).into())
                    .lowercase(false),
            );
        }

        figment = figment.merge(Serialized::defaults(&self.overrides));

        let config: KilnConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}

/// Translate an environment key (prefix stripped) into a config key path:
/// `__` separates nesting levels and `_` separated words become camelCase.
pub fn env_key(raw: &str) -> String {
    raw.split("__")
        .map(|segment| {
            let mut out = String::with_capacity(segment.len());
            for (i, word) in segment.split('_').filter(|w| !w.is_empty()).enumerate() {
                let word = word.to_ascii_lowercase();
                if i == 0 {
                    out.push_str(&word);
                } else {
                    let mut chars = word.chars();
                    if let Some(first) = chars.next() {
                        out.push(first.to_ascii_uppercase());
                        out.push_str(chars.as_str());
                    }
                }
            }
            out
        })
        .collect::<Vec<_>>()
        .join(".")
}
