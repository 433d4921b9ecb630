//! Configuration types for a kiln project.
//!
//! Keys are camelCase in `kiln.toml` and `package.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kiln_core::{Category, SourceRootMap};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KilnConfig {
    /// Root output directory served by the dev server
    pub dist: PathBuf,

    /// Template sources
    pub html: PathBuf,

    /// Output directory for compiled templates
    pub html_dist: PathBuf,

    /// Stylesheet sources
    pub sass: PathBuf,

    pub css_dist: PathBuf,

    /// Script sources
    pub js: PathBuf,

    pub js_dist: PathBuf,

    /// Directories copied to `dist` as-is (images, fonts, ...)
    pub static_folders: Vec<PathBuf>,

    /// Stylesheet regenerated with an `@import` per partial before each
    /// style build
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assemble_styles: Option<PathBuf>,

    pub production: bool,

    pub debug: bool,

    pub dev: DevOptions,

    pub compilers: CompilerCommands,

    pub modules: ModulesConfig,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            dist: PathBuf::from("dist"),
            html: PathBuf::from("src/pug"),
            html_dist: PathBuf::from("dist"),
            sass: PathBuf::from("src/scss"),
            css_dist: PathBuf::from("dist/css"),
            js: PathBuf::from("src/js"),
            js_dist: PathBuf::from("dist/js"),
            static_folders: vec![PathBuf::from("src/images"), PathBuf::from("src/fonts")],
            assemble_styles: None,
            production: false,
            debug: false,
            dev: DevOptions::default(),
            compilers: CompilerCommands::default(),
            modules: ModulesConfig::default(),
        }
    }
}

/// Development server and watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevOptions {
    pub host: String,

    pub port: u16,

    /// Quiet period before a batch of changes is built
    pub debounce_ms: u64,

    /// Upper bound on waiting for the server port to be released
    pub stop_timeout_ms: u64,

    /// Open the browser once the server is up
    pub open: bool,

    /// Path components or `*.ext` patterns the watcher ignores
    pub watch_ignore: Vec<String>,
}

impl DevOptions {
    pub const DEBOUNCE_RANGE: std::ops::RangeInclusive<u64> = 50..=2000;

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for DevOptions {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            debounce_ms: default_debounce_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            open: false,
            watch_ignore: default_watch_ignore(),
        }
    }
}

/// External compiler command templates.
///
/// `{src}` expands to the category's source root and `{dest}` to its output
/// directory. A category without a command is not compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerCommands {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl CompilerCommands {
    /// Command template for `category`, if one is configured.
    pub fn for_category(&self, category: Category) -> Option<&str> {
        match category {
            Category::Template => self.template.as_deref(),
            Category::Style => self.style.as_deref(),
            Category::Script => self.script.as_deref(),
            Category::StaticAsset => None,
        }
    }
}

/// Pluggable modules run after static folder changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<ImagesOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprites: Option<SpritesOptions>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagesOptions {
    pub entry: PathBuf,
    pub dist: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpritesOptions {
    pub entry: PathBuf,
    pub dist: PathBuf,

    /// Prefix of every `<symbol id>` in the generated sprite
    #[serde(default = "default_sprite_icon_selector")]
    pub sprite_icon_selector: String,
}

impl KilnConfig {
    /// Parse a config from a JSON value (the `kiln` field of `package.json`,
    /// or programmatic use).
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// Source root of a compiled category.
    pub fn source_dir(&self, category: Category) -> Option<&Path> {
        match category {
            Category::Template => Some(&self.html),
            Category::Style => Some(&self.sass),
            Category::Script => Some(&self.js),
            Category::StaticAsset => None,
        }
    }

    /// Output directory of a compiled category.
    pub fn dist_dir(&self, category: Category) -> Option<&Path> {
        match category {
            Category::Template => Some(&self.html_dist),
            Category::Style => Some(&self.css_dist),
            Category::Script => Some(&self.js_dist),
            Category::StaticAsset => None,
        }
    }

    /// Build the classifier's root map with every path resolved against
    /// `cwd`.
    ///
    /// Declaration order is template, style, script, then each static folder,
    /// which decides ties between identical roots.
    pub fn source_roots(&self, cwd: &Path) -> SourceRootMap {
        SourceRootMap::builder()
            .root(Category::Template, resolve(cwd, &self.html))
            .root(Category::Style, resolve(cwd, &self.sass))
            .root(Category::Script, resolve(cwd, &self.js))
            .roots(
                Category::StaticAsset,
                self.static_folders.iter().map(|folder| resolve(cwd, folder)),
            )
            .build()
    }
}

/// Resolve a config path against the project root.
pub fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.clean()
    } else {
        cwd.join(path).clean()
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_stop_timeout_ms() -> u64 {
    5000
}

fn default_watch_ignore() -> Vec<String> {
    ["node_modules", ".git", "*.log", ".DS_Store"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_sprite_icon_selector() -> String {
    "icon-".into()
}
