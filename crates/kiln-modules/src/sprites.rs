//! SVG sprite module.
//!
//! Every `*.svg` under the entry directory becomes one `<symbol>` of a hidden
//! sprite sheet written to `{dist}/sprite.svg`:
//!
//! ```text
//! src/icons/arrow.svg  ->  <symbol id="icon-arrow" viewBox="0 0 24 24">...</symbol>
//! ```
//!
//! Icons are referenced from markup with `<use href="/sprite.svg#icon-arrow">`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use kiln_config::{SpritesOptions, resolve};
use kiln_core::{Module, ModuleContext, ModuleError};
use regex::Regex;
use walkdir::WalkDir;

use crate::{blocking, io_error};

const NAME: &str = "sprites";

pub const SPRITE_FILE: &str = "sprite.svg";

static SVG_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<svg\b([^>]*)>").expect("valid regex"));
static SVG_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</svg\s*>").expect("valid regex"));
static PROLOG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<\?xml.*?\?>|<!DOCTYPE[^>]*>|<!--.*?-->").expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct SpriteModule {
    debug: bool,
    entry: PathBuf,
    dist: PathBuf,
    selector: String,
}

impl SpriteModule {
    pub fn new(
        entry: impl Into<PathBuf>,
        dist: impl Into<PathBuf>,
        sprite_icon_selector: impl Into<String>,
    ) -> Self {
        Self {
            debug: false,
            entry: entry.into(),
            dist: dist.into(),
            selector: sprite_icon_selector.into(),
        }
    }

    pub fn from_options(options: &SpritesOptions, root: &Path, debug: bool) -> Self {
        Self::new(
            resolve(root, &options.entry),
            resolve(root, &options.dist),
            options.sprite_icon_selector.clone(),
        )
        .with_debug(debug)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Path of the generated sprite sheet.
    pub fn output(&self) -> PathBuf {
        self.dist.join(SPRITE_FILE)
    }

    /// Render the sprite sheet from the current icons.
    pub fn render(&self) -> Result<String, ModuleError> {
        if !self.entry.is_dir() {
            return Err(ModuleError::Failed {
                module: NAME.to_string(),
                message: format!("entry directory {} does not exist", self.entry.display()),
            });
        }

        let output = self.output();
        let mut sheet = String::from(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" style=\"display:none\">\n",
        );

        for entry in WalkDir::new(&self.entry).sort_by_file_name() {
            let entry = entry.map_err(|e| ModuleError::Failed {
                module: NAME.to_string(),
                message: e.to_string(),
            })?;
            let path = entry.path();
            let is_svg = path.extension().is_some_and(|ext| ext == "svg");
            // The sheet may live inside the entry directory
            if !entry.file_type().is_file() || !is_svg || path == output {
                continue;
            }

            let source = fs::read_to_string(path).map_err(|e| io_error(NAME, path, e))?;
            let id = format!("{}{}", self.selector, icon_name(path));
            match symbol(&id, &source) {
                Some(symbol) => {
                    sheet.push_str("  ");
                    sheet.push_str(&symbol);
                    sheet.push('\n');
                }
                None => tracing::warn!("[sprites] skipping {}: no <svg> root", path.display()),
            }
        }

        sheet.push_str("</svg>\n");
        Ok(sheet)
    }

    /// Write the sprite sheet if its content changed. Returns whether it was
    /// written.
    pub fn build(&self) -> Result<bool, ModuleError> {
        let sheet = self.render()?;
        let output = self.output();

        if fs::read_to_string(&output).is_ok_and(|current| current == sheet) {
            tracing::debug!("[sprites] {} is up to date", output.display());
            return Ok(false);
        }

        fs::create_dir_all(&self.dist).map_err(|e| io_error(NAME, &self.dist, e))?;
        fs::write(&output, sheet).map_err(|e| io_error(NAME, &output, e))?;

        if self.debug {
            tracing::info!("[sprites] wrote {}", output.display());
        }
        Ok(true)
    }
}

#[async_trait]
impl Module for SpriteModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        let module = self.clone().with_debug(self.debug || ctx.debug);
        blocking(NAME, move || module.build()).await?;
        Ok(())
    }
}

/// File stem with whitespace replaced, used as the symbol id suffix.
fn icon_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Turn a standalone SVG document into a `<symbol>`.
///
/// Keeps the root's `viewBox` (or derives one from `width`/`height`) and the
/// inner markup; everything else on the root element is dropped.
fn symbol(id: &str, source: &str) -> Option<String> {
    let source = PROLOG.replace_all(source, "");
    let open = SVG_OPEN.captures(&source)?;
    let whole = open.get(0)?;
    let attrs = open.get(1).map_or("", |m| m.as_str());

    let body_start = whole.end();
    let body_end = SVG_CLOSE
        .find_iter(&source)
        .last()
        .map_or(source.len(), |m| m.start());
    let body = source.get(body_start..body_end).unwrap_or("").trim();

    let view_box = attribute(attrs, "viewBox").or_else(|| {
        let width = attribute(attrs, "width")?;
        let height = attribute(attrs, "height")?;
        Some(format!(
            "0 0 {} {}",
            width.trim_end_matches("px"),
            height.trim_end_matches("px")
        ))
    });

    Some(match view_box {
        Some(view_box) => format!("<symbol id=\"{id}\" viewBox=\"{view_box}\">{body}</symbol>"),
        None => format!("<symbol id=\"{id}\">{body}</symbol>"),
    })
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"(?:^|\s){}\s*=\s*["']([^"']*)["']"#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    re.captures(attrs)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
