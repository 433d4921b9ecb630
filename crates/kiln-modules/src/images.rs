//! Image module: mirrors image files from an entry directory into `dist`.
//!
//! Recompression is left to external tooling; this module keeps the output
//! tree in sync and skips files that are already up to date.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use kiln_config::{ImagesOptions, resolve};
use kiln_core::{Module, ModuleContext, ModuleError};
use walkdir::WalkDir;

use crate::{blocking, io_error};

const NAME: &str = "images";

#[derive(Debug, Clone)]
pub struct ImageModule {
    debug: bool,
    entry: PathBuf,
    dist: PathBuf,
}

/// What a sync pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Targets written in this pass
    pub copied: Vec<PathBuf>,
    /// Images already up to date
    pub unchanged: usize,
}

impl ImageModule {
    pub const EXTENSIONS: &'static [&'static str] =
        &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"];

    pub fn new(entry: impl Into<PathBuf>, dist: impl Into<PathBuf>) -> Self {
        Self {
            debug: false,
            entry: entry.into(),
            dist: dist.into(),
        }
    }

    /// Build from config, resolving paths against the project root.
    pub fn from_options(options: &ImagesOptions, root: &Path, debug: bool) -> Self {
        Self::new(resolve(root, &options.entry), resolve(root, &options.dist)).with_debug(debug)
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }

    pub fn dist(&self) -> &Path {
        &self.dist
    }

    pub fn is_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                Self::EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }

    /// Copy every image under `entry` whose target is missing or stale.
    pub fn sync(&self) -> Result<SyncReport, ModuleError> {
        if !self.entry.is_dir() {
            return Err(ModuleError::Failed {
                module: NAME.to_string(),
                message: format!("entry directory {} does not exist", self.entry.display()),
            });
        }

        let mut report = SyncReport::default();

        for entry in WalkDir::new(&self.entry).sort_by_file_name() {
            let entry = entry.map_err(|e| ModuleError::Failed {
                module: NAME.to_string(),
                message: e.to_string(),
            })?;
            let source = entry.path();
            if !entry.file_type().is_file() || !Self::is_image(source) {
                continue;
            }

            let Ok(relative) = source.strip_prefix(&self.entry) else {
                continue;
            };
            let target = self.dist.join(relative);

            if !needs_copy(source, &target).map_err(|e| io_error(NAME, source, e))? {
                report.unchanged += 1;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(NAME, parent, e))?;
            }
            fs::copy(source, &target).map_err(|e| io_error(NAME, &target, e))?;

            if self.debug {
                tracing::info!("[images] {} -> {}", source.display(), target.display());
            }
            report.copied.push(target);
        }

        Ok(report)
    }
}

/// A target is stale when it is missing, differs in size, or is older than
/// its source.
fn needs_copy(source: &Path, target: &Path) -> std::io::Result<bool> {
    let src = fs::metadata(source)?;
    let dst = match fs::metadata(target) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };

    if src.len() != dst.len() {
        return Ok(true);
    }

    match (src.modified(), dst.modified()) {
        (Ok(src_time), Ok(dst_time)) => Ok(src_time > dst_time),
        _ => Ok(false),
    }
}

#[async_trait]
impl Module for ImageModule {
    fn name(&self) -> &str {
        NAME
    }

    async fn start(&self, ctx: &ModuleContext) -> Result<(), ModuleError> {
        let module = self.clone().with_debug(self.debug || ctx.debug);
        let report = blocking(NAME, move || module.sync()).await?;

        tracing::debug!(
            "[images] {} copied, {} unchanged",
            report.copied.len(),
            report.unchanged
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn recognises_image_extensions() {
        assert!(ImageModule::is_image(Path::new("logo.PNG")));
        assert!(ImageModule::is_image(Path::new("a/b/icon.svg")));
        assert!(!ImageModule::is_image(Path::new("notes.txt")));
        assert!(!ImageModule::is_image(Path::new("Makefile")));
    }

    #[test]
    fn sync_copies_only_stale_images() {
        let dir = TempDir::new().unwrap();
        let entry = dir.path().join("src/images");
        let dist = dir.path().join("dist/images");
        fs::create_dir_all(entry.join("icons")).unwrap();
        fs::write(entry.join("logo.png"), b"png-bytes").unwrap();
        fs::write(entry.join("icons/star.svg"), b"<svg/>").unwrap();
        fs::write(entry.join("readme.txt"), b"skip me").unwrap();

        let module = ImageModule::new(&entry, &dist);

        let first = module.sync().unwrap();
        assert_eq!(first.copied.len(), 2);
        assert!(dist.join("icons/star.svg").is_file());
        assert!(!dist.join("readme.txt").exists());

        let second = module.sync().unwrap();
        assert!(second.copied.is_empty());
        assert_eq!(second.unchanged, 2);

        fs::write(entry.join("logo.png"), b"bigger png bytes").unwrap();
        let third = module.sync().unwrap();
        assert_eq!(third.copied, vec![dist.join("logo.png")]);
    }

    #[test]
    fn missing_entry_is_a_module_error() {
        let dir = TempDir::new().unwrap();
        let module = ImageModule::new(dir.path().join("nope"), dir.path().join("dist"));
        assert!(matches!(
            module.sync(),
            Err(ModuleError::Failed { ref module, .. }) if module == "images"
        ));
    }
}
