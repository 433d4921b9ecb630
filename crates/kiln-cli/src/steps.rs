//! Build steps backed by external compilers and plain file copies.
//!
//! - [`CommandStep`] runs a configured command template for `template`,
//!   `style` or `script`. `{src}` and `{dest}` expand to the category's source
//!   root and output directory.
//! - [`CopyStep`] mirrors changed static files into `dist`, removing targets
//!   whose source was deleted.
//! - [`StyleAssembler`] regenerates the `@import` index stylesheet before the
//!   style compiler runs.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use kiln_core::{BuildStep, BuildStepError, Category};
use walkdir::WalkDir;

/// Runs one shell command per invocation.
#[derive(Debug, Clone)]
pub struct CommandStep {
    category: Category,
    command: String,
    cwd: PathBuf,
    production: bool,
    assembler: Option<StyleAssembler>,
}

impl CommandStep {
    /// `template` is the raw config value; placeholders are expanded here.
    pub fn new(
        category: Category,
        template: &str,
        src: &Path,
        dest: &Path,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            category,
            command: expand(template, src, dest),
            cwd: cwd.into(),
            production: false,
            assembler: None,
        }
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    /// Regenerate an import index before each run.
    pub fn with_assembler(mut self, assembler: StyleAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    /// The expanded command line.
    pub fn command(&self) -> &str {
        &self.command
    }

    fn shell(&self) -> tokio::process::Command {
        #[cfg(windows)]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("cmd");
            cmd.arg("/C").arg(&self.command);
            cmd
        };
        #[cfg(not(windows))]
        let mut cmd = {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(&self.command);
            cmd
        };

        cmd.current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.production {
            cmd.env("NODE_ENV", "production");
        }
        cmd
    }

    fn failed(&self, message: impl Into<String>, diagnostics: Option<String>) -> BuildStepError {
        BuildStepError::Failed {
            category: self.category,
            message: message.into(),
            diagnostics,
        }
    }
}

#[async_trait]
impl BuildStep for CommandStep {
    fn name(&self) -> &str {
        &self.command
    }

    async fn run(
        &self,
        category: Category,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<(), BuildStepError> {
        tracing::debug!("[{}] {} changed path(s)", category, changed.len());

        if let Some(assembler) = self.assembler.clone() {
            let written = tokio::task::spawn_blocking(move || assembler.assemble())
                .await
                .map_err(|e| self.failed(format!("style assembly aborted: {e}"), None))?
                .map_err(|e| self.failed(format!("failed to assemble styles: {e}"), None))?;
            if written {
                tracing::debug!("[{}] import index regenerated", category);
            }
        }

        tracing::debug!("[{}] $ {}", category, self.command);
        let output = self
            .shell()
            .output()
            .await
            .map_err(|e| BuildStepError::Spawn {
                category,
                command: self.command.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("[{}] {}", category, stdout.trim_end());
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        // Some compilers report errors on stdout
        let diagnostics = [stderr.trim(), stdout.trim()]
            .into_iter()
            .find(|text| !text.is_empty())
            .map(str::to_string);

        Err(self.failed(
            format!("`{}` exited with {}", self.command, output.status),
            diagnostics,
        ))
    }
}

fn expand(template: &str, src: &Path, dest: &Path) -> String {
    template
        .replace("{src}", &src.to_string_lossy())
        .replace("{dest}", &dest.to_string_lossy())
}

/// Mirrors static folders into `dist`.
///
/// `src/images/a/b.png` lands in `{dist}/images/a/b.png`: each folder keeps
/// its own name below `dist`.
#[derive(Debug, Clone)]
pub struct CopyStep {
    roots: Vec<PathBuf>,
    dist: PathBuf,
}

impl CopyStep {
    pub fn new(roots: Vec<PathBuf>, dist: impl Into<PathBuf>) -> Self {
        Self {
            roots,
            dist: dist.into(),
        }
    }

    /// Output location of a static source file.
    pub fn target(&self, source: &Path) -> Option<PathBuf> {
        let (root, relative) = self
            .roots
            .iter()
            .filter_map(|root| Some((root, source.strip_prefix(root).ok()?)))
            .min_by_key(|(_, relative)| relative.components().count())?;
        Some(self.dist.join(root.file_name()?).join(relative))
    }

    /// Copy or remove the target of every path. Returns how many targets
    /// changed.
    pub fn sync(&self, paths: &BTreeSet<PathBuf>) -> std::io::Result<usize> {
        let mut touched = 0;

        for source in paths {
            let Some(target) = self.target(source) else {
                tracing::debug!("{} is not below a static folder", source.display());
                continue;
            };

            if source.is_file() {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(source, &target)?;
                touched += 1;
            } else if source.is_dir() {
                for entry in WalkDir::new(source).into_iter().filter_map(|e| e.ok()) {
                    if entry.file_type().is_file() {
                        let nested = BTreeSet::from([entry.path().to_path_buf()]);
                        touched += self.sync(&nested)?;
                    }
                }
            } else {
                touched += remove(&target)?;
            }
        }

        Ok(touched)
    }
}

fn remove(target: &Path) -> std::io::Result<usize> {
    let result = if target.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };

    match result {
        Ok(()) => Ok(1),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl BuildStep for CopyStep {
    fn name(&self) -> &str {
        "copy"
    }

    async fn run(
        &self,
        category: Category,
        changed: &BTreeSet<PathBuf>,
    ) -> Result<(), BuildStepError> {
        let step = self.clone();
        let paths = changed.clone();
        let failed = |message: String| BuildStepError::Failed {
            category,
            message,
            diagnostics: None,
        };

        let touched = tokio::task::spawn_blocking(move || step.sync(&paths))
            .await
            .map_err(|e| failed(format!("copy aborted: {e}")))?
            .map_err(|e| failed(format!("copy failed: {e}")))?;

        tracing::debug!("[{}] {} file(s) synced", category, touched);
        Ok(())
    }
}

/// Keeps an index stylesheet importing every other stylesheet of the sass
/// root, in path order.
#[derive(Debug, Clone)]
pub struct StyleAssembler {
    root: PathBuf,
    target: PathBuf,
}

impl StyleAssembler {
    const EXTENSIONS: &'static [&'static str] = &["scss", "sass", "css"];
    const HEADER: &'static str = "// Generated by kiln from the files next to it. Do not edit.\n";

    pub fn new(root: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            target: target.into(),
        }
    }

    /// Render the index content.
    pub fn render(&self) -> String {
        let base = self.target.parent().unwrap_or(&self.root);
        let mut out = String::from(Self::HEADER);

        for entry in WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            let is_style = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| Self::EXTENSIONS.contains(&ext));
            if !entry.file_type().is_file() || !is_style || path == self.target {
                continue;
            }

            let relative = path
                .strip_prefix(base)
                .or_else(|_| path.strip_prefix(&self.root))
                .unwrap_or(path);
            out.push_str(&format!("@import \"{}\";\n", import_name(relative)));
        }

        out
    }

    /// Write the index if it changed. Returns whether it was written.
    pub fn assemble(&self) -> std::io::Result<bool> {
        let content = self.render();
        if fs::read_to_string(&self.target).is_ok_and(|current| current == content) {
            return Ok(false);
        }

        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.target, content)?;
        Ok(true)
    }
}

/// `components/_button.scss` -> `components/button`
fn import_name(relative: &Path) -> String {
    let mut parts: Vec<String> = relative
        .parent()
        .into_iter()
        .flat_map(|parent| parent.components())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    let stem = relative
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    parts.push(stem.strip_prefix('_').unwrap_or(&stem).to_string());

    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn placeholders_expand() {
        let step = CommandStep::new(
            Category::Style,
            "sass {src}:{dest} --no-source-map",
            Path::new("/site/src/scss"),
            Path::new("/site/dist/css"),
            "/site",
        );
        assert_eq!(
            step.command(),
            "sass /site/src/scss:/site/dist/css --no-source-map"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_failure_keeps_stderr() {
        let dir = TempDir::new().unwrap();
        let step = CommandStep::new(
            Category::Script,
            "echo 'SyntaxError: {src}' >&2; exit 3",
            Path::new("app.js"),
            Path::new("dist"),
            dir.path(),
        );

        let err = step
            .run(Category::Script, &BTreeSet::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), Category::Script);
        assert_eq!(err.diagnostics(), Some("SyntaxError: app.js"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn production_sets_node_env() {
        let dir = TempDir::new().unwrap();
        let step = CommandStep::new(
            Category::Script,
            "printf %s \"$NODE_ENV\" > {dest}",
            Path::new("src"),
            Path::new("env.txt"),
            dir.path(),
        )
        .with_production(true);

        step.run(Category::Script, &BTreeSet::new()).await.unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("env.txt")).unwrap(),
            "production"
        );
    }

    #[tokio::test]
    async fn missing_program_is_not_a_spawn_panic() {
        let dir = TempDir::new().unwrap();
        let step = CommandStep::new(
            Category::Template,
            "kiln-test-no-such-compiler {src}",
            Path::new("src"),
            Path::new("dist"),
            dir.path(),
        );
        // The shell starts, the program does not
        assert!(step.run(Category::Template, &BTreeSet::new()).await.is_err());
    }

    #[test]
    fn copy_mirrors_and_removes() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("src/images");
        let dist = dir.path().join("dist");
        fs::create_dir_all(images.join("icons")).unwrap();
        fs::write(images.join("icons/star.png"), b"star").unwrap();

        let step = CopyStep::new(vec![images.clone()], &dist);
        let star = images.join("icons/star.png");
        assert_eq!(step.target(&star), Some(dist.join("images/icons/star.png")));

        assert_eq!(step.sync(&BTreeSet::from([star.clone()])).unwrap(), 1);
        assert_eq!(fs::read(dist.join("images/icons/star.png")).unwrap(), b"star");

        fs::remove_file(&star).unwrap();
        assert_eq!(step.sync(&BTreeSet::from([star.clone()])).unwrap(), 1);
        assert!(!dist.join("images/icons/star.png").exists());

        // Removing twice is not an error
        assert_eq!(step.sync(&BTreeSet::from([star])).unwrap(), 0);
    }

    #[test]
    fn copy_expands_directories() {
        let dir = TempDir::new().unwrap();
        let fonts = dir.path().join("src/fonts");
        fs::create_dir_all(fonts.join("inter")).unwrap();
        fs::write(fonts.join("inter/a.woff2"), b"a").unwrap();
        fs::write(fonts.join("inter/b.woff2"), b"b").unwrap();

        let step = CopyStep::new(vec![fonts.clone()], dir.path().join("dist"));
        assert_eq!(step.sync(&BTreeSet::from([fonts.join("inter")])).unwrap(), 2);
        assert!(dir.path().join("dist/fonts/inter/b.woff2").is_file());
    }

    #[test]
    fn import_names_drop_partial_prefix() {
        assert_eq!(import_name(Path::new("components/_button.scss")), "components/button");
        assert_eq!(import_name(Path::new("base.sass")), "base");
    }

    #[test]
    fn assembler_writes_only_on_change() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("scss");
        fs::create_dir_all(root.join("components")).unwrap();
        fs::write(root.join("_variables.scss"), "$c: red;").unwrap();
        fs::write(root.join("components/_card.scss"), ".card{}").unwrap();
        fs::write(root.join("notes.txt"), "not a stylesheet").unwrap();

        let assembler = StyleAssembler::new(&root, root.join("main.scss"));
        assert!(assembler.assemble().unwrap());

        let index = fs::read_to_string(root.join("main.scss")).unwrap();
        assert!(index.starts_with("// Generated by kiln"));
        let imports: Vec<&str> = index.lines().skip(1).collect();
        assert_eq!(
            imports,
            vec![
                r#"@import "variables";"#,
                r#"@import "components/card";"#,
            ]
        );

        assert!(!assembler.assemble().unwrap());
    }
}
