//! Ignore rules and directory scans shared by `build` and the watcher.

use std::path::{Component, Path, PathBuf};

use kiln_core::{Category, SourceRootMap, classify};
use walkdir::WalkDir;

/// `watchIgnore` patterns plus the hidden-file rule.
///
/// A pattern starting with `*` matches a file-name suffix (`*.log`); anything
/// else matches a whole path component (`node_modules`).
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<String>,
}

impl IgnoreRules {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a path relative to its watched root.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        for component in relative.components() {
            let Component::Normal(name) = component else {
                continue;
            };
            let name = name.to_string_lossy();

            // Editors' swap and backup files are hidden or end in `~`
            if name.starts_with('.') || name.ends_with('~') {
                return true;
            }

            for pattern in &self.patterns {
                let matched = match pattern.strip_prefix('*') {
                    Some(suffix) => name.ends_with(suffix),
                    None => name == pattern.as_str(),
                };
                if matched {
                    return true;
                }
            }
        }

        false
    }

    /// Check an absolute path against the root that contains it. Paths
    /// outside every root are ignored.
    pub fn is_ignored_under(&self, path: &Path, roots: &SourceRootMap) -> bool {
        roots
            .iter()
            .filter_map(|(_, root)| path.strip_prefix(root).ok())
            .min_by_key(|relative| relative.components().count())
            .is_none_or(|relative| self.is_ignored(relative))
    }
}

/// Every file under `dir` that classifies into a category, in file-name
/// order.
///
/// `dir` may be a source root (full build, root replaced) or any directory
/// below one (directory created or moved in).
pub fn scan(dir: &Path, roots: &SourceRootMap, ignore: &IgnoreRules) -> Vec<(Category, PathBuf)> {
    let mut found = Vec::new();

    for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if ignore.is_ignored_under(path, roots) {
            continue;
        }
        if let Some(category) = classify(path, roots) {
            found.push((category, path.to_path_buf()));
        }
    }

    found
}

/// Scan every configured root.
pub fn scan_all(roots: &SourceRootMap, ignore: &IgnoreRules) -> Vec<(Category, PathBuf)> {
    roots
        .iter()
        .filter(|(_, root)| root.is_dir())
        .flat_map(|(_, root)| scan(root, roots, ignore))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn component_and_suffix_patterns() {
        let rules = IgnoreRules::new(["node_modules", "*.log"]);
        assert!(rules.is_ignored(Path::new("node_modules/pkg/index.js")));
        assert!(rules.is_ignored(Path::new("logs/debug.log")));
        assert!(!rules.is_ignored(Path::new("js/app.js")));
        // Component match, not substring
        assert!(!rules.is_ignored(Path::new("my_node_modules_notes.js")));
    }

    #[test]
    fn hidden_and_backup_files() {
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored(Path::new(".git/config")));
        assert!(rules.is_ignored(Path::new("pug/.index.pug.swp")));
        assert!(rules.is_ignored(Path::new("pug/index.pug~")));
        assert!(!rules.is_ignored(Path::new("pug/index.pug")));
    }

    #[test]
    fn outside_roots_is_ignored() {
        let roots = SourceRootMap::builder()
            .root(Category::Style, "/site/src/scss")
            .build();
        let rules = IgnoreRules::default();
        assert!(rules.is_ignored_under(Path::new("/site/README.md"), &roots));
        assert!(!rules.is_ignored_under(Path::new("/site/src/scss/a.scss"), &roots));
    }

    #[test]
    fn scan_classifies_every_file() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/pug/partials")).unwrap();
        fs::create_dir_all(root.join("src/images")).unwrap();
        fs::write(root.join("src/pug/index.pug"), "p hi").unwrap();
        fs::write(root.join("src/pug/partials/nav.pug"), "nav").unwrap();
        fs::write(root.join("src/pug/.draft.pug"), "p").unwrap();
        fs::write(root.join("src/images/logo.png"), b"png").unwrap();

        let roots = SourceRootMap::builder()
            .root(Category::Template, root.join("src/pug"))
            .root(Category::StaticAsset, root.join("src/images"))
            .root(Category::Script, root.join("src/js"))
            .build();

        let found = scan_all(&roots, &IgnoreRules::default());
        assert_eq!(
            found,
            vec![
                (Category::Template, root.join("src/pug/index.pug")),
                (Category::Template, root.join("src/pug/partials/nav.pug")),
                (Category::StaticAsset, root.join("src/images/logo.png")),
            ]
        );

        let partials = scan(&root.join("src/pug/partials"), &roots, &IgnoreRules::default());
        assert_eq!(partials.len(), 1);
    }
}
