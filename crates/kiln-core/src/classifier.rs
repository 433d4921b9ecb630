//! Path classification against the configured source roots.
//!
//! Classification is a partition: every path below at least one root maps to
//! exactly one [`Category`], every other path maps to none. The deepest
//! matching root wins; equally deep roots are resolved by declaration order.

use crate::category::Category;
use crate::error::ClassificationError;
use indexmap::IndexMap;
use path_clean::PathClean;
use std::path::{Path, PathBuf};

/// Ordered mapping from category to the directories holding its sources.
///
/// Built once at startup through [`SourceRootMap::builder`] and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRootMap {
    roots: IndexMap<Category, Vec<PathBuf>>,
    /// Every root in the order it was declared, across categories
    declared: Vec<(Category, PathBuf)>,
}

impl SourceRootMap {
    /// Start building a root map.
    pub fn builder() -> SourceRootMapBuilder {
        SourceRootMapBuilder::default()
    }

    /// Roots declared for `category`, in declaration order.
    pub fn roots(&self, category: Category) -> &[PathBuf] {
        self.roots.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every `(category, root)` pair in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Path)> {
        self.declared
            .iter()
            .map(|(category, root)| (*category, root.as_path()))
    }

    /// Categories with at least one root, in declaration order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.roots.keys().copied()
    }

    /// Whether `path` is exactly one of the configured roots.
    pub fn is_root(&self, path: &Path) -> bool {
        let path = path.clean();
        self.iter().any(|(_, root)| root == path)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Builder for [`SourceRootMap`].
#[derive(Debug, Default)]
pub struct SourceRootMapBuilder {
    roots: IndexMap<Category, Vec<PathBuf>>,
    declared: Vec<(Category, PathBuf)>,
}

impl SourceRootMapBuilder {
    /// Declare `root` as a source directory of `category`.
    ///
    /// Paths are normalised (`./src/../src/pug` becomes `src/pug`).
    /// Declaring the same root twice for one category is a no-op.
    pub fn root(mut self, category: Category, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().clean();
        let roots = self.roots.entry(category).or_default();
        if !roots.contains(&root) {
            roots.push(root.clone());
            self.declared.push((category, root));
        }
        self
    }

    /// Declare several roots for `category` at once.
    pub fn roots<I, P>(self, category: Category, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        roots
            .into_iter()
            .fold(self, |builder, root| builder.root(category, root))
    }

    pub fn build(self) -> SourceRootMap {
        SourceRootMap {
            roots: self.roots,
            declared: self.declared,
        }
    }
}

/// Classify a changed path, ignoring the reason when it has no category.
///
/// Pure and synchronous; safe to call from any watcher callback.
pub fn classify(path: &Path, roots: &SourceRootMap) -> Option<Category> {
    try_classify(path, roots).ok()
}

/// Classify a changed path, explaining why when it has no category.
pub fn try_classify(path: &Path, roots: &SourceRootMap) -> Result<Category, ClassificationError> {
    let path = path.clean();

    // (category, root, depth) of the deepest root containing the path
    let mut best: Option<(Category, &Path, usize)> = None;

    for (category, root) in roots.iter() {
        if !path.starts_with(root) {
            continue;
        }

        let depth = root.components().count();
        // Strictly deeper only: equal depth keeps the earlier declaration
        if best.is_none_or(|(_, _, best_depth)| depth > best_depth) {
            best = Some((category, root, depth));
        }
    }

    match best {
        None => Err(ClassificationError::OutsideRoots(path)),
        Some((_, root, _)) if path.as_path() == root => Err(ClassificationError::RootTouched(path)),
        Some((category, _, _)) => Ok(category),
    }
}
