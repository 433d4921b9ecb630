//! Debounced change batches.

use crate::category::Category;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Changed paths grouped by category.
///
/// A path belongs to at most one category. Once a `ChangeSet` has been moved
/// into the orchestrator it is only ever read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    template: BTreeSet<PathBuf>,
    style: BTreeSet<PathBuf>,
    script: BTreeSet<PathBuf>,
    static_asset: BTreeSet<PathBuf>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` under `category`.
    ///
    /// Returns `false` when the path was already recorded, either under the
    /// same category (duplicate) or under a different one (the first
    /// classification is kept).
    pub fn insert(&mut self, category: Category, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.category_of(&path).is_some() {
            return false;
        }
        self.bucket_mut(category).insert(path)
    }

    /// Paths recorded under `category`.
    pub fn paths(&self, category: Category) -> &BTreeSet<PathBuf> {
        match category {
            Category::Template => &self.template,
            Category::Style => &self.style,
            Category::Script => &self.script,
            Category::StaticAsset => &self.static_asset,
        }
    }

    /// Category a path was recorded under.
    pub fn category_of(&self, path: &Path) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|category| self.paths(*category).contains(path))
    }

    /// Whether anything was recorded under `category`.
    pub fn contains(&self, category: Category) -> bool {
        !self.paths(category).is_empty()
    }

    /// Categories with at least one path, in build order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        Category::ALL
            .into_iter()
            .filter(|category| self.contains(*category))
    }

    /// Every `(category, path)` pair.
    pub fn iter(&self) -> impl Iterator<Item = (Category, &Path)> {
        Category::ALL.into_iter().flat_map(move |category| {
            self.paths(category)
                .iter()
                .map(move |path| (category, path.as_path()))
        })
    }

    /// Fold another batch into this one, keeping first classifications.
    pub fn merge(&mut self, other: ChangeSet) {
        let ChangeSet {
            template,
            style,
            script,
            static_asset,
        } = other;

        let buckets = [
            (Category::Template, template),
            (Category::Style, style),
            (Category::Script, script),
            (Category::StaticAsset, static_asset),
        ];
        for (category, paths) in buckets {
            for path in paths {
                self.insert(category, path);
            }
        }
    }

    pub fn len(&self) -> usize {
        Category::ALL
            .into_iter()
            .map(|category| self.paths(category).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Boolean-per-category view handed to update hooks.
    pub fn summary(&self) -> ChangeSummary {
        ChangeSummary {
            template: self.contains(Category::Template),
            style: self.contains(Category::Style),
            script: self.contains(Category::Script),
            static_folders: self.contains(Category::StaticAsset),
        }
    }

    fn bucket_mut(&mut self, category: Category) -> &mut BTreeSet<PathBuf> {
        match category {
            Category::Template => &mut self.template,
            Category::Style => &mut self.style,
            Category::Script => &mut self.script,
            Category::StaticAsset => &mut self.static_asset,
        }
    }
}

/// Which categories a batch touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub template: bool,
    pub style: bool,
    pub script: bool,
    pub static_folders: bool,
}

impl ChangeSummary {
    /// Summary with every category marked as changed (full builds).
    pub fn all() -> Self {
        Self {
            template: true,
            style: true,
            script: true,
            static_folders: true,
        }
    }

    pub fn any(&self) -> bool {
        self.template || self.style || self.script || self.static_folders
    }
}
