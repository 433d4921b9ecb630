//! Semantic asset categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The bucket a changed source file is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    /// Page templates (pug/html)
    Template,
    /// Stylesheets (scss/sass)
    Style,
    /// Scripts handed to the bundler
    Script,
    /// Images, fonts and anything else copied verbatim
    StaticAsset,
}

impl Category {
    /// Every category, in build order.
    pub const ALL: [Category; 4] = [
        Category::Template,
        Category::Style,
        Category::Script,
        Category::StaticAsset,
    ];

    /// Name used in config files and log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Template => "template",
            Category::Style => "style",
            Category::Script => "script",
            Category::StaticAsset => "staticAsset",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
