// Sheet settings
// Embedders usually build these in code; a TOML fragment is accepted for convenience.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`crate::sheet::Sheet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Memoize formula results until a precedent changes.
    /// When false every read re-evaluates the formula tree.
    pub cache_formula_results: bool,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            cache_formula_results: true,
        }
    }
}

impl SheetConfig {
    /// Parse settings from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
