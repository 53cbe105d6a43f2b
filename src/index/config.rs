//! Index configuration.

use serde::{Deserialize, Serialize};
use crate::Result;

/// Tunables for a [`CrossReferenceIndex`](super::CrossReferenceIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Resolve proxies during inverse-reference traversals. When false, a
    /// proxy counts as an absent edge.
    pub resolve_proxies: bool,
    /// Unload resources that a closure query had to load.
    pub unload_probed: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { resolve_proxies: true, unload_probed: true }
    }
}

impl IndexConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
