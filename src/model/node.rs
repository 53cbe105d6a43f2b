//! Node and resource identifiers, and the `Setting` edge endpoint.

use serde::{Deserialize, Serialize};
use super::FeatureId;

/// Opaque node identifier. Identity-based: two nodes are never equal by content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Opaque resource identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// One endpoint of a directed edge: the owning node and the feature
/// through which it points at some target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Setting {
    pub owner: NodeId,
    pub feature: FeatureId,
}

impl Setting {
    pub fn new(owner: NodeId, feature: FeatureId) -> Self {
        Self { owner, feature }
    }
}
