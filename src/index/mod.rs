//! # Cross-Reference Index
//!
//! Incrementally maintained answers to two questions about a live graph:
//! "who points at this node" and "which resources depend on which".
//!
//! | Part | Module | Role |
//! |------|--------|------|
//! | `FeatureClassifier` | `classifier` | Which features are indexed or counted |
//! | `InverseReferenceIndex` | `inverse` | Stored non-navigable settings per target |
//! | `ResourceDependencyTracker` | `tracker` | Counted resource-pair edges and hooks |
//! | `CrossReferenceIndex` | `maintainer` | Notification-driven upkeep and queries |
//! | closure queries | `closure` | Transitive imports and exports |
//!
//! Data flows one way: notifications update the inverse index and the
//! tracker, and queries read them back.

pub mod classifier;
pub mod closure;
pub mod config;
pub mod inverse;
pub mod maintainer;
pub mod tracker;

pub use classifier::FeatureClassifier;
pub use config::IndexConfig;
pub use inverse::InverseReferenceIndex;
pub use maintainer::CrossReferenceIndex;
pub use tracker::{
    DependencyChange, DependencyEdge, DependencyObserver, DependencySnapshot, ResourceDependencyTracker,
};
