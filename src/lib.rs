//! # crossref: Cross-Reference Index and Resource Dependency Tracker
//!
//! A live, notification-driven index over a mutable object graph. It answers
//! "who points at this node" and "which resources import which" without
//! rescanning the graph.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `ModelView`/`ModelGraph` is the contract between the index and the graph
//! 2. **Plain data**: ids, metamodel and notifications cross all boundaries as DTOs
//! 3. **Explicit subscriptions**: the index holds subscription handles, never adapters
//! 4. **Counted edges**: resource dependencies are reference-counted pairs, never rescanned
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use crossref::{CrossReferenceIndex, FeatureSpec, MemoryModel, Metamodel, Scope};
//!
//! # fn main() -> crossref::Result<()> {
//! let mut mm = Metamodel::new();
//! let part = mm.register_class("Part", &[])?;
//! let uses = mm.add_feature(part, FeatureSpec::reference("uses").many())?;
//!
//! let mut model = MemoryModel::new(mm);
//! let a = model.create_resource("a.model");
//! let b = model.create_resource("b.model");
//! let a1 = model.create_node(part)?;
//! let b1 = model.create_node(part)?;
//! model.add_root(a, a1)?;
//! model.add_root(b, b1)?;
//!
//! let index = Arc::new(CrossReferenceIndex::new());
//! index.attach(&mut model, Scope::ResourceSet)?;
//!
//! model.add(a1, uses, b1)?;
//! assert!(index.imports(a).contains(&b));
//! assert!(index.exports(b).contains(&a));
//! # Ok(())
//! # }
//! ```
//!
//! ## Graphs
//!
//! | Graph | Feature | Description |
//! |-------|---------|-------------|
//! | Memory | (default) | In-memory object graph for embedding and tests |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod graph;
pub mod index;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    ClassId, Event, Feature, FeatureId, FeatureKey, FeatureSpec, Metamodel,
    NodeId, Notification, Notifier, Position, ResourceFeature, ResourceId, Setting, Value,
};

// ============================================================================
// Re-exports: Graph
// ============================================================================

pub use graph::{MemoryModel, ModelGraph, ModelListener, ModelView, Scope, SubscriptionId};

// ============================================================================
// Re-exports: Index
// ============================================================================

pub use index::{
    CrossReferenceIndex, DependencyChange, DependencyObserver, DependencySnapshot,
    FeatureClassifier, IndexConfig,
};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Resource not loaded: {0}")]
    ResourceNotLoaded(String),

    #[error("Failed to load {uri}: {message}")]
    LoadFailed { uri: String, message: String },

    #[error("Invalid feature: {0}")]
    InvalidFeature(String),

    #[error("Containment cycle: {0}")]
    ContainmentCycle(String),

    #[error("Already attached: {0}")]
    AlreadyAttached(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
