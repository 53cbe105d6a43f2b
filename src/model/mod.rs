//! # Object Graph Model
//!
//! Plain data shared by the graph collaborator and the index: identifiers,
//! the metamodel (types and features), and mutation notifications.
//!
//! Design rule: this module is pure data. No locks, no graph state.

pub mod node;
pub mod metamodel;
pub mod notification;

pub use node::{NodeId, ResourceId, Setting};
pub use metamodel::{ClassDescriptor, ClassId, Feature, FeatureId, FeatureKind, FeatureSpec, Metamodel};
pub use notification::{
    Event, FeatureKey, NodeList, Notification, Notifier, Position, ResourceFeature, Value,
};
