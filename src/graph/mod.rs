//! # Model Graph Contract
//!
//! This is the contract between the cross-reference index and whatever owns
//! the live object graph. The index never owns nodes or resources; it reads
//! them through [`ModelView`] and learns about mutations through
//! [`ModelListener`] subscriptions.
//!
//! ## Implementations
//!
//! | Graph | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryModel` | `memory` | In-memory object graph for embedding and tests |
//!
//! ## Caller contract
//!
//! Mutations are serialized by the host onto one logical writer. Reads assume
//! no mutation is in flight. Nothing here locks.

pub mod memory;

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::model::*;
use crate::Result;

pub use memory::MemoryModel;

// ============================================================================
// Subscription scope
// ============================================================================

/// The part of the graph whose notifications a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// A node and everything it (transitively) contains.
    Node(NodeId),
    /// Everything contained in one resource, plus the resource's own events.
    Resource(ResourceId),
    /// Every resource and everything they contain.
    ResourceSet,
}

/// Handle returned by [`ModelGraph::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

// ============================================================================
// Listener
// ============================================================================

/// Receives notifications after the mutation they describe has been applied.
pub trait ModelListener: Send + Sync {
    fn on_notification(&self, graph: &dyn ModelView, notification: &Notification);
}

// ============================================================================
// ModelView trait
// ============================================================================

/// Read-only access to the live object graph.
pub trait ModelView {
    fn metamodel(&self) -> &Metamodel;

    fn contains_node(&self, node: NodeId) -> bool;

    fn class_of(&self, node: NodeId) -> Option<ClassId>;

    /// The containing node and the containment feature holding `node`.
    fn container(&self, node: NodeId) -> Option<(NodeId, FeatureId)>;

    /// The loaded resource `node` belongs to.
    ///
    /// `None` for detached nodes, proxies, and nodes of unloaded resources.
    fn resource_of(&self, node: NodeId) -> Option<ResourceId>;

    /// Direct children across all containment features, in feature order.
    fn contents(&self, node: NodeId) -> Vec<NodeId>;

    /// Current values of a reference feature, proxies left unresolved.
    fn values(&self, node: NodeId, feature: FeatureId) -> NodeList;

    fn is_proxy(&self, node: NodeId) -> bool;

    fn proxy_uri(&self, node: NodeId) -> Option<&str>;

    /// The URI a proxy for `node` would carry, if `node` belongs to a resource.
    fn uri_of(&self, node: NodeId) -> Option<String>;

    /// The node a proxy stands for, if it can be found right now.
    /// Non-proxies resolve to themselves.
    fn resolve(&self, node: NodeId) -> Option<NodeId>;

    fn resources(&self) -> Vec<ResourceId>;

    fn resource_uri(&self, resource: ResourceId) -> Option<&str>;

    /// Ordered root nodes of a resource. Unloaded resources keep their image.
    fn resource_roots(&self, resource: ResourceId) -> Vec<NodeId>;

    fn is_loaded(&self, resource: ResourceId) -> bool;

    // ========================================================================
    // Provided
    // ========================================================================

    /// "Is instance of": the node's type equals `class` or inherits from it.
    fn is_instance_of(&self, node: NodeId, class: ClassId) -> bool {
        self.class_of(node)
            .is_some_and(|c| self.metamodel().is_subtype(c, class))
    }

    /// `node` and all its transitive contents, pre-order.
    fn all_contents(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.contents(next);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Every node of a resource, pre-order from each root.
    fn resource_contents(&self, resource: ResourceId) -> Vec<NodeId> {
        self.resource_roots(resource)
            .into_iter()
            .flat_map(|root| self.all_contents(root))
            .collect()
    }
}

// ============================================================================
// ModelGraph trait
// ============================================================================

/// A mutable graph the index can attach to and probe.
pub trait ModelGraph: ModelView {
    /// Load a resource. A no-op when already loaded.
    fn load(&mut self, resource: ResourceId) -> Result<()>;

    /// Unload a resource. A no-op when not loaded.
    fn unload(&mut self, resource: ResourceId);

    /// Deliver notifications from inside `scope`. Containment and resource
    /// load-state changes are delivered to every subscription, wherever they
    /// happen, so a partial listener can follow nodes entering and leaving.
    /// A listener subscribed under several scopes receives each notification
    /// at most once.
    fn subscribe(&mut self, scope: Scope, listener: Arc<dyn ModelListener>) -> SubscriptionId;

    /// Returns false if the subscription was unknown.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}
