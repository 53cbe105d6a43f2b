//! In-memory object graph.
//!
//! This is the reference implementation of `ModelGraph`. It keeps nodes and
//! resources in plain maps and delivers notifications synchronously, after
//! each mutation is applied, to every subscription whose scope contains the
//! notifier. Containment and load-state changes reach every subscription.
//! A listener registered under several scopes receives each notification at
//! most once.
//!
//! ## Semantics
//!
//! - **Containment is a tree**: a node has at most one container or is the
//!   root of at most one resource. Re-parenting a node detaches it first, so
//!   listeners see a REMOVE (or SET to null) before the ADD.
//! - **Opposites are kept in sync**: changing one end of a navigable edge
//!   updates the other end and notifies for both.
//! - **Proxies** carry a `"<resource uri>#<node>"` URI and resolve by lookup
//!   against loaded resources. `resolve_feature` swaps resolvable proxies in
//!   place and fires RESOLVE.
//! - **Unloaded resources keep their image**: nodes keep their ids, edges and
//!   tree position, but report no resource, and mutating them is rejected
//!   with `Error::ResourceNotLoaded`.
//!
//! Use this graph for:
//! - Embedding the index in hosts without their own object store
//! - Testing the index against a graph with exact event accounting

use std::sync::Arc;
use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use crate::model::*;
use crate::{Error, Result};
use super::{ModelGraph, ModelListener, ModelView, Scope, SubscriptionId};

// ============================================================================
// MemoryModel
// ============================================================================

/// In-memory object graph with resources, proxies and notifications.
pub struct MemoryModel {
    metamodel: Metamodel,
    nodes: HashMap<NodeId, NodeData>,
    resources: HashMap<ResourceId, ResourceData>,
    /// Creation order, so `resources()` is deterministic.
    resource_order: Vec<ResourceId>,
    subscriptions: Vec<Subscription>,
    failing_loads: HashSet<ResourceId>,
    next_node_id: u64,
    next_resource_id: u64,
    next_subscription_id: u64,
}

struct NodeData {
    class: ClassId,
    container: Option<(NodeId, FeatureId)>,
    root_of: Option<ResourceId>,
    slots: HashMap<FeatureId, NodeList>,
    proxy_uri: Option<String>,
}

struct ResourceData {
    uri: String,
    roots: Vec<NodeId>,
    loaded: bool,
}

struct Subscription {
    id: SubscriptionId,
    scope: Scope,
    listener: Arc<dyn ModelListener>,
}

impl Default for MemoryModel {
    fn default() -> Self {
        Self::new(Metamodel::new())
    }
}

impl MemoryModel {
    pub fn new(metamodel: Metamodel) -> Self {
        Self {
            metamodel,
            nodes: HashMap::new(),
            resources: HashMap::new(),
            resource_order: Vec::new(),
            subscriptions: Vec::new(),
            failing_loads: HashSet::new(),
            next_node_id: 1,
            next_resource_id: 1,
            next_subscription_id: 1,
        }
    }

    /// Mutable access to the type arena, for registering types after creation.
    pub fn metamodel_mut(&mut self) -> &mut Metamodel {
        &mut self.metamodel
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create an empty, loaded resource.
    pub fn create_resource(&mut self, uri: impl Into<String>) -> ResourceId {
        let id = ResourceId(self.next_resource_id);
        self.next_resource_id += 1;
        self.resources.insert(id, ResourceData { uri: uri.into(), roots: Vec::new(), loaded: true });
        self.resource_order.push(id);
        id
    }

    /// Create a detached node of the given type.
    pub fn create_node(&mut self, class: ClassId) -> Result<NodeId> {
        self.insert_node(class, None)
    }

    /// Create an unresolved placeholder addressed by `uri` (`"<resource>#<node>"`).
    pub fn create_proxy(&mut self, class: ClassId, uri: impl Into<String>) -> Result<NodeId> {
        self.insert_node(class, Some(uri.into()))
    }

    fn insert_node(&mut self, class: ClassId, proxy_uri: Option<String>) -> Result<NodeId> {
        if !self.metamodel.is_live(class) {
            return Err(Error::NotFound(format!("Class {class}")));
        }
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        self.nodes.insert(id, NodeData {
            class,
            container: None,
            root_of: None,
            slots: HashMap::new(),
            proxy_uri,
        });
        Ok(id)
    }

    /// Make the next `load` of `resource` fail.
    pub fn fail_next_load(&mut self, resource: ResourceId) {
        self.failing_loads.insert(resource);
    }

    /// Unload (if loaded) and forget a resource. Its roots become detached.
    pub fn delete_resource(&mut self, resource: ResourceId) -> Result<()> {
        if !self.resources.contains_key(&resource) {
            return Err(Error::NotFound(format!("Resource {resource}")));
        }
        self.unload(resource);
        if let Some(data) = self.resources.remove(&resource) {
            for root in data.roots {
                if let Some(node) = self.nodes.get_mut(&root) {
                    node.root_of = None;
                }
            }
        }
        self.resource_order.retain(|r| *r != resource);
        Ok(())
    }

    // ========================================================================
    // Resource contents
    // ========================================================================

    /// Append `node` to the roots of `resource`, detaching it first if needed.
    pub fn add_root(&mut self, resource: ResourceId, node: NodeId) -> Result<()> {
        self.ensure_resource_writable(resource)?;
        self.ensure_attachable(node)?;
        if self.nodes.get(&node).and_then(|n| n.root_of) == Some(resource) {
            return Ok(());
        }
        self.detach(node)?;

        let data = self.resource_mut(resource)?;
        data.roots.push(node);
        let index = data.roots.len() - 1;
        self.node_mut(node)?.root_of = Some(resource);

        self.emit(Notification::resource(
            resource,
            ResourceFeature::Contents,
            Event::Add { new: Value::Node(node), position: Position::Index(index) },
        ));
        Ok(())
    }

    pub fn remove_root(&mut self, resource: ResourceId, node: NodeId) -> Result<()> {
        if self.nodes.get(&node).and_then(|n| n.root_of) != Some(resource) {
            return Err(Error::NotFound(format!("Root {node} of {resource}")));
        }
        self.detach(node)
    }

    /// Remove `node` from its container or resource. A no-op when detached.
    pub fn detach(&mut self, node: NodeId) -> Result<()> {
        let data = self.node(node)?;
        if let Some((container, feature)) = data.container {
            self.ensure_writable(container)?;
            let many = self.feature_of(feature)?.many;
            if many {
                return self.remove(container, feature, node);
            }
            return self.set(container, feature, None);
        }
        if let Some(resource) = data.root_of {
            self.ensure_resource_writable(resource)?;
            let roots = &mut self.resource_mut(resource)?.roots;
            let Some(index) = roots.iter().position(|r| *r == node) else {
                return Ok(());
            };
            roots.remove(index);
            self.node_mut(node)?.root_of = None;
            self.emit(Notification::resource(
                resource,
                ResourceFeature::Contents,
                Event::Remove { old: Value::Node(node), position: Position::Index(index) },
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Feature mutation
    // ========================================================================

    /// Set a single-valued reference (cross-reference or containment).
    pub fn set(&mut self, owner: NodeId, feature: FeatureId, value: Option<NodeId>) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if f.many {
            return Err(Error::InvalidFeature(format!("'{}' is many-valued; use add/remove", f.name)));
        }
        let old = self.single(owner, feature);
        if old == value {
            return Ok(());
        }
        self.check_opposite_ends(owner, &f, old.as_slice(), value.as_slice())?;
        if let Some(target) = value {
            self.check_target(owner, &f, target)?;
            if f.containment {
                self.detach(target)?;
            }
        }

        let event = Event::Set { old: old.into(), new: value.into() };
        self.store_single(owner, &f, old, value)?;
        self.emit(Notification::node(owner, feature, event));

        self.sync_opposites(owner, &f, old.as_slice(), value.as_slice())
    }

    /// Clear a feature. Single-valued features fire UNSET, many-valued REMOVE_MANY.
    pub fn unset(&mut self, owner: NodeId, feature: FeatureId) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if f.many {
            let old = self.values(owner, feature);
            if old.is_empty() {
                return Ok(());
            }
            return self.remove_values(owner, &f, &old, None);
        }
        let old = self.single(owner, feature);
        self.check_opposite_ends(owner, &f, old.as_slice(), &[])?;
        self.store_single(owner, &f, old, None)?;
        self.emit(Notification::node(
            owner,
            feature,
            Event::Unset { old: old.into(), new: Value::Null },
        ));
        self.sync_opposites(owner, &f, old.as_slice(), &[])
    }

    /// Append one value to a many-valued reference. Values are unique.
    pub fn add(&mut self, owner: NodeId, feature: FeatureId, target: NodeId) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if !f.many {
            return Err(Error::InvalidFeature(format!("'{}' is single-valued; use set", f.name)));
        }
        if self.values(owner, feature).contains(&target) {
            return Ok(());
        }
        self.check_target(owner, &f, target)?;
        self.check_opposite_ends(owner, &f, &[], &[target])?;
        if f.containment {
            self.detach(target)?;
        }

        let index = self.push_values(owner, &f, &[target])?;
        self.emit(Notification::node(
            owner,
            feature,
            Event::Add { new: Value::Node(target), position: Position::Index(index) },
        ));
        self.sync_opposites(owner, &f, &[], &[target])
    }

    /// Append several values in one ADD_MANY notification.
    pub fn add_many(&mut self, owner: NodeId, feature: FeatureId, targets: &[NodeId]) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if !f.many {
            return Err(Error::InvalidFeature(format!("'{}' is single-valued; use set", f.name)));
        }
        let current = self.values(owner, feature);
        let mut fresh = NodeList::new();
        for target in targets {
            if !current.contains(target) && !fresh.contains(target) {
                self.check_target(owner, &f, *target)?;
                fresh.push(*target);
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }
        self.check_opposite_ends(owner, &f, &[], &fresh)?;
        if f.containment {
            for target in &fresh {
                self.detach(*target)?;
            }
        }

        let index = self.push_values(owner, &f, &fresh)?;
        let start = index + 1 - fresh.len();
        self.emit(Notification::node(
            owner,
            feature,
            Event::AddMany { new: fresh.clone(), position: Position::Index(start) },
        ));
        self.sync_opposites(owner, &f, &[], &fresh)
    }

    pub fn remove(&mut self, owner: NodeId, feature: FeatureId, target: NodeId) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if !f.many {
            return Err(Error::InvalidFeature(format!("'{}' is single-valued; use set", f.name)));
        }
        let Some(index) = self.values(owner, feature).iter().position(|v| *v == target) else {
            return Ok(());
        };
        self.check_opposite_ends(owner, &f, &[target], &[])?;
        self.take_values(owner, &f, &[target])?;
        self.emit(Notification::node(
            owner,
            feature,
            Event::Remove { old: Value::Node(target), position: Position::Index(index) },
        ));
        self.sync_opposites(owner, &f, &[target], &[])
    }

    /// Remove several values in one REMOVE_MANY notification.
    pub fn remove_many(&mut self, owner: NodeId, feature: FeatureId, targets: &[NodeId]) -> Result<()> {
        let f = self.writable_feature(owner, feature)?;
        if !f.many {
            return Err(Error::InvalidFeature(format!("'{}' is single-valued; use set", f.name)));
        }
        let current = self.values(owner, feature);
        let mut positions = Vec::new();
        let mut old = NodeList::new();
        for (i, v) in current.iter().enumerate() {
            if targets.contains(v) {
                positions.push(i);
                old.push(*v);
            }
        }
        if old.is_empty() {
            return Ok(());
        }
        self.remove_values(owner, &f, &old, Some(positions))
    }

    fn remove_values(
        &mut self,
        owner: NodeId,
        f: &Feature,
        old: &[NodeId],
        positions: Option<Vec<usize>>,
    ) -> Result<()> {
        self.check_opposite_ends(owner, f, old, &[])?;
        self.take_values(owner, f, old)?;
        self.emit(Notification::node(
            owner,
            f.id,
            Event::RemoveMany { old: old.iter().copied().collect(), positions },
        ));
        self.sync_opposites(owner, f, old, &[])
    }

    /// Replace resolvable proxies held by `feature` with the nodes they stand
    /// for, firing RESOLVE for each. Returns how many were resolved.
    pub fn resolve_feature(&mut self, owner: NodeId, feature: FeatureId) -> Result<usize> {
        let f = self.writable_feature(owner, feature)?;
        let current = self.values(owner, feature);
        let mut resolved = 0;
        for (index, value) in current.iter().enumerate() {
            if !self.is_proxy(*value) {
                continue;
            }
            let Some(real) = self.resolve(*value) else {
                trace!(proxy = %value, "proxy did not resolve");
                continue;
            };
            if let Some(slot) = self.node_mut(owner)?.slots.get_mut(&feature) {
                slot[index] = real;
            }
            let position = if f.many { Position::Index(index) } else { Position::NoIndex };
            self.emit(Notification::node(
                owner,
                feature,
                Event::Resolve { old: Value::Node(*value), new: Value::Node(real), position },
            ));
            resolved += 1;
        }
        Ok(resolved)
    }

    // ========================================================================
    // Storage primitives (no notifications)
    // ========================================================================

    fn store_single(&mut self, owner: NodeId, f: &Feature, old: Option<NodeId>, new: Option<NodeId>) -> Result<()> {
        let slot = self.node_mut(owner)?.slots.entry(f.id).or_default();
        slot.clear();
        slot.extend(new);
        if f.containment {
            if let Some(o) = old {
                self.node_mut(o)?.container = None;
            }
            if let Some(n) = new {
                self.node_mut(n)?.container = Some((owner, f.id));
            }
        }
        Ok(())
    }

    /// Returns the index of the last appended value.
    fn push_values(&mut self, owner: NodeId, f: &Feature, values: &[NodeId]) -> Result<usize> {
        let slot = self.node_mut(owner)?.slots.entry(f.id).or_default();
        slot.extend(values.iter().copied());
        let last = slot.len() - 1;
        if f.containment {
            for v in values {
                self.node_mut(*v)?.container = Some((owner, f.id));
            }
        }
        Ok(last)
    }

    fn take_values(&mut self, owner: NodeId, f: &Feature, values: &[NodeId]) -> Result<()> {
        if let Some(slot) = self.node_mut(owner)?.slots.get_mut(&f.id) {
            slot.retain(|v| !values.contains(v));
        }
        if f.containment {
            for v in values {
                self.node_mut(*v)?.container = None;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Opposite maintenance
    // ========================================================================

    /// After `owner.f` lost `removed` and gained `added`, update the other ends.
    fn sync_opposites(&mut self, owner: NodeId, f: &Feature, removed: &[NodeId], added: &[NodeId]) -> Result<()> {
        if f.containment {
            return Ok(());
        }
        let Some(opposite) = f.opposite else { return Ok(()) };
        for target in removed {
            if !self.is_proxy(*target) {
                self.inverse_remove(*target, opposite, owner)?;
            }
        }
        for target in added {
            if !self.is_proxy(*target) {
                self.inverse_add(*target, opposite, owner)?;
            }
        }
        Ok(())
    }

    fn inverse_add(&mut self, target: NodeId, g: FeatureId, owner: NodeId) -> Result<()> {
        let gf = self.feature_of(g)?.clone();
        let current = self.values(target, g);
        if current.contains(&owner) {
            return Ok(());
        }
        if gf.many {
            let index = self.push_values(target, &gf, &[owner])?;
            self.emit(Notification::node(
                target,
                g,
                Event::Add { new: Value::Node(owner), position: Position::Index(index) },
            ));
            return Ok(());
        }

        let previous = current.first().copied();
        if let (Some(prev), Some(forward)) = (previous, gf.opposite) {
            // The previous partner loses its forward edge to `target`.
            let ff = self.feature_of(forward)?.clone();
            if ff.many {
                if let Some(index) = self.values(prev, forward).iter().position(|v| *v == target) {
                    self.take_values(prev, &ff, &[target])?;
                    self.emit(Notification::node(
                        prev,
                        forward,
                        Event::Remove { old: Value::Node(target), position: Position::Index(index) },
                    ));
                }
            } else if self.single(prev, forward) == Some(target) {
                self.store_single(prev, &ff, Some(target), None)?;
                self.emit(Notification::node(
                    prev,
                    forward,
                    Event::Set { old: Value::Node(target), new: Value::Null },
                ));
            }
        }
        self.store_single(target, &gf, previous, Some(owner))?;
        self.emit(Notification::node(
            target,
            g,
            Event::Set { old: previous.into(), new: Value::Node(owner) },
        ));
        Ok(())
    }

    fn inverse_remove(&mut self, target: NodeId, g: FeatureId, owner: NodeId) -> Result<()> {
        let gf = self.feature_of(g)?.clone();
        let Some(index) = self.values(target, g).iter().position(|v| *v == owner) else {
            return Ok(());
        };
        if gf.many {
            self.take_values(target, &gf, &[owner])?;
            self.emit(Notification::node(
                target,
                g,
                Event::Remove { old: Value::Node(owner), position: Position::Index(index) },
            ));
        } else {
            self.store_single(target, &gf, Some(owner), None)?;
            self.emit(Notification::node(
                target,
                g,
                Event::Set { old: Value::Node(owner), new: Value::Null },
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Checks and lookups
    // ========================================================================

    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))
    }

    fn resource_mut(&mut self, id: ResourceId) -> Result<&mut ResourceData> {
        self.resources.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Resource {id}")))
    }

    fn feature_of(&self, id: FeatureId) -> Result<&Feature> {
        self.metamodel.feature(id).ok_or_else(|| Error::NotFound(format!("Feature {id}")))
    }

    fn single(&self, owner: NodeId, feature: FeatureId) -> Option<NodeId> {
        self.nodes
            .get(&owner)
            .and_then(|n| n.slots.get(&feature))
            .and_then(|slot| slot.first().copied())
    }

    /// The resource a node's tree is rooted in, loaded or not.
    fn owning_resource(&self, node: NodeId) -> Option<ResourceId> {
        let mut current = node;
        loop {
            let data = self.nodes.get(&current)?;
            if let Some(resource) = data.root_of {
                return Some(resource);
            }
            current = data.container?.0;
        }
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.nodes.get(&n).and_then(|d| d.container).map(|(c, _)| c);
        }
        false
    }

    fn ensure_writable(&self, node: NodeId) -> Result<()> {
        match self.owning_resource(node) {
            Some(resource) if !self.is_loaded(resource) => {
                Err(Error::ResourceNotLoaded(format!("{resource} (while modifying {node})")))
            }
            _ => Ok(()),
        }
    }

    fn ensure_resource_writable(&self, resource: ResourceId) -> Result<()> {
        match self.resources.get(&resource) {
            None => Err(Error::NotFound(format!("Resource {resource}"))),
            Some(data) if !data.loaded => Err(Error::ResourceNotLoaded(resource.to_string())),
            Some(_) => Ok(()),
        }
    }

    fn ensure_attachable(&self, node: NodeId) -> Result<()> {
        let data = self.node(node)?;
        if data.proxy_uri.is_some() {
            return Err(Error::InvalidFeature(format!("Proxy {node} cannot be contained")));
        }
        self.ensure_writable(node)
    }

    /// Resolve `feature` on `owner` and reject writes the model cannot store.
    fn writable_feature(&self, owner: NodeId, feature: FeatureId) -> Result<Feature> {
        let data = self.node(owner)?;
        if data.proxy_uri.is_some() {
            return Err(Error::InvalidFeature(format!("Proxy {owner} has no state")));
        }
        let f = self.feature_of(feature)?;
        if !f.is_reference() {
            return Err(Error::InvalidFeature(format!("'{}' is not a reference", f.name)));
        }
        if f.container || f.is_group || !f.changeable {
            return Err(Error::InvalidFeature(format!("'{}' cannot be written directly", f.name)));
        }
        if !self.metamodel.all_features(data.class).contains(&feature) {
            return Err(Error::InvalidFeature(format!("'{}' is not a feature of {owner}", f.name)));
        }
        self.ensure_writable(owner)?;
        Ok(f.clone())
    }

    /// Every node whose opposite slot a change would touch must be writable.
    fn check_opposite_ends(&self, owner: NodeId, f: &Feature, removed: &[NodeId], added: &[NodeId]) -> Result<()> {
        if f.containment {
            return Ok(());
        }
        let Some(opposite) = f.opposite else { return Ok(()) };
        let many = self.feature_of(opposite)?.many;
        for node in removed.iter().chain(added) {
            if !self.is_proxy(*node) {
                self.ensure_writable(*node)?;
            }
        }
        if !many {
            for target in added {
                if let Some(previous) = self.single(*target, opposite).filter(|p| *p != owner) {
                    self.ensure_writable(previous)?;
                }
            }
        }
        Ok(())
    }

    fn check_target(&self, owner: NodeId, f: &Feature, target: NodeId) -> Result<()> {
        self.node(target)?;
        if f.containment {
            self.ensure_attachable(target)?;
            if self.is_ancestor_or_self(target, owner) {
                return Err(Error::ContainmentCycle(format!("{target} contains {owner}")));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Notification delivery
    // ========================================================================

    /// Structural changes (containment and load state) reach every
    /// subscription. Everything else only reaches scopes containing the notifier.
    fn in_scope(&self, scope: Scope, notification: &Notification) -> bool {
        match (scope, notification.notifier) {
            (Scope::ResourceSet, Notifier::Node(n)) => self.owning_resource(n).is_some(),
            (Scope::ResourceSet, _) => true,
            (_, Notifier::ResourceSet) => false,
            _ if self.is_structural(notification) => true,
            (Scope::Resource(r), Notifier::Resource(x)) => r == x,
            (Scope::Resource(r), Notifier::Node(n)) => self.owning_resource(n) == Some(r),
            (Scope::Node(root), Notifier::Node(n)) => self.is_ancestor_or_self(root, n),
            (Scope::Node(_), Notifier::Resource(_)) => false,
        }
    }

    fn is_structural(&self, notification: &Notification) -> bool {
        match notification.feature {
            Some(FeatureKey::Resource(ResourceFeature::Contents | ResourceFeature::IsLoaded)) => true,
            Some(FeatureKey::Model(f)) => self.metamodel.feature(f).is_some_and(|f| f.containment),
            _ => false,
        }
    }

    fn emit(&self, notification: Notification) {
        trace!(
            notifier = ?notification.notifier,
            feature = ?notification.feature,
            event = notification.event.name(),
            "notify"
        );
        // A listener subscribed under several scopes still hears each
        // notification once.
        let mut delivered: Vec<*const ()> = Vec::new();
        for sub in &self.subscriptions {
            let key = Arc::as_ptr(&sub.listener) as *const ();
            if delivered.contains(&key) || !self.in_scope(sub.scope, &notification) {
                continue;
            }
            delivered.push(key);
            sub.listener.on_notification(self, &notification);
        }
    }
}

// ============================================================================
// ModelView impl
// ============================================================================

impl ModelView for MemoryModel {
    fn metamodel(&self) -> &Metamodel {
        &self.metamodel
    }

    fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn class_of(&self, node: NodeId) -> Option<ClassId> {
        self.nodes.get(&node).map(|n| n.class)
    }

    fn container(&self, node: NodeId) -> Option<(NodeId, FeatureId)> {
        self.nodes.get(&node).and_then(|n| n.container)
    }

    fn resource_of(&self, node: NodeId) -> Option<ResourceId> {
        self.owning_resource(node).filter(|r| self.is_loaded(*r))
    }

    fn contents(&self, node: NodeId) -> Vec<NodeId> {
        let Some(data) = self.nodes.get(&node) else { return Vec::new() };
        self.metamodel
            .all_features(data.class)
            .into_iter()
            .filter(|fid| self.metamodel.feature(*fid).is_some_and(|f| f.containment))
            .flat_map(|fid| data.slots.get(&fid).cloned().unwrap_or_default())
            .collect()
    }

    fn values(&self, node: NodeId, feature: FeatureId) -> NodeList {
        let Some(data) = self.nodes.get(&node) else { return NodeList::new() };
        let Some(f) = self.metamodel.feature(feature) else { return NodeList::new() };

        if f.container {
            return data
                .container
                .filter(|(_, containment)| f.opposite == Some(*containment))
                .map(|(c, _)| c)
                .into_iter()
                .collect();
        }
        if f.is_group {
            return self
                .metamodel
                .all_features(data.class)
                .into_iter()
                .filter(|fid| self.metamodel.feature(*fid).is_some_and(|m| m.group == Some(feature)))
                .flat_map(|fid| data.slots.get(&fid).cloned().unwrap_or_default())
                .collect();
        }
        data.slots.get(&feature).cloned().unwrap_or_default()
    }

    fn is_proxy(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|n| n.proxy_uri.is_some())
    }

    fn proxy_uri(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(&node).and_then(|n| n.proxy_uri.as_deref())
    }

    fn uri_of(&self, node: NodeId) -> Option<String> {
        let resource = self.owning_resource(node)?;
        let uri = &self.resources.get(&resource)?.uri;
        Some(format!("{uri}#{node}"))
    }

    fn resolve(&self, node: NodeId) -> Option<NodeId> {
        let data = self.nodes.get(&node)?;
        let Some(uri) = data.proxy_uri.as_deref() else { return Some(node) };
        let (resource_uri, fragment) = uri.split_once('#')?;
        let resource = self
            .resource_order
            .iter()
            .copied()
            .find(|r| self.resources.get(r).is_some_and(|d| d.uri == resource_uri && d.loaded))?;
        let target = NodeId(fragment.strip_prefix('n')?.parse().ok()?);
        (!self.is_proxy(target) && self.owning_resource(target) == Some(resource)).then_some(target)
    }

    fn resources(&self) -> Vec<ResourceId> {
        self.resource_order.clone()
    }

    fn resource_uri(&self, resource: ResourceId) -> Option<&str> {
        self.resources.get(&resource).map(|d| d.uri.as_str())
    }

    fn resource_roots(&self, resource: ResourceId) -> Vec<NodeId> {
        self.resources.get(&resource).map(|d| d.roots.clone()).unwrap_or_default()
    }

    fn is_loaded(&self, resource: ResourceId) -> bool {
        self.resources.get(&resource).is_some_and(|d| d.loaded)
    }
}

// ============================================================================
// ModelGraph impl
// ============================================================================

impl ModelGraph for MemoryModel {
    fn load(&mut self, resource: ResourceId) -> Result<()> {
        let data = self.resource_mut(resource)?;
        if data.loaded {
            return Ok(());
        }
        let uri = data.uri.clone();
        if self.failing_loads.remove(&resource) {
            return Err(Error::LoadFailed { uri, message: "injected failure".into() });
        }
        self.resource_mut(resource)?.loaded = true;
        debug!(%resource, %uri, "resource loaded");
        self.emit(Notification::resource(
            resource,
            ResourceFeature::IsLoaded,
            Event::Set { old: Value::Bool(false), new: Value::Bool(true) },
        ));
        Ok(())
    }

    fn unload(&mut self, resource: ResourceId) {
        let Some(data) = self.resources.get_mut(&resource) else { return };
        if !data.loaded {
            return;
        }
        data.loaded = false;
        debug!(%resource, "resource unloaded");
        self.emit(Notification::resource(
            resource,
            ResourceFeature::IsLoaded,
            Event::Set { old: Value::Bool(true), new: Value::Bool(false) },
        ));
    }

    fn subscribe(&mut self, scope: Scope, listener: Arc<dyn ModelListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription_id);
        self.next_subscription_id += 1;
        self.subscriptions.push(Subscription { id, scope, listener });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }
}

// ============================================================================
// Tests
// ============================================================================
