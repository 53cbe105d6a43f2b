//! The live cross-reference index.
//!
//! [`CrossReferenceIndex`] subscribes to a graph and keeps two structures
//! current from mutation notifications alone:
//!
//! - the [`InverseReferenceIndex`] of stored non-navigable edges, and
//! - the [`ResourceDependencyTracker`] of counted resource-pair edges.
//!
//! ## Accounting rules
//!
//! Maintenance always works on raw values, so a proxy counts as an edge into
//! no resource. An edge `o.f -> t` contributes `(resource_of(o), resource_of(t))`
//! to the tracker at the moment it is registered, and the exact same pair is
//! reconstructed when it is deregistered. Containment moves re-account every
//! edge into or out of the moved subtree, so a subtree that leaves a resource
//! takes its dependencies with it.
//!
//! Only owners inside an attached scope are accounted. Attaching to the
//! resource set gives a complete index. Node and resource scopes give a
//! partial view restricted to edges owned inside them.

use std::sync::Arc;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::graph::{ModelGraph, ModelListener, ModelView, Scope, SubscriptionId};
use crate::model::*;
use crate::{Error, Result};
use super::{
    DependencyObserver, DependencySnapshot, FeatureClassifier, IndexConfig, InverseReferenceIndex,
    ResourceDependencyTracker,
};

/// `(importer, imported)`; either end may be absent.
type Pair = (Option<ResourceId>, Option<ResourceId>);

// ============================================================================
// CrossReferenceIndex
// ============================================================================

pub struct CrossReferenceIndex {
    config: IndexConfig,
    classifier: FeatureClassifier,
    inverse: RwLock<InverseReferenceIndex>,
    tracker: RwLock<ResourceDependencyTracker>,
    observer: Option<Arc<dyn DependencyObserver>>,
    attachments: Mutex<Vec<(Scope, SubscriptionId)>>,
}

impl Default for CrossReferenceIndex {
    fn default() -> Self {
        Self::with_config(IndexConfig::default())
    }
}

impl std::fmt::Debug for CrossReferenceIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrossReferenceIndex")
            .field("config", &self.config)
            .field("attachments", &self.attachments())
            .field("settings", &self.inverse.read().len())
            .finish()
    }
}

impl CrossReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: IndexConfig) -> Self {
        Self {
            config,
            classifier: FeatureClassifier::new(),
            inverse: RwLock::new(InverseReferenceIndex::new()),
            tracker: RwLock::new(ResourceDependencyTracker::new()),
            observer: None,
            attachments: Mutex::new(Vec::new()),
        }
    }

    /// Receive import/export hooks.
    pub fn with_observer(mut self, observer: Arc<dyn DependencyObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn classifier(&self) -> &FeatureClassifier {
        &self.classifier
    }

    /// Currently attached scopes, in attach order.
    pub fn attachments(&self) -> Vec<Scope> {
        self.attachments.lock().iter().map(|(scope, _)| *scope).collect()
    }

    // ========================================================================
    // Attach / detach
    // ========================================================================

    /// Subscribe to `scope` and index everything already in it.
    pub fn attach<G: ModelGraph>(self: &Arc<Self>, graph: &mut G, scope: Scope) -> Result<()> {
        {
            let view: &dyn ModelView = &*graph;
            match scope {
                Scope::Node(n) if !view.contains_node(n) => {
                    return Err(Error::NotFound(format!("Node {n}")));
                }
                Scope::Resource(r) if view.resource_uri(r).is_none() => {
                    return Err(Error::NotFound(format!("Resource {r}")));
                }
                _ => {}
            }
            let attached = self.attachments.lock();
            if let Some((existing, _)) = attached.iter().find(|(s, _)| overlaps(view, *s, scope)) {
                return Err(Error::AlreadyAttached(format!("{scope:?} overlaps {existing:?}")));
            }
        }

        let purged = self.classifier.purge_stale(graph.metamodel());
        if purged > 0 {
            debug!(purged, "dropped cached feature lists of unregistered types");
        }

        let listener: Arc<dyn ModelListener> = self.clone();
        let id = graph.subscribe(scope, listener);
        self.attachments.lock().push((scope, id));

        let view: &dyn ModelView = &*graph;
        let nodes = scope_nodes(view, scope);
        self.index_nodes(view, &nodes);
        let pairs = self.outgoing_pairs(view, None, &nodes);
        self.apply(&pairs, true);
        debug!(?scope, nodes = nodes.len(), edges = pairs.len(), "attached");
        self.flush_changes();
        Ok(())
    }

    /// Unsubscribe from `scope` and remove what it contributed.
    pub fn detach<G: ModelGraph>(&self, graph: &mut G, scope: Scope) -> Result<()> {
        let id = {
            let mut attached = self.attachments.lock();
            let pos = attached
                .iter()
                .position(|(s, _)| *s == scope)
                .ok_or_else(|| Error::NotFound(format!("Attachment {scope:?}")))?;
            attached.remove(pos).1
        };
        graph.unsubscribe(id);

        let view: &dyn ModelView = &*graph;
        match scope {
            Scope::Node(root) => {
                let nodes = view.all_contents(root);
                self.unindex_nodes(&nodes);
                let pairs = self.outgoing_pairs(view, None, &nodes);
                self.apply(&pairs, false);
            }
            Scope::Resource(resource) => {
                self.unindex_nodes(&view.resource_contents(resource));
                self.tracker.write().deregister_all(resource);
                // Edges from scopes that stay attached still point in.
                if view.is_loaded(resource) {
                    let mut pairs = Vec::new();
                    for node in view.resource_contents(resource) {
                        self.incoming_pairs(view, Some(resource), node, &mut pairs);
                    }
                    self.apply(&pairs, true);
                }
            }
            Scope::ResourceSet => {
                self.inverse.write().clear();
                let mut tracker = self.tracker.write();
                for resource in view.resources() {
                    tracker.deregister_all(resource);
                }
            }
        }
        debug!(?scope, "detached");
        self.flush_changes();
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Re-account every edge into or out of the subtree at `node`, as if the
    /// subtree were entering (`register`) or leaving `resource`.
    ///
    /// Touches only the dependency tracker.
    pub fn update_imports_and_exports(
        &self,
        graph: &dyn ModelView,
        resource: ResourceId,
        node: NodeId,
        register: bool,
    ) {
        self.update_subtree(graph, Some(resource), node, register);
        self.flush_changes();
    }

    fn handle(&self, view: &dyn ModelView, notification: &Notification) {
        match (notification.notifier, notification.feature) {
            (Notifier::Resource(r), Some(FeatureKey::Resource(ResourceFeature::IsLoaded))) => {
                self.handle_loaded(view, r, &notification.event);
            }
            (Notifier::Resource(r), Some(FeatureKey::Resource(ResourceFeature::Contents))) => {
                self.handle_containment(view, Some(r), None, &notification.event);
            }
            // Membership changes arrive together with load/unload.
            (Notifier::ResourceSet, Some(FeatureKey::Resource(ResourceFeature::Resources))) => {}
            (Notifier::Node(owner), Some(FeatureKey::Model(fid))) => {
                let metamodel = view.metamodel();
                let Some(feature) = metamodel.feature(fid) else {
                    warn!(%owner, feature = %fid, "notification for unknown feature ignored");
                    return;
                };
                if !view.is_instance_of(owner, feature.owner) {
                    warn!(%owner, feature = %feature.name, "notification for undeclared feature ignored");
                    return;
                }
                if !feature.is_reference() || feature.container {
                    return;
                }
                if feature.containment {
                    self.handle_containment(view, view.resource_of(owner), Some(owner), &notification.event);
                } else {
                    self.handle_cross_reference(view, owner, feature, &notification.event);
                }
            }
            (notifier, feature) => {
                warn!(?notifier, ?feature, event = notification.event.name(), "malformed notification ignored");
            }
        }
    }

    fn handle_loaded(&self, view: &dyn ModelView, resource: ResourceId, event: &Event) {
        let Event::Set { old, new } = event else {
            warn!(%resource, event = event.name(), "unexpected load-state event ignored");
            return;
        };
        match (old.as_bool(), new.as_bool()) {
            (Some(true), Some(false)) => {
                self.unindex_nodes(&view.resource_contents(resource));
                self.tracker.write().deregister_all(resource);
                debug!(%resource, "unloaded resource torn down");
            }
            (Some(false), Some(true)) => {
                let scopes = self.attachments();
                let nodes = view.resource_contents(resource);
                let covered: Vec<NodeId> = nodes
                    .iter()
                    .copied()
                    .filter(|n| scopes.iter().any(|s| scope_covers(view, *s, *n)))
                    .collect();
                self.index_nodes(view, &covered);
                let mut pairs = self.outgoing_pairs(view, Some(resource), &covered);
                for node in &nodes {
                    self.incoming_pairs(view, Some(resource), *node, &mut pairs);
                }
                self.apply(&pairs, true);
                debug!(%resource, nodes = covered.len(), edges = pairs.len(), "loaded resource indexed");
            }
            _ => {}
        }
    }

    /// `resource` and `container` locate where the change happened. They are
    /// passed in because removed nodes no longer report them.
    ///
    /// Only nodes inside an attached scope are indexed and counted. Edges
    /// into a moved subtree are re-accounted whenever their owner is covered,
    /// wherever the subtree goes.
    fn handle_containment(
        &self,
        view: &dyn ModelView,
        resource: Option<ResourceId>,
        container: Option<NodeId>,
        event: &Event,
    ) {
        let scopes = self.attachments();
        let covered_now = |n: NodeId| scopes.iter().any(|s| scope_covers(view, *s, n));

        for top in event.removed() {
            let nodes = view.all_contents(top);
            let before: Vec<NodeId> = nodes
                .iter()
                .copied()
                .filter(|n| scopes.iter().any(|s| covered_before_removal(view, *s, resource, container, *n)))
                .collect();
            let gone: Vec<NodeId> = before.iter().copied().filter(|n| !covered_now(*n)).collect();
            self.unindex_nodes(&gone);
            self.account_subtree(view, resource, &nodes, &before, false);
        }
        for top in event.added() {
            let nodes = view.all_contents(top);
            let covered: Vec<NodeId> = nodes.iter().copied().filter(|n| covered_now(*n)).collect();
            let fresh: Vec<NodeId> = covered
                .iter()
                .copied()
                .filter(|n| !scopes.iter().any(|s| covered_while_detached(view, *s, top, *n)))
                .collect();
            self.index_nodes(view, &fresh);
            self.account_subtree(view, resource, &nodes, &covered, true);
        }
    }

    fn handle_cross_reference(&self, view: &dyn ModelView, owner: NodeId, feature: &Feature, event: &Event) {
        if !FeatureClassifier::is_mutable(feature) {
            return;
        }
        let added = event.added();
        let removed = event.removed();

        if FeatureClassifier::is_indexed(feature) {
            let mut inverse = self.inverse.write();
            for target in &added {
                inverse.register_edge(owner, feature.id, *target, view.proxy_uri(*target));
            }
            for target in &removed {
                if !inverse.deregister_edge(owner, feature.id, *target) {
                    trace!(%owner, %target, feature = %feature.name, "removed edge was not indexed");
                }
            }
        }

        if counts_dependency(feature) {
            let src = view.resource_of(owner);
            let mut tracker = self.tracker.write();
            for target in &added {
                tracker.register_reference(src, view.resource_of(*target));
            }
            for target in &removed {
                tracker.deregister_reference(src, view.resource_of(*target));
            }
        }
    }

    fn update_subtree(&self, view: &dyn ModelView, resource: Option<ResourceId>, node: NodeId, register: bool) {
        let nodes = view.all_contents(node);
        self.account_subtree(view, resource, &nodes, &nodes, register);
    }

    /// Re-account the edges leaving `owners` and those entering `nodes`
    /// from covered owners, with `resource` standing for the subtree's side.
    fn account_subtree(
        &self,
        view: &dyn ModelView,
        resource: Option<ResourceId>,
        nodes: &[NodeId],
        owners: &[NodeId],
        register: bool,
    ) {
        let mut pairs = self.outgoing_pairs(view, resource, owners);
        for n in nodes {
            self.incoming_pairs(view, resource, *n, &mut pairs);
        }
        trace!(?resource, register, nodes = nodes.len(), edges = pairs.len(), "subtree re-accounted");
        self.apply(&pairs, register);
    }

    // ========================================================================
    // Edge walks
    // ========================================================================

    /// Visit every raw value of every mutable cross-reference feature of `node`.
    fn for_each_outgoing(&self, view: &dyn ModelView, node: NodeId, mut visit: impl FnMut(&Feature, NodeId)) {
        if view.is_proxy(node) {
            return;
        }
        let Some(class) = view.class_of(node) else { return };
        let metamodel = view.metamodel();
        for fid in self.classifier.mutable_cross_reference_features(metamodel, class).iter() {
            let Some(feature) = metamodel.feature(*fid) else { continue };
            for target in view.values(node, *fid) {
                visit(feature, target);
            }
        }
    }

    fn index_nodes(&self, view: &dyn ModelView, nodes: &[NodeId]) {
        let mut inverse = self.inverse.write();
        for node in nodes {
            self.for_each_outgoing(view, *node, |feature, target| {
                if FeatureClassifier::is_indexed(feature) {
                    inverse.register_edge(*node, feature.id, target, view.proxy_uri(target));
                }
            });
        }
    }

    fn unindex_nodes(&self, nodes: &[NodeId]) {
        if nodes.is_empty() {
            return;
        }
        let owners: HashSet<NodeId> = nodes.iter().copied().collect();
        self.inverse.write().remove_owned_by(|owner| owners.contains(&owner));
    }

    /// Counted edges leaving `nodes`. The owner side is `resource` when given,
    /// else each node's own resource.
    fn outgoing_pairs(&self, view: &dyn ModelView, resource: Option<ResourceId>, nodes: &[NodeId]) -> Vec<Pair> {
        let mut pairs = Vec::new();
        for node in nodes {
            let src = resource.or_else(|| view.resource_of(*node));
            self.for_each_outgoing(view, *node, |feature, target| {
                if counts_dependency(feature) {
                    pairs.push((src, view.resource_of(target)));
                }
            });
        }
        pairs
    }

    /// Counted edges into `node` from owners inside an attached scope.
    fn incoming_pairs(&self, view: &dyn ModelView, resource: Option<ResourceId>, node: NodeId, out: &mut Vec<Pair>) {
        let scopes = self.attachments();
        let covered = |owner: NodeId| scopes.iter().any(|s| scope_covers(view, *s, owner));
        let metamodel = view.metamodel();

        for setting in self.inverse.read().settings_of(node) {
            let counted = metamodel.feature(setting.feature).is_some_and(counts_dependency);
            if counted && covered(setting.owner) {
                out.push((view.resource_of(setting.owner), resource));
            }
        }

        for (reverse, forward) in opposite_features(view, node) {
            if !metamodel.feature(forward).is_some_and(counts_dependency) {
                continue;
            }
            for owner in view.values(node, reverse) {
                if !view.is_proxy(owner) && covered(owner) {
                    out.push((view.resource_of(owner), resource));
                }
            }
        }
    }

    fn apply(&self, pairs: &[Pair], register: bool) {
        let mut tracker = self.tracker.write();
        for (src, dst) in pairs {
            if register {
                tracker.register_reference(*src, *dst);
            } else {
                tracker.deregister_reference(*src, *dst);
            }
        }
    }

    /// Deliver hook calls recorded by the tracker, outside of any lock.
    fn flush_changes(&self) {
        let changes = self.tracker.write().drain_changes();
        if let Some(observer) = &self.observer {
            for change in &changes {
                change.dispatch(observer.as_ref());
            }
        }
    }

    // ========================================================================
    // Dependency queries
    // ========================================================================

    /// Resources `resource` holds at least one edge into.
    pub fn imports(&self, resource: ResourceId) -> HashSet<ResourceId> {
        self.tracker.read().imports(resource)
    }

    /// Resources holding at least one edge into `resource`.
    pub fn exports(&self, resource: ResourceId) -> HashSet<ResourceId> {
        self.tracker.read().exports(resource)
    }

    pub fn import_count(&self, importer: ResourceId, imported: ResourceId) -> u32 {
        self.tracker.read().import_count(importer, imported)
    }

    pub fn dependency_snapshot(&self) -> DependencySnapshot {
        self.tracker.read().snapshot()
    }

    // ========================================================================
    // Inverse-reference queries
    // ========================================================================

    /// Every setting whose edge points at `node`: its container setting, the
    /// stored non-navigable settings and those read back through opposites.
    ///
    /// With `resolve`, settings held against proxies for `node` are included
    /// and proxy opposites are resolved. Without it, proxies are absent edges.
    pub fn inverse_references(&self, graph: &dyn ModelView, node: NodeId, resolve: bool) -> HashSet<Setting> {
        let mut out = HashSet::new();
        if let Some((container, feature)) = graph.container(node) {
            out.insert(Setting::new(container, feature));
        }
        out.extend(self.non_navigable_inverse_references(graph, node, resolve));

        for (reverse, forward) in opposite_features(graph, node) {
            for value in graph.values(node, reverse) {
                let owner = if resolve {
                    graph.resolve(value)
                } else {
                    Some(value).filter(|v| !graph.is_proxy(*v))
                };
                if let Some(owner) = owner {
                    out.insert(Setting::new(owner, forward));
                }
            }
        }
        out
    }

    /// Only the stored settings pointing at `node`.
    pub fn non_navigable_inverse_references(
        &self,
        graph: &dyn ModelView,
        node: NodeId,
        resolve: bool,
    ) -> HashSet<Setting> {
        let inverse = self.inverse.read();
        let mut out: HashSet<Setting> = inverse.settings_of(node).iter().copied().collect();
        if !resolve {
            return out;
        }
        let Some(uri) = graph.uri_of(node) else { return out };
        for proxy in inverse.proxies_for(&uri) {
            if *proxy != node && graph.resolve(*proxy) == Some(node) {
                out.extend(inverse.settings_of(*proxy).iter().copied());
            }
        }
        out
    }

    /// Owners of edges into `node`, optionally filtered by feature and by
    /// the owner's type.
    pub fn inverse_referencers(
        &self,
        graph: &dyn ModelView,
        node: NodeId,
        feature: Option<FeatureId>,
        class: Option<ClassId>,
    ) -> HashSet<NodeId> {
        self.inverse_references(graph, node, self.config.resolve_proxies)
            .into_iter()
            .filter(|s| matches_filter(graph, s, feature, class))
            .map(|s| s.owner)
            .collect()
    }

    /// Like [`Self::inverse_referencers`], restricted to edges that count
    /// toward resource dependencies.
    pub fn inverse_referencers_cross_resource(
        &self,
        graph: &dyn ModelView,
        node: NodeId,
        feature: Option<FeatureId>,
        class: Option<ClassId>,
    ) -> HashSet<NodeId> {
        let metamodel = graph.metamodel();
        self.inverse_references(graph, node, self.config.resolve_proxies)
            .into_iter()
            .filter(|s| metamodel.feature(s.feature).is_some_and(counts_dependency))
            .filter(|s| matches_filter(graph, s, feature, class))
            .map(|s| s.owner)
            .collect()
    }

    pub fn non_navigable_inverse_referencers(&self, graph: &dyn ModelView, node: NodeId) -> HashSet<NodeId> {
        self.non_navigable_inverse_references(graph, node, self.config.resolve_proxies)
            .into_iter()
            .map(|s| s.owner)
            .collect()
    }

    /// Referencers of `node`, keyed by the feature they reference it through.
    pub fn grouped_referencers(&self, graph: &dyn ModelView, node: NodeId) -> HashMap<FeatureId, HashSet<NodeId>> {
        let mut groups: HashMap<FeatureId, HashSet<NodeId>> = HashMap::new();
        for setting in self.inverse_references(graph, node, self.config.resolve_proxies) {
            groups.entry(setting.feature).or_default().insert(setting.owner);
        }
        groups
    }

    /// Referencers of `node` through any of `features`.
    pub fn referencers_any(&self, graph: &dyn ModelView, node: NodeId, features: &[FeatureId]) -> HashSet<NodeId> {
        self.inverse_references(graph, node, self.config.resolve_proxies)
            .into_iter()
            .filter(|s| features.contains(&s.feature))
            .map(|s| s.owner)
            .collect()
    }
}

impl ModelListener for CrossReferenceIndex {
    fn on_notification(&self, graph: &dyn ModelView, notification: &Notification) {
        self.handle(graph, notification);
        self.flush_changes();
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Edges that take part in resource dependency accounting.
fn counts_dependency(feature: &Feature) -> bool {
    FeatureClassifier::is_import_export_capable(feature) && FeatureClassifier::is_mutable(feature)
}

/// `(reverse, forward)` pairs for the navigable cross-references of `node`'s
/// type: `node.reverse` holds the owners whose `forward` points at `node`.
fn opposite_features(view: &dyn ModelView, node: NodeId) -> Vec<(FeatureId, FeatureId)> {
    let Some(class) = view.class_of(node) else { return Vec::new() };
    let metamodel = view.metamodel();
    metamodel
        .all_features(class)
        .into_iter()
        .filter_map(|fid| {
            let f = metamodel.feature(fid)?;
            if !f.is_reference() || f.containment || f.container {
                return None;
            }
            Some((fid, f.opposite?))
        })
        .collect()
}

fn matches_filter(view: &dyn ModelView, setting: &Setting, feature: Option<FeatureId>, class: Option<ClassId>) -> bool {
    feature.is_none_or(|f| f == setting.feature) && class.is_none_or(|c| view.is_instance_of(setting.owner, c))
}

/// Nodes whose outgoing edges an attachment to `scope` accounts for.
fn scope_nodes(view: &dyn ModelView, scope: Scope) -> Vec<NodeId> {
    match scope {
        Scope::Node(root) if in_unloaded_resource(view, root) => Vec::new(),
        Scope::Node(root) => view.all_contents(root),
        Scope::Resource(r) if view.is_loaded(r) => view.resource_contents(r),
        Scope::Resource(_) => Vec::new(),
        Scope::ResourceSet => view
            .resources()
            .into_iter()
            .filter(|r| view.is_loaded(*r))
            .flat_map(|r| view.resource_contents(r))
            .collect(),
    }
}

/// Nodes of unloaded resources report no resource, so look for the top
/// ancestor among their roots.
fn in_unloaded_resource(view: &dyn ModelView, node: NodeId) -> bool {
    let mut top = node;
    while let Some((container, _)) = view.container(top) {
        top = container;
    }
    view.resources()
        .into_iter()
        .any(|r| !view.is_loaded(r) && view.resource_roots(r).contains(&top))
}

fn scope_covers(view: &dyn ModelView, scope: Scope, node: NodeId) -> bool {
    match scope {
        Scope::ResourceSet => view.resource_of(node).is_some(),
        Scope::Resource(r) => view.resource_of(node) == Some(r),
        Scope::Node(root) => is_within(view, root, node),
    }
}

/// Whether `scope` covered `node` before its subtree was removed from
/// `container` (or from the roots of `resource` when there is no container).
fn covered_before_removal(
    view: &dyn ModelView,
    scope: Scope,
    resource: Option<ResourceId>,
    container: Option<NodeId>,
    node: NodeId,
) -> bool {
    match scope {
        Scope::ResourceSet => resource.is_some(),
        Scope::Resource(r) => resource == Some(r),
        Scope::Node(root) => {
            is_within(view, root, node) || container.is_some_and(|c| is_within(view, root, c))
        }
    }
}

/// Whether `scope` covered `node` while the subtree at `top` was detached,
/// which only a node scope rooted inside the subtree does.
fn covered_while_detached(view: &dyn ModelView, scope: Scope, top: NodeId, node: NodeId) -> bool {
    match scope {
        Scope::Node(root) => is_within(view, top, root) && is_within(view, root, node),
        Scope::Resource(_) | Scope::ResourceSet => false,
    }
}

fn is_within(view: &dyn ModelView, root: NodeId, node: NodeId) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if n == root {
            return true;
        }
        current = view.container(n).map(|(c, _)| c);
    }
    false
}

fn overlaps(view: &dyn ModelView, a: Scope, b: Scope) -> bool {
    match (a, b) {
        (Scope::ResourceSet, _) | (_, Scope::ResourceSet) => true,
        (Scope::Resource(x), Scope::Resource(y)) => x == y,
        (Scope::Resource(r), Scope::Node(n)) | (Scope::Node(n), Scope::Resource(r)) => {
            view.resource_of(n) == Some(r)
        }
        (Scope::Node(x), Scope::Node(y)) => is_within(view, x, y) || is_within(view, y, x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryModel;

    struct Fixture {
        model: MemoryModel,
        class: ClassId,
        children: FeatureId,
        refs: FeatureId,
        weak: FeatureId,
    }

    fn fixture() -> Fixture {
        let mut mm = Metamodel::new();
        let class = mm.register_class("Element", &[]).unwrap();
        let children = mm.add_feature(class, FeatureSpec::reference("children").containment().many()).unwrap();
        let refs = mm.add_feature(class, FeatureSpec::reference("refs").many()).unwrap();
        let weak = mm.add_feature(class, FeatureSpec::reference("weak").non_resolving()).unwrap();
        Fixture { model: MemoryModel::new(mm), class, children, refs, weak }
    }

    #[test]
    fn test_attach_scans_existing_edges() {
        let mut fx = fixture();
        let a = fx.model.create_resource("a");
        let b = fx.model.create_resource("b");
        let a1 = fx.model.create_node(fx.class).unwrap();
        let b1 = fx.model.create_node(fx.class).unwrap();
        fx.model.add_root(a, a1).unwrap();
        fx.model.add_root(b, b1).unwrap();
        fx.model.add(a1, fx.refs, b1).unwrap();

        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut fx.model, Scope::ResourceSet).unwrap();

        assert_eq!(index.imports(a), HashSet::from_iter([b]));
        assert_eq!(index.inverse_referencers(&fx.model, b1, None, None), HashSet::from_iter([a1]));
    }

    #[test]
    fn test_non_resolving_edges_indexed_but_not_counted() {
        let mut fx = fixture();
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut fx.model, Scope::ResourceSet).unwrap();
        let a = fx.model.create_resource("a");
        let b = fx.model.create_resource("b");
        let a1 = fx.model.create_node(fx.class).unwrap();
        let b1 = fx.model.create_node(fx.class).unwrap();
        fx.model.add_root(a, a1).unwrap();
        fx.model.add_root(b, b1).unwrap();

        fx.model.set(a1, fx.weak, Some(b1)).unwrap();
        assert!(index.imports(a).is_empty());
        assert_eq!(index.non_navigable_inverse_referencers(&fx.model, b1), HashSet::from_iter([a1]));
        assert!(index.inverse_referencers_cross_resource(&fx.model, b1, None, None).is_empty());
    }

    #[test]
    fn test_container_setting_is_reported() {
        let mut fx = fixture();
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut fx.model, Scope::ResourceSet).unwrap();
        let r = fx.model.create_resource("a");
        let parent = fx.model.create_node(fx.class).unwrap();
        let child = fx.model.create_node(fx.class).unwrap();
        fx.model.add_root(r, parent).unwrap();
        fx.model.add(parent, fx.children, child).unwrap();

        let settings = index.inverse_references(&fx.model, child, true);
        assert_eq!(settings, HashSet::from_iter([Setting::new(parent, fx.children)]));
    }

    #[test]
    fn test_overlapping_attach_rejected() {
        let mut fx = fixture();
        let r = fx.model.create_resource("a");
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut fx.model, Scope::Resource(r)).unwrap();
        let err = index.attach(&mut fx.model, Scope::ResourceSet).unwrap_err();
        assert!(matches!(err, Error::AlreadyAttached(_)));
        assert_eq!(index.attachments(), vec![Scope::Resource(r)]);
    }

    #[test]
    fn test_detach_clears_and_unsubscribes() {
        let mut fx = fixture();
        let a = fx.model.create_resource("a");
        let b = fx.model.create_resource("b");
        let a1 = fx.model.create_node(fx.class).unwrap();
        let b1 = fx.model.create_node(fx.class).unwrap();
        fx.model.add_root(a, a1).unwrap();
        fx.model.add_root(b, b1).unwrap();

        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut fx.model, Scope::ResourceSet).unwrap();
        fx.model.add(a1, fx.refs, b1).unwrap();
        index.detach(&mut fx.model, Scope::ResourceSet).unwrap();

        assert!(index.dependency_snapshot().is_empty());
        assert!(index.non_navigable_inverse_referencers(&fx.model, b1).is_empty());

        fx.model.remove(a1, fx.refs, b1).unwrap();
        assert!(index.dependency_snapshot().is_empty());
        assert!(index.detach(&mut fx.model, Scope::ResourceSet).is_err());
    }
}
