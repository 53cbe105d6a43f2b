//! End-to-end scenarios for resource import/export tracking.
//!
//! Each test builds a small multi-resource graph in `MemoryModel`, attaches
//! a `CrossReferenceIndex` to the whole resource set and drives it purely
//! through graph mutations.

use std::sync::Arc;
use hashbrown::HashSet;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crossref::{
    ClassId, CrossReferenceIndex, DependencyObserver, FeatureId, FeatureSpec, MemoryModel, Metamodel,
    ModelGraph, NodeId, ResourceId, Scope,
};

// ============================================================================
// Helper: one element type with a containment, a plain cross-reference list,
// a single cross-reference and a navigable pair.
// ============================================================================

struct World {
    model: MemoryModel,
    index: Arc<CrossReferenceIndex>,
    element: ClassId,
    children: FeatureId,
    refs: FeatureId,
    target: FeatureId,
    friend: FeatureId,
}

impl World {
    fn new() -> Self {
        Self::with_index(CrossReferenceIndex::new())
    }

    fn with_index(index: CrossReferenceIndex) -> Self {
        let mut mm = Metamodel::new();
        let element = mm.register_class("Element", &[]).unwrap();
        let children = mm.add_feature(element, FeatureSpec::reference("children").containment().many()).unwrap();
        let parent = mm.add_feature(element, FeatureSpec::reference("parent").container()).unwrap();
        mm.set_opposites(children, parent).unwrap();
        let refs = mm.add_feature(element, FeatureSpec::reference("refs").many()).unwrap();
        let target = mm.add_feature(element, FeatureSpec::reference("target")).unwrap();
        let friend = mm.add_feature(element, FeatureSpec::reference("friend")).unwrap();
        let friend_of = mm.add_feature(element, FeatureSpec::reference("friendOf").many()).unwrap();
        mm.set_opposites(friend, friend_of).unwrap();

        let mut model = MemoryModel::new(mm);
        let index = Arc::new(index);
        index.attach(&mut model, Scope::ResourceSet).unwrap();
        Self { model, index, element, children, refs, target, friend }
    }

    fn resource(&mut self, uri: &str) -> ResourceId {
        self.model.create_resource(uri)
    }

    fn root(&mut self, resource: ResourceId) -> NodeId {
        let node = self.model.create_node(self.element).unwrap();
        self.model.add_root(resource, node).unwrap();
        node
    }

    fn child(&mut self, parent: NodeId) -> NodeId {
        let node = self.model.create_node(self.element).unwrap();
        self.model.add(parent, self.children, node).unwrap();
        node
    }
}

fn set(items: &[ResourceId]) -> HashSet<ResourceId> {
    items.iter().copied().collect()
}

fn nodes(items: &[NodeId]) -> HashSet<NodeId> {
    items.iter().copied().collect()
}

// ============================================================================
// 1. One cross-resource reference
// ============================================================================

#[test]
fn test_single_reference_creates_import_and_export() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);

    w.model.set(a1, w.target, Some(b1)).unwrap();

    assert_eq!(w.index.exports(b), set(&[a]));
    assert_eq!(w.index.imports(a), set(&[b]));
    assert!(w.index.imports(b).is_empty());
    assert!(w.index.exports(a).is_empty());
}

// ============================================================================
// 2. Clearing the reference
// ============================================================================

#[test]
fn test_clearing_reference_removes_dependency() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);

    w.model.set(a1, w.target, Some(b1)).unwrap();
    w.model.set(a1, w.target, None).unwrap();

    assert!(w.index.imports(a).is_empty());
    assert!(w.index.exports(b).is_empty());
    assert!(w.index.dependency_snapshot().is_empty());
}

#[test]
fn test_unset_removes_dependency() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);

    w.model.set(a1, w.target, Some(b1)).unwrap();
    w.model.unset(a1, w.target).unwrap();
    assert!(w.index.imports(a).is_empty());
}

// ============================================================================
// 3. Two edges over the same resource pair
// ============================================================================

#[test]
fn test_two_edges_same_pair_counted() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let a2 = w.root(a);
    let b1 = w.root(b);

    w.model.set(a1, w.target, Some(b1)).unwrap();
    w.model.set(a2, w.target, Some(b1)).unwrap();
    assert_eq!(w.index.imports(a), set(&[b]));
    assert_eq!(w.index.import_count(a, b), 2);

    w.model.set(a1, w.target, None).unwrap();
    assert_eq!(w.index.imports(a), set(&[b]));
    assert_eq!(w.index.import_count(a, b), 1);

    w.model.set(a2, w.target, None).unwrap();
    assert!(w.index.imports(a).is_empty());
    assert_eq!(w.index.import_count(a, b), 0);
}

// ============================================================================
// 4. Transitive chain
// ============================================================================

#[test]
fn test_transitive_imports_over_chain() {
    let mut w = World::new();
    let ra = w.resource("a.model");
    let rb = w.resource("b.model");
    let rc = w.resource("c.model");
    let a1 = w.root(ra);
    let b1 = w.root(rb);
    let c1 = w.root(rc);

    w.model.add(c1, w.refs, b1).unwrap();
    w.model.add(b1, w.refs, a1).unwrap();

    assert_eq!(w.index.transitive_imports(&mut w.model, rc), set(&[rb, ra]));
    assert_eq!(w.index.transitive_exports(&mut w.model, ra), set(&[rb, rc]));
    assert!(w.index.transitive_imports(&mut w.model, ra).is_empty());
}

// ============================================================================
// 5. Unload and reload restore the same state
// ============================================================================

#[test]
fn test_unload_reload_restores_state() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let c = w.resource("c.model");
    let a1 = w.root(a);
    let b1 = w.root(b);
    let b2 = w.child(b1);
    let c1 = w.root(c);

    w.model.add(a1, w.refs, b2).unwrap();
    w.model.add(a1, w.refs, b1).unwrap();
    w.model.set(b2, w.target, Some(c1)).unwrap();
    w.model.set(c1, w.friend, Some(b2)).unwrap();

    let before = w.index.dependency_snapshot();
    assert!(!before.is_empty());

    w.model.unload(b);
    assert!(w.index.imports(b).is_empty());
    assert!(w.index.exports(b).is_empty());
    assert!(!w.index.imports(a).contains(&b));

    w.model.load(b).unwrap();
    assert_eq!(w.index.dependency_snapshot(), before);
}

// ============================================================================
// 6. Containment moves carry dependencies with the subtree
// ============================================================================

#[test]
fn test_moving_subtree_moves_dependencies() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let c = w.resource("c.model");
    let a1 = w.root(a);
    let moving = w.child(a1);
    let inner = w.child(moving);
    let b1 = w.root(b);
    let c1 = w.root(c);

    // Outgoing from deep inside the subtree, incoming from another resource.
    w.model.add(inner, w.refs, b1).unwrap();
    w.model.add(b1, w.refs, moving).unwrap();
    assert_eq!(w.index.imports(a), set(&[b]));
    assert_eq!(w.index.exports(a), set(&[b]));

    w.model.add(c1, w.children, moving).unwrap();

    assert!(w.index.imports(a).is_empty());
    assert!(w.index.exports(a).is_empty());
    assert_eq!(w.index.imports(c), set(&[b]));
    assert_eq!(w.index.exports(c), set(&[b]));
    assert_eq!(w.index.imports(b), set(&[c]));
}

#[test]
fn test_detached_subtree_drops_dependencies() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);
    w.model.add(a1, w.refs, b1).unwrap();

    w.model.remove_root(a, a1).unwrap();
    assert!(w.index.dependency_snapshot().is_empty());

    w.model.add_root(a, a1).unwrap();
    assert_eq!(w.index.imports(a), set(&[b]));
}

#[test]
fn test_navigable_edges_count_both_ways() {
    let mut w = World::new();
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);

    // friend/friendOf: a1.friend = b1 implies b1.friendOf = [a1]
    w.model.set(a1, w.friend, Some(b1)).unwrap();
    assert_eq!(w.index.imports(a), set(&[b]));
    assert_eq!(w.index.imports(b), set(&[a]));
    assert_eq!(w.index.inverse_referencers(&w.model, b1, Some(w.friend), None), nodes(&[a1]));

    w.model.set(a1, w.friend, None).unwrap();
    assert!(w.index.dependency_snapshot().is_empty());
}

// ============================================================================
// 7. Hooks
// ============================================================================

#[derive(Default)]
struct Journal {
    entries: Mutex<Vec<String>>,
}

impl DependencyObserver for Journal {
    fn import_added(&self, importer: ResourceId, imported: ResourceId) {
        self.entries.lock().push(format!("+import {importer}->{imported}"));
    }
    fn import_removed(&self, importer: ResourceId, imported: ResourceId) {
        self.entries.lock().push(format!("-import {importer}->{imported}"));
    }
    fn export_added(&self, exporter: ResourceId, importer: ResourceId) {
        self.entries.lock().push(format!("+export {exporter}<-{importer}"));
    }
    fn export_removed(&self, exporter: ResourceId, importer: ResourceId) {
        self.entries.lock().push(format!("-export {exporter}<-{importer}"));
    }
}

#[test]
fn test_hooks_fire_on_transitions_only() {
    let journal = Arc::new(Journal::default());
    let mut w = World::with_index(CrossReferenceIndex::new().with_observer(journal.clone()));
    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let a2 = w.root(a);
    let b1 = w.root(b);

    w.model.add(a1, w.refs, b1).unwrap();
    w.model.add(a2, w.refs, b1).unwrap();
    w.model.remove(a1, w.refs, b1).unwrap();
    w.model.remove(a2, w.refs, b1).unwrap();

    assert_eq!(
        *journal.entries.lock(),
        vec![
            "+import r1->r2".to_string(),
            "+export r2<-r1".to_string(),
            "-import r1->r2".to_string(),
            "-export r2<-r1".to_string(),
        ]
    );
}

/// Hooks run after the index has released its locks, so they may query it.
#[test]
fn test_hooks_may_query_the_index() {
    struct Reentrant {
        index: Mutex<Option<Arc<CrossReferenceIndex>>>,
        seen: Mutex<Vec<usize>>,
    }
    impl DependencyObserver for Reentrant {
        fn import_added(&self, importer: ResourceId, _imported: ResourceId) {
            if let Some(index) = self.index.lock().as_ref() {
                self.seen.lock().push(index.imports(importer).len());
            }
        }
    }

    let observer = Arc::new(Reentrant { index: Mutex::new(None), seen: Mutex::new(Vec::new()) });
    let mut w = World::with_index(CrossReferenceIndex::new().with_observer(observer.clone()));
    *observer.index.lock() = Some(w.index.clone());

    let a = w.resource("a.model");
    let b = w.resource("b.model");
    let a1 = w.root(a);
    let b1 = w.root(b);
    w.model.add(a1, w.refs, b1).unwrap();

    assert_eq!(*observer.seen.lock(), vec![1]);
    *observer.index.lock() = None;
}
