//! Resource dependency tracker.
//!
//! Counts edges between ordered resource pairs. `imports[a][b]` is the number
//! of import/export-capable edges from nodes of `a` to nodes of `b`, and
//! `exports` is its transpose, updated in lock-step. A counter is never zero:
//! the last decrement removes the entry, and an emptied outer map is removed
//! with it.
//!
//! Every 0 -> 1 and 1 -> 0 transition is recorded as a [`DependencyChange`]
//! in a pending buffer. The owning index drains the buffer and hands the
//! changes to its [`DependencyObserver`] once its locks are released.

use std::num::NonZeroU32;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

use crate::model::ResourceId;

// ============================================================================
// Hooks
// ============================================================================

/// Edge creation/removal at resource granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyChange {
    ImportAdded { importer: ResourceId, imported: ResourceId },
    ImportRemoved { importer: ResourceId, imported: ResourceId },
    ExportAdded { exporter: ResourceId, importer: ResourceId },
    ExportRemoved { exporter: ResourceId, importer: ResourceId },
}

/// Observer of resource-level dependency changes. All hooks default to no-ops.
///
/// Hooks are called after the index has released its locks, so they may
/// query the index. They must not assume any particular thread.
pub trait DependencyObserver: Send + Sync {
    fn import_added(&self, _importer: ResourceId, _imported: ResourceId) {}
    fn import_removed(&self, _importer: ResourceId, _imported: ResourceId) {}
    fn export_added(&self, _exporter: ResourceId, _importer: ResourceId) {}
    fn export_removed(&self, _exporter: ResourceId, _importer: ResourceId) {}
}

impl DependencyChange {
    /// Invoke the matching hook.
    pub fn dispatch(&self, observer: &dyn DependencyObserver) {
        match *self {
            DependencyChange::ImportAdded { importer, imported } => observer.import_added(importer, imported),
            DependencyChange::ImportRemoved { importer, imported } => observer.import_removed(importer, imported),
            DependencyChange::ExportAdded { exporter, importer } => observer.export_added(exporter, importer),
            DependencyChange::ExportRemoved { exporter, importer } => observer.export_removed(exporter, importer),
        }
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// One counted import edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub importer: ResourceId,
    pub imported: ResourceId,
    pub count: u32,
}

/// Sorted copy of every import edge, for comparisons and dumps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub edges: Vec<DependencyEdge>,
}

impl DependencySnapshot {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

// ============================================================================
// Tracker
// ============================================================================

type CounterMap = HashMap<ResourceId, HashMap<ResourceId, NonZeroU32>>;

#[derive(Debug, Default)]
pub struct ResourceDependencyTracker {
    imports: CounterMap,
    exports: CounterMap,
    pending: Vec<DependencyChange>,
}

impl ResourceDependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one edge `src -> dst`. A no-op for self-pairs and missing ends.
    pub fn register_reference(&mut self, src: Option<ResourceId>, dst: Option<ResourceId>) {
        let (Some(src), Some(dst)) = (src, dst) else { return };
        if src == dst {
            return;
        }

        if increment(&mut self.imports, src, dst) {
            trace!(importer = %src, imported = %dst, "import added");
            self.pending.push(DependencyChange::ImportAdded { importer: src, imported: dst });
        }
        if increment(&mut self.exports, dst, src) {
            trace!(exporter = %dst, importer = %src, "export added");
            self.pending.push(DependencyChange::ExportAdded { exporter: dst, importer: src });
        }
    }

    /// Uncount one edge `src -> dst`.
    ///
    /// Decrementing an absent pair means an edge was deregistered without
    /// having been registered. That is logged and asserted in debug builds.
    pub fn deregister_reference(&mut self, src: Option<ResourceId>, dst: Option<ResourceId>) {
        let (Some(src), Some(dst)) = (src, dst) else { return };
        if src == dst {
            return;
        }

        match decrement(&mut self.imports, src, dst) {
            Some(true) => {
                trace!(importer = %src, imported = %dst, "import removed");
                self.pending.push(DependencyChange::ImportRemoved { importer: src, imported: dst });
            }
            Some(false) => {}
            None => underflow(src, dst),
        }
        match decrement(&mut self.exports, dst, src) {
            Some(true) => {
                trace!(exporter = %dst, importer = %src, "export removed");
                self.pending.push(DependencyChange::ExportRemoved { exporter: dst, importer: src });
            }
            Some(false) => {}
            None => underflow(src, dst),
        }
    }

    /// Remove every edge into or out of `resource`, whatever its count.
    pub fn deregister_all(&mut self, resource: ResourceId) {
        if let Some(imported) = self.imports.remove(&resource) {
            for dst in imported.keys().copied() {
                remove_entry(&mut self.exports, dst, resource);
                self.pending.push(DependencyChange::ImportRemoved { importer: resource, imported: dst });
                self.pending.push(DependencyChange::ExportRemoved { exporter: dst, importer: resource });
            }
        }
        if let Some(importers) = self.exports.remove(&resource) {
            for src in importers.keys().copied() {
                remove_entry(&mut self.imports, src, resource);
                self.pending.push(DependencyChange::ImportRemoved { importer: src, imported: resource });
                self.pending.push(DependencyChange::ExportRemoved { exporter: resource, importer: src });
            }
        }
        trace!(%resource, "all dependencies removed");
    }

    pub fn imports(&self, resource: ResourceId) -> HashSet<ResourceId> {
        self.imports.get(&resource).map(|m| m.keys().copied().collect()).unwrap_or_default()
    }

    pub fn exports(&self, resource: ResourceId) -> HashSet<ResourceId> {
        self.exports.get(&resource).map(|m| m.keys().copied().collect()).unwrap_or_default()
    }

    /// Edge multiplicity `src -> dst`, 0 when absent.
    pub fn import_count(&self, src: ResourceId, dst: ResourceId) -> u32 {
        self.imports
            .get(&src)
            .and_then(|m| m.get(&dst))
            .map_or(0, |c| c.get())
    }

    pub fn snapshot(&self) -> DependencySnapshot {
        let mut edges: Vec<DependencyEdge> = self
            .imports
            .iter()
            .flat_map(|(src, inner)| {
                inner.iter().map(|(dst, count)| DependencyEdge {
                    importer: *src,
                    imported: *dst,
                    count: count.get(),
                })
            })
            .collect();
        edges.sort();
        DependencySnapshot { edges }
    }

    /// Take the changes recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<DependencyChange> {
        std::mem::take(&mut self.pending)
    }
}

/// Returns true on a 0 -> 1 transition.
fn increment(map: &mut CounterMap, outer: ResourceId, inner: ResourceId) -> bool {
    let counters = map.entry(outer).or_default();
    match counters.get_mut(&inner) {
        Some(count) => {
            *count = count.saturating_add(1);
            false
        }
        None => {
            counters.insert(inner, NonZeroU32::MIN);
            true
        }
    }
}

/// `Some(true)` on a 1 -> 0 transition, `None` when the entry was absent.
fn decrement(map: &mut CounterMap, outer: ResourceId, inner: ResourceId) -> Option<bool> {
    let counters = map.get_mut(&outer)?;
    let count = counters.get_mut(&inner)?;
    match NonZeroU32::new(count.get() - 1) {
        Some(lower) => {
            *count = lower;
            Some(false)
        }
        None => {
            counters.remove(&inner);
            if counters.is_empty() {
                map.remove(&outer);
            }
            Some(true)
        }
    }
}

fn remove_entry(map: &mut CounterMap, outer: ResourceId, inner: ResourceId) {
    if let Some(counters) = map.get_mut(&outer) {
        counters.remove(&inner);
        if counters.is_empty() {
            map.remove(&outer);
        }
    }
}

fn underflow(src: ResourceId, dst: ResourceId) {
    error!(importer = %src, imported = %dst, "dependency counter underflow");
    debug_assert!(false, "dependency counter underflow for {src} -> {dst}");
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ResourceId = ResourceId(1);
    const B: ResourceId = ResourceId(2);
    const C: ResourceId = ResourceId(3);

    #[test]
    fn test_counter_needs_matching_deregistrations() {
        let mut t = ResourceDependencyTracker::new();
        t.register_reference(Some(A), Some(B));
        t.register_reference(Some(A), Some(B));
        assert_eq!(t.import_count(A, B), 2);

        t.deregister_reference(Some(A), Some(B));
        assert_eq!(t.import_count(A, B), 1);
        assert!(t.imports(A).contains(&B));
        assert!(t.exports(B).contains(&A));

        t.deregister_reference(Some(A), Some(B));
        assert!(t.imports(A).is_empty());
        assert!(t.exports(B).is_empty());
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn test_self_and_missing_pairs_ignored() {
        let mut t = ResourceDependencyTracker::new();
        t.register_reference(Some(A), Some(A));
        t.register_reference(None, Some(A));
        t.register_reference(Some(A), None);
        assert!(t.snapshot().is_empty());
        assert!(t.drain_changes().is_empty());
    }

    #[test]
    fn test_changes_only_on_transitions() {
        let mut t = ResourceDependencyTracker::new();
        t.register_reference(Some(A), Some(B));
        t.register_reference(Some(A), Some(B));
        assert_eq!(
            t.drain_changes(),
            vec![
                DependencyChange::ImportAdded { importer: A, imported: B },
                DependencyChange::ExportAdded { exporter: B, importer: A },
            ]
        );
        t.deregister_reference(Some(A), Some(B));
        assert!(t.drain_changes().is_empty());
    }

    #[test]
    fn test_deregister_all_both_directions() {
        let mut t = ResourceDependencyTracker::new();
        t.register_reference(Some(A), Some(B));
        t.register_reference(Some(B), Some(C));
        t.register_reference(Some(C), Some(B));
        t.register_reference(Some(A), Some(C));
        t.drain_changes();

        t.deregister_all(B);
        assert_eq!(t.imports(A), HashSet::from_iter([C]));
        assert!(t.imports(C).is_empty());
        assert!(t.exports(C).contains(&A));
        assert!(t.exports(B).is_empty());
        assert_eq!(t.drain_changes().len(), 6);
    }

    #[test]
    #[should_panic(expected = "underflow")]
    #[cfg(debug_assertions)]
    fn test_underflow_asserts() {
        let mut t = ResourceDependencyTracker::new();
        t.deregister_reference(Some(A), Some(B));
    }
}
