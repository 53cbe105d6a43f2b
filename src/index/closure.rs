//! Transitive import/export closure.
//!
//! The closure walks the direct-dependency relation with a work list. A
//! frontier resource that is not loaded is loaded so the index can discover
//! its edges, then unloaded again once the walk is done. Cleanup is
//! best-effort: a resource whose load failed but still ended up loaded is
//! unloaded too, and nothing is retried.

use hashbrown::HashSet;
use tracing::{debug, warn};

use crate::graph::ModelGraph;
use crate::model::ResourceId;
use super::CrossReferenceIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Imports,
    Exports,
}

impl CrossReferenceIndex {
    /// Every resource reachable from `resource` through imports, excluding
    /// `resource` itself.
    pub fn transitive_imports<G: ModelGraph>(&self, graph: &mut G, resource: ResourceId) -> HashSet<ResourceId> {
        self.closure(graph, resource, Direction::Imports)
    }

    /// Every resource reachable from `resource` through exports, excluding
    /// `resource` itself.
    pub fn transitive_exports<G: ModelGraph>(&self, graph: &mut G, resource: ResourceId) -> HashSet<ResourceId> {
        self.closure(graph, resource, Direction::Exports)
    }

    fn closure<G: ModelGraph>(&self, graph: &mut G, origin: ResourceId, direction: Direction) -> HashSet<ResourceId> {
        let mut seen = HashSet::new();
        seen.insert(origin);
        let mut result = HashSet::new();
        let mut probed = Vec::new();
        let mut work = vec![origin];

        while let Some(resource) = work.pop() {
            if !graph.is_loaded(resource) {
                match graph.load(resource) {
                    Ok(()) => {
                        debug!(%resource, "probe-loaded for closure");
                        probed.push(resource);
                    }
                    Err(err) => {
                        warn!(%resource, error = %err, "closure probe failed; treating as dead end");
                        if graph.is_loaded(resource) {
                            probed.push(resource);
                        }
                        continue;
                    }
                }
            }

            let next = match direction {
                Direction::Imports => self.imports(resource),
                Direction::Exports => self.exports(resource),
            };
            for dependency in next {
                if seen.insert(dependency) {
                    result.insert(dependency);
                    work.push(dependency);
                }
            }
        }

        if self.config().unload_probed {
            for resource in probed.into_iter().rev() {
                graph.unload(resource);
            }
        }
        debug!(%origin, ?direction, reached = result.len(), "closure computed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::graph::{MemoryModel, ModelView, Scope};
    use crate::index::IndexConfig;
    use crate::model::{FeatureSpec, Metamodel};

    /// Resources r0..r{n-1}, each with one root; `edges` are (from, to) pairs.
    fn chain(n: usize, edges: &[(usize, usize)]) -> (MemoryModel, Vec<ResourceId>) {
        let mut mm = Metamodel::new();
        let class = mm.register_class("Unit", &[]).unwrap();
        let uses = mm.add_feature(class, FeatureSpec::reference("uses").many()).unwrap();
        let mut model = MemoryModel::new(mm);
        let mut resources = Vec::new();
        let mut roots = Vec::new();
        for i in 0..n {
            let r = model.create_resource(format!("r{i}"));
            let root = model.create_node(class).unwrap();
            model.add_root(r, root).unwrap();
            resources.push(r);
            roots.push(root);
        }
        for (from, to) in edges {
            model.add(roots[*from], uses, roots[*to]).unwrap();
        }
        (model, resources)
    }

    #[test]
    fn test_cycle_excludes_origin() {
        let (mut model, r) = chain(3, &[(0, 1), (1, 2), (2, 0)]);
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut model, Scope::ResourceSet).unwrap();

        assert_eq!(index.transitive_imports(&mut model, r[0]), HashSet::from_iter([r[1], r[2]]));
        assert_eq!(index.transitive_exports(&mut model, r[0]), HashSet::from_iter([r[1], r[2]]));
    }

    #[test]
    fn test_probed_resources_are_unloaded_again() {
        let (mut model, r) = chain(3, &[(0, 1), (1, 2)]);
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut model, Scope::ResourceSet).unwrap();
        model.unload(r[0]);
        assert!(index.imports(r[0]).is_empty());

        assert_eq!(index.transitive_imports(&mut model, r[0]), HashSet::from_iter([r[1], r[2]]));
        assert!(!model.is_loaded(r[0]));
        assert!(index.imports(r[0]).is_empty());
    }

    #[test]
    fn test_probed_resources_kept_when_configured() {
        let (mut model, r) = chain(2, &[(0, 1)]);
        let config = IndexConfig { unload_probed: false, ..IndexConfig::default() };
        let index = Arc::new(CrossReferenceIndex::with_config(config));
        index.attach(&mut model, Scope::ResourceSet).unwrap();
        model.unload(r[0]);

        assert_eq!(index.transitive_imports(&mut model, r[0]), HashSet::from_iter([r[1]]));
        assert!(model.is_loaded(r[0]));
    }

    #[test]
    fn test_failed_probe_is_dead_end() {
        let (mut model, r) = chain(3, &[(0, 1), (1, 2)]);
        let index = Arc::new(CrossReferenceIndex::new());
        index.attach(&mut model, Scope::ResourceSet).unwrap();
        model.unload(r[0]);
        model.fail_next_load(r[0]);

        assert!(index.transitive_imports(&mut model, r[0]).is_empty());
        assert!(!model.is_loaded(r[0]));
    }
}
