//! Inverse reference index: for each target node, the settings pointing at it.
//!
//! Only non-navigable cross-reference edges are stored. Navigable edges are
//! read back through their opposite, and container edges through the node's
//! container pointer. Storage is a multiset so that one physical edge maps to
//! one stored occurrence.
//!
//! Proxy targets are also filed under the URI they stand for, so a lookup
//! for a real node only visits the proxies that could resolve to it.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::model::{FeatureId, NodeId, Setting};

#[derive(Debug, Default, Clone)]
pub struct InverseReferenceIndex {
    settings: HashMap<NodeId, SmallVec<[Setting; 2]>>,
    /// Proxy targets with stored settings, by proxy URI.
    proxies: HashMap<String, SmallVec<[NodeId; 1]>>,
    proxy_uris: HashMap<NodeId, String>,
}

impl InverseReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one occurrence. `proxy_uri` is the target's URI when it is a proxy.
    pub fn register_edge(&mut self, owner: NodeId, feature: FeatureId, target: NodeId, proxy_uri: Option<&str>) {
        self.settings.entry(target).or_default().push(Setting::new(owner, feature));
        if let Some(uri) = proxy_uri {
            if !self.proxy_uris.contains_key(&target) {
                self.proxy_uris.insert(target, uri.to_owned());
                self.proxies.entry(uri.to_owned()).or_default().push(target);
            }
        }
    }

    /// Remove one occurrence. Returns false if the edge was not stored.
    pub fn deregister_edge(&mut self, owner: NodeId, feature: FeatureId, target: NodeId) -> bool {
        let Some(list) = self.settings.get_mut(&target) else { return false };
        let setting = Setting::new(owner, feature);
        let Some(pos) = list.iter().position(|s| *s == setting) else { return false };
        list.swap_remove(pos);
        if list.is_empty() {
            self.settings.remove(&target);
            self.forget_proxy(target);
        }
        true
    }

    /// Stored settings pointing at `target`, duplicates included.
    pub fn settings_of(&self, target: NodeId) -> &[Setting] {
        self.settings.get(&target).map_or(&[][..], |list| list.as_slice())
    }

    /// Proxy targets with stored settings that carry `uri`.
    pub fn proxies_for(&self, uri: &str) -> &[NodeId] {
        self.proxies.get(uri).map_or(&[][..], |list| list.as_slice())
    }

    /// Drop every setting whose owner matches. Returns how many were dropped.
    pub fn remove_owned_by(&mut self, mut owned: impl FnMut(NodeId) -> bool) -> usize {
        let mut removed = 0;
        let mut emptied = Vec::new();
        self.settings.retain(|target, list| {
            let before = list.len();
            list.retain(|s| !owned(s.owner));
            removed += before - list.len();
            if list.is_empty() {
                emptied.push(*target);
            }
            !list.is_empty()
        });
        for target in emptied {
            self.forget_proxy(target);
        }
        removed
    }

    fn forget_proxy(&mut self, target: NodeId) {
        let Some(uri) = self.proxy_uris.remove(&target) else { return };
        if let Some(list) = self.proxies.get_mut(&uri) {
            list.retain(|p| *p != target);
            if list.is_empty() {
                self.proxies.remove(&uri);
            }
        }
    }

    /// Targets with at least one stored setting.
    pub fn targets(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.settings.keys().copied()
    }

    /// Total stored occurrences.
    pub fn len(&self) -> usize {
        self.settings.values().map(|list| list.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn clear(&mut self) {
        self.settings.clear();
        self.proxies.clear();
        self.proxy_uris.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: FeatureId = FeatureId(0);
    const G: FeatureId = FeatureId(1);

    #[test]
    fn test_deregister_removes_one_occurrence() {
        let mut idx = InverseReferenceIndex::new();
        let (a, t) = (NodeId(1), NodeId(9));
        idx.register_edge(a, F, t, None);
        idx.register_edge(a, F, t, None);
        assert_eq!(idx.len(), 2);

        assert!(idx.deregister_edge(a, F, t));
        assert_eq!(idx.settings_of(t), &[Setting::new(a, F)]);
        assert!(idx.deregister_edge(a, F, t));
        assert!(idx.is_empty());
        assert!(!idx.deregister_edge(a, F, t));
    }

    #[test]
    fn test_remove_owned_by() {
        let mut idx = InverseReferenceIndex::new();
        idx.register_edge(NodeId(1), F, NodeId(9), None);
        idx.register_edge(NodeId(2), G, NodeId(9), None);
        idx.register_edge(NodeId(1), G, NodeId(8), None);

        assert_eq!(idx.remove_owned_by(|owner| owner == NodeId(1)), 2);
        assert_eq!(idx.settings_of(NodeId(9)), &[Setting::new(NodeId(2), G)]);
        assert!(idx.settings_of(NodeId(8)).is_empty());
        assert_eq!(idx.targets().count(), 1);
    }

    #[test]
    fn test_proxies_filed_by_uri_while_referenced() {
        let mut idx = InverseReferenceIndex::new();
        let (p, q) = (NodeId(20), NodeId(21));
        idx.register_edge(NodeId(1), F, p, Some("b.model#n5"));
        idx.register_edge(NodeId(2), F, p, Some("b.model#n5"));
        idx.register_edge(NodeId(1), G, q, Some("b.model#n5"));
        idx.register_edge(NodeId(1), F, NodeId(5), None);
        assert_eq!(idx.proxies_for("b.model#n5"), &[p, q]);
        assert!(idx.proxies_for("b.model#n6").is_empty());

        assert!(idx.deregister_edge(NodeId(1), F, p));
        assert_eq!(idx.proxies_for("b.model#n5"), &[p, q]);
        assert!(idx.deregister_edge(NodeId(2), F, p));
        assert_eq!(idx.proxies_for("b.model#n5"), &[q]);

        assert_eq!(idx.remove_owned_by(|owner| owner == NodeId(1)), 2);
        assert!(idx.proxies_for("b.model#n5").is_empty());
        assert!(idx.is_empty());
    }
}
