//! Feature classification.
//!
//! Decides which features count toward resource dependencies and which are
//! stored in the inverse index. The per-type feature list is memoized in a
//! cache owned by one index instance; entries for unregistered types are
//! dropped by [`FeatureClassifier::purge_stale`].

use std::sync::Arc;
use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::model::{ClassId, Feature, FeatureId, Metamodel};

#[derive(Debug, Default)]
pub struct FeatureClassifier {
    cache: RwLock<HashMap<ClassId, Arc<[FeatureId]>>>,
}

impl FeatureClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edges of this feature count toward resource imports and exports.
    pub fn is_import_export_capable(feature: &Feature) -> bool {
        feature.is_reference()
            && !feature.container
            && !feature.containment
            && feature.resolves_proxies
            && feature.changeable
    }

    /// Changeable, and either stored or a member of a feature group.
    /// Group aggregates themselves are excluded so values are not counted twice.
    pub fn is_mutable(feature: &Feature) -> bool {
        feature.changeable && (!feature.derived || (feature.group.is_some() && !feature.is_group))
    }

    /// Edges of this feature are stored in the inverse index.
    pub fn is_indexed(feature: &Feature) -> bool {
        Self::is_cross_reference(feature) && Self::is_mutable(feature) && !feature.is_navigable()
    }

    fn is_cross_reference(feature: &Feature) -> bool {
        feature.is_reference() && !feature.containment && !feature.container
    }

    /// All mutable cross-reference features of `class`, inherited ones first.
    ///
    /// An empty list is cached like any other.
    pub fn mutable_cross_reference_features(&self, metamodel: &Metamodel, class: ClassId) -> Arc<[FeatureId]> {
        if let Some(hit) = self.cache.read().get(&class) {
            return Arc::clone(hit);
        }

        let features: Arc<[FeatureId]> = metamodel
            .all_features(class)
            .into_iter()
            .filter(|fid| {
                metamodel
                    .feature(*fid)
                    .is_some_and(|f| Self::is_cross_reference(f) && Self::is_mutable(f))
            })
            .collect();

        // Only live types are cached; a stale id must not pin an entry.
        if metamodel.is_live(class) {
            self.cache.write().insert(class, Arc::clone(&features));
        }
        features
    }

    /// Drop entries whose type is no longer registered. Returns how many.
    pub fn purge_stale(&self, metamodel: &Metamodel) -> usize {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|class, _| metamodel.is_live(*class));
        before - cache.len()
    }

    pub fn cached_classes(&self) -> usize {
        self.cache.read().len()
    }
}
