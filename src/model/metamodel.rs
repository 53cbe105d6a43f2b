//! Metamodel: node types and the features (typed edge kinds) they declare.
//!
//! Types live in an arena indexed by [`ClassId`]. A slot can be freed with
//! [`Metamodel::unregister_class`]; the slot's generation is bumped so that an
//! id handed out before the free never aliases a type registered afterwards.
//! Caches keyed by `ClassId` (see `index::classifier`) rely on this.

use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// Stable arena id of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId {
    index: u32,
    generation: u32,
}

impl ClassId {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}v{}", self.index, self.generation)
    }
}

/// Arena id of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub u32);

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Plain data slot; never an edge.
    Attribute,
    /// Edge to another node.
    Reference,
}

/// A typed, directed edge kind declared on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub name: String,
    pub owner: ClassId,
    pub kind: FeatureKind,
    pub containment: bool,
    /// Back-pointer from a contained node to its container.
    pub container: bool,
    pub changeable: bool,
    pub derived: bool,
    pub resolves_proxies: bool,
    pub many: bool,
    pub opposite: Option<FeatureId>,
    /// The feature-group this feature is a member of, if any.
    pub group: Option<FeatureId>,
    /// True when this feature is itself a feature-group aggregating members.
    pub is_group: bool,
}

impl Feature {
    pub fn is_reference(&self) -> bool {
        self.kind == FeatureKind::Reference
    }

    /// Navigable edges declare an opposite and can be recomputed from it.
    pub fn is_navigable(&self) -> bool {
        self.opposite.is_some()
    }
}

/// Declarative description of a feature, turned into a [`Feature`] by
/// [`Metamodel::add_feature`].
///
/// Defaults match a plain cross-reference: changeable, proxy-resolving,
/// single-valued, not derived.
#[derive(Debug, Clone)]
pub struct FeatureSpec {
    name: String,
    kind: FeatureKind,
    containment: bool,
    container: bool,
    changeable: bool,
    derived: bool,
    resolves_proxies: bool,
    many: bool,
    group: Option<FeatureId>,
    is_group: bool,
}

impl FeatureSpec {
    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Reference,
            containment: false,
            container: false,
            changeable: true,
            derived: false,
            resolves_proxies: true,
            many: false,
            group: None,
            is_group: false,
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        Self { kind: FeatureKind::Attribute, resolves_proxies: false, ..Self::reference(name) }
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn containment(mut self) -> Self {
        self.containment = true;
        self
    }

    /// Container back-pointers are never changeable directly.
    pub fn container(mut self) -> Self {
        self.container = true;
        self.changeable = false;
        self
    }

    pub fn unchangeable(mut self) -> Self {
        self.changeable = false;
        self
    }

    pub fn derived(mut self) -> Self {
        self.derived = true;
        self
    }

    pub fn non_resolving(mut self) -> Self {
        self.resolves_proxies = false;
        self
    }

    pub fn in_group(mut self, group: FeatureId) -> Self {
        self.group = Some(group);
        self
    }

    pub fn group(mut self) -> Self {
        self.is_group = true;
        self.derived = true;
        self.many = true;
        self
    }
}

/// A registered node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDescriptor {
    pub id: ClassId,
    pub name: String,
    pub supertypes: Vec<ClassId>,
    /// Features declared directly on this type (not inherited).
    pub features: Vec<FeatureId>,
}

#[derive(Debug, Clone, Default)]
struct ClassSlot {
    generation: u32,
    class: Option<ClassDescriptor>,
}

/// Arena of node types and their features.
#[derive(Debug, Clone, Default)]
pub struct Metamodel {
    classes: Vec<ClassSlot>,
    features: Vec<Option<Feature>>,
}

impl Metamodel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type. Freed slots are reused with a bumped generation.
    pub fn register_class(&mut self, name: impl Into<String>, supertypes: &[ClassId]) -> Result<ClassId> {
        for sup in supertypes {
            if self.class(*sup).is_none() {
                return Err(Error::NotFound(format!("Supertype {sup}")));
            }
        }

        let index = match self.classes.iter().position(|slot| slot.class.is_none()) {
            Some(free) => free,
            None => {
                self.classes.push(ClassSlot::default());
                self.classes.len() - 1
            }
        };
        let slot = &mut self.classes[index];
        let id = ClassId { index: index as u32, generation: slot.generation };
        slot.class = Some(ClassDescriptor {
            id,
            name: name.into(),
            supertypes: supertypes.to_vec(),
            features: Vec::new(),
        });
        Ok(id)
    }

    /// Free a node type and the features it declares.
    ///
    /// Subtypes keep a dangling supertype id, which `all_features` and
    /// `is_subtype` skip.
    pub fn unregister_class(&mut self, id: ClassId) -> Result<ClassDescriptor> {
        let slot = self
            .classes
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.class.is_some())
            .ok_or_else(|| Error::NotFound(format!("Class {id}")))?;
        slot.generation += 1;
        let class = slot.class.take().ok_or_else(|| Error::NotFound(format!("Class {id}")))?;
        for fid in &class.features {
            if let Some(entry) = self.features.get_mut(fid.0 as usize) {
                *entry = None;
            }
        }
        Ok(class)
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.classes
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.class.as_ref())
    }

    pub fn is_live(&self, id: ClassId) -> bool {
        self.class(id).is_some()
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.iter().filter_map(|slot| slot.class.as_ref())
    }

    /// Declare a feature on `owner`.
    pub fn add_feature(&mut self, owner: ClassId, spec: FeatureSpec) -> Result<FeatureId> {
        if spec.kind == FeatureKind::Attribute && (spec.containment || spec.container) {
            return Err(Error::InvalidFeature(format!(
                "Attribute '{}' cannot be a containment or container", spec.name
            )));
        }
        if spec.containment && spec.container {
            return Err(Error::InvalidFeature(format!(
                "Feature '{}' cannot be both containment and container", spec.name
            )));
        }
        if let Some(group) = spec.group {
            match self.feature(group) {
                Some(g) if g.is_group => {}
                _ => return Err(Error::InvalidFeature(format!("{group} is not a feature group"))),
            }
        }

        let id = FeatureId(self.features.len() as u32);
        let class = self
            .classes
            .get_mut(owner.index as usize)
            .filter(|slot| slot.generation == owner.generation)
            .and_then(|slot| slot.class.as_mut())
            .ok_or_else(|| Error::NotFound(format!("Class {owner}")))?;
        class.features.push(id);

        self.features.push(Some(Feature {
            id,
            name: spec.name,
            owner,
            kind: spec.kind,
            containment: spec.containment,
            container: spec.container,
            changeable: spec.changeable,
            derived: spec.derived,
            resolves_proxies: spec.resolves_proxies,
            many: spec.many,
            opposite: None,
            group: spec.group,
            is_group: spec.is_group,
        }));
        Ok(id)
    }

    /// Declare `a` and `b` as each other's opposite.
    ///
    /// A containment must pair with a container back-pointer.
    pub fn set_opposites(&mut self, a: FeatureId, b: FeatureId) -> Result<()> {
        let (fa, fb) = match (self.feature(a), self.feature(b)) {
            (Some(fa), Some(fb)) => (fa, fb),
            _ => return Err(Error::NotFound(format!("Feature {a} or {b}"))),
        };
        if !fa.is_reference() || !fb.is_reference() {
            return Err(Error::InvalidFeature(format!("Opposites {a}/{b} must both be references")));
        }
        if fa.containment != fb.container || fb.containment != fa.container {
            return Err(Error::InvalidFeature(format!(
                "Opposites {a}/{b} must pair containment with container"
            )));
        }
        for (this, other) in [(a, b), (b, a)] {
            if let Some(Some(f)) = self.features.get_mut(this.0 as usize) {
                f.opposite = Some(other);
            }
        }
        Ok(())
    }

    pub fn feature(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// All features of `class`, inherited ones first, each listed once.
    pub fn all_features(&self, class: ClassId) -> Vec<FeatureId> {
        let mut out = Vec::new();
        let mut visited = Vec::new();
        self.collect_features(class, &mut out, &mut visited);
        out
    }

    fn collect_features(&self, class: ClassId, out: &mut Vec<FeatureId>, visited: &mut Vec<ClassId>) {
        if visited.contains(&class) {
            return;
        }
        visited.push(class);
        let Some(desc) = self.class(class) else { return };
        for sup in &desc.supertypes {
            self.collect_features(*sup, out, visited);
        }
        for fid in &desc.features {
            if !out.contains(fid) {
                out.push(*fid);
            }
        }
    }

    /// "Is instance of": `class` equals `of` or inherits from it.
    pub fn is_subtype(&self, class: ClassId, of: ClassId) -> bool {
        if class == of {
            return self.is_live(class);
        }
        let Some(desc) = self.class(class) else { return false };
        desc.supertypes.iter().any(|sup| self.is_subtype(*sup, of))
    }
}
