//! Graph-mutation notifications.
//!
//! A notification is delivered after the mutation it describes has been
//! applied. Values are node ids (or a boolean for the resource load flag).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use super::{FeatureId, NodeId, ResourceId};

/// The object whose state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Notifier {
    Node(NodeId),
    Resource(ResourceId),
    ResourceSet,
}

/// Structural slots of resources and the resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceFeature {
    /// Ordered root-node list of a resource.
    Contents,
    /// Boolean loaded state of a resource.
    IsLoaded,
    /// Resource list of the resource set.
    Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKey {
    Model(FeatureId),
    Resource(ResourceFeature),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Node(NodeId),
    Bool(bool),
}

impl Value {
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Value::Node(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<Option<NodeId>> for Value {
    fn from(node: Option<NodeId>) -> Self {
        node.map_or(Value::Null, Value::Node)
    }
}

/// Where in a many-valued feature a change happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    Index(usize),
    NoIndex,
}

pub type NodeList = SmallVec<[NodeId; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    Set { old: Value, new: Value },
    Unset { old: Value, new: Value },
    /// A proxy value was replaced by the node it resolves to.
    Resolve { old: Value, new: Value, position: Position },
    Add { new: Value, position: Position },
    AddMany { new: NodeList, position: Position },
    Remove { old: Value, position: Position },
    /// `positions` lists the former indices when known.
    RemoveMany { old: NodeList, positions: Option<Vec<usize>> },
}

impl Event {
    /// Nodes this event introduced into the feature.
    pub fn added(&self) -> NodeList {
        match self {
            Event::Set { new, .. } | Event::Unset { new, .. } | Event::Resolve { new, .. } => {
                new.as_node().into_iter().collect()
            }
            Event::Add { new, .. } => new.as_node().into_iter().collect(),
            Event::AddMany { new, .. } => new.clone(),
            Event::Remove { .. } | Event::RemoveMany { .. } => NodeList::new(),
        }
    }

    /// Nodes this event took out of the feature.
    pub fn removed(&self) -> NodeList {
        match self {
            Event::Set { old, .. } | Event::Unset { old, .. } | Event::Resolve { old, .. } => {
                old.as_node().into_iter().collect()
            }
            Event::Remove { old, .. } => old.as_node().into_iter().collect(),
            Event::RemoveMany { old, .. } => old.clone(),
            Event::Add { .. } | Event::AddMany { .. } => NodeList::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::Set { .. } => "SET",
            Event::Unset { .. } => "UNSET",
            Event::Resolve { .. } => "RESOLVE",
            Event::Add { .. } => "ADD",
            Event::AddMany { .. } => "ADD_MANY",
            Event::Remove { .. } => "REMOVE",
            Event::RemoveMany { .. } => "REMOVE_MANY",
        }
    }
}

/// One graph mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub notifier: Notifier,
    /// `None` only for events without a typed slot.
    pub feature: Option<FeatureKey>,
    pub event: Event,
}

impl Notification {
    pub fn node(notifier: NodeId, feature: FeatureId, event: Event) -> Self {
        Self {
            notifier: Notifier::Node(notifier),
            feature: Some(FeatureKey::Model(feature)),
            event,
        }
    }

    pub fn resource(resource: ResourceId, feature: ResourceFeature, event: Event) -> Self {
        Self {
            notifier: Notifier::Resource(resource),
            feature: Some(FeatureKey::Resource(feature)),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_set_reports_old_and_new() {
        let ev = Event::Set { old: Value::Node(NodeId(1)), new: Value::Node(NodeId(2)) };
        assert_eq!(ev.added().as_slice(), &[NodeId(2)]);
        assert_eq!(ev.removed().as_slice(), &[NodeId(1)]);
    }

    #[test]
    fn test_null_values_contribute_nothing() {
        let ev = Event::Unset { old: Value::Null, new: Value::Null };
        assert!(ev.added().is_empty());
        assert!(ev.removed().is_empty());
    }

    #[test]
    fn test_many_events() {
        let add = Event::AddMany { new: smallvec![NodeId(1), NodeId(2)], position: Position::NoIndex };
        assert_eq!(add.added().len(), 2);
        assert!(add.removed().is_empty());

        let rm = Event::RemoveMany { old: smallvec![NodeId(3)], positions: Some(vec![0]) };
        assert_eq!(rm.removed().as_slice(), &[NodeId(3)]);
        assert_eq!(rm.name(), "REMOVE_MANY");
    }
}
