use std::sync::Arc;

use crate::leaf::Leaf;
use crate::map::PathMap;

/// A value stored in a [`PathMap`] level: a leaf or a child map.
#[derive(Debug, Clone)]
pub enum Value {
    Leaf(Arc<dyn Leaf>),
    Map(PathMap),
}

impl Value {
    /// Wraps an already shared leaf without copying it.
    pub fn shared(leaf: Arc<dyn Leaf>) -> Self {
        Value::Leaf(leaf)
    }

    pub fn as_leaf(&self) -> Option<&Arc<dyn Leaf>> {
        match self {
            Value::Leaf(leaf) => Some(leaf),
            Value::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&PathMap> {
        match self {
            Value::Leaf(_) => None,
            Value::Map(map) => Some(map),
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut PathMap> {
        match self {
            Value::Leaf(_) => None,
            Value::Map(map) => Some(map),
        }
    }

    pub fn into_map(self) -> Option<PathMap> {
        match self {
            Value::Leaf(_) => None,
            Value::Map(map) => Some(map),
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Returns the leaf downcast to `T`, if this is a leaf of that type.
    pub fn downcast_ref<T: Leaf>(&self) -> Option<&T> {
        self.as_leaf()?.as_any().downcast_ref::<T>()
    }

    /// Copies the value, cloning leaves instead of sharing them.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Leaf(leaf) => Value::Leaf(leaf.clone_leaf()),
            Value::Map(map) => Value::Map(map.deep_copy()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Leaf(a), Value::Leaf(b)) => a.eq_leaf(b.as_ref()),
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: Leaf> From<T> for Value {
    fn from(value: T) -> Self {
        Value::Leaf(Arc::new(value))
    }
}

impl From<PathMap> for Value {
    fn from(map: PathMap) -> Self {
        Value::Map(map)
    }
}
