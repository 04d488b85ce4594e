use indexmap::IndexMap;
use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use std::sync::Arc;

use crate::key::Key;
use crate::leaf::Leaf;

/// An entry of a [`PlainMap`]: a leaf or a nested plain mapping.
#[derive(Debug, Clone)]
pub enum Plain {
    Leaf(Arc<dyn Leaf>),
    Map(PlainMap),
}

impl Plain {
    /// Wraps a shared leaf, unwrapping it into [`Plain::Map`] if it is a plain mapping.
    pub fn from_shared(leaf: Arc<dyn Leaf>) -> Self {
        match leaf.as_any().downcast_ref::<PlainMap>() {
            Some(map) => Plain::Map(map.clone()),
            None => Plain::Leaf(leaf),
        }
    }

    pub fn as_leaf(&self) -> Option<&Arc<dyn Leaf>> {
        match self {
            Plain::Leaf(leaf) => Some(leaf),
            Plain::Map(_) => None,
        }
    }

    pub fn as_map(&self) -> Option<&PlainMap> {
        match self {
            Plain::Leaf(_) => None,
            Plain::Map(map) => Some(map),
        }
    }

    /// Returns the leaf downcast to `T`, if this is a leaf of that type.
    pub fn downcast_ref<T: Leaf>(&self) -> Option<&T> {
        self.as_leaf()?.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for Plain {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Plain::Leaf(a), Plain::Leaf(b)) => a.eq_leaf(b.as_ref()),
            (Plain::Map(a), Plain::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<T: Leaf> From<T> for Plain {
    fn from(value: T) -> Self {
        let leaf: Arc<dyn Leaf> = Arc::new(value);
        Plain::from_shared(leaf)
    }
}

/// An ordinary nested mapping, the base type a [`PathMap`](crate::PathMap)
/// converts from and to.
///
/// Keys are never split: `"a.b"` is one key of a plain mapping. A plain
/// mapping is itself a leaf, so it can be stored verbatim in a path map whose
/// auto-convert option is disabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlainMap(IndexMap<Key, Plain>);

impl PlainMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an entry, returning the previous one at `key`.
    pub fn insert(&mut self, key: impl Into<Key>, value: impl Into<Plain>) -> Option<Plain> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<Key>, value: impl Into<Plain>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Plain> {
        self.0.get(&key.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Key, Plain> {
        self.0.iter()
    }
}

impl<K: Into<Key>, V: Into<Plain>> FromIterator<(K, V)> for PlainMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        PlainMap(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for PlainMap {
    type Item = (Key, Plain);
    type IntoIter = indexmap::map::IntoIter<Key, Plain>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PlainMap {
    type Item = (&'a Key, &'a Plain);
    type IntoIter = indexmap::map::Iter<'a, Key, Plain>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for PlainMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, &PlainRef(value))?;
        }
        map.end()
    }
}

/// Serializes a borrowed entry; leaves go through their generic CBOR form.
struct PlainRef<'a>(&'a Plain);

impl Serialize for PlainRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            Plain::Leaf(leaf) => leaf
                .to_cbor()
                .map_err(S::Error::custom)?
                .serialize(serializer),
            Plain::Map(map) => map.serialize(serializer),
        }
    }
}
