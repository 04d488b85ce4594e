use indexmap::IndexMap;
use log::debug;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use crate::config::{PathConfig, default_config};
use crate::key::Key;
use crate::leaf::Leaf;
use crate::plain::{Plain, PlainMap};
use crate::value::Value;

/// Error type for path map operations.
#[derive(Debug, thiserror::Error)]
pub enum PathMapError {
    #[error("path not found: {0}")]
    NotFound(String),
    #[error("value at {0:?} is a leaf and does not support nested assignment")]
    TypeConflict(String),
    #[error("path separator must not be empty")]
    EmptySeparator,
}

/// A visitor for traversing the leaves of a path map.
pub trait LeafVisitor {
    /// Visits a leaf together with the full segment path leading to it.
    fn visit_leaf(&mut self, path: &[&Key], leaf: &Arc<dyn Leaf>);
}

/// A nested associative container addressed by composite keys.
///
/// String keys are split at the first occurrence of the configured separator:
/// `map.set("a.b.c", v)` stores `v` under `c` inside the child map `b`, which
/// lives inside the child map `a`. Missing intermediate maps are created on
/// the way.
///
/// Every level exclusively owns its child maps, so the structure is always a
/// tree. Leaves are shared: cloning a map clones its levels but not its
/// leaves, see [`PathMap::deep_copy`] for an unshared copy.
#[derive(Clone)]
pub struct PathMap {
    entries: IndexMap<Key, Value>,
    config: Arc<PathConfig>,
}

impl PathMap {
    /// Creates an empty map using the process-wide default configuration.
    pub fn new() -> Self {
        Self::with_config(default_config())
    }

    /// Creates an empty map with an explicit configuration.
    pub fn with_config(config: PathConfig) -> Self {
        Self::empty(Arc::new(config))
    }

    fn empty(config: Arc<PathConfig>) -> Self {
        PathMap {
            entries: IndexMap::new(),
            config,
        }
    }

    /// Builds a map from a plain nested mapping using the default configuration.
    ///
    /// Every key goes through [`PathMap::set`], so composite keys inside the
    /// source are split as well.
    pub fn from_plain(plain: PlainMap) -> Result<Self, PathMapError> {
        Self::from_plain_with(plain, default_config())
    }

    pub fn from_plain_with(plain: PlainMap, config: PathConfig) -> Result<Self, PathMapError> {
        Self::build(plain, Arc::new(config))
    }

    fn build(plain: PlainMap, config: Arc<PathConfig>) -> Result<Self, PathMapError> {
        let mut map = Self::empty(config);
        for (key, value) in plain {
            let value = match value {
                Plain::Leaf(leaf) => Value::Leaf(leaf),
                Plain::Map(nested) => Value::Leaf(Arc::new(nested)),
            };
            map.set_key(&key, value)?;
        }
        Ok(map)
    }

    /// Builds a map from `(key, value)` pairs using the default configuration.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, PathMapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        Self::from_entries_with(entries, default_config())
    }

    /// Builds a map from `(key, value)` pairs, splitting keys per `config`.
    pub fn from_entries_with<I, K, V>(entries: I, config: PathConfig) -> Result<Self, PathMapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let mut map = Self::with_config(config);
        map.update(entries)?;
        Ok(map)
    }

    /// Assigns every `(key, value)` pair in order.
    pub fn update<I, K, V>(&mut self, entries: I) -> Result<(), PathMapError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    pub fn separator(&self) -> &str {
        self.config.separator()
    }

    /// Assigns `value` at `key`.
    ///
    /// Whatever was stored at the target is replaced, including a whole child
    /// map. When auto-convert is enabled, plain mappings are wrapped into path
    /// maps, and leaves standing in the way of a composite key are replaced by
    /// child maps. With auto-convert disabled, such a leaf is a
    /// [`PathMapError::TypeConflict`].
    pub fn set(
        &mut self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), PathMapError> {
        self.set_key(&key.into(), value.into())
    }

    fn set_key(&mut self, key: &Key, value: Value) -> Result<(), PathMapError> {
        let (head, rest) = key.split(self.config.separator());
        match rest {
            None => {
                let value = self.promote(value)?;
                self.entries.insert(head, value);
                Ok(())
            }
            Some(rest) => self.descend(head)?.set_key(&Key::from(rest), value),
        }
    }

    /// Wraps a plain mapping into a child map if auto-convert is enabled.
    fn promote(&self, value: Value) -> Result<Value, PathMapError> {
        if !self.config.auto_convert() {
            return Ok(value);
        }
        match value.downcast_ref::<PlainMap>() {
            Some(plain) => Ok(Value::Map(Self::build(plain.clone(), Arc::clone(&self.config))?)),
            None => Ok(value),
        }
    }

    /// Returns the child map at `head`, creating or replacing it as needed.
    fn descend(&mut self, head: Key) -> Result<&mut PathMap, PathMapError> {
        let config = Arc::clone(&self.config);
        let name = head.to_string();
        let slot = self
            .entries
            .entry(head)
            .or_insert_with(|| Value::Map(PathMap::empty(Arc::clone(&config))));

        if let Value::Leaf(leaf) = slot {
            if !config.auto_convert() {
                return Err(PathMapError::TypeConflict(name));
            }
            let child = match leaf.as_any().downcast_ref::<PlainMap>() {
                Some(plain) => Self::build(plain.clone(), Arc::clone(&config))?,
                None => {
                    debug!("replacing leaf at {:?} with a child map", name);
                    PathMap::empty(Arc::clone(&config))
                }
            };
            *slot = Value::Map(child);
        }

        match slot {
            Value::Map(child) => Ok(child),
            Value::Leaf(_) => Err(PathMapError::TypeConflict(name)),
        }
    }

    /// Returns the value at `key`, or `None` if the path does not resolve.
    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        self.lookup(&key.into())
    }

    /// Returns the value at `key`, or `default` if the path does not resolve.
    pub fn get_or<'a>(&'a self, key: impl Into<Key>, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// Returns the leaf at `key` downcast to `T`.
    pub fn get_as<T: Leaf>(&self, key: impl Into<Key>) -> Option<&T> {
        self.get(key)?.downcast_ref::<T>()
    }

    /// Returns the value at `key`, failing if the path does not resolve.
    pub fn fetch(&self, key: impl Into<Key>) -> Result<&Value, PathMapError> {
        let key = key.into();
        self.lookup(&key)
            .ok_or_else(|| PathMapError::NotFound(key.to_string()))
    }

    fn lookup(&self, key: &Key) -> Option<&Value> {
        let (head, rest) = key.split(self.config.separator());
        let value = self.entries.get(&head)?;
        match rest {
            None => Some(value),
            Some(rest) => value.as_map()?.lookup(&Key::from(rest)),
        }
    }

    /// Returns true if every segment of `key` resolves through child maps.
    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.lookup(&key.into()).is_some()
    }

    /// Removes and returns the value at `key`.
    ///
    /// Ancestor levels left empty are kept.
    pub fn delete(&mut self, key: impl Into<Key>) -> Result<Value, PathMapError> {
        let key = key.into();
        self.remove(&key)
            .ok_or_else(|| PathMapError::NotFound(key.to_string()))
    }

    /// Removes and returns the value at `key`, or `None` without side effects.
    pub fn pop(&mut self, key: impl Into<Key>) -> Option<Value> {
        self.remove(&key.into())
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        let (head, rest) = key.split(self.config.separator());
        match rest {
            None => self.entries.shift_remove(&head),
            Some(rest) => self
                .entries
                .get_mut(&head)?
                .as_map_mut()?
                .remove(&Key::from(rest)),
        }
    }

    /// Number of entries on this level.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Key, Value> {
        self.entries.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, Key, Value> {
        self.entries.keys()
    }

    /// Visits every leaf depth-first with its full segment path.
    pub fn visit_leaves(&self, visitor: &mut dyn LeafVisitor) {
        let mut path = Vec::new();
        self.walk(&mut path, visitor);
    }

    fn walk<'a>(&'a self, path: &mut Vec<&'a Key>, visitor: &mut dyn LeafVisitor) {
        for (key, value) in &self.entries {
            path.push(key);
            match value {
                Value::Leaf(leaf) => visitor.visit_leaf(path, leaf),
                Value::Map(child) => child.walk(path, visitor),
            }
            path.pop();
        }
    }

    /// Returns one entry per leaf, keyed by its segments joined with `separator`.
    ///
    /// Empty child maps contribute no entries. Paths that join to the same
    /// string collapse into one entry holding the leaf visited last, e.g.
    /// `Key::Int(7)` next to `"7"`, or a segment containing `separator`.
    pub fn flatten(&self, separator: &str) -> IndexMap<String, Arc<dyn Leaf>> {
        let mut collector = Flattener {
            separator,
            entries: IndexMap::new(),
        };
        self.visit_leaves(&mut collector);
        collector.entries
    }

    /// Converts every level into a plain nested mapping.
    pub fn to_plain(&self) -> PlainMap {
        self.entries
            .iter()
            .map(|(key, value)| {
                let plain = match value {
                    Value::Leaf(leaf) => Plain::Leaf(Arc::clone(leaf)),
                    Value::Map(child) => Plain::Map(child.to_plain()),
                };
                (key.clone(), plain)
            })
            .collect()
    }

    /// Copies the map, cloning leaf values instead of sharing them.
    pub fn deep_copy(&self) -> PathMap {
        PathMap {
            entries: self
                .entries
                .iter()
                .map(|(key, value)| (key.clone(), value.deep_copy()))
                .collect(),
            config: Arc::clone(&self.config),
        }
    }
}

impl Default for PathMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Equality compares entries only; configuration is ignored.
impl PartialEq for PathMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for PathMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl<K: Into<Key>> Index<K> for PathMap {
    type Output = Value;

    /// Panics if the path does not resolve.
    fn index(&self, key: K) -> &Value {
        let key = key.into();
        match self.lookup(&key) {
            Some(value) => value,
            None => panic!("path not found: {}", key),
        }
    }
}

impl<'a> IntoIterator for &'a PathMap {
    type Item = (&'a Key, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, Key, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

struct Flattener<'s> {
    separator: &'s str,
    entries: IndexMap<String, Arc<dyn Leaf>>,
}

impl LeafVisitor for Flattener<'_> {
    fn visit_leaf(&mut self, path: &[&Key], leaf: &Arc<dyn Leaf>) {
        let joined = path
            .iter()
            .map(|key| key.to_string())
            .collect::<Vec<_>>()
            .join(self.separator);
        self.entries.insert(joined, Arc::clone(leaf));
    }
}
