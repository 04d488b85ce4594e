use serde::{Deserialize, Serialize};
use std::fmt;

/// A key addressing one entry of a [`PathMap`](crate::PathMap) level.
///
/// String keys may be composite: they are split at the first occurrence of the
/// map's separator into a head segment and a remainder. Integer keys are
/// always a single, opaque segment.
///
/// Keys serialize untagged, so `Key::Str("a")` is a CBOR text string and
/// `Key::Int(3)` a CBOR integer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    /// Splits this key into `(head, remainder)` at the first `sep`.
    ///
    /// Returns `None` as the remainder when the key addresses the current
    /// level (no separator present, or a non-string key). An empty `sep`
    /// never splits.
    pub fn split(&self, sep: &str) -> (Key, Option<&str>) {
        match self {
            Key::Str(_) if sep.is_empty() => (self.clone(), None),
            Key::Str(s) => match s.split_once(sep) {
                Some((head, rest)) => (Key::Str(head.to_string()), Some(rest)),
                None => (self.clone(), None),
            },
            Key::Int(_) => (self.clone(), None),
        }
    }

    /// Returns the string if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            Key::Int(_) => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{:?}", s),
            Key::Int(n) => write!(f, "{}", n),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::Str(s.clone())
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

macro_rules! impl_key_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Key {
                fn from(n: $t) -> Self {
                    Key::Int(i64::from(n))
                }
            }
        )*
    };
}

impl_key_from_int!(i8, i16, i32, i64, u8, u16, u32);
