//! PathMap is a nested, path-addressable map with a pluggable codec registry.
//!
//! Core concepts:
//! - **PathMap**: A tree of insertion-ordered levels addressed by composite keys
//! - **Key**: A string key (split at the separator) or an opaque integer key
//! - **Leaf**: Any stored value that is not itself a map
//! - **PlainMap**: A plain nested mapping, converted into child maps on assignment
//! - **CodecRegistry**: Maps leaf types to serializers and file extensions back to deserializers
//!
//! # Example
//!
//! ```
//! use pathmap_core::PathMap;
//!
//! let mut map = PathMap::new();
//! map.set("server.http.port", 8080i64).unwrap();
//! map.set("server.name", "edge".to_string()).unwrap();
//!
//! assert_eq!(map.get_as::<i64>("server.http.port"), Some(&8080));
//! assert!(map.get("server.http").unwrap().is_map());
//! assert!(!map.contains("server.name.first"));
//!
//! let flat = map.flatten("/");
//! assert!(flat.contains_key("server/http/port"));
//! ```
//!
//! # Codecs
//!
//! Archiving a map serializes every leaf through a [`CodecRegistry`]. Types
//! without a codec of their own are written as CBOR. Custom types can declare
//! a codec with `#[derive(Codec)]`:
//!
//! ```
//! use pathmap_core::{Codec, CodecRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Codec)]
//! #[codec(ext = "point")]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! let mut registry = CodecRegistry::new();
//! Point::register(&mut registry, false).unwrap();
//! let (_, ext) = registry.serialize(&Point { x: 1, y: 2 }).unwrap();
//! assert_eq!(ext, ".point");
//! ```

extern crate self as pathmap_core;

pub mod codec;
mod config;
mod key;
mod leaf;
mod map;
#[cfg(feature = "npy")]
mod npy;
mod plain;
mod value;

pub use codec::{
    BoxError, Codec, CodecError, CodecRegistry, Deserializer, Role, Serializer,
    normalize_extension, register_deserializer, register_serializer,
};
pub use config::{
    DEFAULT_SEPARATOR, PathConfig, default_config, disable_auto_convert, enable_auto_convert,
    set_default_separator,
};
pub use key::Key;
pub use leaf::{Leaf, downcast_leaf};
pub use map::{LeafVisitor, PathMap, PathMapError};
#[cfg(feature = "npy")]
pub use npy::{ArrayData, NPY_EXTENSION, NpyError, NumericArray};
pub use plain::{Plain, PlainMap};
pub use value::Value;

#[cfg(feature = "derive")]
pub use pathmap_derive::Codec;
