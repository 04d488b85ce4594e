//! Type-keyed codec registry.
//!
//! A codec pairs a serializer and a deserializer for one leaf type with a
//! file extension. Serializers are looked up by the `TypeId` of a leaf,
//! deserializers by extension. Types without a registered serializer, and
//! extensions without a registered deserializer, resolve to the CBOR fallback
//! codec bound to [`PathMap`] itself, so every leaf can always be encoded.
//!
//! A process-wide registry is available through [`global`]. Registration is
//! expected to happen during initialization, before maps are archived.

use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use crate::leaf::Leaf;
use crate::map::PathMap;

/// Boxed error returned by user-supplied codec functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Extension of the fallback codec.
pub const FALLBACK_EXTENSION: &str = ".cbor";
pub const TEXT_EXTENSION: &str = ".txt";
pub const BYTES_EXTENSION: &str = ".bytes";

/// Which half of a codec an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Serializer,
    Deserializer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Serializer => f.write_str("serializer"),
            Role::Deserializer => f.write_str("deserializer"),
        }
    }
}

/// Error type for codec registration and use.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("a {role} is already registered for {type_name}")]
    AlreadyRegistered {
        role: Role,
        type_name: &'static str,
    },
    #[error("extension {extension} is already bound to {bound}")]
    ExtensionConflict {
        extension: String,
        bound: &'static str,
    },
    #[error("serializer for {expected} received a {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("failed to encode {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },
    /// The deserializer's own error, passed through unchanged.
    #[error(transparent)]
    Decode(BoxError),
}

type SerializeFn = dyn Fn(&dyn Leaf) -> Result<Vec<u8>, CodecError> + Send + Sync;
type DeserializeFn = dyn Fn(&[u8]) -> Result<Arc<dyn Leaf>, CodecError> + Send + Sync;

/// Normalizes an extension to its leading-dot form.
pub fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{}", extension)
    }
}

/// The encoding half of a codec.
#[derive(Clone)]
pub struct Serializer {
    type_name: &'static str,
    extension: String,
    encode: Arc<SerializeFn>,
}

impl Serializer {
    /// Wraps a typed serializer function.
    pub fn new<T, F, E>(f: F, extension: &str) -> Self
    where
        T: Leaf,
        F: Fn(&T) -> Result<Vec<u8>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let expected = type_name::<T>();
        let encode: Arc<SerializeFn> = Arc::new(move |leaf: &dyn Leaf| {
            let value = leaf
                .as_any()
                .downcast_ref::<T>()
                .ok_or(CodecError::TypeMismatch {
                    expected,
                    found: leaf.leaf_type_name(),
                })?;
            f(value).map_err(|e| CodecError::Encode {
                type_name: expected,
                source: e.into(),
            })
        });
        Serializer {
            type_name: expected,
            extension: normalize_extension(extension),
            encode,
        }
    }

    fn fallback() -> Self {
        Serializer {
            type_name: type_name::<PathMap>(),
            extension: FALLBACK_EXTENSION.to_string(),
            encode: Arc::new(encode_fallback),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn serialize(&self, leaf: &dyn Leaf) -> Result<Vec<u8>, CodecError> {
        (self.encode)(leaf)
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("type_name", &self.type_name)
            .field("extension", &self.extension)
            .finish()
    }
}

/// The decoding half of a codec.
#[derive(Clone)]
pub struct Deserializer {
    type_name: &'static str,
    extension: String,
    decode: Arc<DeserializeFn>,
}

impl Deserializer {
    /// Wraps a typed deserializer function.
    pub fn new<T, F, E>(f: F, extension: &str) -> Self
    where
        T: Leaf,
        F: Fn(&[u8]) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let decode: Arc<DeserializeFn> = Arc::new(move |bytes: &[u8]| {
            let value = f(bytes).map_err(|e| CodecError::Decode(e.into()))?;
            Ok(Arc::new(value) as Arc<dyn Leaf>)
        });
        Deserializer {
            type_name: type_name::<T>(),
            extension: normalize_extension(extension),
            decode,
        }
    }

    fn fallback() -> Self {
        Deserializer {
            type_name: type_name::<PathMap>(),
            extension: FALLBACK_EXTENSION.to_string(),
            decode: Arc::new(decode_fallback),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<Arc<dyn Leaf>, CodecError> {
        (self.decode)(bytes)
    }
}

impl fmt::Debug for Deserializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deserializer")
            .field("type_name", &self.type_name)
            .field("extension", &self.extension)
            .finish()
    }
}

/// Maps leaf types to serializers and extensions to deserializers.
///
/// At most one serializer per type and one deserializer per extension is
/// active. Registering again requires `overwrite`.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    serializers: HashMap<TypeId, Serializer>,
    deserializers: HashMap<TypeId, Deserializer>,
    extensions: HashMap<String, TypeId>,
    fallback_serializer: Serializer,
    fallback_deserializer: Deserializer,
}

impl CodecRegistry {
    /// Creates a registry holding the built-in codecs.
    pub fn new() -> Self {
        let mut registry = CodecRegistry {
            serializers: HashMap::new(),
            deserializers: HashMap::new(),
            extensions: HashMap::new(),
            fallback_serializer: Serializer::fallback(),
            fallback_deserializer: Deserializer::fallback(),
        };
        registry
            .extensions
            .insert(FALLBACK_EXTENSION.to_string(), TypeId::of::<PathMap>());
        registry.install_builtins();
        registry
    }

    fn install_builtins(&mut self) {
        self.bind_serializer(
            TypeId::of::<String>(),
            Serializer::new(
                |s: &String| Ok::<_, Infallible>(s.as_bytes().to_vec()),
                TEXT_EXTENSION,
            ),
        );
        self.bind_serializer(
            TypeId::of::<&'static str>(),
            Serializer::new(
                |s: &&'static str| Ok::<_, Infallible>(s.as_bytes().to_vec()),
                TEXT_EXTENSION,
            ),
        );
        self.bind_deserializer(
            TypeId::of::<String>(),
            Deserializer::new(|bytes: &[u8]| String::from_utf8(bytes.to_vec()), TEXT_EXTENSION),
        );

        self.bind_serializer(
            TypeId::of::<Vec<u8>>(),
            Serializer::new(|b: &Vec<u8>| Ok::<_, Infallible>(b.clone()), BYTES_EXTENSION),
        );
        self.bind_deserializer(
            TypeId::of::<Vec<u8>>(),
            Deserializer::new(|bytes: &[u8]| Ok::<_, Infallible>(bytes.to_vec()), BYTES_EXTENSION),
        );

        #[cfg(feature = "npy")]
        {
            use crate::npy::{NPY_EXTENSION, NumericArray};

            self.bind_serializer(
                TypeId::of::<NumericArray>(),
                Serializer::new(|a: &NumericArray| Ok::<_, Infallible>(a.to_npy()), NPY_EXTENSION),
            );
            self.bind_deserializer(
                TypeId::of::<NumericArray>(),
                Deserializer::new(NumericArray::from_npy, NPY_EXTENSION),
            );
        }
    }

    /// Registers a serializer for `T`, writing payloads under `extension`.
    pub fn register_serializer<T, F, E>(
        &mut self,
        f: F,
        extension: &str,
        overwrite: bool,
    ) -> Result<(), CodecError>
    where
        T: Leaf,
        F: Fn(&T) -> Result<Vec<u8>, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.add_serializer(TypeId::of::<T>(), Serializer::new(f, extension), overwrite)
    }

    /// Registers a deserializer for `T`, reading payloads stored under `extension`.
    pub fn register_deserializer<T, F, E>(
        &mut self,
        f: F,
        extension: &str,
        overwrite: bool,
    ) -> Result<(), CodecError>
    where
        T: Leaf,
        F: Fn(&[u8]) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.add_deserializer(TypeId::of::<T>(), Deserializer::new(f, extension), overwrite)
    }

    /// Adds a prebuilt serializer for the type identified by `type_id`.
    pub fn add_serializer(
        &mut self,
        type_id: TypeId,
        serializer: Serializer,
        overwrite: bool,
    ) -> Result<(), CodecError> {
        self.check_serializer(type_id, &serializer, overwrite)?;
        self.bind_serializer(type_id, serializer);
        Ok(())
    }

    /// Adds a prebuilt deserializer for the type identified by `type_id`.
    pub fn add_deserializer(
        &mut self,
        type_id: TypeId,
        deserializer: Deserializer,
        overwrite: bool,
    ) -> Result<(), CodecError> {
        self.check_deserializer(type_id, &deserializer, overwrite)?;
        self.bind_deserializer(type_id, deserializer);
        Ok(())
    }

    /// Adds both halves of a codec, or neither if either is rejected.
    pub fn add_codec(
        &mut self,
        type_id: TypeId,
        serializer: Serializer,
        deserializer: Deserializer,
        overwrite: bool,
    ) -> Result<(), CodecError> {
        self.check_serializer(type_id, &serializer, overwrite)?;
        self.check_deserializer(type_id, &deserializer, overwrite)?;
        self.bind_serializer(type_id, serializer);
        self.bind_deserializer(type_id, deserializer);
        Ok(())
    }

    fn check_serializer(
        &self,
        type_id: TypeId,
        serializer: &Serializer,
        overwrite: bool,
    ) -> Result<(), CodecError> {
        if !overwrite && self.serializers.contains_key(&type_id) {
            return Err(CodecError::AlreadyRegistered {
                role: Role::Serializer,
                type_name: serializer.type_name,
            });
        }
        Ok(())
    }

    fn check_deserializer(
        &self,
        type_id: TypeId,
        deserializer: &Deserializer,
        overwrite: bool,
    ) -> Result<(), CodecError> {
        if overwrite {
            return Ok(());
        }
        if self.deserializers.contains_key(&type_id) {
            return Err(CodecError::AlreadyRegistered {
                role: Role::Deserializer,
                type_name: deserializer.type_name,
            });
        }
        match self.extensions.get(&deserializer.extension) {
            Some(bound) if *bound != type_id => Err(CodecError::ExtensionConflict {
                extension: deserializer.extension.clone(),
                bound: self.bound_type_name(bound),
            }),
            _ => Ok(()),
        }
    }

    fn bound_type_name(&self, type_id: &TypeId) -> &'static str {
        match self.deserializers.get(type_id) {
            Some(deserializer) => deserializer.type_name,
            None => self.fallback_deserializer.type_name,
        }
    }

    fn bind_serializer(&mut self, type_id: TypeId, serializer: Serializer) {
        debug!(
            "serializer for {} bound to {}",
            serializer.type_name, serializer.extension
        );
        if let Some(previous) = self.serializers.insert(type_id, serializer) {
            debug!("replaced serializer writing {}", previous.extension);
        }
    }

    /// Binds a deserializer, releasing whatever its extension and its type
    /// were bound to before.
    fn bind_deserializer(&mut self, type_id: TypeId, deserializer: Deserializer) {
        if let Some(previous) = self.deserializers.remove(&type_id) {
            if self.extensions.get(&previous.extension) == Some(&type_id) {
                self.extensions.remove(&previous.extension);
            }
            debug!("replaced deserializer reading {}", previous.extension);
        }
        if let Some(displaced) = self.extensions.get(&deserializer.extension).copied() {
            if displaced != type_id {
                if let Some(previous) = self.deserializers.remove(&displaced) {
                    debug!(
                        "{} no longer reads {}",
                        previous.type_name, previous.extension
                    );
                }
            }
        }
        debug!(
            "deserializer for {} bound to {}",
            deserializer.type_name, deserializer.extension
        );
        self.extensions
            .insert(deserializer.extension.clone(), type_id);
        self.deserializers.insert(type_id, deserializer);
    }

    /// Returns the serializer for `type_id`, or the fallback.
    pub fn resolve_serializer(&self, type_id: TypeId) -> &Serializer {
        self.serializers
            .get(&type_id)
            .unwrap_or(&self.fallback_serializer)
    }

    /// Returns the deserializer bound to `extension`, or the fallback.
    pub fn resolve_deserializer(&self, extension: &str) -> &Deserializer {
        let extension = normalize_extension(extension);
        self.extensions
            .get(&extension)
            .and_then(|type_id| self.deserializers.get(type_id))
            .unwrap_or(&self.fallback_deserializer)
    }

    /// Returns true if `type_id` has a serializer of its own.
    pub fn has_serializer(&self, type_id: TypeId) -> bool {
        self.serializers.contains_key(&type_id)
    }

    /// Iterates over every extension bound to a deserializer, fallback included.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    /// Encodes a leaf, returning the payload and its extension.
    pub fn serialize(&self, leaf: &dyn Leaf) -> Result<(Vec<u8>, &str), CodecError> {
        let serializer = self.resolve_serializer(leaf.leaf_type_id());
        let payload = serializer.serialize(leaf)?;
        Ok((payload, serializer.extension()))
    }

    /// Decodes a payload stored under `extension`.
    pub fn deserialize(&self, extension: &str, bytes: &[u8]) -> Result<Arc<dyn Leaf>, CodecError> {
        self.resolve_deserializer(extension).deserialize(bytes)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A leaf type that declares its own codec.
///
/// Usually derived with `#[derive(Codec)]` and `#[codec(ext = "...")]`.
pub trait Codec: Leaf + Sized {
    /// Extension of archive entries holding values of this type.
    const EXTENSION: &'static str;

    fn encode(&self) -> Result<Vec<u8>, BoxError>;

    fn decode(bytes: &[u8]) -> Result<Self, BoxError>;

    /// Registers both halves of the codec with `registry`.
    ///
    /// Nothing is registered if either half is rejected.
    fn register(registry: &mut CodecRegistry, overwrite: bool) -> Result<(), CodecError> {
        registry.add_codec(
            TypeId::of::<Self>(),
            Serializer::new(Self::encode, Self::EXTENSION),
            Deserializer::new(Self::decode, Self::EXTENSION),
            overwrite,
        )
    }

    /// Registers both halves of the codec with the global registry.
    fn register_global(overwrite: bool) -> Result<(), CodecError> {
        let mut registry = global().write().unwrap_or_else(PoisonError::into_inner);
        Self::register(&mut registry, overwrite)
    }
}

static GLOBAL: LazyLock<RwLock<CodecRegistry>> =
    LazyLock::new(|| RwLock::new(CodecRegistry::new()));

/// Returns the process-wide registry.
pub fn global() -> &'static RwLock<CodecRegistry> {
    &GLOBAL
}

/// Registers a serializer with the global registry.
pub fn register_serializer<T, F, E>(
    f: F,
    extension: &str,
    overwrite: bool,
) -> Result<(), CodecError>
where
    T: Leaf,
    F: Fn(&T) -> Result<Vec<u8>, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_serializer(f, extension, overwrite)
}

/// Registers a deserializer with the global registry.
pub fn register_deserializer<T, F, E>(
    f: F,
    extension: &str,
    overwrite: bool,
) -> Result<(), CodecError>
where
    T: Leaf,
    F: Fn(&[u8]) -> Result<T, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    global()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register_deserializer(f, extension, overwrite)
}

/// Encodes a value as CBOR.
pub fn cbor_encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BoxError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decodes a CBOR payload.
pub fn cbor_decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BoxError> {
    Ok(ciborium::from_reader(bytes)?)
}

fn encode_fallback(leaf: &dyn Leaf) -> Result<Vec<u8>, CodecError> {
    let value = leaf.to_cbor()?;
    cbor_encode(&value).map_err(|source| CodecError::Encode {
        type_name: leaf.leaf_type_name(),
        source,
    })
}

/// Decodes a fallback payload into a canonical leaf.
///
/// Scalars come back as `i64` (`u64` above `i64::MAX`), `f64`, `bool`,
/// `String`, `Vec<u8>` or `()`. Anything else stays a `ciborium::Value`.
fn decode_fallback(bytes: &[u8]) -> Result<Arc<dyn Leaf>, CodecError> {
    use ciborium::Value as Cbor;

    let value = cbor_decode::<Cbor>(bytes).map_err(CodecError::Decode)?;
    let leaf: Arc<dyn Leaf> = match value {
        Cbor::Integer(n) => match i64::try_from(n) {
            Ok(n) => Arc::new(n),
            Err(_) => match u64::try_from(n) {
                Ok(n) => Arc::new(n),
                Err(_) => Arc::new(Cbor::Integer(n)),
            },
        },
        Cbor::Float(f) => Arc::new(f),
        Cbor::Bool(b) => Arc::new(b),
        Cbor::Text(s) => Arc::new(s),
        Cbor::Bytes(b) => Arc::new(b),
        Cbor::Null => Arc::new(()),
        other => Arc::new(other),
    };
    Ok(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::downcast_leaf;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn encode_point(p: &Point) -> Result<Vec<u8>, BoxError> {
        Ok(format!("{},{}", p.x, p.y).into_bytes())
    }

    fn decode_point(bytes: &[u8]) -> Result<Point, BoxError> {
        let text = std::str::from_utf8(bytes)?;
        let (x, y) = text.split_once(',').ok_or("missing comma")?;
        Ok(Point {
            x: x.parse()?,
            y: y.parse()?,
        })
    }

    #[test]
    fn extension_normalized() {
        assert_eq!(normalize_extension("txt"), ".txt");
        assert_eq!(normalize_extension(".txt"), ".txt");
    }

    #[test]
    fn builtin_text_and_bytes() {
        let registry = CodecRegistry::new();

        let (payload, ext) = registry.serialize(&"hi".to_string()).unwrap();
        assert_eq!(payload, b"hi");
        assert_eq!(ext, ".txt");

        let (payload, ext) = registry.serialize(&vec![0u8, 255]).unwrap();
        assert_eq!(payload, vec![0u8, 255]);
        assert_eq!(ext, ".bytes");

        let text = registry.deserialize(".txt", b"hi").unwrap();
        assert!(text.eq_leaf(&"hi".to_string()));
    }

    #[test]
    fn static_str_serializes_as_text() {
        let registry = CodecRegistry::new();
        let (payload, ext) = registry.serialize(&"hi").unwrap();
        assert_eq!(payload, b"hi");
        assert_eq!(ext, ".txt");
    }

    #[test]
    fn unknown_type_resolves_to_fallback() {
        let registry = CodecRegistry::new();
        let serializer = registry.resolve_serializer(TypeId::of::<Point>());
        assert_eq!(serializer.extension(), FALLBACK_EXTENSION);
        assert!(!registry.has_serializer(TypeId::of::<Point>()));

        let map_serializer = registry.resolve_serializer(TypeId::of::<PathMap>());
        assert_eq!(map_serializer.extension(), FALLBACK_EXTENSION);
    }

    #[test]
    fn unknown_extension_resolves_to_fallback() {
        let registry = CodecRegistry::new();
        let deserializer = registry.resolve_deserializer(".nope");
        assert_eq!(deserializer.extension(), FALLBACK_EXTENSION);
    }

    #[test]
    fn fallback_roundtrip_canonical_scalars() {
        let registry = CodecRegistry::new();

        let (payload, ext) = registry.serialize(&-5i32).unwrap();
        assert_eq!(ext, ".cbor");
        let back = registry.deserialize(ext, &payload).unwrap();
        assert!(back.eq_leaf(&-5i64));

        let (payload, _) = registry.serialize(&1.5f64).unwrap();
        assert!(registry.deserialize(".cbor", &payload).unwrap().eq_leaf(&1.5f64));

        let (payload, _) = registry.serialize(&true).unwrap();
        assert!(registry.deserialize(".cbor", &payload).unwrap().eq_leaf(&true));

        let (payload, _) = registry.serialize(&u64::MAX).unwrap();
        assert!(registry.deserialize(".cbor", &payload).unwrap().eq_leaf(&u64::MAX));
    }

    #[test]
    fn fallback_keeps_compound_values_generic() {
        let registry = CodecRegistry::new();
        let (payload, _) = registry.serialize(&Point { x: 1, y: 2 }).unwrap();
        let back = registry.deserialize(".cbor", &payload).unwrap();
        let value = back.as_any().downcast_ref::<ciborium::Value>().unwrap();
        assert!(value.is_map());
    }

    #[test]
    fn fallback_decode_failure_propagates() {
        let registry = CodecRegistry::new();
        let err = registry.deserialize(".cbor", &[]).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn custom_codec_roundtrip() {
        let mut registry = CodecRegistry::new();
        registry
            .register_serializer(encode_point, "point", false)
            .unwrap();
        registry
            .register_deserializer(decode_point, "point", false)
            .unwrap();

        let (payload, ext) = registry.serialize(&Point { x: 3, y: 4 }).unwrap();
        assert_eq!(payload, b"3,4");
        assert_eq!(ext, ".point");

        let back = registry.deserialize(".point", b"3,4").unwrap();
        assert!(back.eq_leaf(&Point { x: 3, y: 4 }));
    }

    #[test]
    fn duplicate_serializer_rejected() {
        let mut registry = CodecRegistry::new();
        registry
            .register_serializer(encode_point, ".point", false)
            .unwrap();
        let err = registry
            .register_serializer(encode_point, ".point", false)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::AlreadyRegistered {
                role: Role::Serializer,
                ..
            }
        ));
    }

    #[test]
    fn overwrite_replaces_serializer() {
        let mut registry = CodecRegistry::new();
        registry
            .register_serializer(encode_point, ".point", false)
            .unwrap();
        registry
            .register_serializer(
                |p: &Point| Ok::<_, Infallible>(format!("{};{}", p.x, p.y).into_bytes()),
                ".pt",
                true,
            )
            .unwrap();

        let (payload, ext) = registry.serialize(&Point { x: 1, y: 2 }).unwrap();
        assert_eq!(payload, b"1;2");
        assert_eq!(ext, ".pt");
    }

    #[test]
    fn duplicate_deserializer_rejected() {
        let mut registry = CodecRegistry::new();
        let err = registry
            .register_deserializer(|b: &[u8]| String::from_utf8(b.to_vec()), ".text", false)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::AlreadyRegistered {
                role: Role::Deserializer,
                ..
            }
        ));
    }

    #[test]
    fn extension_conflict_rejected() {
        let mut registry = CodecRegistry::new();
        let err = registry
            .register_deserializer(decode_point, ".txt", false)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::ExtensionConflict { ref extension, .. } if extension == ".txt"
        ));

        let err = registry
            .register_deserializer(decode_point, ".cbor", false)
            .unwrap_err();
        assert!(matches!(err, CodecError::ExtensionConflict { .. }));
    }

    #[test]
    fn overwrite_takes_over_extension() {
        let mut registry = CodecRegistry::new();
        registry
            .register_deserializer(decode_point, ".txt", true)
            .unwrap();

        let back = registry.deserialize(".txt", b"5,6").unwrap();
        assert!(back.eq_leaf(&Point { x: 5, y: 6 }));

        // String lost its extension and may bind a new one without overwrite.
        registry
            .register_deserializer(|b: &[u8]| String::from_utf8(b.to_vec()), ".text", false)
            .unwrap();
        assert!(registry.deserialize(".text", b"ok").unwrap().eq_leaf(&"ok".to_string()));
    }

    #[test]
    fn overwrite_moves_type_to_new_extension() {
        let mut registry = CodecRegistry::new();
        registry
            .register_deserializer(|b: &[u8]| String::from_utf8(b.to_vec()), ".text", true)
            .unwrap();
        assert_eq!(registry.resolve_deserializer(".txt").extension(), FALLBACK_EXTENSION);
        assert_eq!(registry.resolve_deserializer(".text").extension(), ".text");
    }

    #[test]
    fn rebinding_own_extension_requires_overwrite() {
        let mut registry = CodecRegistry::new();
        registry
            .register_deserializer(decode_point, ".point", false)
            .unwrap();
        let err = registry
            .register_deserializer(decode_point, ".point", false)
            .unwrap_err();
        assert!(matches!(err, CodecError::AlreadyRegistered { .. }));
        registry
            .register_deserializer(decode_point, ".point", true)
            .unwrap();
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Note(String);

    impl Codec for Note {
        const EXTENSION: &'static str = ".txt";

        fn encode(&self) -> Result<Vec<u8>, BoxError> {
            Ok(self.0.as_bytes().to_vec())
        }

        fn decode(bytes: &[u8]) -> Result<Self, BoxError> {
            Ok(Note(String::from_utf8(bytes.to_vec())?))
        }
    }

    #[test]
    fn rejected_codec_registers_neither_half() {
        let mut registry = CodecRegistry::new();
        let err = Note::register(&mut registry, false).unwrap_err();
        assert!(matches!(err, CodecError::ExtensionConflict { .. }));
        assert!(!registry.has_serializer(TypeId::of::<Note>()));

        let (_, ext) = registry.serialize(&Note("a".into())).unwrap();
        assert_eq!(ext, FALLBACK_EXTENSION);
        let text = registry.deserialize(".txt", b"hi").unwrap();
        assert_eq!(downcast_leaf::<String>(text.as_ref()), Some(&"hi".to_string()));
    }

    #[test]
    fn serializer_type_mismatch() {
        let serializer = Serializer::new(encode_point, ".point");
        let err = serializer.serialize(&1i64).unwrap_err();
        assert!(matches!(err, CodecError::TypeMismatch { .. }));
    }

    #[test]
    fn user_decode_error_passes_through() {
        let mut registry = CodecRegistry::new();
        registry
            .register_deserializer(decode_point, ".point", false)
            .unwrap();
        let err = registry.deserialize(".point", b"no-comma").unwrap_err();
        assert_eq!(err.to_string(), "missing comma");
    }

    #[test]
    fn extensions_include_builtins() {
        let registry = CodecRegistry::new();
        let mut exts: Vec<_> = registry.extensions().collect();
        exts.sort();
        assert!(exts.contains(&".cbor"));
        assert!(exts.contains(&".txt"));
        assert!(exts.contains(&".bytes"));
    }
}
