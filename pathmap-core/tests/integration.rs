//! Integration tests exercising maps, plain mappings and codecs together.

use pathmap_core::{
    BoxError, Codec, CodecError, CodecRegistry, Key, Leaf, LeafVisitor, PathConfig, PathMap,
    PathMapError, Plain, PlainMap, Value,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Codec)]
#[codec(ext = "vec2")]
struct Vec2 {
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Codec)]
#[codec(ext = "celsius", with = "celsius")]
struct Celsius(f64);

mod celsius {
    use super::Celsius;
    use pathmap_core::BoxError;

    pub fn encode(value: &Celsius) -> Result<Vec<u8>, BoxError> {
        Ok(format!("{}C", value.0).into_bytes())
    }

    pub fn decode(bytes: &[u8]) -> Result<Celsius, BoxError> {
        let text = std::str::from_utf8(bytes)?;
        let degrees = text.strip_suffix('C').ok_or("missing unit")?;
        Ok(Celsius(degrees.parse()?))
    }
}

fn map() -> PathMap {
    PathMap::with_config(PathConfig::default())
}

#[test]
fn numeric_segment_scenario() {
    let mut m = map();
    m.set("6.10.11", 61011i64).unwrap();
    m.set("6.7", 67i64).unwrap();
    assert_eq!(m.get_as::<i64>("6.10.11"), Some(&61011));

    m.delete("6.7").unwrap();
    assert!(!m.contains("6.7"));
    assert!(m.contains("6"));
    assert!(m.contains("6.10"));
}

#[test]
fn nested_plain_mapping_becomes_tree() {
    let plain = PlainMap::new().with(
        "model",
        PlainMap::new()
            .with("layers", 4i64)
            .with("optimizer.name", "adam".to_string())
            .with("optimizer.lr", 0.001f64),
    );
    let m = PathMap::from_plain_with(plain, PathConfig::default()).unwrap();

    let optimizer = m.get("model.optimizer").and_then(Value::as_map).unwrap();
    assert_eq!(optimizer.len(), 2);
    assert_eq!(m.get_as::<f64>("model.optimizer.lr"), Some(&0.001));

    let flat: Vec<_> = m.flatten(".").into_keys().collect();
    assert_eq!(flat, ["model.layers", "model.optimizer.name", "model.optimizer.lr"]);
}

#[test]
fn leaf_blocks_traversal_but_not_assignment() {
    let mut m = map();
    m.set("a", 1i64).unwrap();
    assert!(m.contains("a"));
    assert!(!m.contains("a.b"));
    assert!(m.get("a.b").is_none());
    assert!(matches!(m.delete("a.b"), Err(PathMapError::NotFound(_))));

    m.set("a.b", 2i64).unwrap();
    assert_eq!(m.get_as::<i64>("a.b"), Some(&2));
}

#[test]
fn strict_map_reports_conflict() {
    let mut m = PathMap::with_config(PathConfig::default().with_auto_convert(false));
    m.set("a", 1i64).unwrap();
    assert!(matches!(m.set("a.b", 2i64), Err(PathMapError::TypeConflict(_))));
    assert_eq!(m.get_as::<i64>("a"), Some(&1));
}

#[test]
fn pop_and_fetch() {
    let mut m = map();
    m.set("x.y", "v".to_string()).unwrap();

    assert!(matches!(m.fetch("x.z"), Err(PathMapError::NotFound(_))));
    assert!(m.pop("x.z").is_none());

    let popped = m.pop("x.y").unwrap();
    assert_eq!(popped.downcast_ref::<String>().map(String::as_str), Some("v"));
    assert!(m.contains("x"));
    assert!(m.get("x").and_then(Value::as_map).unwrap().is_empty());
}

#[test]
fn to_plain_roundtrip() {
    let source = PlainMap::new().with("x", PlainMap::new().with("y", 1i64).with("z", 2i64));
    let m = PathMap::from_plain_with(source.clone(), PathConfig::default()).unwrap();
    let plain = m.to_plain();
    assert_eq!(plain, source);
    assert!(matches!(plain.get("x"), Some(Plain::Map(_))));
}

#[test]
fn integer_keys_are_single_segments() {
    let mut m = map();
    m.set(3i64, "three".to_string()).unwrap();
    m.set("3.1", "pi".to_string()).unwrap();

    assert_eq!(m.get_as::<String>(3i64).map(String::as_str), Some("three"));
    assert!(m.get("3").unwrap().is_map());
    assert_eq!(m.len(), 2);
    assert!(m.keys().any(|k| *k == Key::Int(3)));
}

#[test]
fn visitor_sees_full_paths() {
    struct Paths(Vec<String>);

    impl LeafVisitor for Paths {
        fn visit_leaf(&mut self, path: &[&Key], _leaf: &Arc<dyn Leaf>) {
            let segments: Vec<_> = path.iter().map(|k| k.to_string()).collect();
            self.0.push(segments.join("|"));
        }
    }

    let mut m = map();
    m.set("a.b", 1i64).unwrap();
    m.set(2i64, 2i64).unwrap();

    let mut paths = Paths(Vec::new());
    m.visit_leaves(&mut paths);
    assert_eq!(paths.0, ["a|b", "2"]);
}

#[test]
fn derived_cbor_codec() {
    let mut registry = CodecRegistry::new();
    Vec2::register(&mut registry, false).unwrap();
    assert!(matches!(
        Vec2::register(&mut registry, false),
        Err(CodecError::AlreadyRegistered { .. })
    ));

    let value = Vec2 { x: 1.0, y: -2.0 };
    let (payload, ext) = registry.serialize(&value).unwrap();
    assert_eq!(ext, ".vec2");
    assert!(registry.deserialize(ext, &payload).unwrap().eq_leaf(&value));
}

#[test]
fn derived_codec_with_module() {
    let mut registry = CodecRegistry::new();
    Celsius::register(&mut registry, false).unwrap();

    let (payload, ext) = registry.serialize(&Celsius(21.5)).unwrap();
    assert_eq!(payload, b"21.5C");
    assert_eq!(ext, ".celsius");

    let err = registry.deserialize(".celsius", b"21.5F").unwrap_err();
    assert_eq!(err.to_string(), "missing unit");
}

#[test]
fn codec_trait_by_hand() {
    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Flag(bool);

    impl Codec for Flag {
        const EXTENSION: &'static str = ".flag";

        fn encode(&self) -> Result<Vec<u8>, BoxError> {
            Ok(vec![self.0 as u8])
        }

        fn decode(bytes: &[u8]) -> Result<Self, BoxError> {
            match bytes {
                [b] => Ok(Flag(*b != 0)),
                _ => Err("expected one byte".into()),
            }
        }
    }

    let mut registry = CodecRegistry::new();
    Flag::register(&mut registry, false).unwrap();
    let back = registry.deserialize(".flag", &[1]).unwrap();
    assert!(back.eq_leaf(&Flag(true)));
}

#[test]
fn shallow_and_deep_copies() {
    let mut m = map();
    m.set("cfg.name", "a".to_string()).unwrap();

    let shallow = m.clone();
    let deep = m.deep_copy();
    let original = m.get("cfg.name").and_then(Value::as_leaf).unwrap();

    assert!(Arc::ptr_eq(
        original,
        shallow.get("cfg.name").and_then(Value::as_leaf).unwrap()
    ));
    assert!(!Arc::ptr_eq(
        original,
        deep.get("cfg.name").and_then(Value::as_leaf).unwrap()
    ));
    assert_eq!(shallow, deep);

    m.set("cfg.other", 1i64).unwrap();
    assert!(!shallow.contains("cfg.other"));
}
