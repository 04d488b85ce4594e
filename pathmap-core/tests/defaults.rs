//! Process-wide defaults. Kept in their own test binary since they are global.

use pathmap_core::{
    PathMap, PathMapError, default_config, disable_auto_convert, enable_auto_convert,
    set_default_separator,
};

#[test]
fn defaults_apply_to_new_maps_only() {
    let before = PathMap::new();
    assert_eq!(before.separator(), ".");
    assert!(before.config().auto_convert());

    set_default_separator("/");
    set_default_separator("");
    assert_eq!(default_config().separator(), "/");

    let mut slashed = PathMap::new();
    slashed.set("a/b", 1i64).unwrap();
    assert!(slashed.get("a").unwrap().is_map());
    assert_eq!(before.separator(), ".");

    disable_auto_convert();
    let mut strict = PathMap::new();
    strict.set("a", 1i64).unwrap();
    assert!(matches!(strict.set("a/b", 2i64), Err(PathMapError::TypeConflict(_))));

    // children inherit their parent's configuration, not the current default
    enable_auto_convert();
    set_default_separator(".");
    slashed.set("a/c/d", 3i64).unwrap();
    let a = slashed.get("a").and_then(|v| v.as_map()).unwrap();
    assert_eq!(a.separator(), "/");
    assert_eq!(slashed.get_as::<i64>("a/c/d"), Some(&3));
    assert!(PathMap::new().config().auto_convert());
}
