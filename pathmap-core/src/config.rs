use serde::{Deserialize, Serialize};
use std::sync::{LazyLock, PoisonError, RwLock};

use crate::map::PathMapError;

/// Separator used when no other is configured.
pub const DEFAULT_SEPARATOR: &str = ".";

/// Per-map configuration, threaded into every [`PathMap`](crate::PathMap) at construction.
///
/// Child maps created while assigning composite keys inherit their parent's
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    separator: String,
    auto_convert: bool,
}

impl Default for PathConfig {
    fn default() -> Self {
        PathConfig {
            separator: DEFAULT_SEPARATOR.to_string(),
            auto_convert: true,
        }
    }
}

impl PathConfig {
    /// Creates a configuration. The separator must not be empty.
    pub fn new(separator: impl Into<String>, auto_convert: bool) -> Result<Self, PathMapError> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(PathMapError::EmptySeparator);
        }
        Ok(PathConfig {
            separator,
            auto_convert,
        })
    }

    /// The string composite keys are split at.
    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Whether plain mappings are wrapped into path maps on assignment.
    pub fn auto_convert(&self) -> bool {
        self.auto_convert
    }

    pub fn with_auto_convert(mut self, auto_convert: bool) -> Self {
        self.auto_convert = auto_convert;
        self
    }
}

static DEFAULTS: LazyLock<RwLock<PathConfig>> =
    LazyLock::new(|| RwLock::new(PathConfig::default()));

/// Returns a snapshot of the process-wide default configuration.
pub fn default_config() -> PathConfig {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Sets the default separator for maps constructed afterwards.
///
/// An empty separator is ignored.
pub fn set_default_separator(separator: &str) {
    if separator.is_empty() {
        return;
    }
    DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .separator = separator.to_string();
}

/// Enables auto-convert for maps constructed afterwards.
pub fn enable_auto_convert() {
    set_default_auto_convert(true);
}

/// Disables auto-convert for maps constructed afterwards.
pub fn disable_auto_convert() {
    set_default_auto_convert(false);
}

fn set_default_auto_convert(enabled: bool) {
    DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .auto_convert = enabled;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_dot_with_auto_convert() {
        let config = PathConfig::default();
        assert_eq!(config.separator(), ".");
        assert!(config.auto_convert());
    }

    #[test]
    fn empty_separator_rejected() {
        assert!(matches!(
            PathConfig::new("", true),
            Err(PathMapError::EmptySeparator)
        ));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: PathConfig =
            ciborium::Value::Map(vec![(
                ciborium::Value::Text("separator".into()),
                ciborium::Value::Text("/".into()),
            )])
            .deserialized()
            .unwrap();
        assert_eq!(config.separator(), "/");
        assert!(config.auto_convert());
    }
}
