use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::ConfigurationError;

/// Provider-specific adapter configuration.
///
/// A loose string-to-value map validated once at adapter construction:
/// each adapter names its required keys (construction fails when one is
/// absent) and reads everything else through the defaulting getters.
/// Unknown keys are ignored.
#[derive(Debug, Clone, Default)]
pub struct AdapterParameters {
    values: BTreeMap<String, Value>,
}

impl AdapterParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, used when wiring an adapter up by hand.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// String value of a required key.
    pub fn require_str(&self, key: &'static str) -> Result<&str, ConfigurationError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Err(ConfigurationError::MissingParameter(key)),
            Some(Value::String(s)) if !s.is_empty() => Ok(s),
            Some(_) => Err(ConfigurationError::InvalidParameter {
                key,
                expected: "non-empty string",
            }),
        }
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn string_opt(&self, key: &str) -> Option<String> {
        self.str(key).map(str::to_owned)
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.values
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    pub fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for AdapterParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
