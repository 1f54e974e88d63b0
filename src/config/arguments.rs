//! The flat constructor-argument bag handed to capability constructors.

use std::collections::BTreeSet;
use std::fmt;

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

/// Placeholder written wherever a masked value would otherwise appear.
pub const REDACTED: &str = "***";

/// Final constructor arguments: configured arguments merged with
/// environment-sourced values.
///
/// Keys that came from a masked environment binding are remembered so that
/// `Debug` output and error messages never contain their values.
#[derive(Clone, Default, PartialEq)]
pub struct ResolvedArguments {
    values: Map<String, Value>,
    masked: BTreeSet<String>,
}

impl ResolvedArguments {
    /// Create an argument bag from plain (unmasked) values.
    pub fn new(values: Map<String, Value>) -> Self {
        Self {
            values,
            masked: BTreeSet::new(),
        }
    }

    /// Set `key`, replacing any existing value. A masked insert marks the
    /// key as secret; an unmasked insert clears a previous mark.
    pub fn insert(&mut self, key: impl Into<String>, value: Value, masked: bool) {
        let key = key.into();
        if masked {
            self.masked.insert(key.clone());
        } else {
            self.masked.remove(&key);
        }
        self.values.insert(key, value);
    }

    /// Copy of these arguments without the given keys.
    pub fn without(&self, keys: &[&str]) -> Self {
        let values = self
            .values
            .iter()
            .filter(|(k, _)| !keys.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let masked = self
            .masked
            .iter()
            .filter(|k| !keys.contains(&k.as_str()))
            .cloned()
            .collect();
        Self { values, masked }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether `key` holds a masked value.
    pub fn is_masked(&self, key: &str) -> bool {
        self.masked.contains(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Borrow the underlying map, secrets included.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// The arguments as a JSON object, secrets included.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    // --- Typed accessors for constructors ---

    /// A required, non-null string argument.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.optional_str(key)?
            .ok_or_else(|| anyhow!("missing required argument `{key}`"))
    }

    /// A string argument; `null` and absence both yield `None`.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(anyhow!(
                "argument `{key}` must be a string, got {}",
                kind_of(other)
            )),
        }
    }

    /// A numeric argument.
    pub fn optional_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| anyhow!("argument `{key}` is not representable as f64")),
            Some(other) => Err(anyhow!(
                "argument `{key}` must be a number, got {}",
                kind_of(other)
            )),
        }
    }

    /// A non-negative integer argument.
    pub fn optional_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| anyhow!("argument `{key}` must be a non-negative integer")),
            Some(other) => Err(anyhow!(
                "argument `{key}` must be an integer, got {}",
                kind_of(other)
            )),
        }
    }

    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(anyhow!(
                "argument `{key}` must be a boolean, got {}",
                kind_of(other)
            )),
        }
    }

    /// Replace every masked value occurring in `text` with [`REDACTED`].
    pub fn redact(&self, text: &str) -> String {
        let mut secrets: Vec<&str> = self
            .masked
            .iter()
            .filter_map(|k| self.values.get(k))
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .collect();
        // Longest first so a secret containing another is replaced whole.
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut out = text.to_string();
        for secret in secrets {
            out = out.replace(secret, REDACTED);
        }
        out
    }
}

impl fmt::Debug for ResolvedArguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.values {
            if self.masked.contains(key) && !value.is_null() {
                map.entry(key, &REDACTED);
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

impl From<Map<String, Value>> for ResolvedArguments {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
