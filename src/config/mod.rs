//! Capability slot configuration.
//!
//! A configuration document carries a `capabilities` mapping from slot name
//! to slot block:
//!
//! ```yaml
//! capabilities:
//!   chat:
//!     type: plugin
//!     module: acme.chat
//!     model_name: gpt-35
//!     temperature: 0
//!     from_env:
//!       openai_api_key:
//!         env_name: OPENAI_API_KEY
//!         critical: true
//! ```
//!
//! `type`, `module`/`location` and `from_env` are reserved; every other key
//! is a free-form constructor argument. Slot order and binding order follow
//! the document.

pub mod arguments;

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{CapabilityError, DocumentError};

pub use arguments::{ResolvedArguments, REDACTED};

/// Key holding the type tag.
pub const TYPE_KEY: &str = "type";
/// Key holding the location of an externally loaded implementation.
pub const MODULE_KEY: &str = "module";
/// Accepted alias of [`MODULE_KEY`].
pub const LOCATION_KEY: &str = "location";
/// Key holding the environment-binding block.
pub const FROM_ENV_KEY: &str = "from_env";

/// Keys consumed by the resolution machinery and never forwarded to a
/// constructor.
pub const RESERVED_KEYS: &[&str] = &[TYPE_KEY, MODULE_KEY, LOCATION_KEY, FROM_ENV_KEY];

// ---------------------------------------------------------------------------
// CapabilityConfig
// ---------------------------------------------------------------------------

/// One capability slot's configuration block, parsed once at startup and
/// immutable thereafter.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityConfig {
    /// Discriminator: a built-in tag or the external-loading tag.
    pub type_tag: String,
    /// Location of an externally loaded implementation.
    pub location: Option<String>,
    /// Free-form constructor arguments.
    pub arguments: Map<String, Value>,
    /// Raw `from_env` entries keyed by argument name; validated on assembly.
    pub env_bindings: Map<String, Value>,
}

impl CapabilityConfig {
    /// A config with the given type tag and no arguments.
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            location: None,
            arguments: Map::new(),
            env_bindings: Map::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }

    pub fn with_env_binding(mut self, argument: impl Into<String>, binding: Value) -> Self {
        self.env_bindings.insert(argument.into(), binding);
        self
    }

    /// Parse a slot block.
    ///
    /// Fails with `InvalidCapabilityConfig` when the block is not an object,
    /// `type` is missing or not a string, or the location is not a string;
    /// fails with `InvalidEnvBindingShape` when `from_env` is not an object.
    pub fn from_value(value: &Value) -> Result<Self, CapabilityError> {
        let block = value.as_object().ok_or_else(|| {
            CapabilityError::InvalidCapabilityConfig("slot block must be a mapping".to_string())
        })?;

        let type_tag = match block.get(TYPE_KEY) {
            Some(Value::String(tag)) => tag.clone(),
            Some(_) => {
                return Err(CapabilityError::InvalidCapabilityConfig(
                    "`type` must be a string".to_string(),
                ))
            }
            None => {
                return Err(CapabilityError::InvalidCapabilityConfig(
                    "missing `type`".to_string(),
                ))
            }
        };

        let location = match block.get(MODULE_KEY).or_else(|| block.get(LOCATION_KEY)) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(CapabilityError::InvalidCapabilityConfig(
                    "`module` must be a string".to_string(),
                ))
            }
        };

        let env_bindings = match block.get(FROM_ENV_KEY) {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(bindings)) => bindings.clone(),
            Some(_) => {
                return Err(CapabilityError::invalid_binding(
                    FROM_ENV_KEY,
                    "`from_env` must be a mapping of argument names to binding records",
                ))
            }
        };

        let arguments = block
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            type_tag,
            location,
            arguments,
            env_bindings,
        })
    }
}

// ---------------------------------------------------------------------------
// EnvBinding
// ---------------------------------------------------------------------------

/// One environment-sourced constructor argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    /// Argument the resolved value is stored under.
    pub argument_name: String,
    /// Environment variable to read.
    pub env_name: String,
    /// Keep the value out of logs and error messages.
    pub mask: bool,
    /// Abort startup when the variable is unset.
    pub critical: bool,
}

impl EnvBinding {
    /// A masked, non-critical binding.
    pub fn new(argument_name: impl Into<String>, env_name: impl Into<String>) -> Self {
        Self {
            argument_name: argument_name.into(),
            env_name: env_name.into(),
            mask: true,
            critical: false,
        }
    }

    /// Validate a raw `from_env` entry.
    ///
    /// The entry must be a mapping with a non-empty string `env_name` and
    /// optional boolean `mask` (default `true`) and `critical` (default
    /// `false`). Unknown keys are rejected, as is the argument name
    /// `from_env` itself.
    pub fn from_value(argument_name: &str, raw: &Value) -> Result<Self, CapabilityError> {
        if argument_name == FROM_ENV_KEY {
            return Err(CapabilityError::invalid_binding(
                argument_name,
                "`from_env` is reserved and cannot be a binding target",
            ));
        }

        let record = raw.as_object().ok_or_else(|| {
            CapabilityError::invalid_binding(argument_name, "expected a mapping with `env_name`")
        })?;

        if let Some(unknown) = record
            .keys()
            .find(|k| !matches!(k.as_str(), "env_name" | "mask" | "critical"))
        {
            return Err(CapabilityError::invalid_binding(
                argument_name,
                format!("unknown key `{unknown}`"),
            ));
        }

        let env_name = match record.get("env_name") {
            Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
            Some(Value::String(_)) => {
                return Err(CapabilityError::invalid_binding(
                    argument_name,
                    "`env_name` must not be empty",
                ))
            }
            Some(_) => {
                return Err(CapabilityError::invalid_binding(
                    argument_name,
                    "`env_name` must be a string",
                ))
            }
            None => {
                return Err(CapabilityError::invalid_binding(
                    argument_name,
                    "missing `env_name`",
                ))
            }
        };

        Ok(Self {
            argument_name: argument_name.to_string(),
            env_name,
            mask: flag(argument_name, record, "mask", true)?,
            critical: flag(argument_name, record, "critical", false)?,
        })
    }
}

fn flag(
    argument_name: &str,
    record: &Map<String, Value>,
    key: &str,
    default: bool,
) -> Result<bool, CapabilityError> {
    match record.get(key) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(CapabilityError::invalid_binding(
            argument_name,
            format!("`{key}` must be a boolean"),
        )),
    }
}

// ---------------------------------------------------------------------------
// CapabilitiesDocument
// ---------------------------------------------------------------------------

/// The `capabilities` fragment of an application configuration document.
///
/// Slot blocks are kept raw so that one malformed slot does not hide
/// problems in the others; they are parsed per slot during binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilitiesDocument {
    slots: Vec<(String, Value)>,
}

impl CapabilitiesDocument {
    /// Build a document from an already-parsed configuration value.
    pub fn from_value(document: &Value) -> Result<Self, DocumentError> {
        let root = document
            .as_object()
            .ok_or_else(|| DocumentError::Shape("document root must be a mapping".to_string()))?;

        let slots = match root.get("capabilities") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(slots)) => slots
                .iter()
                .map(|(name, block)| (name.clone(), block.clone()))
                .collect(),
            Some(_) => {
                return Err(DocumentError::Shape(
                    "`capabilities` must be a mapping of slot names to slot blocks".to_string(),
                ))
            }
        };

        Ok(Self { slots })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_yaml::from_str(text)?;
        Self::from_value(&value)
    }

    pub fn from_json_str(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Read a document from disk; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        log::debug!("Loading capability document from {}", path.display());

        let is_json = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    /// Slot names and raw blocks, in document order.
    pub fn slots(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(name, block)| (name.as_str(), block))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
