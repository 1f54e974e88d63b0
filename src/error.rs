//! Error types for capability resolution.
//!
//! Every variant is a startup-time failure. None of them are retried or
//! logged-and-swallowed: they travel up to the application's startup path
//! carrying enough context (slot, tag, location, argument) to fix the
//! configuration document.

use std::fmt;

use thiserror::Error;

use crate::config::ResolvedArguments;

/// Errors raised while resolving a single capability slot.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A critical environment binding references an unset or unusable variable.
    #[error("environment variable `{env_name}` is required but {problem}")]
    MissingCriticalEnvironmentValue {
        env_name: String,
        problem: EnvValueProblem,
    },

    /// A `from_env` entry is not a well-formed binding record.
    #[error("invalid `from_env` entry `{argument}`: {reason}")]
    InvalidEnvBindingShape { argument: String, reason: String },

    /// The slot block itself is malformed (missing or non-string `type`, ...).
    #[error("invalid capability configuration: {0}")]
    InvalidCapabilityConfig(String),

    /// The location could not be resolved to a loadable code unit.
    #[error("module `{location}` not found: {reason}")]
    ModuleNotFound { location: String, reason: String },

    /// The code unit does not export the canonical entry symbol.
    #[error("module `{location}` does not export entry symbol `{symbol}`")]
    EntryPointMissing { location: String, symbol: String },

    /// The loaded entry does not provide every operation of the contract.
    #[error(
        "`{location}` does not satisfy the {contract} contract; missing operation(s): {}",
        .missing.join(", ")
    )]
    ContractNotSatisfied {
        location: String,
        contract: String,
        missing: Vec<String>,
    },

    /// The external-loading tag was used without a location.
    #[error("capability type `{type_tag}` requires a non-empty `module` location")]
    MissingLocation { type_tag: String },

    /// The type tag is neither a built-in nor the external-loading tag.
    #[error(
        "unknown capability type `{type_tag}`; expected one of: {}",
        .known.join(", ")
    )]
    UnknownCapabilityType { type_tag: String, known: Vec<String> },

    /// The implementation's own constructor failed.
    #[error("failed to construct `{type_tag}` capability")]
    CapabilityConstructionFailed {
        type_tag: String,
        #[source]
        cause: RedactedCause,
    },
}

impl CapabilityError {
    /// Short, stable name of the error kind, suitable for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingCriticalEnvironmentValue { .. } => "MissingCriticalEnvironmentValue",
            Self::InvalidEnvBindingShape { .. } => "InvalidEnvBindingShape",
            Self::InvalidCapabilityConfig(_) => "InvalidCapabilityConfig",
            Self::ModuleNotFound { .. } => "ModuleNotFound",
            Self::EntryPointMissing { .. } => "EntryPointMissing",
            Self::ContractNotSatisfied { .. } => "ContractNotSatisfied",
            Self::MissingLocation { .. } => "MissingLocation",
            Self::UnknownCapabilityType { .. } => "UnknownCapabilityType",
            Self::CapabilityConstructionFailed { .. } => "CapabilityConstructionFailed",
        }
    }

    /// Wrap a constructor's own failure, scrubbing masked argument values
    /// from the rendered cause chain.
    pub(crate) fn construction_failed(
        type_tag: &str,
        args: &ResolvedArguments,
        err: &anyhow::Error,
    ) -> Self {
        Self::CapabilityConstructionFailed {
            type_tag: type_tag.to_string(),
            cause: RedactedCause::new(args.redact(&format!("{err:#}"))),
        }
    }

    pub(crate) fn invalid_binding(argument: &str, reason: impl Into<String>) -> Self {
        Self::InvalidEnvBindingShape {
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a critical environment value could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvValueProblem {
    /// The variable is not set.
    Unset,
    /// The variable is set but its value is not valid unicode.
    NotUnicode,
}

impl fmt::Display for EnvValueProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("not set"),
            Self::NotUnicode => f.write_str("its value is not valid unicode"),
        }
    }
}

/// The rendered cause of a construction failure with masked values removed.
///
/// The original error is flattened to text (including its whole context
/// chain) at the moment it is wrapped, so no secret-bearing error value
/// survives past the factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactedCause(String);

impl RedactedCause {
    pub(crate) fn new(message: String) -> Self {
        Self(message)
    }

    /// The redacted message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RedactedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for RedactedCause {}

/// A capability error attributed to the slot it occurred in.
#[derive(Debug, Error)]
#[error("capability slot `{slot}`: {source}")]
pub struct SlotError {
    pub slot: String,
    #[source]
    pub source: SlotFailure,
}

/// Why a slot failed to bind.
#[derive(Debug, Error)]
pub enum SlotFailure {
    /// Resolution of the slot's configuration failed.
    #[error(transparent)]
    Capability(#[from] CapabilityError),

    /// The slot name was already bound.
    #[error("slot is already bound")]
    DuplicateSlot,
}

impl SlotFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capability(e) => e.kind(),
            Self::DuplicateSlot => "DuplicateSlot",
        }
    }
}

/// Every slot failure collected during one binding pass.
#[derive(Debug, Error)]
#[error("{} capability slot(s) failed to resolve: {}", .failures.len(), summarize(.failures))]
pub struct BindErrors {
    pub failures: Vec<SlotError>,
}

fn summarize(failures: &[SlotError]) -> String {
    failures
        .iter()
        .map(|f| f.slot.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors reading a capability configuration document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but has the wrong shape.
    #[error("invalid document: {0}")]
    Shape(String),
}
