//! Environment value resolution.

use std::collections::HashMap;
use std::env::VarError;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::REDACTED;
use crate::error::{CapabilityError, EnvValueProblem};

/// Read-only source of environment values.
pub trait EnvSource: Send + Sync {
    /// Look up `name` with the semantics of [`std::env::var`].
    fn var(&self, name: &str) -> Result<String, VarError>;
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Result<String, VarError> {
        std::env::var(name)
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Result<String, VarError> {
        self.get(name).cloned().ok_or(VarError::NotPresent)
    }
}

impl<T: EnvSource + ?Sized> EnvSource for &T {
    fn var(&self, name: &str) -> Result<String, VarError> {
        (**self).var(name)
    }
}

// ---------------------------------------------------------------------------
// ResolvedValue
// ---------------------------------------------------------------------------

/// The outcome of resolving one environment reference.
///
/// The value is held as a [`SecretString`] so it cannot leak through
/// `Debug` while in transit to the argument bag.
pub struct ResolvedValue {
    value: Option<SecretString>,
    masked: bool,
}

impl ResolvedValue {
    /// `true` when the variable was unset (non-critical bindings only).
    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    pub fn is_masked(&self) -> bool {
        self.masked
    }

    /// Borrow the raw value.
    pub fn expose(&self) -> Option<&str> {
        self.value.as_ref().map(|v| v.expose_secret())
    }

    /// Convert into a configuration value: a string, or `null` when absent.
    pub fn into_value(self) -> Value {
        match self.value {
            Some(secret) => Value::String(secret.expose_secret().to_string()),
            None => Value::Null,
        }
    }
}

impl fmt::Debug for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.masked) {
            (None, _) => f.write_str("ResolvedValue(<absent>)"),
            (Some(_), true) => write!(f, "ResolvedValue({REDACTED})"),
            (Some(v), false) => write!(f, "ResolvedValue({:?})", v.expose_secret()),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvironmentResolver
// ---------------------------------------------------------------------------

/// Resolves environment references, applying criticality and masking policy.
///
/// Holds no mutable state, so concurrent use across slots is safe.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentResolver<E = ProcessEnv> {
    source: E,
}

impl EnvironmentResolver<ProcessEnv> {
    /// Resolver over the process environment.
    pub fn new() -> Self {
        Self { source: ProcessEnv }
    }
}

impl<E: EnvSource> EnvironmentResolver<E> {
    /// Resolver over an arbitrary source.
    pub fn with_source(source: E) -> Self {
        Self { source }
    }

    /// Resolve `env_name`.
    ///
    /// Unset (or not unicode) and `critical` fails with
    /// `MissingCriticalEnvironmentValue` stating which. Otherwise such a
    /// value is absent and a warning is logged. `mask`
    /// only decides whether the value may be logged.
    pub fn resolve(
        &self,
        env_name: &str,
        critical: bool,
        mask: bool,
    ) -> Result<ResolvedValue, CapabilityError> {
        let problem = match self.source.var(env_name) {
            Ok(raw) => {
                if mask {
                    log::debug!("Resolved {} = {}", env_name, REDACTED);
                } else {
                    log::debug!("Resolved {} = {:?}", env_name, raw);
                }
                return Ok(ResolvedValue {
                    value: Some(SecretString::from(raw)),
                    masked: mask,
                });
            }
            Err(VarError::NotPresent) => EnvValueProblem::Unset,
            Err(VarError::NotUnicode(_)) => EnvValueProblem::NotUnicode,
        };

        if critical {
            return Err(CapabilityError::MissingCriticalEnvironmentValue {
                env_name: env_name.to_string(),
                problem,
            });
        }

        log::warn!(
            "Environment variable {} is {}; continuing without it",
            env_name,
            match problem {
                EnvValueProblem::Unset => "not set",
                EnvValueProblem::NotUnicode => "not valid unicode",
            }
        );
        Ok(ResolvedValue {
            value: None,
            masked: mask,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_present_value() {
        let resolver = EnvironmentResolver::with_source(env(&[("OPENAI_API_KEY", "sk-test")]));
        let value = resolver.resolve("OPENAI_API_KEY", true, true).unwrap();
        assert_eq!(value.expose(), Some("sk-test"));
        assert!(value.is_masked());
        assert_eq!(value.into_value(), Value::String("sk-test".to_string()));
    }

    #[test]
    fn test_missing_critical_fails_naming_variable() {
        let resolver = EnvironmentResolver::with_source(env(&[]));
        let err = resolver.resolve("OPENAI_API_KEY", true, true).unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::MissingCriticalEnvironmentValue { ref env_name, problem: EnvValueProblem::Unset } if env_name == "OPENAI_API_KEY"
        ));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_missing_non_critical_is_absent() {
        let resolver = EnvironmentResolver::with_source(env(&[]));
        let value = resolver.resolve("OPTIONAL", false, true).unwrap();
        assert!(value.is_absent());
        assert_eq!(value.into_value(), Value::Null);
    }

    #[test]
    fn test_empty_value_counts_as_present() {
        let resolver = EnvironmentResolver::with_source(env(&[("EMPTY", "")]));
        let value = resolver.resolve("EMPTY", true, false).unwrap();
        assert_eq!(value.expose(), Some(""));
    }

    #[test]
    fn test_mask_does_not_affect_resolution() {
        let resolver = EnvironmentResolver::with_source(env(&[("K", "v")]));
        assert!(resolver.resolve("K", false, true).is_ok());
        assert!(resolver.resolve("K", false, false).is_ok());
        assert!(resolver.resolve("UNSET", true, false).is_err());
        assert!(resolver.resolve("UNSET", true, true).is_err());
    }

    /// Every variable holds bytes that are not valid unicode.
    struct GarbledEnv;

    impl EnvSource for GarbledEnv {
        fn var(&self, _name: &str) -> Result<String, VarError> {
            Err(VarError::NotUnicode(std::ffi::OsString::from("\u{fffd}")))
        }
    }

    #[test]
    fn test_non_unicode_critical_value_is_not_reported_as_unset() {
        let resolver = EnvironmentResolver::with_source(GarbledEnv);
        let err = resolver.resolve("OPENAI_API_KEY", true, true).unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::MissingCriticalEnvironmentValue {
                problem: EnvValueProblem::NotUnicode,
                ..
            }
        ));
        assert!(err.to_string().contains("not valid unicode"));
        assert!(!err.to_string().contains("not set"));
    }

    #[test]
    fn test_non_unicode_optional_value_is_absent() {
        let resolver = EnvironmentResolver::with_source(GarbledEnv);
        let value = resolver.resolve("OPTIONAL", false, false).unwrap();
        assert!(value.is_absent());
    }

    #[test]
    fn test_debug_masks_value() {
        let resolver = EnvironmentResolver::with_source(env(&[("K", "hunter2")]));
        let masked = resolver.resolve("K", false, true).unwrap();
        let plain = resolver.resolve("K", false, false).unwrap();
        assert!(!format!("{masked:?}").contains("hunter2"));
        assert!(format!("{plain:?}").contains("hunter2"));
    }
}
