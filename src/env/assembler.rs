//! Constructor argument assembly.

use crate::config::{CapabilityConfig, EnvBinding, ResolvedArguments, FROM_ENV_KEY};
use crate::error::CapabilityError;

use super::resolver::{EnvSource, EnvironmentResolver, ProcessEnv};

/// Merges configured arguments with environment-sourced values.
#[derive(Debug, Clone, Default)]
pub struct ArgumentAssembler<E = ProcessEnv> {
    resolver: EnvironmentResolver<E>,
}

impl ArgumentAssembler<ProcessEnv> {
    pub fn new() -> Self {
        Self {
            resolver: EnvironmentResolver::new(),
        }
    }
}

impl<E: EnvSource> ArgumentAssembler<E> {
    pub fn with_resolver(resolver: EnvironmentResolver<E>) -> Self {
        Self { resolver }
    }

    /// Build the final argument bag for `config`.
    ///
    /// Starts from a copy of `config.arguments`; each `from_env` entry is
    /// resolved in document order and overwrites any same-named argument.
    /// The result never contains a `from_env` key and `config` is left
    /// untouched.
    pub fn assemble(&self, config: &CapabilityConfig) -> Result<ResolvedArguments, CapabilityError> {
        let bindings = config
            .env_bindings
            .iter()
            .map(|(argument, raw)| EnvBinding::from_value(argument, raw))
            .collect::<Result<Vec<_>, _>>()?;

        let mut arguments = ResolvedArguments::new(
            config
                .arguments
                .iter()
                .filter(|(k, _)| k.as_str() != FROM_ENV_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        for binding in &bindings {
            let resolved = self
                .resolver
                .resolve(&binding.env_name, binding.critical, binding.mask)?;

            if arguments.contains_key(&binding.argument_name) {
                log::debug!(
                    "Argument {} overridden by environment variable {}",
                    binding.argument_name,
                    binding.env_name
                );
            }
            let masked = resolved.is_masked();
            arguments.insert(binding.argument_name.clone(), resolved.into_value(), masked);
        }

        Ok(arguments)
    }
}
