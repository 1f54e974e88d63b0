//! Capability factory: dispatch a type tag to a built-in or a loaded
//! implementation.

use std::fmt;
use std::sync::Arc;

use crate::config::{ResolvedArguments, RESERVED_KEYS};
use crate::contract::CapabilityContract;
use crate::error::CapabilityError;
use crate::loader::{DynamicLoader, ModuleTable};
use crate::registry::BuiltinRegistry;

pub use crate::loader::EXTERNAL_TAG;

/// Creates instances of contract `C` from a type tag and resolved arguments.
pub struct CapabilityFactory<C: CapabilityContract + ?Sized> {
    registry: BuiltinRegistry<C>,
    loader: DynamicLoader,
}

impl<C: CapabilityContract + ?Sized> CapabilityFactory<C> {
    /// Factory whose loader resolves dotted locations against `modules`.
    pub fn new(modules: ModuleTable) -> Self {
        Self::with_loader(DynamicLoader::new(modules))
    }

    pub fn with_loader(loader: DynamicLoader) -> Self {
        Self {
            registry: BuiltinRegistry::new(),
            loader,
        }
    }

    pub fn registry(&self) -> &BuiltinRegistry<C> {
        &self.registry
    }

    pub fn loader(&self) -> &DynamicLoader {
        &self.loader
    }

    /// Every tag `create` accepts: built-ins followed by the external tag.
    pub fn known_tags(&self) -> Vec<String> {
        self.registry
            .tags()
            .into_iter()
            .chain(std::iter::once(EXTERNAL_TAG))
            .map(str::to_string)
            .collect()
    }

    /// Create an instance.
    ///
    /// Dispatch, first match wins:
    /// 1. the external tag loads `location` (required, non-empty)
    /// 2. a registry tag runs the built-in constructor
    /// 3. anything else fails with `UnknownCapabilityType`
    ///
    /// Reserved configuration keys are never forwarded to a constructor.
    /// Constructor failures propagate as `CapabilityConstructionFailed`.
    pub fn create(
        &self,
        type_tag: &str,
        resolved_args: &ResolvedArguments,
        location: Option<&str>,
    ) -> Result<Arc<C>, CapabilityError> {
        let args = resolved_args.without(RESERVED_KEYS);

        if type_tag == EXTERNAL_TAG {
            let location = location
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| CapabilityError::MissingLocation {
                    type_tag: type_tag.to_string(),
                })?;

            let constructor = self.loader.load::<C>(location)?;
            let instance = constructor(&args)?;
            log::info!("Created {} capability from plugin {}", C::NAME, location);
            return Ok(instance);
        }

        if let Some(construct) = self.registry.lookup(type_tag) {
            let instance = construct(&args)
                .map_err(|e| CapabilityError::construction_failed(type_tag, &args, &e))?;
            log::info!("Created built-in {} capability {}", C::NAME, type_tag);
            return Ok(instance);
        }

        Err(CapabilityError::UnknownCapabilityType {
            type_tag: type_tag.to_string(),
            known: self.known_tags(),
        })
    }
}

impl<C: CapabilityContract + ?Sized> Default for CapabilityFactory<C> {
    fn default() -> Self {
        Self::new(ModuleTable::new())
    }
}

impl<C: CapabilityContract + ?Sized> fmt::Debug for CapabilityFactory<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityFactory")
            .field("contract", &C::NAME)
            .field("registry", &self.registry)
            .field("loader", &self.loader)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::contract::{chat_entry, ChatCapability};
    use crate::loader::{CodeUnit, ENTRY_SYMBOL};

    #[derive(Debug)]
    struct Recorder {
        seen: Vec<String>,
    }

    #[async_trait]
    impl ChatCapability for Recorder {
        async fn generate_response(&self, _prompt: &str, _system: &str) -> Result<String> {
            Ok(self.seen.join(","))
        }
    }

    fn factory() -> CapabilityFactory<dyn ChatCapability> {
        let entry = chat_entry("Recorder", |args: &ResolvedArguments| {
            Ok(Recorder {
                seen: args.keys().map(str::to_string).collect(),
            })
        });
        CapabilityFactory::new(
            ModuleTable::new().with_unit(CodeUnit::new("acme.chat").export(ENTRY_SYMBOL, entry)),
        )
    }

    fn args(value: Value) -> ResolvedArguments {
        match value {
            Value::Object(map) => ResolvedArguments::new(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_external_tag_requires_location() {
        let f = factory();
        for location in [None, Some(""), Some("   ")] {
            let err = f.create(EXTERNAL_TAG, &ResolvedArguments::default(), location).err().unwrap();
            assert!(matches!(err, CapabilityError::MissingLocation { .. }));
        }
    }

    #[test]
    fn test_unknown_type_lists_known_tags() {
        let err = factory().create("bogus", &ResolvedArguments::default(), None).err().unwrap();
        match err {
            CapabilityError::UnknownCapabilityType { type_tag, known } => {
                assert_eq!(type_tag, "bogus");
                assert_eq!(known, vec!["azure", "openai", "plugin"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builtin_ignores_location_and_loader() {
        // An empty module table proves the loader is never consulted.
        let f = CapabilityFactory::<dyn ChatCapability>::default();
        let instance = f.create("azure", &args(json!({"model": "gpt-x"})), Some("acme.chat"));
        assert!(instance.is_ok());
    }

    #[test]
    fn test_builtin_construction_failure_propagates() {
        let err = factory()
            .create("azure", &ResolvedArguments::default(), None)
            .err()
            .unwrap();
        match err {
            CapabilityError::CapabilityConstructionFailed { type_tag, cause } => {
                assert_eq!(type_tag, "azure");
                assert!(cause.message().contains("model"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_plugin_receives_no_reserved_keys() {
        let resolved = args(json!({
            "model_name": "gpt-35",
            "module": "acme.chat",
            "type": "plugin",
            "from_env": {},
        }));
        let chat = factory().create(EXTERNAL_TAG, &resolved, Some("acme.chat")).unwrap();
        let seen = chat.generate_response("", "").await.unwrap();
        assert_eq!(seen, "model_name");
    }

    #[test]
    fn test_plugin_module_not_found() {
        let err = factory()
            .create(EXTERNAL_TAG, &ResolvedArguments::default(), Some("acme.nope"))
            .err()
            .unwrap();
        assert!(matches!(err, CapabilityError::ModuleNotFound { .. }));
    }
}
