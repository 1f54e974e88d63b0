//! Dynamic loading of externally supplied capability implementations.
//!
//! A location is resolved in one of two ways:
//!
//! 1. A dotted path (`acme.chat`, `acme::chat`) addresses a [`CodeUnit`]
//!    registered in the loader's [`ModuleTable`].
//! 2. A file path (`./plugins/libacme_chat.so`) or library name
//!    (`libacme_chat.so.1`) is opened as a shared library (feature
//!    `native-plugins`).
//!
//! Either way the unit must export [`ENTRY_SYMBOL`]. The entry's declared
//! operations are checked against the target contract at load time and the
//! constructed object's operations are checked again before it is exposed.

#[cfg(feature = "native-plugins")]
mod native;
pub mod plugin;
pub mod unit;

use std::sync::Arc;

use crate::config::ResolvedArguments;
use crate::contract::{missing_operations, CapabilityContract};
use crate::error::CapabilityError;

pub use plugin::{PluginEntry, PluginObject};
pub use unit::{normalize_path, CodeUnit, ModuleTable};

/// The one symbol every externally loaded unit must export.
pub const ENTRY_SYMBOL: &str = "capability_entry";

/// Tag under which construction failures of loaded implementations are
/// reported.
pub const EXTERNAL_TAG: &str = "plugin";

/// Constructor produced by a successful load.
pub type LoadedConstructor<C> =
    Box<dyn Fn(&ResolvedArguments) -> Result<Arc<C>, CapabilityError> + Send + Sync>;

/// Export a plugin entry from a shared library.
///
/// ```ignore
/// fn entry() -> PluginEntry {
///     chat_entry("AcmeChat", AcmeChat::from_arguments)
/// }
/// capability_resolver::declare_capability_entry!(entry);
/// ```
#[macro_export]
macro_rules! declare_capability_entry {
    ($factory:path) => {
        #[no_mangle]
        pub fn capability_entry() -> $crate::loader::PluginEntry {
            $factory()
        }
    };
}

/// Locates external code units and validates them against a contract.
#[derive(Debug, Clone, Default)]
pub struct DynamicLoader {
    modules: ModuleTable,
}

impl DynamicLoader {
    pub fn new(modules: ModuleTable) -> Self {
        Self { modules }
    }

    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    /// Resolve `location`, find its entry symbol and check it against `C`.
    ///
    /// Fails with `ModuleNotFound`, `EntryPointMissing` or
    /// `ContractNotSatisfied`. The returned constructor re-checks the built
    /// object and drops it if it falls short of the contract.
    pub fn load<C>(&self, location: &str) -> Result<LoadedConstructor<C>, CapabilityError>
    where
        C: CapabilityContract + ?Sized,
    {
        let entry = self.locate(location)?;

        let missing = missing_operations::<C, _>(entry.operations());
        if !missing.is_empty() {
            return Err(CapabilityError::ContractNotSatisfied {
                location: location.to_string(),
                contract: C::NAME.to_string(),
                missing,
            });
        }

        log::info!(
            "Loaded {} entry {} from {}",
            C::NAME,
            entry.name(),
            location
        );

        let location = location.to_string();
        Ok(Box::new(move |args: &ResolvedArguments| {
            let object = entry.construct(args).map_err(|e| {
                let e = e.context(format!("constructing `{}` from `{}`", entry.name(), location));
                CapabilityError::construction_failed(EXTERNAL_TAG, args, &e)
            })?;

            let missing = missing_operations::<C, _>(&object.operations());
            if !missing.is_empty() {
                return Err(CapabilityError::ContractNotSatisfied {
                    location: location.clone(),
                    contract: C::NAME.to_string(),
                    missing,
                });
            }

            Ok(C::adapt(object))
        }))
    }

    fn locate(&self, location: &str) -> Result<PluginEntry, CapabilityError> {
        let location = location.trim();
        if is_library_path(location) {
            return load_library_entry(location);
        }

        let unit = self
            .modules
            .get(location)
            .ok_or_else(|| CapabilityError::ModuleNotFound {
                location: location.to_string(),
                reason: self.not_registered_reason(),
            })?;

        unit.symbol(ENTRY_SYMBOL)
            .cloned()
            .ok_or_else(|| CapabilityError::EntryPointMissing {
                location: location.to_string(),
                symbol: ENTRY_SYMBOL.to_string(),
            })
    }

    fn not_registered_reason(&self) -> String {
        if self.modules.is_empty() {
            "no code units are registered".to_string()
        } else {
            format!(
                "no code unit registered under this path (registered: {})",
                self.modules.paths().join(", ")
            )
        }
    }
}

/// Whether `location` names a shared library rather than a dotted path.
pub fn is_library_path(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    location.contains('/')
        || location.contains('\\')
        || lower.contains(".so.")
        || [".so", ".dylib", ".dll"].iter().any(|ext| lower.ends_with(ext))
}

#[cfg(feature = "native-plugins")]
fn load_library_entry(location: &str) -> Result<PluginEntry, CapabilityError> {
    native::load_entry(location)
}

#[cfg(not(feature = "native-plugins"))]
fn load_library_entry(location: &str) -> Result<PluginEntry, CapabilityError> {
    Err(CapabilityError::ModuleNotFound {
        location: location.to_string(),
        reason: "loading shared libraries requires the `native-plugins` feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::contract::chat::{chat_entry, ChatCapability, GENERATE_RESPONSE};

    #[derive(Debug)]
    struct EchoChat {
        model: String,
    }

    #[async_trait]
    impl ChatCapability for EchoChat {
        async fn generate_response(&self, prompt: &str, _system: &str) -> Result<String> {
            Ok(format!("{}: {}", self.model, prompt))
        }
    }

    /// Claims the chat operation but its instances do not provide it.
    #[derive(Debug)]
    struct Liar;

    #[async_trait]
    impl PluginObject for Liar {
        fn name(&self) -> &str {
            "Liar"
        }

        fn operations(&self) -> Vec<String> {
            vec!["summarize".to_string()]
        }

        async fn invoke(&self, _operation: &str, _input: Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn loader() -> DynamicLoader {
        let echo = chat_entry("EchoChat", |args: &ResolvedArguments| {
            Ok(EchoChat {
                model: args.require_str("model_name")?.to_string(),
            })
        });
        let summarize_only = PluginEntry::new("Summarizer", &["summarize"], |_| {
            Ok(Arc::new(Liar) as Arc<dyn PluginObject>)
        });
        let liar = PluginEntry::new("Liar", &[GENERATE_RESPONSE], |_| {
            Ok(Arc::new(Liar) as Arc<dyn PluginObject>)
        });
        let failing = PluginEntry::new("Failing", &[GENERATE_RESPONSE], |args| {
            Err(anyhow!(
                "auth rejected key {}",
                args.optional_str("api_key")?.unwrap_or_default()
            ))
        });

        DynamicLoader::new(
            ModuleTable::new()
                .with_unit(CodeUnit::new("acme.chat").export(ENTRY_SYMBOL, echo))
                .with_unit(CodeUnit::new("acme.summary").export(ENTRY_SYMBOL, summarize_only))
                .with_unit(CodeUnit::new("acme.liar").export(ENTRY_SYMBOL, liar))
                .with_unit(CodeUnit::new("acme.failing").export(ENTRY_SYMBOL, failing))
                .with_unit(CodeUnit::new("acme.empty").export("SomethingElse", echo_like())),
        )
    }

    fn echo_like() -> PluginEntry {
        chat_entry("Other", |_| Ok(EchoChat { model: "x".into() }))
    }

    fn args(value: Value) -> ResolvedArguments {
        match value {
            Value::Object(map) => ResolvedArguments::new(map),
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_load_and_construct() {
        let constructor = loader().load::<dyn ChatCapability>("acme.chat").unwrap();
        let chat = constructor(&args(json!({"model_name": "gpt-35"}))).unwrap();
        assert_eq!(chat.generate_response("hi", "").await.unwrap(), "gpt-35: hi");
    }

    #[test]
    fn test_double_colon_location() {
        assert!(loader().load::<dyn ChatCapability>("acme::chat").is_ok());
    }

    #[test]
    fn test_unknown_module() {
        let err = loader().load::<dyn ChatCapability>("acme.missing").err().unwrap();
        match err {
            CapabilityError::ModuleNotFound { location, reason } => {
                assert_eq!(location, "acme.missing");
                assert!(reason.contains("acme.chat"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_table_reason() {
        let err = DynamicLoader::default()
            .load::<dyn ChatCapability>("acme.chat")
            .err()
            .unwrap();
        assert!(err.to_string().contains("no code units are registered"));
    }

    #[test]
    fn test_entry_point_missing() {
        let err = loader().load::<dyn ChatCapability>("acme.empty").err().unwrap();
        assert!(matches!(
            err,
            CapabilityError::EntryPointMissing { ref symbol, .. } if symbol == ENTRY_SYMBOL
        ));
    }

    #[test]
    fn test_declared_operations_checked_at_load() {
        let err = loader().load::<dyn ChatCapability>("acme.summary").err().unwrap();
        match err {
            CapabilityError::ContractNotSatisfied { missing, contract, .. } => {
                assert_eq!(contract, "chat");
                assert_eq!(missing, vec![GENERATE_RESPONSE.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_constructed_object_checked_before_exposure() {
        let constructor = loader().load::<dyn ChatCapability>("acme.liar").unwrap();
        let err = constructor(&ResolvedArguments::default()).err().unwrap();
        assert!(matches!(err, CapabilityError::ContractNotSatisfied { .. }));
    }

    #[test]
    fn test_construction_failure_is_wrapped_and_redacted() {
        let constructor = loader().load::<dyn ChatCapability>("acme.failing").unwrap();
        let mut a = ResolvedArguments::default();
        a.insert("api_key", json!("sk-live-123"), true);

        let err = constructor(&a).err().unwrap();
        let CapabilityError::CapabilityConstructionFailed { type_tag, cause } = err else {
            panic!("expected construction failure");
        };
        assert_eq!(type_tag, EXTERNAL_TAG);
        assert!(cause.message().contains("acme.failing"));
        assert!(cause.message().contains("***"));
        assert!(!cause.message().contains("sk-live-123"));
    }

    #[test]
    fn test_library_paths() {
        assert!(is_library_path("./plugins/libacme.so"));
        assert!(is_library_path("acme.dll"));
        assert!(is_library_path("libacme.so.1"));
        assert!(is_library_path("libc.so.6"));
        assert!(!is_library_path("acme.solver"));
        assert!(is_library_path("C:\\plugins\\acme"));
        assert!(!is_library_path("acme.chat"));
        assert!(!is_library_path("acme::chat"));
    }

    #[cfg(not(feature = "native-plugins"))]
    #[test]
    fn test_library_path_without_feature() {
        for location in ["./libacme_chat.so", "libacme_chat.so.1"] {
            let err = loader().load::<dyn ChatCapability>(location).err().unwrap();
            match err {
                CapabilityError::ModuleNotFound { reason, .. } => {
                    assert!(reason.contains("native-plugins"), "{location}: {reason}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
