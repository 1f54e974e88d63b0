//! Capability contracts.
//!
//! A contract is the operation set an implementation must provide. In Rust
//! it is a trait; [`CapabilityContract`] is implemented on that trait's
//! object type (`dyn ChatCapability`) to describe it to the resolution
//! machinery:
//!
//! - the operation names an externally loaded implementation is checked
//!   against before it is exposed
//! - the closed table of built-in implementations
//! - how a validated plugin object is adapted to the trait

pub mod chat;

use std::sync::Arc;

use crate::loader::PluginObject;
use crate::registry::BuiltinEntry;

pub use chat::{chat_entry, cleanse_response, ChatCapability, PluginChat};

/// Describes a capability trait to the factory and the loader.
pub trait CapabilityContract: Send + Sync + 'static {
    /// Contract name used in diagnostics.
    const NAME: &'static str;

    /// Operations every implementation must provide.
    const OPERATIONS: &'static [&'static str];

    /// Built-in implementations, keyed by type tag.
    fn builtins() -> &'static [BuiltinEntry<Self>];

    /// Expose a plugin object that passed the operation check.
    fn adapt(object: Arc<dyn PluginObject>) -> Arc<Self>;
}

/// Operations of `C` that `provided` lacks, in contract order.
pub fn missing_operations<C, S>(provided: &[S]) -> Vec<String>
where
    C: CapabilityContract + ?Sized,
    S: AsRef<str>,
{
    C::OPERATIONS
        .iter()
        .filter(|op| !provided.iter().any(|p| p.as_ref() == **op))
        .map(|op| (*op).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_operations() {
        let none: [&str; 0] = [];
        assert_eq!(
            missing_operations::<dyn ChatCapability, _>(&none),
            vec!["generate_response".to_string()]
        );
        assert!(missing_operations::<dyn ChatCapability, _>(&["generate_response", "extra"])
            .is_empty());
    }
}
