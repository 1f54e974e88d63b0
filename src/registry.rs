//! Built-in implementation registry.
//!
//! The table of built-ins for a contract is fixed at compile time by
//! [`CapabilityContract::builtins`]; nothing can be added at runtime. The
//! external-loading tag is never part of it.

use std::fmt;
use std::sync::Arc;

use crate::config::ResolvedArguments;
use crate::contract::CapabilityContract;

/// Constructor of a built-in implementation.
pub type BuiltinConstructor<C> = fn(&ResolvedArguments) -> anyhow::Result<Arc<C>>;

/// One row of a contract's built-in table.
pub struct BuiltinEntry<C: ?Sized> {
    /// Type tag selecting this implementation.
    pub tag: &'static str,
    pub construct: BuiltinConstructor<C>,
}

impl<C: ?Sized> fmt::Debug for BuiltinEntry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinEntry").field("tag", &self.tag).finish()
    }
}

/// Read-only view over the built-in table of contract `C`.
pub struct BuiltinRegistry<C: ?Sized + 'static> {
    entries: &'static [BuiltinEntry<C>],
}

impl<C: CapabilityContract + ?Sized> BuiltinRegistry<C> {
    pub fn new() -> Self {
        Self {
            entries: C::builtins(),
        }
    }

    /// Constructor registered under `type_tag`, if any.
    pub fn lookup(&self, type_tag: &str) -> Option<BuiltinConstructor<C>> {
        self.entries
            .iter()
            .find(|entry| entry.tag == type_tag)
            .map(|entry| entry.construct)
    }

    /// Registered tags in table order.
    pub fn tags(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.tag).collect()
    }
}

impl<C: CapabilityContract + ?Sized> Default for BuiltinRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Clone for BuiltinRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries,
        }
    }
}

impl<C: ?Sized> fmt::Debug for BuiltinRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| entry.tag))
            .finish()
    }
}
