//! Shared-library plugins.
//!
//! The library must export [`ENTRY_SYMBOL`](super::ENTRY_SYMBOL) as a
//! `fn() -> PluginEntry`, normally via `declare_capability_entry!`, and must
//! be built with the same compiler and crate version as the host.

use libloading::{Library, Symbol};

use crate::error::CapabilityError;

use super::plugin::PluginEntry;
use super::ENTRY_SYMBOL;

type EntryFn = fn() -> PluginEntry;

/// Open the library at `location` and call its entry symbol.
///
/// The library stays mapped for the rest of the process: objects built by
/// the entry execute its code for as long as the slot lives.
pub(crate) fn load_entry(location: &str) -> Result<PluginEntry, CapabilityError> {
    // SAFETY: running a library's initializers is inherent to loading a
    // plugin; only trusted locations belong in a capability document.
    let library = unsafe { Library::new(location) }.map_err(|e| CapabilityError::ModuleNotFound {
        location: location.to_string(),
        reason: e.to_string(),
    })?;
    let library: &'static Library = Box::leak(Box::new(library));

    // SAFETY: the entry symbol's type is fixed by `declare_capability_entry!`.
    let entry: Symbol<'static, EntryFn> =
        unsafe { library.get(ENTRY_SYMBOL.as_bytes()) }.map_err(|_| {
            CapabilityError::EntryPointMissing {
                location: location.to_string(),
                symbol: ENTRY_SYMBOL.to_string(),
            }
        })?;

    log::debug!("Opened shared library {}", location);
    Ok(entry())
}
