//! Code units linked into the binary and addressed by dotted path.
//!
//! A plugin crate compiled into the application registers its unit in a
//! [`ModuleTable`] during initialization; configuration documents then
//! reference it as `module: acme.chat` without the application naming the
//! crate anywhere else.

use std::collections::HashMap;

use super::plugin::PluginEntry;

/// A loadable unit: a dotted path plus the symbols it exports.
#[derive(Debug, Clone)]
pub struct CodeUnit {
    path: String,
    symbols: HashMap<String, PluginEntry>,
}

impl CodeUnit {
    pub fn new(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            symbols: HashMap::new(),
        }
    }

    /// Export `entry` under `symbol`.
    pub fn export(mut self, symbol: &str, entry: PluginEntry) -> Self {
        self.symbols.insert(symbol.to_string(), entry);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn symbol(&self, name: &str) -> Option<&PluginEntry> {
        self.symbols.get(name)
    }

    /// Exported symbol names, sorted.
    pub fn symbol_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Registered code units, keyed by normalized dotted path.
#[derive(Debug, Clone, Default)]
pub struct ModuleTable {
    units: HashMap<String, CodeUnit>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit, replacing any unit with the same path.
    pub fn register(&mut self, unit: CodeUnit) {
        if self.units.contains_key(unit.path()) {
            log::warn!("Code unit {} registered twice; keeping the latest", unit.path());
        }
        self.units.insert(unit.path().to_string(), unit);
    }

    pub fn with_unit(mut self, unit: CodeUnit) -> Self {
        self.register(unit);
        self
    }

    pub fn get(&self, location: &str) -> Option<&CodeUnit> {
        self.units.get(&normalize_path(location))
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.units.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// `acme::chat`, ` acme.chat ` and `acme.chat` all address the same unit.
pub fn normalize_path(location: &str) -> String {
    location.trim().replace("::", ".")
}
