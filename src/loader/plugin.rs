//! What an externally loaded code unit exports.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::config::ResolvedArguments;

/// An instance produced by a plugin entry.
///
/// Operations are invoked by name with a structured input, which lets the
/// loader check a foreign implementation against a contract by the
/// operations it actually exposes rather than by its concrete type.
#[async_trait]
pub trait PluginObject: Send + Sync + fmt::Debug {
    /// Implementation name for diagnostics.
    fn name(&self) -> &str;

    /// Operations this instance implements.
    fn operations(&self) -> Vec<String>;

    /// Invoke `operation` with a structured input.
    async fn invoke(&self, operation: &str, input: Value) -> Result<Value>;
}

type Constructor = dyn Fn(&ResolvedArguments) -> Result<Arc<dyn PluginObject>> + Send + Sync;

/// The canonical entry a code unit exports: a named factory that declares
/// which operations its instances provide.
#[derive(Clone)]
pub struct PluginEntry {
    name: String,
    operations: Vec<String>,
    constructor: Arc<Constructor>,
}

impl PluginEntry {
    pub fn new<F>(name: &str, operations: &[&str], constructor: F) -> Self
    where
        F: Fn(&ResolvedArguments) -> Result<Arc<dyn PluginObject>> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            operations: operations.iter().map(|op| (*op).to_string()).collect(),
            constructor: Arc::new(constructor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operations the entry declares for its instances.
    pub fn operations(&self) -> &[String] {
        &self.operations
    }

    /// Run the factory.
    pub fn construct(&self, args: &ResolvedArguments) -> Result<Arc<dyn PluginObject>> {
        (self.constructor)(args)
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}
