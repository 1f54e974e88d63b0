//! # Capability Resolver
//!
//! Configuration-driven selection of capability implementations.
//!
//! Each named slot of a configuration document picks either a built-in
//! implementation (by type tag) or an externally supplied one (tag
//! `plugin` plus a `module` location). Constructor arguments come from the
//! slot block, with `from_env` entries pulled from the environment. The
//! resolved instances are exposed to the application only through the
//! capability trait.
//!
//! ```ignore
//! use capability_resolver::{
//!     CapabilitiesDocument, CapabilityFactory, ChatCapability, ConfigurationBinder,
//! };
//!
//! let document = CapabilitiesDocument::from_path("capabilities.yaml")?;
//! let binder = ConfigurationBinder::<dyn ChatCapability>::new(CapabilityFactory::default());
//! let capabilities = binder.bind_document(&document)?;
//! let chat = capabilities.get("chat").expect("slot configured");
//! ```

pub mod binder;
pub mod config;
pub mod contract;
pub mod env;
pub mod error;
pub mod factory;
pub mod loader;
pub mod providers;
pub mod registry;

pub use binder::{ConfigurationBinder, RuntimeCapabilities};
pub use config::{CapabilitiesDocument, CapabilityConfig, EnvBinding, ResolvedArguments};
pub use contract::{CapabilityContract, ChatCapability};
pub use env::{ArgumentAssembler, EnvSource, EnvironmentResolver, ProcessEnv, ResolvedValue};
pub use error::{
    BindErrors, CapabilityError, DocumentError, EnvValueProblem, SlotError, SlotFailure,
};
pub use factory::CapabilityFactory;
pub use loader::{CodeUnit, DynamicLoader, ModuleTable, PluginEntry, PluginObject};
pub use registry::BuiltinRegistry;
