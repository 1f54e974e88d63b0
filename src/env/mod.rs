//! Environment-sourced constructor arguments.
//!
//! - [`resolver`] - looks up one environment reference and applies the
//!   criticality and masking policy
//! - [`assembler`] - merges resolved values into a slot's arguments

pub mod assembler;
pub mod resolver;

pub use assembler::ArgumentAssembler;
pub use resolver::{EnvSource, EnvironmentResolver, ProcessEnv, ResolvedValue};
