//! Configuration binder: assemble then create, per named slot.
//!
//! Slots are resolved in document order. Every slot is attempted even after
//! an earlier one fails so that a misconfigured document is reported in one
//! pass; if any slot failed, nothing is handed to the application.

use std::fmt;
use std::sync::Arc;

use crate::config::{CapabilitiesDocument, CapabilityConfig};
use crate::contract::CapabilityContract;
use crate::env::{ArgumentAssembler, EnvSource, ProcessEnv};
use crate::error::{BindErrors, CapabilityError, SlotError, SlotFailure};
use crate::factory::CapabilityFactory;

// ---------------------------------------------------------------------------
// RuntimeCapabilities
// ---------------------------------------------------------------------------

/// Bound capability instances, read-only once handed out.
pub struct RuntimeCapabilities<C: ?Sized> {
    slots: Vec<(String, Arc<C>)>,
}

impl<C: ?Sized> RuntimeCapabilities<C> {
    /// Instance bound under `slot`.
    pub fn get(&self, slot: &str) -> Option<Arc<C>> {
        self.slots
            .iter()
            .find(|(name, _)| name == slot)
            .map(|(_, instance)| Arc::clone(instance))
    }

    /// Slot names in binding order.
    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<C>)> {
        self.slots.iter().map(|(name, instance)| (name.as_str(), instance))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<C: ?Sized> Clone for RuntimeCapabilities<C> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for RuntimeCapabilities<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeCapabilities")
            .field("slots", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ConfigurationBinder
// ---------------------------------------------------------------------------

/// Resolves capability slots into instances of contract `C`.
pub struct ConfigurationBinder<C: CapabilityContract + ?Sized, E = ProcessEnv> {
    assembler: ArgumentAssembler<E>,
    factory: CapabilityFactory<C>,
    bound: Vec<(String, Arc<C>)>,
}

impl<C: CapabilityContract + ?Sized> ConfigurationBinder<C, ProcessEnv> {
    /// Binder reading the process environment.
    pub fn new(factory: CapabilityFactory<C>) -> Self {
        Self::with_assembler(ArgumentAssembler::new(), factory)
    }
}

impl<C: CapabilityContract + ?Sized, E: EnvSource> ConfigurationBinder<C, E> {
    pub fn with_assembler(assembler: ArgumentAssembler<E>, factory: CapabilityFactory<C>) -> Self {
        Self {
            assembler,
            factory,
            bound: Vec::new(),
        }
    }

    pub fn factory(&self) -> &CapabilityFactory<C> {
        &self.factory
    }

    /// Assemble arguments for `config` and create its instance without
    /// attaching it to any slot.
    pub fn resolve(&self, config: &CapabilityConfig) -> Result<Arc<C>, CapabilityError> {
        let arguments = self.assembler.assemble(config)?;
        log::debug!(
            "Assembled {} argument(s) for {} capability: {:?}",
            arguments.len(),
            config.type_tag,
            arguments
        );
        self.factory
            .create(&config.type_tag, &arguments, config.location.as_deref())
    }

    /// Resolve `config` and attach the instance under `slot`.
    ///
    /// A slot name can be bound only once.
    pub fn bind(&mut self, slot: &str, config: &CapabilityConfig) -> Result<Arc<C>, SlotError> {
        if self.bound.iter().any(|(name, _)| name == slot) {
            return Err(SlotError {
                slot: slot.to_string(),
                source: SlotFailure::DuplicateSlot,
            });
        }

        let instance = self.resolve(config).map_err(|e| SlotError {
            slot: slot.to_string(),
            source: e.into(),
        })?;

        log::info!(
            "Bound capability slot {} ({} {})",
            slot,
            C::NAME,
            config.type_tag
        );
        self.bound.push((slot.to_string(), Arc::clone(&instance)));
        Ok(instance)
    }

    /// Bind every slot of `document`, then hand over the result.
    ///
    /// All slots are attempted. If any of them failed the bound instances
    /// are dropped and every failure is returned together.
    pub fn bind_document(
        mut self,
        document: &CapabilitiesDocument,
    ) -> Result<RuntimeCapabilities<C>, BindErrors> {
        let mut failures = Vec::new();

        for (slot, block) in document.slots() {
            let result = CapabilityConfig::from_value(block)
                .map_err(|e| SlotError {
                    slot: slot.to_string(),
                    source: e.into(),
                })
                .and_then(|config| self.bind(slot, &config));

            if let Err(e) = result {
                log::error!("Capability slot {} failed: {}", slot, e.source);
                failures.push(e);
            }
        }

        if failures.is_empty() {
            Ok(self.finish())
        } else {
            Err(BindErrors { failures })
        }
    }

    /// Freeze the slots bound so far.
    pub fn finish(self) -> RuntimeCapabilities<C> {
        RuntimeCapabilities { slots: self.bound }
    }
}

impl<C: CapabilityContract + ?Sized, E> fmt::Debug for ConfigurationBinder<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBinder")
            .field("factory", &self.factory)
            .field(
                "bound",
                &self.bound.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
