//! Lazy module container with cycle-tolerant activation
//!
//! This module provides the name→factory registry the application is built
//! on. Modules are registered up front, receive their configuration subtree
//! in one pass, and are only constructed when first required — activation
//! order follows first use, not registration order, so modules can declare
//! dependencies on each other without a separate topological sort.
//!
//! Circular dependencies are a documented degradation rather than an error:
//! a slot is marked active *before* its factory runs, so a re-entrant
//! `require` of the same name during factory execution returns the
//! [`Placeholder`] value instead of recursing forever. A participant must
//! not assume it can synchronously use a circularly-dependent peer during
//! its own construction.
//!
//! The container is generic over a services type `S` (the application
//! passes its job scheduler) so that it stays independent of everything
//! that is threaded through to factories.

use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Reserved config key carrying the tri-state enable flag
pub const ENABLED_KEY: &str = "_enabled";

/// Reserved config key carrying the per-module log verbosity
pub const LOG_LEVEL_KEY: &str = "_log_level";

// ============================================================================
// Module references and factories
// ============================================================================

/// Type-erased handle to an activated module instance
pub type ModuleRef = Arc<dyn Any + Send + Sync>;

/// Factory capability: given the activation context (container, services,
/// config subtree), produce the module instance. Invoked at most once.
pub type ModuleFactory<S> = Box<dyn FnOnce(&mut ModuleCx<'_, S>) -> Result<ModuleRef>>;

/// Value returned by a re-entrant `require` during the target's own factory
/// execution (the circular-dependency case). Downcasting it to the expected
/// module type fails, which is the signal that the peer is mid-construction.
#[derive(Debug)]
pub struct Placeholder;

fn placeholder_ref() -> ModuleRef {
    Arc::new(Placeholder)
}

// ============================================================================
// Module configuration subtree
// ============================================================================

/// Opaque configuration subtree handed to a module factory
///
/// Holds the raw JSON mapping for one module, including the reserved
/// `_enabled` and `_log_level` keys. Modules deserialize it into their own
/// typed config structs via [`ModuleConfig::parse`].
#[derive(Debug, Clone, Default)]
pub struct ModuleConfig {
    raw: serde_json::Map<String, Value>,
}

impl ModuleConfig {
    /// Build from a JSON value; anything that is not an object yields the
    /// empty mapping
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self { raw: map.clone() },
            _ => Self::default(),
        }
    }

    /// The resolved enable flag: `None` when the reserved key is absent
    pub fn enabled(&self) -> Option<bool> {
        self.raw.get(ENABLED_KEY).and_then(Value::as_bool)
    }

    /// The reserved log-verbosity value, forwarded to the logging layer
    pub fn log_level(&self) -> Option<&str> {
        self.raw.get(LOG_LEVEL_KEY).and_then(Value::as_str)
    }

    /// Look up a raw config value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    /// Deserialize the subtree into a typed config struct
    ///
    /// Reserved keys are stripped first so typed structs do not need to
    /// account for them.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        let mut map = self.raw.clone();
        map.remove(ENABLED_KEY);
        map.remove(LOG_LEVEL_KEY);
        serde_json::from_value(Value::Object(map))
            .map_err(|e| Error::config(format!("invalid module config: {e}")))
    }
}

// ============================================================================
// Module slots
// ============================================================================

/// Activation state of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    /// Registered, factory not yet invoked
    Pending,
    /// Factory invoked (instance present once it returns)
    Active,
}

struct ModuleSlot<S> {
    name: String,
    factory: Option<ModuleFactory<S>>,
    state: ActivationState,
    config: ModuleConfig,
    instance: Option<ModuleRef>,
}

// ============================================================================
// Container
// ============================================================================

/// Name-keyed registry of lazily-activated module singletons
pub struct ModuleContainer<S> {
    // Registration order is preserved so start_enabled is deterministic
    slots: Vec<ModuleSlot<S>>,
}

impl<S> Default for ModuleContainer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ModuleContainer<S> {
    /// Create an empty container
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    /// Register a module factory under a unique name
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory<S>) -> Result<()> {
        let name = name.into();
        if self.index_of(&name).is_some() {
            return Err(Error::config(format!(
                "module name '{name}' is already in use"
            )));
        }
        self.slots.push(ModuleSlot {
            name,
            factory: Some(factory),
            state: ActivationState::Pending,
            config: ModuleConfig::default(),
            instance: None,
        });
        Ok(())
    }

    /// Distribute per-module config subtrees
    ///
    /// For each registered module the subtree is `config[name]` (the empty
    /// mapping when absent). Must run before any activation; the
    /// application enforces that ordering.
    pub fn apply_config(&mut self, config: &Value) -> Result<()> {
        let table = match config {
            Value::Object(map) => Some(map),
            Value::Null => None,
            _ => {
                return Err(Error::config(
                    "module config must be a mapping keyed by module name",
                ))
            }
        };
        for slot in &mut self.slots {
            slot.config = table
                .and_then(|t| t.get(&slot.name))
                .map(ModuleConfig::from_value)
                .unwrap_or_default();
        }
        Ok(())
    }

    /// Resolve a module by name, activating it on first use
    ///
    /// Fails with a config error for unknown names and for modules whose
    /// enable flag is explicitly false. A re-entrant call for a module
    /// whose factory is currently running returns the [`Placeholder`].
    pub fn require(&mut self, services: &mut S, name: &str) -> Result<ModuleRef> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| Error::config(format!("module '{name}' is not registered")))?;

        if self.slots[idx].state == ActivationState::Active {
            // instance is still None while this slot's own factory runs
            return Ok(self.slots[idx]
                .instance
                .clone()
                .unwrap_or_else(placeholder_ref));
        }
        if self.slots[idx].config.enabled() == Some(false) {
            return Err(Error::config(format!("module '{name}' is disabled")));
        }

        let slot = &mut self.slots[idx];
        let factory = slot
            .factory
            .take()
            .ok_or_else(|| Error::config(format!("module '{name}' has no factory")))?;
        // Mark active before the factory runs so nested requires of this
        // name see the placeholder instead of recursing.
        slot.state = ActivationState::Active;
        let config = slot.config.clone();
        let name = slot.name.clone();

        tracing::info!(module = %name, "starting module");
        let instance = {
            let mut cx = ModuleCx {
                container: self,
                services,
                module: &name,
                config: &config,
            };
            factory(&mut cx)?
        };
        self.slots[idx].instance = Some(instance.clone());
        Ok(instance)
    }

    /// Activate every module whose enable flag is explicitly true
    ///
    /// Other modules stay dormant unless pulled in transitively by a
    /// `require` from a starting module.
    pub fn start_enabled(&mut self, services: &mut S) -> Result<()> {
        let names: Vec<String> = self
            .slots
            .iter()
            .filter(|s| s.config.enabled() == Some(true))
            .map(|s| s.name.clone())
            .collect();
        for name in names {
            self.require(services, &name)?;
        }
        Ok(())
    }

    /// Activation state of a registered module
    pub fn state(&self, name: &str) -> Option<ActivationState> {
        self.index_of(name).map(|i| self.slots[i].state)
    }

    /// Per-module log verbosity values from the reserved `_log_level` key
    pub fn log_directives(&self) -> Vec<(String, String)> {
        self.slots
            .iter()
            .filter_map(|s| {
                s.config
                    .log_level()
                    .map(|lvl| (s.name.clone(), lvl.to_string()))
            })
            .collect()
    }
}

// ============================================================================
// Activation context
// ============================================================================

/// Context passed to a module factory during activation
pub struct ModuleCx<'a, S> {
    container: &'a mut ModuleContainer<S>,
    /// Application services threaded through activation (the job scheduler)
    pub services: &'a mut S,
    module: &'a str,
    config: &'a ModuleConfig,
}

impl<S> ModuleCx<'_, S> {
    /// Name of the module currently being constructed
    pub fn module_name(&self) -> &str {
        self.module
    }

    /// Config subtree of the module currently being constructed
    pub fn config(&self) -> &ModuleConfig {
        self.config
    }

    /// Resolve a dependency, activating it if needed
    pub fn require(&mut self, name: &str) -> Result<ModuleRef> {
        self.container.require(self.services, name)
    }
}
