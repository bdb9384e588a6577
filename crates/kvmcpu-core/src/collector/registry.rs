//! Name → constructor table the host builds its collector set from.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::collector::{CollectError, Collector};
use crate::config::Config;

/// Builds a collector from the host configuration.
pub type Factory = Box<dyn Fn(&Config) -> Result<Box<dyn Collector>, CollectError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown collector {name:?} (available: {available})")]
    Unknown { name: String, available: String },
    #[error("failed to build collector {name:?}: {error}")]
    Build { name: String, error: CollectError },
}

/// A constructed collector together with its registry key.
pub struct NamedCollector {
    pub name: String,
    pub collector: Box<dyn Collector>,
}

impl fmt::Debug for NamedCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCollector")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of collector factories keyed by short name.
#[derive(Default)]
pub struct CollectorRegistry {
    factories: BTreeMap<String, Factory>,
}

impl fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Config) -> Result<Box<dyn Collector>, CollectError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Constructs the collectors named in `enabled`, in that order.
    pub fn build<S: AsRef<str>>(
        &self,
        config: &Config,
        enabled: &[S],
    ) -> Result<Vec<NamedCollector>, RegistryError> {
        let mut collectors = Vec::with_capacity(enabled.len());
        for name in enabled {
            let name = name.as_ref();
            let factory = self
                .factories
                .get(name)
                .ok_or_else(|| RegistryError::Unknown {
                    name: name.to_string(),
                    available: self.names().join(", "),
                })?;
            let collector = factory(config).map_err(|error| RegistryError::Build {
                name: name.to_string(),
                error,
            })?;
            info!(collector = name, "collector enabled");
            collectors.push(NamedCollector {
                name: name.to_string(),
                collector,
            });
        }
        Ok(collectors)
    }
}

/// Registry holding every collector this crate provides.
///
/// `cpu` reads live kernel memory through `libkvm`. On other targets it is
/// still listed, but building it fails with `CollectError::Unsupported`.
pub fn default_registry() -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.register(super::cpu::CPU_COLLECTOR, cpu_factory);
    registry
}

#[cfg(target_os = "freebsd")]
fn cpu_factory(config: &Config) -> Result<Box<dyn Collector>, CollectError> {
    use crate::collector::CpuCollector;
    use crate::kvm::Kvm;

    Ok(Box::new(CpuCollector::new(config.clone(), Kvm::new())?))
}

#[cfg(not(target_os = "freebsd"))]
fn cpu_factory(_config: &Config) -> Result<Box<dyn Collector>, CollectError> {
    Err(CollectError::Unsupported {
        collector: super::cpu::CPU_COLLECTOR,
        os: std::env::consts::OS,
    })
}
