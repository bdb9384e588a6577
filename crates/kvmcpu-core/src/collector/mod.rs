//! Prometheus collectors backed by kernel memory.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Scraper                           │
//! │   scrape() ── per collector ──► update(&mut sink)        │
//! │   + node_scrape_collector_{success,duration_seconds}     │
//! └──────────────┬───────────────────────────────────────────┘
//!                │ built by
//!       ┌────────▼──────────┐        ┌──────────────────────┐
//!       │ CollectorRegistry │ "cpu"─►│ CpuCollector<K, C>   │
//!       └───────────────────┘        │  - Credentials       │
//!                                    │  - KernelMemory      │
//!                                    └──────────┬───────────┘
//!                                               │
//!                                ┌──────────────┼──────────────┐
//!                         ┌──────▼──────┐              ┌───────▼──────┐
//!                         │ Kvm         │              │ FakeKernel   │
//!                         │ (FreeBSD)   │              │ (Testing)    │
//!                         └─────────────┘              └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use kvmcpu_core::collector::mock::{FakeKernel, FixedCredentials};
//! use kvmcpu_core::collector::{Collector, CpuCollector};
//! use kvmcpu_core::config::Config;
//!
//! let collector = CpuCollector::new(Config::default(), FakeKernel::typical_system())
//!     .unwrap()
//!     .with_credentials(FixedCredentials::root());
//! let mut families = Vec::new();
//! collector.update(&mut families).unwrap();
//! assert_eq!(families[0].get_metric().len(), 20);
//! ```

pub mod cpu;
mod error;
pub mod mock;
pub mod privilege;
pub mod registry;
pub mod scrape;

use prometheus::proto::MetricFamily;

pub use cpu::{CpuCollector, CpuMode};
pub use error::CollectError;
pub use privilege::{Credentials, ProcessCredentials};
pub use registry::{CollectorRegistry, Factory, NamedCollector, RegistryError, default_registry};
pub use scrape::{Scraper, encode_text};

/// Destination for metric families produced by an update.
pub trait MetricSink {
    fn emit(&mut self, family: MetricFamily);
}

impl MetricSink for Vec<MetricFamily> {
    fn emit(&mut self, family: MetricFamily) {
        self.push(family);
    }
}

/// A source of metrics that the host refreshes on every scrape.
pub trait Collector: Send + Sync {
    /// Reads current values and emits them through `sink`.
    ///
    /// Nothing is emitted when an error is returned.
    fn update(&self, sink: &mut dyn MetricSink) -> Result<(), CollectError>;
}
