//! kvmcpu-core — per-CPU time accounting from FreeBSD kernel memory.
//!
//! Provides:
//! - `kvm` — kernel-memory session abstraction, the `libkvm` backend and
//!   the fixed-layout `struct pcpu` decoder
//! - `collector` — the `cpu` collector, the collector registry and the
//!   scrape loop that turns collectors into Prometheus metric families
//! - `config` — collector configuration forwarded from the host

pub mod collector;
pub mod config;
pub mod kvm;

/// Crate version with the git revision it was built from.
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_SHA"), ")");

/// Metric namespace shared by every collector.
pub const NAMESPACE: &str = "node";
