//! Abstractions for kernel-memory access to enable testing and mocking.
//!
//! `KernelMemory` opens read-only sessions against the kernel; a session
//! answers the two questions the `cpu` collector asks (how many CPUs, and
//! what a CPU's `pc_cp_time` holds) and is closed when dropped.
//!
//! ```text
//!        ┌──────────────┐   open()   ┌───────────────┐
//!        │ KernelMemory │ ─────────► │ KernelSession │ ── drop ──► close
//!        └──────┬───────┘            └───────┬───────┘
//!               │                            │ cp_time(cpu)
//!       ┌───────┴────────┐           ┌───────▼───────┐
//!       │ Kvm (FreeBSD)  │           │  PcpuLayout   │ (decoder)
//!       │ FakeKernel     │           └───────────────┘
//!       └────────────────┘
//! ```

#[cfg(target_os = "freebsd")]
mod freebsd;
pub mod pcpu;

use thiserror::Error;

#[cfg(target_os = "freebsd")]
pub use freebsd::{Kvm, KvmSession};
pub use pcpu::{CPUSTATES, CpTime, DecodeError, PcpuLayout};

/// Errors reported by a kernel-memory backend.
#[derive(Debug, Error)]
pub enum KernelError {
    /// The session could not be opened; carries the library's error text.
    #[error("{0}")]
    Open(String),
    /// The CPU count query failed.
    #[error("failed to query cpu count: {0}")]
    CpuCount(String),
    /// The per-CPU structure of one CPU could not be read.
    #[error("failed to read per-cpu data of cpu {cpu}: {reason}")]
    PerCpu { cpu: usize, reason: String },
    /// The per-CPU structure was read but does not decode.
    #[error("failed to decode per-cpu data of cpu {cpu}: {error}")]
    Decode { cpu: usize, error: DecodeError },
}

/// Source of read-only kernel-memory sessions.
pub trait KernelMemory: Send + Sync {
    /// Session type. Dropping it closes the session.
    type Session: KernelSession;

    /// Opens a read-only session.
    ///
    /// A failed open never yields a session. If the library hands back a
    /// handle together with an error, the handle is closed before returning.
    fn open(&self) -> Result<Self::Session, KernelError>;
}

/// An open read-only kernel-memory session.
pub trait KernelSession {
    /// Number of CPU slots; valid indices are `0..cpu_count()`.
    fn cpu_count(&self) -> Result<usize, KernelError>;

    /// Reads the time buckets of one CPU.
    ///
    /// Returns `Ok(None)` when the kernel reports the CPU as absent.
    fn cp_time(&self, cpu: usize) -> Result<Option<CpTime>, KernelError>;
}
