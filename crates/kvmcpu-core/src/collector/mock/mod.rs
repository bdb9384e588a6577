//! In-memory test doubles for collectors.
//!
//! `FakeKernel` stands in for `libkvm` and counts every session it opens
//! and closes; `FixedCredentials` stands in for the process identity.

mod kernel;
mod scenarios;

pub use kernel::{FakeKernel, FakeSession, FixedCredentials, KernelCounters, OpenFailure};
