use thiserror::Error;

use crate::kvm::KernelError;

/// Error returned by a failed collector update.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Neither the effective user nor the effective group may read kernel memory.
    #[error(
        "caller should be either root user or kmem group (gid {kmem_gid}) to access /dev/mem \
         (euid {uid}, egid {gid})"
    )]
    Authorization { uid: u32, gid: u32, kmem_gid: u32 },
    /// The kernel-memory session could not be opened.
    #[error("failed to open kernel memory: {0}")]
    Open(KernelError),
    /// A query against an open session failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
    /// The collector has no kernel backend on this target.
    #[error("{collector} collector is not supported on {os}")]
    Unsupported {
        collector: &'static str,
        os: &'static str,
    },
    /// The metric library rejected a descriptor or label set.
    #[error(transparent)]
    Metrics(#[from] prometheus::Error),
}
