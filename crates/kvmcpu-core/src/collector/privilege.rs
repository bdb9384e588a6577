//! Effective process identity and the kernel-memory privilege check.

use tracing::debug;

use crate::collector::CollectError;

/// Source of the effective user and group ids.
pub trait Credentials: Send + Sync {
    fn effective_uid(&self) -> u32;
    fn effective_gid(&self) -> u32;
}

/// Identity of the running process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCredentials;

impl Credentials for ProcessCredentials {
    fn effective_uid(&self) -> u32 {
        // SAFETY: geteuid(2) has no preconditions and cannot fail.
        unsafe { libc::geteuid() }
    }

    fn effective_gid(&self) -> u32 {
        // SAFETY: getegid(2) has no preconditions and cannot fail.
        unsafe { libc::getegid() }
    }
}

/// Fails unless the caller is root or runs with the kmem group.
///
/// This is a fast-fail heuristic for a readable error message. The kernel's
/// own permission check on `/dev/mem` still decides whether the open works.
pub fn check_kmem_access<C: Credentials + ?Sized>(
    credentials: &C,
    kmem_gid: u32,
) -> Result<(), CollectError> {
    let uid = credentials.effective_uid();
    let gid = credentials.effective_gid();
    if uid != 0 && gid != kmem_gid {
        debug!(uid, gid, kmem_gid, "kernel memory access denied");
        return Err(CollectError::Authorization { uid, gid, kmem_gid });
    }
    Ok(())
}
