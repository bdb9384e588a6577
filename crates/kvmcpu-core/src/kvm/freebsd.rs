//! `libkvm` backend.
//!
//! Binds the four `libkvm` calls the collector needs. Every session owns
//! one `kvm_t` handle and closes it in `Drop`; every `kvm_getpcpu` copy is
//! released with `free(3)` as soon as it has been decoded.

use std::ffi::CStr;
use std::ptr::{self, NonNull};
use std::slice;

use libc::{c_char, c_int, c_void};
use tracing::debug;

use super::{CpTime, KernelError, KernelMemory, KernelSession, PcpuLayout};

/// `_POSIX2_LINE_MAX` from `limits.h`; the size `kvm_openfiles` expects.
const POSIX2_LINE_MAX: usize = 2048;

/// Opaque `kvm_t`.
#[repr(C)]
struct KvmT {
    _private: [u8; 0],
}

unsafe extern "C" {
    fn kvm_openfiles(
        execfile: *const c_char,
        corefile: *const c_char,
        swapfile: *const c_char,
        flags: c_int,
        errbuf: *mut c_char,
    ) -> *mut KvmT;
    fn kvm_close(kd: *mut KvmT) -> c_int;
    fn kvm_geterr(kd: *mut KvmT) -> *mut c_char;
    fn kvm_getncpus(kd: *mut KvmT) -> c_int;
    fn kvm_getpcpu(kd: *mut KvmT, cpu: c_int) -> *mut c_void;
}

/// Live kernel memory of the running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct Kvm {
    layout: PcpuLayout,
}

impl Kvm {
    /// Creates a backend using the `struct pcpu` layout of the build target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the `struct pcpu` layout.
    pub fn with_layout(layout: PcpuLayout) -> Self {
        Self { layout }
    }
}

impl KernelMemory for Kvm {
    type Session = KvmSession;

    fn open(&self) -> Result<KvmSession, KernelError> {
        let mut errbuf = [0u8; POSIX2_LINE_MAX];

        // SAFETY: null paths select the running kernel and /dev/mem; errbuf
        // is _POSIX2_LINE_MAX bytes as kvm_openfiles(3) requires.
        let kd = unsafe {
            kvm_openfiles(
                ptr::null(),
                ptr::null(),
                ptr::null(),
                libc::O_RDONLY,
                errbuf.as_mut_ptr().cast(),
            )
        };

        let message = CStr::from_bytes_until_nul(&errbuf)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        match NonNull::new(kd) {
            Some(kd) => {
                // Closed on drop, also when the error buffer says the open failed.
                let session = KvmSession {
                    kd,
                    layout: self.layout,
                };
                if !message.is_empty() {
                    return Err(KernelError::Open(message));
                }
                debug!(layout = self.layout.name, "kvm session opened");
                Ok(session)
            }
            None if message.is_empty() => Err(KernelError::Open(
                "kvm_openfiles returned no handle".to_string(),
            )),
            None => Err(KernelError::Open(message)),
        }
    }
}

/// Open `kvm_t` handle.
pub struct KvmSession {
    kd: NonNull<KvmT>,
    layout: PcpuLayout,
}

// SAFETY: the handle is owned exclusively by this session and libkvm keeps
// no thread-local state for it.
unsafe impl Send for KvmSession {}

impl KvmSession {
    fn last_error(&self) -> String {
        // SAFETY: kd is a live handle; kvm_geterr returns a pointer into it.
        let err = unsafe { kvm_geterr(self.kd.as_ptr()) };
        if err.is_null() {
            return String::new();
        }
        // SAFETY: libkvm keeps the message NUL-terminated.
        unsafe { CStr::from_ptr(err) }
            .to_string_lossy()
            .into_owned()
    }
}

impl KernelSession for KvmSession {
    fn cpu_count(&self) -> Result<usize, KernelError> {
        // SAFETY: kd is a live handle.
        let ncpus = unsafe { kvm_getncpus(self.kd.as_ptr()) };
        usize::try_from(ncpus).map_err(|_| KernelError::CpuCount(self.last_error()))
    }

    fn cp_time(&self, cpu: usize) -> Result<Option<CpTime>, KernelError> {
        let index = c_int::try_from(cpu).map_err(|_| KernelError::PerCpu {
            cpu,
            reason: "cpu index out of range".to_string(),
        })?;

        // SAFETY: kd is a live handle.
        let raw = unsafe { kvm_getpcpu(self.kd.as_ptr(), index) };
        if raw.is_null() {
            return Ok(None);
        }
        if raw as usize == usize::MAX {
            return Err(KernelError::PerCpu {
                cpu,
                reason: self.last_error(),
            });
        }

        let copy = PcpuCopy(raw);
        // SAFETY: kvm_getpcpu returns a heap copy of a whole struct pcpu,
        // which is larger than the prologue the layout describes.
        let image = unsafe { slice::from_raw_parts(copy.0.cast::<u8>(), self.layout.image_len()) };
        self.layout
            .decode(image)
            .map(Some)
            .map_err(|error| KernelError::Decode { cpu, error })
    }
}

impl Drop for KvmSession {
    fn drop(&mut self) {
        // SAFETY: kd came from kvm_openfiles and is closed only here.
        unsafe {
            kvm_close(self.kd.as_ptr());
        }
        debug!("kvm session closed");
    }
}

/// `kvm_getpcpu` buffer, released with `free(3)`.
struct PcpuCopy(*mut c_void);

impl Drop for PcpuCopy {
    fn drop(&mut self) {
        // SAFETY: the buffer was malloc'd by libkvm and is freed once.
        unsafe { libc::free(self.0) };
    }
}
