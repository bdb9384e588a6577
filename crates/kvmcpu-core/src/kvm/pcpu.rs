//! Decoder for the `pc_cp_time` array of FreeBSD's `struct pcpu`.
//!
//! `kvm_getpcpu(3)` hands back a raw copy of the per-CPU structure. The
//! only part read from it is the leading prologue up to and including
//!
//! ```c
//! long pc_cp_time[CPUSTATES];
//! ```
//!
//! whose offset is fixed per ABI. All layout assumptions live in
//! `PcpuLayout`; decoding works on plain byte slices so it stays safe code.

use std::mem::size_of;

use libc::c_long;
use thiserror::Error;

/// Number of time buckets in `pc_cp_time` (`CPUSTATES` in `sys/resource.h`).
pub const CPUSTATES: usize = 5;

/// Bucket indices from `sys/resource.h`.
pub const CP_USER: usize = 0;
pub const CP_NICE: usize = 1;
pub const CP_SYS: usize = 2;
pub const CP_INTR: usize = 3;
pub const CP_IDLE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("per-cpu image too short: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("negative counter {value} in bucket {bucket}")]
    NegativeCounter { bucket: usize, value: i64 },
}

/// Cumulative ticks a CPU spent in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpTime {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub interrupt: u64,
    pub idle: u64,
}

impl CpTime {
    /// Builds a sample from buckets in kernel order.
    pub fn from_buckets(buckets: [u64; CPUSTATES]) -> Self {
        Self {
            user: buckets[CP_USER],
            nice: buckets[CP_NICE],
            system: buckets[CP_SYS],
            interrupt: buckets[CP_INTR],
            idle: buckets[CP_IDLE],
        }
    }

    /// Buckets in kernel order.
    pub fn buckets(&self) -> [u64; CPUSTATES] {
        let mut buckets = [0; CPUSTATES];
        buckets[CP_USER] = self.user;
        buckets[CP_NICE] = self.nice;
        buckets[CP_SYS] = self.system;
        buckets[CP_INTR] = self.interrupt;
        buckets[CP_IDLE] = self.idle;
        buckets
    }
}

/// Position of `pc_cp_time` inside `struct pcpu` for one ABI.
///
/// The prologue has been stable since FreeBSD 10:
///
/// ```c
/// struct thread *pc_curthread, *pc_idlethread, *pc_fpcurthread, *pc_deadthread;
/// struct pcb    *pc_curpcb;
/// void          *pc_sched;
/// uint64_t       pc_switchtime;
/// int            pc_switchticks;
/// u_int          pc_cpuid;
/// STAILQ_ENTRY(pcpu) pc_allcpu;
/// struct lock_list_entry *pc_spinlocks;
/// long           pc_cp_time[CPUSTATES];
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcpuLayout {
    /// Short name used in logs.
    pub name: &'static str,
    /// Size of `long` (and of a pointer) in bytes.
    pub word_size: usize,
    /// Byte offset of `pc_cp_time`.
    pub cp_time_offset: usize,
}

impl PcpuLayout {
    /// amd64, arm64, powerpc64, riscv64.
    pub const FREEBSD_LP64: Self = Self {
        name: "freebsd-lp64",
        word_size: 8,
        cp_time_offset: 80,
    };

    /// i386, armv7, powerpc.
    pub const FREEBSD_ILP32: Self = Self {
        name: "freebsd-ilp32",
        word_size: 4,
        cp_time_offset: 48,
    };

    /// Layout matching the `long` width of the build target.
    pub const fn native() -> Self {
        if size_of::<c_long>() == 8 {
            Self::FREEBSD_LP64
        } else {
            Self::FREEBSD_ILP32
        }
    }

    /// Bytes of the structure that must be readable to decode it.
    pub const fn image_len(&self) -> usize {
        self.cp_time_offset + CPUSTATES * self.word_size
    }

    /// Decodes `pc_cp_time` from a native-endian structure image.
    pub fn decode(&self, image: &[u8]) -> Result<CpTime, DecodeError> {
        let needed = self.image_len();
        if image.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                actual: image.len(),
            });
        }

        let mut buckets = [0u64; CPUSTATES];
        for (bucket, slot) in buckets.iter_mut().enumerate() {
            let start = self.cp_time_offset + bucket * self.word_size;
            let word = &image[start..start + self.word_size];
            let value = self.read_long(word);
            *slot = u64::try_from(value)
                .map_err(|_| DecodeError::NegativeCounter { bucket, value })?;
        }
        Ok(CpTime::from_buckets(buckets))
    }

    /// Builds a zero-filled structure image holding `cp_time`.
    ///
    /// Used by the fake kernel so fixtures go through the same decoder as
    /// real kernel memory.
    pub fn encode(&self, cp_time: &CpTime) -> Vec<u8> {
        let mut image = vec![0u8; self.image_len()];
        for (bucket, value) in cp_time.buckets().into_iter().enumerate() {
            let start = self.cp_time_offset + bucket * self.word_size;
            let word = &mut image[start..start + self.word_size];
            if self.word_size == 8 {
                word.copy_from_slice(&(value as i64).to_ne_bytes());
            } else {
                word.copy_from_slice(&(value as i32).to_ne_bytes());
            }
        }
        image
    }

    fn read_long(&self, word: &[u8]) -> i64 {
        if self.word_size == 8 {
            i64::from_ne_bytes(word.try_into().unwrap_or_default())
        } else {
            i64::from(i32::from_ne_bytes(word.try_into().unwrap_or_default()))
        }
    }
}

impl Default for PcpuLayout {
    fn default() -> Self {
        Self::native()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CpTime {
        CpTime::from_buckets([100, 5, 50, 0, 845])
    }

    #[test]
    fn test_from_buckets_order() {
        let cp = sample();
        assert_eq!(cp.user, 100);
        assert_eq!(cp.nice, 5);
        assert_eq!(cp.system, 50);
        assert_eq!(cp.interrupt, 0);
        assert_eq!(cp.idle, 845);
        assert_eq!(cp.buckets(), [100, 5, 50, 0, 845]);
    }

    #[test]
    fn test_image_len() {
        assert_eq!(PcpuLayout::FREEBSD_LP64.image_len(), 120);
        assert_eq!(PcpuLayout::FREEBSD_ILP32.image_len(), 68);
    }

    #[test]
    fn test_decode_lp64() {
        let layout = PcpuLayout::FREEBSD_LP64;
        let image = layout.encode(&sample());
        assert_eq!(layout.decode(&image).unwrap(), sample());
    }

    #[test]
    fn test_decode_ilp32() {
        let layout = PcpuLayout::FREEBSD_ILP32;
        let image = layout.encode(&sample());
        assert_eq!(layout.decode(&image).unwrap(), sample());
    }

    #[test]
    fn test_decode_reads_at_offset() {
        // Bytes before pc_cp_time belong to other fields and must be ignored.
        let layout = PcpuLayout::FREEBSD_LP64;
        let mut image = layout.encode(&sample());
        image[..layout.cp_time_offset].fill(0xAB);
        image.extend_from_slice(&[0xCD; 64]);

        assert_eq!(layout.decode(&image).unwrap(), sample());
    }

    #[test]
    fn test_decode_hand_built_image() {
        let layout = PcpuLayout::FREEBSD_LP64;
        let mut image = vec![0u8; 80];
        for value in [7i64, 0, 3, 1, 99] {
            image.extend_from_slice(&value.to_ne_bytes());
        }

        let cp = layout.decode(&image).unwrap();
        assert_eq!(cp, CpTime::from_buckets([7, 0, 3, 1, 99]));
    }

    #[test]
    fn test_decode_truncated() {
        let layout = PcpuLayout::FREEBSD_LP64;
        let image = vec![0u8; 100];

        assert_eq!(
            layout.decode(&image),
            Err(DecodeError::Truncated {
                needed: 120,
                actual: 100
            })
        );
    }

    #[test]
    fn test_decode_negative_counter() {
        let layout = PcpuLayout::FREEBSD_LP64;
        let mut image = layout.encode(&sample());
        let idle = layout.cp_time_offset + CP_IDLE * layout.word_size;
        image[idle..idle + 8].copy_from_slice(&(-1i64).to_ne_bytes());

        assert_eq!(
            layout.decode(&image),
            Err(DecodeError::NegativeCounter {
                bucket: CP_IDLE,
                value: -1
            })
        );
    }

    #[test]
    fn test_native_matches_long() {
        assert_eq!(PcpuLayout::native().word_size, size_of::<c_long>());
    }
}
