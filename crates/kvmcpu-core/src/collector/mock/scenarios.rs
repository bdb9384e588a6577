//! Pre-built fake kernels for testing.

use super::kernel::FakeKernel;

impl FakeKernel {
    /// Four CPUs a few hours after boot, mostly idle.
    pub fn typical_system() -> Self {
        Self::with_cores(&[
            [125_430, 1_210, 48_902, 3_114, 2_410_377],
            [118_002, 980, 51_337, 2_876, 2_416_904],
            [131_876, 1_455, 46_210, 3_390, 2_406_118],
            [109_544, 702, 44_985, 2_651, 2_431_209],
        ])
    }

    /// A machine with sparse CPU ids: slots 1 and 3 are absent.
    pub fn sparse_system() -> Self {
        let mut kernel = Self::new();
        kernel.add_core([5_000, 10, 2_000, 100, 90_000]);
        kernel.add_absent_core();
        kernel.add_core([4_800, 12, 2_150, 95, 90_100]);
        kernel.add_absent_core();
        kernel
    }
}

#[cfg(test)]
mod tests {
    use crate::kvm::{KernelMemory, KernelSession};

    use super::*;

    #[test]
    fn test_typical_system() {
        let kernel = FakeKernel::typical_system();
        let session = kernel.open().unwrap();
        assert_eq!(session.cpu_count().unwrap(), 4);
        for cpu in 0..4 {
            assert!(session.cp_time(cpu).unwrap().is_some());
        }
    }

    #[test]
    fn test_sparse_system() {
        let kernel = FakeKernel::sparse_system();
        let session = kernel.open().unwrap();
        assert_eq!(session.cpu_count().unwrap(), 4);
        assert!(session.cp_time(1).unwrap().is_none());
        assert!(session.cp_time(3).unwrap().is_none());
    }
}
