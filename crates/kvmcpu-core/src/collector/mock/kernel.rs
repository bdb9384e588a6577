use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::collector::Credentials;
use crate::config::DEFAULT_KMEM_GID;
use crate::kvm::{CPUSTATES, CpTime, KernelError, KernelMemory, KernelSession, PcpuLayout};

/// How a simulated open fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenFailure {
    /// The library reports an error and returns no handle.
    NoHandle(String),
    /// The library reports an error but also returns a handle.
    PartialHandle(String),
}

#[derive(Debug, Clone, Copy)]
struct ReadFailure {
    cpu: usize,
    every: usize,
}

/// Session bookkeeping shared by a fake kernel and all of its sessions.
#[derive(Debug, Default)]
pub struct KernelCounters {
    attempts: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
    live: AtomicUsize,
}

impl KernelCounters {
    /// Calls to `open`, successful or not.
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Handles created, including partial ones.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Handles closed.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Handles currently open.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// In-memory kernel for testing.
///
/// Each CPU is stored as a raw `struct pcpu` image so reads go through the
/// same `PcpuLayout` decoder as real kernel memory.
#[derive(Debug, Clone)]
pub struct FakeKernel {
    layout: PcpuLayout,
    /// Per-CPU images; `None` marks an absent CPU.
    cpus: Arc<Vec<Option<Vec<u8>>>>,
    open_failure: Option<OpenFailure>,
    cpu_count_failure: bool,
    read_failure: Option<ReadFailure>,
    counters: Arc<KernelCounters>,
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self {
            layout: PcpuLayout::native(),
            cpus: Arc::new(Vec::new()),
            open_failure: None,
            cpu_count_failure: false,
            read_failure: None,
            counters: Arc::new(KernelCounters::default()),
        }
    }
}

impl FakeKernel {
    /// Creates a kernel with no CPUs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a kernel whose CPUs hold the given buckets, in kernel order.
    pub fn with_cores(cores: &[[u64; CPUSTATES]]) -> Self {
        let mut kernel = Self::new();
        for buckets in cores {
            kernel.add_core(*buckets);
        }
        kernel
    }

    /// Appends a CPU with the given buckets.
    pub fn add_core(&mut self, buckets: [u64; CPUSTATES]) {
        let image = self.layout.encode(&CpTime::from_buckets(buckets));
        Arc::make_mut(&mut self.cpus).push(Some(image));
    }

    /// Appends a CPU slot the kernel reports as not present.
    pub fn add_absent_core(&mut self) {
        Arc::make_mut(&mut self.cpus).push(None);
    }

    /// Appends a CPU backed by an arbitrary structure image.
    pub fn add_raw_core(&mut self, image: Vec<u8>) {
        Arc::make_mut(&mut self.cpus).push(Some(image));
    }

    /// Makes every `open` fail.
    pub fn fail_open(mut self, failure: OpenFailure) -> Self {
        self.open_failure = Some(failure);
        self
    }

    /// Makes every CPU count query fail.
    pub fn fail_cpu_count(mut self) -> Self {
        self.cpu_count_failure = true;
        self
    }

    /// Makes reads of `cpu` fail in every session.
    pub fn fail_read_at(self, cpu: usize) -> Self {
        self.fail_read_every(1, cpu)
    }

    /// Makes reads of `cpu` fail in every `every`-th session, starting with the first.
    pub fn fail_read_every(mut self, every: usize, cpu: usize) -> Self {
        self.read_failure = Some(ReadFailure {
            cpu,
            every: every.max(1),
        });
        self
    }

    /// Session counters, shared with clones of this kernel.
    pub fn counters(&self) -> Arc<KernelCounters> {
        Arc::clone(&self.counters)
    }

    fn new_session(&self) -> FakeSession {
        let sequence = self.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        let fail_read = self
            .read_failure
            .filter(|f| sequence % f.every == 0)
            .map(|f| f.cpu);
        FakeSession {
            layout: self.layout,
            cpus: Arc::clone(&self.cpus),
            cpu_count_failure: self.cpu_count_failure,
            fail_read,
            counters: Arc::clone(&self.counters),
        }
    }
}

impl KernelMemory for FakeKernel {
    type Session = FakeSession;

    fn open(&self) -> Result<FakeSession, KernelError> {
        self.counters.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.open_failure {
            None => Ok(self.new_session()),
            Some(OpenFailure::NoHandle(message)) => Err(KernelError::Open(message.clone())),
            Some(OpenFailure::PartialHandle(message)) => {
                let _partial = self.new_session();
                Err(KernelError::Open(message.clone()))
            }
        }
    }
}

/// Open session of a `FakeKernel`.
#[derive(Debug)]
pub struct FakeSession {
    layout: PcpuLayout,
    cpus: Arc<Vec<Option<Vec<u8>>>>,
    cpu_count_failure: bool,
    fail_read: Option<usize>,
    counters: Arc<KernelCounters>,
}

impl KernelSession for FakeSession {
    fn cpu_count(&self) -> Result<usize, KernelError> {
        if self.cpu_count_failure {
            return Err(KernelError::CpuCount("simulated failure".to_string()));
        }
        Ok(self.cpus.len())
    }

    fn cp_time(&self, cpu: usize) -> Result<Option<CpTime>, KernelError> {
        if self.fail_read == Some(cpu) {
            return Err(KernelError::PerCpu {
                cpu,
                reason: "simulated failure".to_string(),
            });
        }
        match self.cpus.get(cpu) {
            Some(Some(image)) => self
                .layout
                .decode(image)
                .map(Some)
                .map_err(|error| KernelError::Decode { cpu, error }),
            Some(None) => Ok(None),
            None => Err(KernelError::PerCpu {
                cpu,
                reason: "no such cpu".to_string(),
            }),
        }
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed effective identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCredentials {
    pub uid: u32,
    pub gid: u32,
}

impl FixedCredentials {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// uid 0, gid 0 (`wheel`).
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    /// Non-root user running with the default kmem group.
    pub fn kmem_member(uid: u32) -> Self {
        Self::new(uid, DEFAULT_KMEM_GID)
    }

    /// Ordinary user, neither root nor kmem.
    pub fn unprivileged() -> Self {
        Self::new(1001, 1001)
    }
}

impl Credentials for FixedCredentials {
    fn effective_uid(&self) -> u32 {
        self.uid
    }

    fn effective_gid(&self) -> u32 {
        self.gid
    }
}
