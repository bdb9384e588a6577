//! The `cpu` collector: per-CPU time buckets from `struct pcpu`.
//!
//! Every update checks privilege, opens a kernel-memory session, reads
//! `pc_cp_time` of each CPU and republishes the raw cumulative ticks as
//! `node_cpu{cpu, mode}`. The session is closed before `update` returns.

use std::sync::{Mutex, PoisonError};

use prometheus::core::Collector as _;
use prometheus::{CounterVec, Opts};
use tracing::{debug, trace};

use crate::NAMESPACE;
use crate::collector::privilege::check_kmem_access;
use crate::collector::{CollectError, Collector, Credentials, MetricSink, ProcessCredentials};
use crate::config::Config;
use crate::kvm::{CPUSTATES, CpTime, KernelMemory, KernelSession};

/// Registry key of this collector.
pub const CPU_COLLECTOR: &str = "cpu";

const CPU_METRIC: &str = "cpu";
const CPU_HELP: &str = "Seconds the cpus spent in each mode.";

/// State a CPU spent time in; the `mode` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CpuMode {
    User,
    Nice,
    System,
    Interrupt,
    Idle,
}

impl CpuMode {
    /// All modes, in kernel bucket order.
    pub const ALL: [CpuMode; CPUSTATES] = [
        CpuMode::User,
        CpuMode::Nice,
        CpuMode::System,
        CpuMode::Interrupt,
        CpuMode::Idle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CpuMode::User => "user",
            CpuMode::Nice => "nice",
            CpuMode::System => "system",
            CpuMode::Interrupt => "interrupt",
            CpuMode::Idle => "idle",
        }
    }

    /// Ticks spent in this mode.
    pub fn ticks(self, cp_time: &CpTime) -> u64 {
        match self {
            CpuMode::User => cp_time.user,
            CpuMode::Nice => cp_time.nice,
            CpuMode::System => cp_time.system,
            CpuMode::Interrupt => cp_time.interrupt,
            CpuMode::Idle => cp_time.idle,
        }
    }
}

/// Collector exposing `node_cpu{cpu, mode}`.
///
/// Generic over the kernel backend and the identity source so tests can
/// run it against `FakeKernel` and `FixedCredentials`.
pub struct CpuCollector<K, C = ProcessCredentials> {
    config: Config,
    kernel: K,
    credentials: C,
    /// Label-set reset, value updates and emission happen under this lock.
    cpu: Mutex<CounterVec>,
}

impl<K: KernelMemory> CpuCollector<K> {
    /// Creates a collector reading through `kernel` as the current process.
    ///
    /// Performs no I/O; the counter vector starts without children.
    pub fn new(config: Config, kernel: K) -> Result<Self, CollectError> {
        let opts = Opts::new(CPU_METRIC, CPU_HELP).namespace(NAMESPACE);
        let cpu = CounterVec::new(opts, &["cpu", "mode"])?;
        Ok(Self {
            config,
            kernel,
            credentials: ProcessCredentials,
            cpu: Mutex::new(cpu),
        })
    }
}

impl<K: KernelMemory, C: Credentials> CpuCollector<K, C> {
    /// Replaces the identity used by the privilege check.
    pub fn with_credentials<D: Credentials>(self, credentials: D) -> CpuCollector<K, D> {
        CpuCollector {
            config: self.config,
            kernel: self.kernel,
            credentials,
            cpu: self.cpu,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Reads every present CPU within one session.
    fn read_samples(&self) -> Result<Vec<(usize, CpTime)>, CollectError> {
        check_kmem_access(&self.credentials, self.config.kmem_gid)?;

        let session = self.kernel.open().map_err(CollectError::Open)?;
        let ncpus = session.cpu_count()?;

        let mut samples = Vec::with_capacity(ncpus);
        for cpu in 0..ncpus {
            match session.cp_time(cpu)? {
                Some(cp_time) => samples.push((cpu, cp_time)),
                None => trace!(cpu, "cpu not present, skipping"),
            }
        }
        Ok(samples)
    }
}

impl<K: KernelMemory, C: Credentials> Collector for CpuCollector<K, C> {
    fn update(&self, sink: &mut dyn MetricSink) -> Result<(), CollectError> {
        let samples = self.read_samples()?;

        let cpu = self.cpu.lock().unwrap_or_else(PoisonError::into_inner);
        // Drop children of CPUs that are no longer reported.
        cpu.reset();
        for (index, cp_time) in &samples {
            let label = index.to_string();
            for mode in CpuMode::ALL {
                let counter = cpu.get_metric_with_label_values(&[label.as_str(), mode.as_str()])?;
                counter.inc_by(mode.ticks(cp_time) as f64);
            }
        }

        for family in cpu.collect() {
            if !family.get_metric().is_empty() {
                sink.emit(family);
            }
        }

        debug!(cpus = samples.len(), "cpu collector updated");
        Ok(())
    }
}
