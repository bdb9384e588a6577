//! End-to-end flow from registry to text exposition using the fake kernel.

use std::sync::Arc;

use kvmcpu_core::collector::mock::{FakeKernel, FixedCredentials, KernelCounters, OpenFailure};
use kvmcpu_core::collector::{
    CollectError, Collector, CollectorRegistry, CpuCollector, RegistryError, Scraper, encode_text,
};
use kvmcpu_core::config::Config;

fn registry_with(kernel: FakeKernel, credentials: FixedCredentials) -> CollectorRegistry {
    let mut registry = CollectorRegistry::new();
    registry.register("cpu", move |config: &Config| {
        let collector = CpuCollector::new(config.clone(), kernel.clone())?
            .with_credentials(credentials);
        Ok(Box::new(collector) as Box<dyn Collector>)
    });
    registry
}

fn scrape_text(scraper: &Scraper) -> String {
    let (_, body) = encode_text(&scraper.scrape()).unwrap();
    String::from_utf8(body).unwrap()
}

#[test]
fn test_two_core_exposition() {
    let kernel = FakeKernel::with_cores(&[[100, 5, 50, 0, 845], [80, 2, 40, 1, 877]]);
    let registry = registry_with(kernel, FixedCredentials::root());
    let scraper = Scraper::new(registry.build(&Config::default(), &["cpu"]).unwrap()).unwrap();

    let text = scrape_text(&scraper);
    for line in [
        r#"node_cpu{cpu="0",mode="user"} 100"#,
        r#"node_cpu{cpu="0",mode="nice"} 5"#,
        r#"node_cpu{cpu="0",mode="system"} 50"#,
        r#"node_cpu{cpu="0",mode="interrupt"} 0"#,
        r#"node_cpu{cpu="0",mode="idle"} 845"#,
        r#"node_cpu{cpu="1",mode="user"} 80"#,
        r#"node_cpu{cpu="1",mode="nice"} 2"#,
        r#"node_cpu{cpu="1",mode="system"} 40"#,
        r#"node_cpu{cpu="1",mode="interrupt"} 1"#,
        r#"node_cpu{cpu="1",mode="idle"} 877"#,
    ] {
        assert!(text.contains(line), "missing {line} in:\n{text}");
    }
    assert_eq!(text.lines().filter(|l| l.starts_with("node_cpu{")).count(), 10);
}

#[test]
fn test_repeated_scrapes_are_identical() {
    let registry = registry_with(FakeKernel::typical_system(), FixedCredentials::root());
    let scraper = Scraper::new(registry.build(&Config::default(), &["cpu"]).unwrap()).unwrap();

    let cpu_lines = |text: &str| -> Vec<String> {
        let mut lines: Vec<_> = text
            .lines()
            .filter(|l| l.starts_with("node_cpu{"))
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    };

    let first = cpu_lines(&scrape_text(&scraper));
    let second = cpu_lines(&scrape_text(&scraper));
    assert_eq!(first.len(), 20);
    assert_eq!(first, second);
}

#[test]
fn test_unprivileged_scrape_reports_failure() {
    let kernel = FakeKernel::typical_system();
    let counters: Arc<KernelCounters> = kernel.counters();
    let registry = registry_with(kernel, FixedCredentials::unprivileged());
    let scraper = Scraper::new(registry.build(&Config::default(), &["cpu"]).unwrap()).unwrap();

    let text = scrape_text(&scraper);
    assert!(!text.contains("node_cpu{"));
    assert!(text.contains(r#"node_scrape_collector_success{collector="cpu"} 0"#));
    assert_eq!(counters.open_attempts(), 0);
}

#[test]
fn test_open_failure_surfaces_library_text() {
    let kernel = FakeKernel::typical_system()
        .fail_open(OpenFailure::NoHandle("/dev/mem: Permission denied".into()));
    let collector = CpuCollector::new(Config::default(), kernel)
        .unwrap()
        .with_credentials(FixedCredentials::kmem_member(1000));

    let mut families = Vec::new();
    let err = collector.update(&mut families).unwrap_err();
    assert!(matches!(err, CollectError::Open(_)));
    assert!(err.to_string().contains("/dev/mem: Permission denied"));
    assert!(families.is_empty());
}

#[test]
fn test_sparse_cpus_are_skipped() {
    let registry = registry_with(FakeKernel::sparse_system(), FixedCredentials::root());
    let scraper = Scraper::new(registry.build(&Config::default(), &["cpu"]).unwrap()).unwrap();

    let text = scrape_text(&scraper);
    assert!(text.contains(r#"node_cpu{cpu="2",mode="idle"} 90100"#));
    assert!(!text.contains(r#"cpu="1""#));
    assert!(!text.contains(r#"cpu="3""#));
}

#[test]
fn test_config_file_reaches_collector() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"kmem_gid": 9}}"#).unwrap();
    let config = Config::from_file(file.path()).unwrap();

    // gid 9 only counts as kmem when the configured group is honored.
    let registry = registry_with(FakeKernel::typical_system(), FixedCredentials::new(1000, 9));
    let scraper = Scraper::new(registry.build(&config, &["cpu"]).unwrap()).unwrap();
    assert!(scrape_text(&scraper).contains(r#"node_scrape_collector_success{collector="cpu"} 1"#));
}

#[test]
fn test_unknown_collector() {
    let registry = registry_with(FakeKernel::new(), FixedCredentials::root());
    let err = registry.build(&Config::default(), &["meminfo"]).unwrap_err();
    assert!(matches!(err, RegistryError::Unknown { .. }));
}
