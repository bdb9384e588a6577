//! One scrape across all enabled collectors.

use std::time::Instant;

use prometheus::core::Collector as _;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, TextEncoder};
use tracing::{debug, warn};

use crate::NAMESPACE;
use crate::collector::{CollectError, NamedCollector};

/// Runs collectors and reports per-collector success and duration.
pub struct Scraper {
    collectors: Vec<NamedCollector>,
    duration: GaugeVec,
    success: GaugeVec,
}

impl Scraper {
    pub fn new(collectors: Vec<NamedCollector>) -> Result<Self, CollectError> {
        let duration = GaugeVec::new(
            Opts::new(
                "collector_duration_seconds",
                "Duration of a collector scrape.",
            )
            .namespace(NAMESPACE)
            .subsystem("scrape"),
            &["collector"],
        )?;
        let success = GaugeVec::new(
            Opts::new(
                "collector_success",
                "Whether a collector succeeded.",
            )
            .namespace(NAMESPACE)
            .subsystem("scrape"),
            &["collector"],
        )?;
        Ok(Self {
            collectors,
            duration,
            success,
        })
    }

    pub fn collector_names(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.name.as_str()).collect()
    }

    /// Updates every collector once and returns all families sorted by name.
    ///
    /// A failing collector contributes no families of its own; its failure
    /// shows up as `node_scrape_collector_success{collector} 0`.
    pub fn scrape(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();

        for named in &self.collectors {
            let start = Instant::now();
            let mut emitted = Vec::new();
            let result = named.collector.update(&mut emitted);
            let elapsed = start.elapsed().as_secs_f64();

            let ok = match result {
                Ok(()) => {
                    debug!(collector = %named.name, duration_seconds = elapsed, "collector succeeded");
                    families.append(&mut emitted);
                    1.0
                }
                Err(e) => {
                    warn!(collector = %named.name, duration_seconds = elapsed, error = %e, "collector failed");
                    0.0
                }
            };

            let labels = [named.name.as_str()];
            if let Ok(g) = self.duration.get_metric_with_label_values(&labels) {
                g.set(elapsed);
            }
            if let Ok(g) = self.success.get_metric_with_label_values(&labels) {
                g.set(ok);
            }
        }

        families.extend(
            self.duration
                .collect()
                .into_iter()
                .chain(self.success.collect())
                .filter(|f| !f.get_metric().is_empty()),
        );
        families.sort_by(|a, b| a.get_name().cmp(b.get_name()));
        families
    }
}

/// Renders families in the Prometheus text exposition format.
///
/// Returns the content type together with the body.
pub fn encode_text(families: &[MetricFamily]) -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut body = Vec::new();
    encoder.encode(families, &mut body)?;
    Ok((encoder.format_type().to_string(), body))
}
