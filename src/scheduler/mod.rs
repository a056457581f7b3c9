use crate::config::Config;
use crate::metrics::{DeltaTracker, MetricKind, MetricRegistry, RegistryError};
use crate::samplers::{
    CounterSource, EventClass, RawSample, NETWORK_RECEIVE_BYTES, NETWORK_TRANSMIT_BYTES,
};
use crate::{debug, error, warn};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use std::sync::Arc;
use std::time::{Duration, Instant};

// self-telemetry: completed sampling passes
const SAMPLING_PASSES: &str = "nodepulse_sampling_passes_total";

// a hanging source read must not starve the next tick
const SOURCE_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Drives the single writer path: on a fixed wall-clock interval, polls every
/// counter source and applies the results to the registry. Runs concurrently
/// with metric exposition and never overlaps its own passes.
pub struct Scheduler {
    registry: Arc<MetricRegistry>,
    sources: Vec<Box<dyn CounterSource>>,
    deltas: DeltaTracker<EventClass>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        registry: Arc<MetricRegistry>,
        sources: Vec<Box<dyn CounterSource>>,
    ) -> Result<Self, RegistryError> {
        // fix every family's kind up front so a conflict is caught at
        // startup instead of mid-pass
        registry.register(NETWORK_RECEIVE_BYTES, MetricKind::Gauge)?;
        registry.register(NETWORK_TRANSMIT_BYTES, MetricKind::Gauge)?;

        for class in EventClass::ALL {
            registry.register(class.metric_name(), MetricKind::Counter)?;
        }

        registry.register(SAMPLING_PASSES, MetricKind::Counter)?;

        Ok(Self {
            registry,
            sources,
            deltas: DeltaTracker::new(),
            period: config.general().interval(),
        })
    }

    /// Run sampling passes until shutdown is signalled. A pass that overruns
    /// the interval defers the next tick; passes never overlap.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.collect().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
    }

    /// One collection pass: poll all sources, then apply the samples. A
    /// failed source is logged and skipped; prior values in the registry are
    /// left untouched so its series simply go stale.
    async fn collect(&mut self) {
        let start = Instant::now();

        let polls: Vec<_> = self
            .sources
            .iter()
            .map(|s| tokio::time::timeout(SOURCE_READ_TIMEOUT, s.poll()))
            .collect();

        let names: Vec<&'static str> = self.sources.iter().map(|s| s.name()).collect();

        let results = futures::future::join_all(polls).await;

        for (name, result) in names.into_iter().zip(results) {
            match result {
                Ok(Ok(samples)) => {
                    for sample in samples {
                        self.apply(sample);
                    }
                }
                Ok(Err(e)) => {
                    warn!("failed to read '{name}' source: {e}");
                }
                Err(_) => {
                    warn!("'{name}' source read timed out");
                }
            }
        }

        if let Err(e) = self.registry.add_to_counter(SAMPLING_PASSES, &[], 1) {
            error!("failed to count sampling pass: {e}");
        }

        debug!("sampling latency: {} us", start.elapsed().as_micros());
    }

    fn apply(&mut self, sample: RawSample) {
        match sample {
            RawSample::InterfaceBytes {
                device,
                receive,
                transmit,
            } => {
                let labels = [("device", device.as_str())];

                if let Err(e) =
                    self.registry
                        .set_gauge(NETWORK_RECEIVE_BYTES, &labels, receive as f64)
                {
                    error!("failed to update receive gauge: {e}");
                }

                if let Err(e) =
                    self.registry
                        .set_gauge(NETWORK_TRANSMIT_BYTES, &labels, transmit as f64)
                {
                    error!("failed to update transmit gauge: {e}");
                }
            }
            RawSample::EventCount { class, count } => {
                let increment = self.deltas.observe(class, count);

                // zero increments still touch the registry so the series
                // exists from the first pass
                if let Err(e) =
                    self.registry
                        .add_to_counter(class.metric_name(), &[class.label()], increment)
                {
                    error!("failed to update event counter: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samplers::testing::FakeTable;
    use crate::samplers::{Events, Interfaces};

    use std::io::Write;

    fn scheduler_with(sources: Vec<Box<dyn CounterSource>>) -> (Scheduler, Arc<MetricRegistry>) {
        let registry = Arc::new(MetricRegistry::new());
        let config = Config::default();
        let scheduler = Scheduler::new(&config, registry.clone(), sources).unwrap();

        (scheduler, registry)
    }

    fn counter_value(registry: &MetricRegistry, name: &str, label: (&str, &str)) -> Option<u64> {
        registry
            .snapshot()
            .counters
            .iter()
            .find(|c| c.name == name && c.metadata.get(label.0).map(|v| v.as_str()) == Some(label.1))
            .map(|c| c.value)
    }

    fn gauge_value(registry: &MetricRegistry, name: &str, device: &str) -> Option<f64> {
        registry
            .snapshot()
            .gauges
            .iter()
            .find(|g| g.name == name && g.metadata.get("device").map(|v| v.as_str()) == Some(device))
            .map(|g| g.value)
    }

    #[tokio::test]
    async fn test_pass_populates_interface_gauges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "header\nheader\n  eth0: 1000 0 0 0 0 0 0 0 2000 0 0 0 0 0 0 0\n"
        )
        .unwrap();

        let (mut scheduler, registry) =
            scheduler_with(vec![Box::new(Interfaces::new(file.path()))]);

        scheduler.collect().await;

        assert_eq!(
            gauge_value(&registry, NETWORK_RECEIVE_BYTES, "eth0"),
            Some(1000.0)
        );
        assert_eq!(
            gauge_value(&registry, NETWORK_TRANSMIT_BYTES, "eth0"),
            Some(2000.0)
        );
    }

    #[tokio::test]
    async fn test_event_counters_accumulate_across_passes() {
        let tcp = FakeTable::default();
        let source = Events::new(Some(Box::new(tcp.clone())), None);

        let (mut scheduler, registry) = scheduler_with(vec![Box::new(source)]);

        // raw 0, 5, 5, 12: first pass is baseline only
        for raw in [0, 5, 5, 12] {
            tcp.set(1, raw);
            scheduler.collect().await;
        }

        assert_eq!(
            counter_value(
                &registry,
                "node_tcp_connections_total",
                ("direction", "outbound")
            ),
            Some(12)
        );
    }

    #[tokio::test]
    async fn test_reset_never_decreases_published_counter() {
        let tcp = FakeTable::default();
        let source = Events::new(Some(Box::new(tcp.clone())), None);

        let (mut scheduler, registry) = scheduler_with(vec![Box::new(source)]);

        for raw in [100, 40, 55] {
            tcp.set(1, raw);
            scheduler.collect().await;
        }

        assert_eq!(
            counter_value(
                &registry,
                "node_tcp_connections_total",
                ("direction", "outbound")
            ),
            Some(15)
        );
    }

    #[tokio::test]
    async fn test_failed_source_leaves_prior_gauges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "header\nheader\n  eth0: 1000 0 0 0 0 0 0 0 2000 0 0 0 0 0 0 0\n"
        )
        .unwrap();

        let path = file.path().to_path_buf();

        let (mut scheduler, registry) = scheduler_with(vec![Box::new(Interfaces::new(&path))]);

        scheduler.collect().await;

        // source becomes unreadable for one pass
        drop(file);
        scheduler.collect().await;

        assert_eq!(
            gauge_value(&registry, NETWORK_RECEIVE_BYTES, "eth0"),
            Some(1000.0)
        );

        // and readable again
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            "header\nheader\n  eth0: 1500 0 0 0 0 0 0 0 2500 0 0 0 0 0 0 0\n"
        )
        .unwrap();

        scheduler.collect().await;

        assert_eq!(
            gauge_value(&registry, NETWORK_RECEIVE_BYTES, "eth0"),
            Some(1500.0)
        );
    }

    #[tokio::test]
    async fn test_counter_series_exist_after_first_pass() {
        let tcp = FakeTable::default();
        tcp.set(1, 100);
        tcp.set(2, 50);

        let source = Events::new(Some(Box::new(tcp)), None);
        let (mut scheduler, registry) = scheduler_with(vec![Box::new(source)]);

        scheduler.collect().await;

        // baselines established, series published at zero
        assert_eq!(
            counter_value(
                &registry,
                "node_tcp_connections_total",
                ("direction", "outbound")
            ),
            Some(0)
        );
        assert_eq!(
            counter_value(
                &registry,
                "node_tcp_connections_total",
                ("direction", "inbound")
            ),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_pass_counter_increments() {
        let (mut scheduler, registry) = scheduler_with(Vec::new());

        scheduler.collect().await;
        scheduler.collect().await;

        let passes = registry
            .snapshot()
            .counters
            .iter()
            .find(|c| c.name == SAMPLING_PASSES)
            .map(|c| c.value);

        assert_eq!(passes, Some(2));
    }
}
