//! Samples event counters populated by kernel-attached probes. The capture
//! side lives in the kernel: pinned hash maps updated on TCP connect/accept
//! and on HTTP GET detection. This source only reads current values.

const NAME: &str = "kernel_events";

pub mod stats;

#[cfg(target_os = "linux")]
mod bpf;

use crate::samplers::{CounterSource, RawSample};
#[cfg(target_os = "linux")]
use crate::samplers::{SourceResult, SAMPLERS};

use async_trait::async_trait;

use stats::{HTTP_REQUESTS, TCP_CONNECTIONS};

#[cfg(target_os = "linux")]
#[distributed_slice(SAMPLERS)]
fn init(config: std::sync::Arc<crate::config::Config>) -> SourceResult {
    use crate::warn;

    if !config.enabled(NAME) {
        return Ok(None);
    }

    let pin_path = config.general().bpf_pin_path();

    let tcp = match bpf::PinnedMap::open(format!("{pin_path}/{TCP_MAP}")) {
        Ok(map) => Some(Box::new(map) as Box<dyn KeyedCounterTable>),
        Err(e) => {
            warn!("{NAME}: tcp counter table unavailable: {e}");
            None
        }
    };

    let http = match bpf::PinnedMap::open(format!("{pin_path}/{HTTP_MAP}")) {
        Ok(map) => Some(Box::new(map) as Box<dyn KeyedCounterTable>),
        Err(e) => {
            warn!("{NAME}: http counter table unavailable: {e}");
            None
        }
    };

    if tcp.is_none() && http.is_none() {
        return Ok(None);
    }

    Ok(Some(Box::new(Events::new(tcp, http))))
}

#[cfg(target_os = "linux")]
use linkme::distributed_slice;

// map names match the capture programs' pinned objects
#[cfg(target_os = "linux")]
const TCP_MAP: &str = "tcp_metrics";
#[cfg(target_os = "linux")]
const HTTP_MAP: &str = "http_metrics";

/// A kernel-populated table of 64-bit event counters addressed by small
/// integer keys. The only interface the engine has to kernel event capture.
pub trait KeyedCounterTable: Send + Sync {
    fn lookup(&self, key: u32) -> Option<u64>;
}

/// The tracked event classes. Each maps a fixed key in one of the capture
/// tables to a counter series in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    TcpConnectOutbound,
    TcpAcceptInbound,
    HttpGet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Table {
    Tcp,
    Http,
}

impl EventClass {
    pub const ALL: [EventClass; 3] = [
        EventClass::TcpConnectOutbound,
        EventClass::TcpAcceptInbound,
        EventClass::HttpGet,
    ];

    fn table(&self) -> Table {
        match self {
            Self::TcpConnectOutbound | Self::TcpAcceptInbound => Table::Tcp,
            Self::HttpGet => Table::Http,
        }
    }

    pub fn key(&self) -> u32 {
        match self {
            Self::TcpConnectOutbound => 1,
            Self::TcpAcceptInbound => 2,
            Self::HttpGet => 1,
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            Self::TcpConnectOutbound | Self::TcpAcceptInbound => TCP_CONNECTIONS,
            Self::HttpGet => HTTP_REQUESTS,
        }
    }

    pub fn label(&self) -> (&'static str, &'static str) {
        match self {
            Self::TcpConnectOutbound => ("direction", "outbound"),
            Self::TcpAcceptInbound => ("direction", "inbound"),
            Self::HttpGet => ("method", "GET"),
        }
    }
}

pub struct Events {
    tcp: Option<Box<dyn KeyedCounterTable>>,
    http: Option<Box<dyn KeyedCounterTable>>,
}

impl Events {
    pub fn new(
        tcp: Option<Box<dyn KeyedCounterTable>>,
        http: Option<Box<dyn KeyedCounterTable>>,
    ) -> Self {
        Self { tcp, http }
    }

    fn table(&self, class: EventClass) -> Option<&dyn KeyedCounterTable> {
        match class.table() {
            Table::Tcp => self.tcp.as_deref(),
            Table::Http => self.http.as_deref(),
        }
    }
}

#[async_trait]
impl CounterSource for Events {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn poll(&self) -> anyhow::Result<Vec<RawSample>> {
        let mut samples = Vec::new();

        // a missing key for one class does not block the others
        for class in EventClass::ALL {
            if let Some(count) = self.table(class).and_then(|t| t.lookup(class.key())) {
                samples.push(RawSample::EventCount { class, count });
            }
        }

        Ok(samples)
    }
}

#[cfg(test)]
pub mod testing {
    use super::KeyedCounterTable;

    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// In-memory stand-in for a kernel counter table.
    #[derive(Clone, Default)]
    pub struct FakeTable {
        counts: Arc<Mutex<HashMap<u32, u64>>>,
    }

    impl FakeTable {
        pub fn set(&self, key: u32, value: u64) {
            self.counts.lock().insert(key, value);
        }
    }

    impl KeyedCounterTable for FakeTable {
        fn lookup(&self, key: u32) -> Option<u64> {
            self.counts.lock().get(&key).copied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeTable;
    use super::*;

    #[tokio::test]
    async fn test_poll_reads_all_classes() {
        let tcp = FakeTable::default();
        tcp.set(1, 10);
        tcp.set(2, 20);

        let http = FakeTable::default();
        http.set(1, 30);

        let source = Events::new(Some(Box::new(tcp)), Some(Box::new(http)));
        let samples = source.poll().await.unwrap();

        assert_eq!(
            samples,
            vec![
                RawSample::EventCount {
                    class: EventClass::TcpConnectOutbound,
                    count: 10,
                },
                RawSample::EventCount {
                    class: EventClass::TcpAcceptInbound,
                    count: 20,
                },
                RawSample::EventCount {
                    class: EventClass::HttpGet,
                    count: 30,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_key_skips_class_only() {
        let tcp = FakeTable::default();
        tcp.set(2, 7);

        let source = Events::new(Some(Box::new(tcp)), None);
        let samples = source.poll().await.unwrap();

        assert_eq!(
            samples,
            vec![RawSample::EventCount {
                class: EventClass::TcpAcceptInbound,
                count: 7,
            }]
        );
    }

    #[test]
    fn test_class_series_mapping() {
        assert_eq!(
            EventClass::TcpConnectOutbound.metric_name(),
            "node_tcp_connections_total"
        );
        assert_eq!(
            EventClass::TcpConnectOutbound.label(),
            ("direction", "outbound")
        );
        assert_eq!(
            EventClass::TcpAcceptInbound.label(),
            ("direction", "inbound")
        );
        assert_eq!(EventClass::HttpGet.metric_name(), "node_http_requests_total");
        assert_eq!(EventClass::HttpGet.label(), ("method", "GET"));
    }
}
