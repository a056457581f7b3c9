//! Samples per-interface receive/transmit byte counters from the kernel's
//! interface-statistics table (`/proc/net/dev`).

const NAME: &str = "network_interfaces";

pub mod stats;

use crate::config::Config;
use crate::samplers::{CounterSource, RawSample, SourceResult, SAMPLERS};
use crate::warn;

use async_trait::async_trait;
use linkme::distributed_slice;

use std::path::PathBuf;
use std::sync::Arc;

#[distributed_slice(SAMPLERS)]
fn init(config: Arc<Config>) -> SourceResult {
    if !config.enabled(NAME) {
        return Ok(None);
    }

    // probe the stats file so a host without it disables the source instead
    // of failing every pass
    if let Err(e) = std::fs::read_to_string(PROC_NET_DEV) {
        warn!("{NAME}: {PROC_NET_DEV} is not readable, source disabled: {e}");
        return Ok(None);
    }

    Ok(Some(Box::new(Interfaces::new(PROC_NET_DEV))))
}

const PROC_NET_DEV: &str = "/proc/net/dev";

// number of header lines before the per-interface records
const HEADER_LINES: usize = 2;

// whitespace-delimited fields per record: device plus 8 receive and 8
// transmit counters
const MIN_FIELDS: usize = 10;

const RECEIVE_BYTES_FIELD: usize = 1;
const TRANSMIT_BYTES_FIELD: usize = 9;

pub struct Interfaces {
    path: PathBuf,
}

impl Interfaces {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CounterSource for Interfaces {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn poll(&self) -> anyhow::Result<Vec<RawSample>> {
        let data = tokio::fs::read_to_string(&self.path).await?;

        Ok(parse_net_dev(&data))
    }
}

/// Parse the interface-statistics table. Lines that do not match the
/// expected shape are skipped, never fatal.
fn parse_net_dev(data: &str) -> Vec<RawSample> {
    let mut samples = Vec::new();

    for line in data.lines().skip(HEADER_LINES) {
        let parts: Vec<&str> = line.split_whitespace().collect();

        if parts.len() < MIN_FIELDS {
            continue;
        }

        let device = parts[0].strip_suffix(':').unwrap_or(parts[0]);

        let receive = parts[RECEIVE_BYTES_FIELD].parse::<u64>();
        let transmit = parts[TRANSMIT_BYTES_FIELD].parse::<u64>();

        if let (Ok(receive), Ok(transmit)) = (receive, transmit) {
            samples.push(RawSample::InterfaceBytes {
                device: device.to_string(),
                receive,
                transmit,
            });
        }
    }

    samples
}
