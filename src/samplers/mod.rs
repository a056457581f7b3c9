use crate::config::Config;

use async_trait::async_trait;
use linkme::distributed_slice;

use std::sync::Arc;

mod events;
mod interfaces;

pub use events::{EventClass, KeyedCounterTable};
pub use interfaces::stats::{NETWORK_RECEIVE_BYTES, NETWORK_TRANSMIT_BYTES};

#[cfg(test)]
pub use events::testing;
#[cfg(test)]
pub use events::Events;
#[cfg(test)]
pub use interfaces::Interfaces;

#[distributed_slice]
pub static SAMPLERS: [fn(config: Arc<Config>) -> SourceResult] = [..];

/// One raw observation from a counter source: an absolute, monotonic value as
/// of the read. Sources never difference or interpret their counters; the
/// sampling task decides what each variant becomes in the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSample {
    /// Per-interface byte counters, republished as gauges.
    InterfaceBytes {
        device: String,
        receive: u64,
        transmit: u64,
    },
    /// A kernel event-class count, republished as a cumulative counter via
    /// reset-aware differencing.
    EventCount { class: EventClass, count: u64 },
}

/// A source of raw monotonic counters, polled once per sampling pass.
#[async_trait]
pub trait CounterSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the current absolute values for all active keys. An error
    /// covers the whole pass for this source; the scheduler logs it and
    /// leaves prior registry values untouched.
    async fn poll(&self) -> anyhow::Result<Vec<RawSample>>;
}

pub type SourceResult = anyhow::Result<Option<Box<dyn CounterSource>>>;
