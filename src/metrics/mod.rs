use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;
use thiserror::Error;

mod delta;

pub use delta::DeltaTracker;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("metric '{name}' is already registered as a {kind}")]
    KindConflict { name: String, kind: MetricKind },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
        }
    }
}

/// A key that uniquely identifies a series by name and label set.
#[derive(Debug, Clone, Eq, PartialEq)]
struct SeriesKey {
    name: String,
    labels_hash: u64,
}

impl SeriesKey {
    fn new(name: &str, labels: &HashMap<String, String>) -> Self {
        Self {
            name: name.to_string(),
            labels_hash: hash_labels(labels),
        }
    }
}

impl Hash for SeriesKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.labels_hash.hash(state);
    }
}

/// Hash a label set deterministically by sorting keys.
fn hash_labels(labels: &HashMap<String, String>) -> u64 {
    use std::collections::hash_map::DefaultHasher;

    let mut hasher = DefaultHasher::new();

    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort_by_key(|(k, _)| *k);

    for (k, v) in pairs {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }

    hasher.finish()
}

#[derive(Debug, Clone)]
enum SeriesValue {
    Counter(u64),
    Gauge(f64),
}

#[derive(Debug, Clone)]
struct Series {
    name: String,
    labels: HashMap<String, String>,
    value: SeriesValue,
}

struct Inner {
    kinds: HashMap<String, MetricKind>,
    series: HashMap<SeriesKey, Series>,
}

/// A set of named metric series, each either a last-write-wins gauge or a
/// cumulative counter, keyed by (name, label set). One writer (the sampling
/// task) mutates it while any number of scrape handlers take snapshots.
pub struct MetricRegistry {
    inner: RwLock<Inner>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                kinds: HashMap::new(),
                series: HashMap::new(),
            }),
        }
    }

    /// Pre-declare a metric family. The kind is fixed on first registration
    /// for the lifetime of the process.
    pub fn register(&self, name: &str, kind: MetricKind) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();

        Self::check_kind(&mut inner, name, kind)
    }

    /// Set a gauge series to the provided value, registering it if new.
    pub fn set_gauge(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        value: f64,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();

        Self::check_kind(&mut inner, name, MetricKind::Gauge)?;

        let labels = owned_labels(labels);
        let key = SeriesKey::new(name, &labels);

        inner
            .series
            .entry(key)
            .and_modify(|s| s.value = SeriesValue::Gauge(value))
            .or_insert_with(|| Series {
                name: name.to_string(),
                labels,
                value: SeriesValue::Gauge(value),
            });

        Ok(())
    }

    /// Add a non-negative increment to a counter series, registering it at
    /// zero if new. The add saturates so the published value can never wrap.
    pub fn add_to_counter(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        increment: u64,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();

        Self::check_kind(&mut inner, name, MetricKind::Counter)?;

        let labels = owned_labels(labels);
        let key = SeriesKey::new(name, &labels);

        let series = inner.series.entry(key).or_insert_with(|| Series {
            name: name.to_string(),
            labels,
            value: SeriesValue::Counter(0),
        });

        if let SeriesValue::Counter(ref mut v) = series.value {
            *v = v.saturating_add(increment);
        }

        Ok(())
    }

    /// Take an owned, internally consistent copy of all series. Counters and
    /// gauges are sorted by name and label set so repeated snapshots of an
    /// unchanged registry are identical.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read();

        let mut counters = Vec::new();
        let mut gauges = Vec::new();

        for series in inner.series.values() {
            match series.value {
                SeriesValue::Counter(value) => counters.push(Counter {
                    name: series.name.clone(),
                    value,
                    metadata: series.labels.clone(),
                }),
                SeriesValue::Gauge(value) => gauges.push(Gauge {
                    name: series.name.clone(),
                    value,
                    metadata: series.labels.clone(),
                }),
            }
        }

        drop(inner);

        counters.sort_by(|a, b| {
            (&a.name, sorted_pairs(&a.metadata)).cmp(&(&b.name, sorted_pairs(&b.metadata)))
        });
        gauges.sort_by(|a, b| {
            (&a.name, sorted_pairs(&a.metadata)).cmp(&(&b.name, sorted_pairs(&b.metadata)))
        });

        Snapshot {
            systemtime: SystemTime::now(),
            counters,
            gauges,
        }
    }

    fn check_kind(inner: &mut Inner, name: &str, kind: MetricKind) -> Result<(), RegistryError> {
        match inner.kinds.get(name) {
            Some(registered) if *registered != kind => Err(RegistryError::KindConflict {
                name: name.to_string(),
                kind: *registered,
            }),
            Some(_) => Ok(()),
            None => {
                inner.kinds.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn owned_labels(labels: &[(&str, &str)]) -> HashMap<String, String> {
    labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn sorted_pairs(labels: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut pairs: Vec<_> = labels.iter().collect();
    pairs.sort_by_key(|(k, _)| *k);
    pairs
}

/// A point-in-time copy of the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub systemtime: SystemTime,
    pub counters: Vec<Counter>,
    pub gauges: Vec<Gauge>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counter {
    pub name: String,
    pub value: u64,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    pub name: String,
    pub value: f64,
    pub metadata: HashMap<String, String>,
}
