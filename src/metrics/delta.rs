use std::collections::HashMap;
use std::hash::Hash;

/// Converts a monotonic, possibly-resetting raw counter stream into
/// non-negative increments for a published counter.
///
/// The first observation of a key records a baseline and contributes nothing;
/// crediting the absolute value would count traffic from before this process
/// started. A raw value at or below the previous one is treated as a source
/// reset (capture restart or wraparound): the increment is zero and deltas
/// are computed from the new baseline, under-counting only the interval in
/// which the reset occurred.
pub struct DeltaTracker<K> {
    previous: HashMap<K, u64>,
}

impl<K: Eq + Hash> DeltaTracker<K> {
    pub fn new() -> Self {
        Self {
            previous: HashMap::new(),
        }
    }

    /// Record a raw observation for `key` and return the increment to apply
    /// to the published counter.
    pub fn observe(&mut self, key: K, raw: u64) -> u64 {
        match self.previous.insert(key, raw) {
            None => 0,
            Some(previous) if raw > previous => raw - previous,
            Some(_) => 0,
        }
    }
}

impl<K: Eq + Hash> Default for DeltaTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}
