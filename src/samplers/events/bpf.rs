use super::KeyedCounterTable;

use anyhow::Context;
use libbpf_rs::{MapCore, MapFlags, MapHandle};

use std::path::Path;

/// A BPF hash map pinned by the external capture loader, opened read-only
/// by file-system path. Keys are `u32`, values `u64`, both native-endian as
/// written by the capture programs.
pub struct PinnedMap {
    map: MapHandle,
}

impl PinnedMap {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        let map = MapHandle::from_pinned_path(path)
            .with_context(|| format!("failed to open pinned map: {}", path.display()))?;

        Ok(Self { map })
    }
}

impl KeyedCounterTable for PinnedMap {
    fn lookup(&self, key: u32) -> Option<u64> {
        let value = self
            .map
            .lookup(&key.to_ne_bytes(), MapFlags::ANY)
            .ok()
            .flatten()?;

        Some(u64::from_ne_bytes(value.try_into().ok()?))
    }
}
