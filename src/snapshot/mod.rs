//! # Snapshot Store
//!
//! An append-only collection of posterior weight samples. Snapshots are deep
//! copies taken at sample points and never mutated afterwards; iteration
//! order is creation order. An optional persistence backend mirrors every
//! append to durable storage and can rebuild the store after a restart.

pub mod persist;

use crate::error::SamplerError;
use crate::params::ParameterVector;
use persist::SnapshotPersistence;

/// One accepted posterior sample plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Storage key; carries a zero-padded sequence number so directory order
    /// equals creation order.
    pub key: String,
    pub epoch: usize,
    pub step_in_epoch: usize,
    pub cycle: usize,
    pub params: ParameterVector,
}

impl Snapshot {
    /// Builds the snapshot for sample number `index` (0-based across the
    /// whole run).
    pub fn new(
        index: usize,
        epoch: usize,
        step_in_epoch: usize,
        cycle: usize,
        params: ParameterVector,
    ) -> Self {
        Self {
            key: format!("{index:06}_e{epoch}_m{step_in_epoch}"),
            epoch,
            step_in_epoch,
            cycle,
            params,
        }
    }
}

/// Append-only, in-memory sequence of snapshots with optional write-through
/// persistence. Writes happen only during sampling and reads only during
/// evaluation, so no locking is needed.
#[derive(Default)]
pub struct SnapshotStore {
    snapshots: Vec<Snapshot>,
    backend: Option<Box<dyn SnapshotPersistence>>,
}

impl SnapshotStore {
    /// Purely in-memory store.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Store that mirrors every append to `backend`.
    pub fn with_persistence(backend: Box<dyn SnapshotPersistence>) -> Self {
        Self {
            snapshots: Vec::new(),
            backend: Some(backend),
        }
    }

    /// Rebuilds a store from everything `backend` has, in key order, and
    /// keeps using it for future appends. Epoch and in-epoch step are parsed
    /// back out of the `{seq}_e{epoch}_m{step}` key; the cycle is not encoded
    /// in the key and restores as zero. A partial ensemble from an aborted
    /// run is usable as-is.
    pub fn restore(backend: Box<dyn SnapshotPersistence>) -> Result<Self, SamplerError> {
        let mut snapshots = Vec::new();
        for (key, params) in backend.read_all()? {
            let (epoch, step_in_epoch) = parse_provenance(&key);
            snapshots.push(Snapshot {
                key,
                epoch,
                step_in_epoch,
                cycle: 0,
                params,
            });
        }
        Ok(Self {
            snapshots,
            backend: Some(backend),
        })
    }

    /// Appends a snapshot, writing through to the backend when present.
    /// O(1) amortized; never overwrites.
    pub fn append(&mut self, snapshot: Snapshot) -> Result<(), SamplerError> {
        if let Some(backend) = &self.backend {
            backend.write(&snapshot.key, &snapshot.params)?;
        }
        self.snapshots.push(snapshot);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshots in creation order.
    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }
}

/// Epoch and in-epoch step from a `{seq}_e{epoch}_m{step}` key. Segments
/// that do not parse are left at zero so foreign keys still load.
fn parse_provenance(key: &str) -> (usize, usize) {
    let mut epoch = 0;
    let mut step = 0;
    for part in key.split('_') {
        if let Some(v) = part.strip_prefix('e') {
            epoch = v.parse().unwrap_or(epoch);
        } else if let Some(v) = part.strip_prefix('m') {
            step = v.parse().unwrap_or(step);
        }
    }
    (epoch, step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn params(v: f32) -> ParameterVector {
        let mut pv = ParameterVector::new();
        pv.insert("w", ArrayD::from_elem(ndarray::IxDyn(&[2]), v));
        pv
    }

    #[test]
    fn append_preserves_creation_order() {
        let mut store = SnapshotStore::in_memory();
        for i in 0..3 {
            store
                .append(Snapshot::new(i, i, 10 * i, 0, params(i as f32)))
                .unwrap();
        }
        assert_eq!(store.count(), 3);
        let keys: Vec<_> = store.iter().map(|s| s.key.clone()).collect();
        assert_eq!(keys, vec!["000000_e0_m0", "000001_e1_m10", "000002_e2_m20"]);
    }

    #[test]
    fn snapshots_are_deep_copies() {
        let mut live = params(1.0);
        let mut store = SnapshotStore::in_memory();
        store
            .append(Snapshot::new(0, 0, 0, 0, live.clone()))
            .unwrap();
        live.get_mut("w").unwrap()[[0]] = 99.0;
        let stored = store.iter().next().unwrap();
        assert_eq!(stored.params.get("w").unwrap()[[0]], 1.0);
    }

    /// Serves a fixed list of snapshots and discards writes.
    struct FixedBackend(Vec<(String, ParameterVector)>);

    impl SnapshotPersistence for FixedBackend {
        fn write(&self, _key: &str, _params: &ParameterVector) -> Result<(), persist::PersistError> {
            Ok(())
        }

        fn read_all(&self) -> Result<Vec<(String, ParameterVector)>, persist::PersistError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn restore_recovers_epoch_and_step_from_keys() {
        let backend = FixedBackend(vec![
            ("000000_e2_m7".to_string(), params(0.0)),
            ("000001_e11_m0".to_string(), params(1.0)),
        ]);
        let store = SnapshotStore::restore(Box::new(backend)).unwrap();
        let snaps: Vec<_> = store.iter().collect();
        assert_eq!((snaps[0].epoch, snaps[0].step_in_epoch), (2, 7));
        assert_eq!((snaps[1].epoch, snaps[1].step_in_epoch), (11, 0));
    }

    #[test]
    fn key_order_is_lexicographic_in_creation_order() {
        // Zero-padded sequence numbers keep directory listings sorted even
        // when epoch/step numbers vary in width.
        let a = Snapshot::new(9, 9, 999, 0, params(0.0));
        let b = Snapshot::new(10, 10, 3, 0, params(0.0));
        assert!(a.key < b.key);
    }
}
