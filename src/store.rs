//! Keyed, concurrent-safe storage of a device's current point values.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::DataPoint;

/// Per-device store of current data point values.
///
/// Every operation is individually atomic and returns copies; readers are
/// never blocked behind a long-running operation. Read-modify-write
/// sequences spanning several calls need the device's exclusive section
/// (see [`ControlExecutor`](crate::control::ControlExecutor) and
/// [`SimulationLoop`](crate::simulation::SimulationLoop)), not the store.
#[derive(Debug, Default)]
pub struct DataPointStore {
    points: RwLock<HashMap<String, DataPoint>>,
}

impl DataPointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a copy of the current value of a point.
    pub fn get(&self, id: &str) -> Option<DataPoint> {
        self.points.read().get(id).cloned()
    }

    /// Snapshot copy of all points; order is not significant.
    pub fn get_all(&self) -> Vec<DataPoint> {
        self.points.read().values().cloned().collect()
    }

    /// All point ids, sorted for stable listings.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.points.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Insert a point if absent.
    ///
    /// Re-adding an existing id is a no-op so duplicate seeding from a
    /// configuration is never an error.
    pub fn add(&self, point: DataPoint) {
        self.points.write().entry(point.id.clone()).or_insert(point);
    }

    /// Replace the stored value and timestamp of a point.
    ///
    /// A missing id is treated as an insert, matching seed-then-update
    /// usage by the simulation loop.
    pub fn update(&self, point: DataPoint) {
        self.points.write().insert(point.id.clone(), point);
    }

    /// Number of stored points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Check whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataValue;

    fn point(id: &str, value: f64) -> DataPoint {
        DataPoint::new(id, id, DataValue::Float(value))
    }

    #[test]
    fn test_update_then_get_matches_write() {
        let store = DataPointStore::new();
        let p = point("IED_A/MMXU1.Amp.phsA$MX", 12.5);
        store.update(p.clone());

        let got = store.get(&p.id).unwrap();
        assert_eq!(got.value, p.value);
        assert_eq!(got.timestamp, p.timestamp);
    }

    #[test]
    fn test_add_is_idempotent() {
        let store = DataPointStore::new();
        let first = point("IED_A/MMXU1.Amp.phsA$MX", 1.0);
        let second = point("IED_A/MMXU1.Amp.phsA$MX", 2.0);

        store.add(first.clone());
        store.add(second);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&first.id).unwrap().value, first.value);
    }

    #[test]
    fn test_update_upserts_missing_id() {
        let store = DataPointStore::new();
        assert!(store.get("IED_A/LN1.v$MX").is_none());

        store.update(point("IED_A/LN1.v$MX", 3.0));
        assert_eq!(store.len(), 1);
        assert!(store.get("IED_A/LN1.v$MX").is_some());
    }

    #[test]
    fn test_get_all_is_a_snapshot() {
        let store = DataPointStore::new();
        store.add(point("IED_A/LN1.a$MX", 1.0));
        store.add(point("IED_A/LN1.b$MX", 2.0));

        let snapshot = store.get_all();
        store.update(point("IED_A/LN1.a$MX", 9.0));

        assert_eq!(snapshot.len(), 2);
        let a = snapshot.iter().find(|p| p.id.ends_with("a$MX")).unwrap();
        assert_eq!(a.value, DataValue::Float(1.0));
    }

    #[test]
    fn test_concurrent_readers_and_writer() {
        use std::sync::Arc;

        let store = Arc::new(DataPointStore::new());
        store.add(point("IED_A/LN1.v$MX", 0.0));

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    store.update(point("IED_A/LN1.v$MX", i as f64));
                }
            })
        };

        // No reader may ever observe a torn value/timestamp pair; every
        // read returns some complete point.
        for _ in 0..1000 {
            let got = store.get("IED_A/LN1.v$MX").unwrap();
            assert!(got.value.as_f64().is_some());
        }

        writer.join().unwrap();
        assert_eq!(
            store.get("IED_A/LN1.v$MX").unwrap().value,
            DataValue::Float(999.0)
        );
    }
}
