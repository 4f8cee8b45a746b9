//! Periodic telemetry simulation.
//!
//! While a device is running, a background task regenerates a plausible
//! value for every non-controllable point on a fixed tick, producing the
//! illusion of live process data. Controllable points belong to the
//! control executor and are never touched here.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::control::SessionTable;
use crate::device::ChangeNotifier;
use crate::store::DataPointStore;
use crate::types::{DataPoint, DataValue, PointType};

/// Default simulation tick.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Per-device periodic value generator.
pub struct SimulationLoop {
    store: Arc<DataPointStore>,
    sessions: Arc<Mutex<SessionTable>>,
    notifier: Arc<ChangeNotifier>,
    tick: Duration,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimulationLoop {
    /// Create a loop over a device's store with the default tick.
    pub fn new(
        store: Arc<DataPointStore>,
        sessions: Arc<Mutex<SessionTable>>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            sessions,
            notifier,
            tick: DEFAULT_TICK,
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Override the tick period.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Check whether the loop is running.
    pub fn is_running(&self) -> bool {
        self.stop_tx.lock().is_some()
    }

    /// Start the background task.
    ///
    /// Starting an already-running loop is a no-op.
    pub fn start(&self) {
        let mut stop_slot = self.stop_tx.lock();
        if stop_slot.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let sessions = Arc::clone(&self.sessions);
        let notifier = Arc::clone(&self.notifier);
        let tick = self.tick;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; consume it so the
            // seeded values survive one full period.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                        run_tick(&store, &sessions, &notifier);
                    }
                }
            }
            debug!("simulation loop stopped");
        });

        *stop_slot = Some(stop_tx);
        *self.handle.lock() = Some(handle);
    }

    /// Stop the background task and wait for it to observe the stop.
    ///
    /// After this returns no further ticks occur. Stopping an idle loop is
    /// a no-op.
    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// One simulation tick over a snapshot of the store.
///
/// Each per-point update runs inside the device's exclusive section so it
/// cannot interleave with a control transition on the same point.
fn run_tick(
    store: &DataPointStore,
    sessions: &Mutex<SessionTable>,
    notifier: &ChangeNotifier,
) {
    for point in store.get_all() {
        // Controllable points are mutated by the control executor only.
        if point.is_controllable() {
            continue;
        }
        let Some(value) = generate_value(&point) else {
            continue;
        };

        let table = sessions.lock();
        if table.is_held(&point.id) {
            continue;
        }
        let mut updated = point;
        updated.set_value(value);
        store.update(updated.clone());
        notifier.notify(&updated);
        drop(table);

        trace!(point = %updated.id, value = %updated.value, "simulated");
    }
}

/// Compute a fresh simulated value for a point.
///
/// Float and integer points sample a bounded range typical of the
/// quantity; booleans flip a coin; text points pass through unchanged.
fn generate_value(point: &DataPoint) -> Option<DataValue> {
    let mut rng = rand::thread_rng();
    match point.point_type() {
        PointType::Float => Some(DataValue::Float(rng.gen_range(0.0..100.0))),
        PointType::Integer => Some(DataValue::Integer(rng.gen_range(0..1000))),
        PointType::Boolean => Some(DataValue::Boolean(rng.gen_bool(0.5))),
        PointType::Text => None,
    }
}
