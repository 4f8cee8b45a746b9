//! One simulated IED: store, control executor, simulation loop, and
//! network front end wired around a shared exclusive section.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::control::{ControlExecutor, SessionTable, DEFAULT_SELECT_TIMEOUT};
use crate::error::Result;
use crate::server::IedServer;
use crate::simulation::{SimulationLoop, DEFAULT_TICK};
use crate::store::DataPointStore;
use crate::types::{ControlModel, ControlOperation, DataPoint};

/// Change-notification fan-out for one device.
///
/// Both the simulation loop and the control executor publish through the
/// same notifier, so observers cannot distinguish the two sources from the
/// payload; per-point delivery order equals value-change order.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<DataPoint>,
    count: AtomicU64,
}

impl ChangeNotifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            count: AtomicU64::new(0),
        }
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DataPoint> {
        self.tx.subscribe()
    }

    /// Publish one updated point.
    pub fn notify(&self, point: &DataPoint) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // Send fails only when nobody subscribes; updates still count.
        let _ = self.tx.send(point.clone());
    }

    /// Total updates published since creation.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Static description of one simulated device.
///
/// Created once at device-add time and immutable thereafter; the store,
/// not the configuration, evolves.
#[derive(Debug, Clone)]
pub struct IedConfiguration {
    /// Station name, unique across the registry
    pub station_name: String,
    /// Device label
    pub device_name: String,
    /// Identifier of the model source this device was derived from
    pub model_source: String,
    /// Listening port (0 for ephemeral)
    pub port: u16,
    /// Initial data points
    pub data_points: Vec<DataPoint>,
}

/// One simulated IED.
pub struct IedDevice {
    config: IedConfiguration,
    store: Arc<DataPointStore>,
    executor: Arc<ControlExecutor>,
    simulation: SimulationLoop,
    server: IedServer,
    notifier: Arc<ChangeNotifier>,
}

impl IedDevice {
    /// Build a device with default timing.
    pub fn new(config: IedConfiguration) -> Self {
        Self::with_timing(config, DEFAULT_TICK, DEFAULT_SELECT_TIMEOUT)
    }

    /// Build a device with explicit tick and selection deadline.
    pub fn with_timing(
        config: IedConfiguration,
        tick: Duration,
        select_timeout: Duration,
    ) -> Self {
        let store = Arc::new(DataPointStore::new());
        let sessions = Arc::new(Mutex::new(SessionTable::default()));
        let notifier = Arc::new(ChangeNotifier::new(256));

        // Duplicate ids in the seed list are tolerated by the idempotent add.
        for point in &config.data_points {
            store.add(point.clone());
        }

        let executor = Arc::new(
            ControlExecutor::new(
                Arc::clone(&store),
                Arc::clone(&sessions),
                Arc::clone(&notifier),
            )
            .with_select_timeout(select_timeout),
        );
        let simulation = SimulationLoop::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&notifier),
        )
        .with_tick(tick);
        let server = IedServer::new(
            config.station_name.clone(),
            config.port,
            Arc::clone(&store),
            Arc::clone(&executor),
        );

        Self {
            config,
            store,
            executor,
            simulation,
            server,
            notifier,
        }
    }

    /// Station name.
    pub fn station(&self) -> &str {
        &self.config.station_name
    }

    /// Static configuration.
    pub fn configuration(&self) -> &IedConfiguration {
        &self.config
    }

    /// The device's point store.
    pub fn store(&self) -> &Arc<DataPointStore> {
        &self.store
    }

    /// The device's control executor.
    pub fn executor(&self) -> &Arc<ControlExecutor> {
        &self.executor
    }

    /// Check whether the simulation loop is running.
    pub fn is_running(&self) -> bool {
        self.simulation.is_running()
    }

    /// Start the network front end and the simulation loop.
    ///
    /// Idempotent; returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self.server.start().await?;
        self.simulation.start();
        info!(station = %self.station(), address = %addr, "device started");
        Ok(addr)
    }

    /// Stop the device and wait until both the simulation loop and the
    /// listener have observed the stop.
    ///
    /// In-flight control operations and simulation ticks complete; nothing
    /// is forcibly aborted.
    pub async fn stop(&self) {
        self.simulation.stop().await;
        self.server.stop().await;
        info!(station = %self.station(), updates = self.update_count(), "device stopped");
    }

    /// Subscribe to this device's change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<DataPoint> {
        self.notifier.subscribe()
    }

    /// Updates published since the device was built.
    pub fn update_count(&self) -> u64 {
        self.notifier.count()
    }

    /// Snapshot of the current data points.
    pub fn current_data_points(&self) -> Vec<DataPoint> {
        self.store.get_all()
    }

    /// Execute a control operation on one of this device's points.
    pub fn execute_control(
        &self,
        point_id: &str,
        operation: ControlOperation,
    ) -> Result<Option<DataPoint>> {
        self.executor.execute(point_id, operation, "console")
    }

    /// Every controllable point of this device with its control model.
    pub fn controllable_points(&self) -> Vec<(DataPoint, ControlModel)> {
        self.store
            .get_all()
            .into_iter()
            .filter_map(|p| p.control_model().filter(|_| p.is_controllable()).map(|m| (p, m)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ControlPhase, DataValue, META_CTL_MODEL, META_LN_CLASS};

    const BREAKER: &str = "IED_XCBR/XCBR1.Pos$ST";

    fn config() -> IedConfiguration {
        IedConfiguration {
            station_name: "IED_XCBR".into(),
            device_name: "Simulator_IED_XCBR".into(),
            model_source: "model_xcbr.icd".into(),
            port: 0,
            data_points: vec![
                DataPoint::new(BREAKER, "Breaker position", DataValue::Integer(0))
                    .with_metadata(META_LN_CLASS, "XCBR")
                    .with_metadata(META_CTL_MODEL, ControlModel::SboNormal.as_str()),
                DataPoint::new(
                    "IED_XCBR/MMXU1.Amp.phsA$MX",
                    "Phase A current",
                    DataValue::Float(0.0),
                ),
            ],
        }
    }

    fn fast_device() -> IedDevice {
        IedDevice::with_timing(config(), Duration::from_millis(10), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_seeding_is_idempotent() {
        let mut cfg = config();
        let duplicate = cfg.data_points[0].clone();
        cfg.data_points.push(duplicate);

        let device = IedDevice::new(cfg);
        assert_eq!(device.current_data_points().len(), 2);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let device = fast_device();
        assert!(!device.is_running());

        let addr = device.start().await.unwrap();
        assert!(device.is_running());
        assert_eq!(device.start().await.unwrap(), addr);

        device.stop().await;
        assert!(!device.is_running());
    }

    #[tokio::test]
    async fn test_simulation_and_control_share_notifications() {
        let device = fast_device();
        let mut rx = device.subscribe();

        device.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        device
            .execute_control(BREAKER, ControlOperation::Select)
            .unwrap();
        let operated = device
            .execute_control(BREAKER, ControlOperation::Close)
            .unwrap()
            .unwrap();
        assert_eq!(operated.value, DataValue::Integer(0));

        device.stop().await;

        // The stream carries both simulated and operated updates; the
        // payload alone does not reveal the source.
        let mut saw_breaker = false;
        let mut saw_measurement = false;
        while let Ok(point) = rx.try_recv() {
            if point.id == BREAKER {
                saw_breaker = true;
            } else {
                saw_measurement = true;
            }
        }
        assert!(saw_breaker);
        assert!(saw_measurement);
    }

    #[tokio::test]
    async fn test_controllable_points_listing() {
        let device = fast_device();
        let controls = device.controllable_points();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].0.id, BREAKER);
        assert_eq!(controls[0].1, ControlModel::SboNormal);
    }

    #[tokio::test]
    async fn test_device_isolation() {
        let a = fast_device();
        let mut cfg_b = config();
        cfg_b.station_name = "IED_XCBR2".into();
        let b = IedDevice::with_timing(cfg_b, Duration::from_millis(10), Duration::from_secs(30));

        a.start().await.unwrap();
        b.start().await.unwrap();

        b.executor().select(BREAKER, "client-1").unwrap();
        a.stop().await;

        // Stopping A affects neither B's cadence nor its control sessions.
        assert!(b.is_running());
        assert_eq!(b.executor().phase(BREAKER), ControlPhase::Selected);

        let before = b.update_count();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(b.update_count() > before);

        b.stop().await;
    }
}
