//! Registry owning the fleet of simulated devices.
//!
//! Enforces station-name uniqueness, assigns ports, fans start/stop out
//! across devices, and surfaces their change notifications through the
//! logging toggle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::device::{IedConfiguration, IedDevice};
use crate::error::{IedError, Result};
use crate::model::{seed_points, station_from_model_source};
use crate::types::{ControlModel, ControlOperation, DataPoint};

/// Fallback base port for stations without a fixed assignment.
pub const FALLBACK_BASE_PORT: u16 = 10200;

/// A controllable point as presented to operators, annotated with its
/// owning station and control model.
#[derive(Debug, Clone)]
pub struct ControllableEntry {
    /// Owning station
    pub station: String,
    /// The control point
    pub point: DataPoint,
    /// Its control model
    pub model: ControlModel,
}

/// Owner of all simulated devices.
#[derive(Default)]
pub struct IedRegistry {
    devices: RwLock<Vec<Arc<IedDevice>>>,
    logging: Arc<AtomicBool>,
    loggers: Mutex<Vec<JoinHandle<()>>>,
}

impl IedRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a device from a model source and register it.
    ///
    /// Fails with `DuplicateStation` when the derived station name
    /// collides (case-insensitive) with a registered device; other devices
    /// are unaffected by a failed add. Must be called within a Tokio
    /// runtime: the device's notification logger is spawned here.
    pub fn add_device(&self, model_source: &str) -> Result<Arc<IedDevice>> {
        let station = station_from_model_source(model_source);
        let mut devices = self.devices.write();

        if devices
            .iter()
            .any(|d| d.station().eq_ignore_ascii_case(&station))
        {
            return Err(IedError::DuplicateStation(station));
        }

        let port = assign_port(&station, devices.len());
        let data_points = seed_points(&station);
        let config = IedConfiguration {
            device_name: format!("Simulator_{station}"),
            station_name: station,
            model_source: model_source.to_string(),
            port,
            data_points,
        };
        let device = Arc::new(IedDevice::new(config));

        self.spawn_logger(&device);
        devices.push(Arc::clone(&device));
        info!(station = %device.station(), port, "device registered");
        Ok(device)
    }

    /// Start every device concurrently.
    ///
    /// A device that fails to start is logged and skipped; devices are
    /// independent failure domains.
    pub async fn start_all(&self) {
        let devices = self.snapshot();
        let results = join_all(devices.iter().map(|d| d.start())).await;
        for (device, result) in devices.iter().zip(results) {
            if let Err(e) = result {
                warn!(station = %device.station(), error = %e, "device failed to start");
            }
        }
    }

    /// Stop every device concurrently and wait until all loops have
    /// exited.
    ///
    /// Returns the per-station update counts for reporting.
    pub async fn stop_all(&self) -> Vec<(String, u64)> {
        let devices = self.snapshot();
        join_all(devices.iter().map(|d| d.stop())).await;
        devices
            .iter()
            .map(|d| (d.station().to_string(), d.update_count()))
            .collect()
    }

    /// Find a device by station name, case-insensitive.
    ///
    /// Accepts either a bare station name or a compound point id, whose
    /// leading station segment is extracted.
    pub fn find_by_station(&self, name: &str) -> Result<Arc<IedDevice>> {
        let station = name.split('/').next().unwrap_or(name);
        self.devices
            .read()
            .iter()
            .find(|d| d.station().eq_ignore_ascii_case(station))
            .cloned()
            .ok_or_else(|| IedError::UnknownStation(station.to_string()))
    }

    /// Every controllable point across all devices.
    pub fn list_controllable(&self) -> Vec<ControllableEntry> {
        self.devices
            .read()
            .iter()
            .flat_map(|d| {
                let station = d.station().to_string();
                d.controllable_points()
                    .into_iter()
                    .map(move |(point, model)| ControllableEntry {
                        station: station.clone(),
                        point,
                        model,
                    })
            })
            .collect()
    }

    /// Snapshot of a station's current data points.
    pub fn current_data_points(&self, station: &str) -> Result<Vec<DataPoint>> {
        Ok(self.find_by_station(station)?.current_data_points())
    }

    /// Execute a control operation, routing by the point id's station.
    pub fn execute_control(
        &self,
        point_id: &str,
        operation: ControlOperation,
    ) -> Result<Option<DataPoint>> {
        let device = self.find_by_station(point_id)?;
        device.execute_control(point_id, operation)
    }

    /// Surface change notifications through tracing.
    pub fn enable_logging(&self) {
        self.logging.store(true, Ordering::Relaxed);
    }

    /// Stop surfacing change notifications; delivery continues for other
    /// subscribers.
    pub fn disable_logging(&self) {
        self.logging.store(false, Ordering::Relaxed);
    }

    /// Check whether change notifications are surfaced.
    pub fn logging_enabled(&self) -> bool {
        self.logging.load(Ordering::Relaxed)
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<IedDevice>> {
        self.devices.read().clone()
    }

    fn spawn_logger(&self, device: &Arc<IedDevice>) {
        let mut rx = device.subscribe();
        let station = device.station().to_string();
        let logging = Arc::clone(&self.logging);

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(point) => {
                        if logging.load(Ordering::Relaxed) {
                            info!(
                                station = %station,
                                point = %point.id,
                                name = %point.name,
                                value = %point.value,
                                "data point changed"
                            );
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(station = %station, skipped, "notification stream lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.loggers.lock().push(handle);
    }
}

/// Port assignment policy: fixed port per known station, else a
/// deterministic fallback from the device count.
fn assign_port(station: &str, device_count: usize) -> u16 {
    match station {
        "IED_CSWI" => 10102,
        "IED_MMXU" => 10103,
        "IED_XCBR" => 10104,
        _ => FALLBACK_BASE_PORT + device_count as u16,
    }
}
