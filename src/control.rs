//! Supervisory-control executor.
//!
//! Implements the select/operate/cancel handshake for points tagged as
//! controllable. Per control point the phases are
//! `Idle -> Selected -> Idle`, with Cancel and deadline expiry both
//! returning to `Idle`. Select-before-operate models require a held,
//! unexpired selection; direct-operate models accept Open/Close straight
//! from `Idle`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::device::ChangeNotifier;
use crate::error::{IedError, Result};
use crate::store::DataPointStore;
use crate::types::{
    ControlModel, ControlOperation, ControlPhase, ControlSession, DataPoint, DataValue, PointId,
};

/// Default selection deadline.
pub const DEFAULT_SELECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Session table shared between the executor and the simulation loop.
///
/// Its mutex doubles as the device's exclusive section: every
/// read-modify-write of a point, from either the executor or a simulation
/// tick, runs while holding it. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, ControlSession>,
}

impl SessionTable {
    /// Get the unexpired session for a point, if any.
    pub fn active(&self, id: &str) -> Option<&ControlSession> {
        self.sessions.get(id).filter(|s| !s.is_expired())
    }

    /// Check whether an unexpired selection is held for a point.
    pub fn is_held(&self, id: &str) -> bool {
        self.active(id).is_some()
    }

    pub(crate) fn take(&mut self, id: &str) -> Option<ControlSession> {
        self.sessions.remove(id)
    }

    pub(crate) fn insert(&mut self, session: ControlSession) {
        self.sessions.insert(session.point_id.clone(), session);
    }
}

/// Per-device control executor.
///
/// All failures are typed results from the error taxonomy; nothing is
/// raised past the executor boundary.
#[derive(Debug)]
pub struct ControlExecutor {
    store: Arc<DataPointStore>,
    sessions: Arc<Mutex<SessionTable>>,
    notifier: Arc<ChangeNotifier>,
    select_timeout: Duration,
}

impl ControlExecutor {
    /// Create an executor over a device's store and session table.
    pub fn new(
        store: Arc<DataPointStore>,
        sessions: Arc<Mutex<SessionTable>>,
        notifier: Arc<ChangeNotifier>,
    ) -> Self {
        Self {
            store,
            sessions,
            notifier,
            select_timeout: DEFAULT_SELECT_TIMEOUT,
        }
    }

    /// Override the selection deadline.
    pub fn with_select_timeout(mut self, timeout: Duration) -> Self {
        self.select_timeout = timeout;
        self
    }

    /// Dispatch one control operation.
    ///
    /// Returns the updated point for Open/Close, `None` for Select and
    /// Cancel.
    pub fn execute(
        &self,
        id: &str,
        operation: ControlOperation,
        holder: &str,
    ) -> Result<Option<DataPoint>> {
        match operation {
            ControlOperation::Select => self.select(id, holder).map(|_| None),
            ControlOperation::Open | ControlOperation::Close => {
                self.operate(id, operation).map(Some)
            }
            ControlOperation::Cancel => self.cancel(id).map(|_| None),
        }
    }

    /// Reserve a control point.
    ///
    /// Fails with `AlreadySelected` if another unexpired session holds the
    /// point. On direct-operate models the reservation is accepted but no
    /// session is created; the operate remains legal straight from `Idle`.
    pub fn select(&self, id: &str, holder: &str) -> Result<()> {
        let model = self.controllable(id)?;
        let mut table = self.sessions.lock();

        if table.is_held(id) {
            return Err(IedError::AlreadySelected(id.to_string()));
        }

        if !model.requires_select() {
            debug!(point = %id, model = %model, "select on direct-operate model ignored");
            return Ok(());
        }

        table.insert(ControlSession::new(id, holder, self.select_timeout));
        debug!(point = %id, holder = %holder, "selected");
        Ok(())
    }

    /// Apply an Open or Close operation.
    ///
    /// Sets the point to the operation's sentinel value, refreshes its
    /// timestamp, clears the session, and emits the same change
    /// notification the simulation loop uses.
    pub fn operate(&self, id: &str, operation: ControlOperation) -> Result<DataPoint> {
        let sentinel = operation
            .sentinel()
            .ok_or(IedError::InvalidRequest("Not an operate"))?;
        let model = self.controllable(id)?;
        let mut table = self.sessions.lock();

        if model.requires_select() {
            match table.take(id) {
                None => return Err(IedError::NotSelected(id.to_string())),
                Some(session) if session.is_expired() => {
                    debug!(point = %id, "selection expired before operate");
                    return Err(IedError::StaleSelection(id.to_string()));
                }
                Some(_) => {}
            }
        } else {
            // A stray reservation on a direct model never blocks the operate.
            table.take(id);
        }

        // Re-read inside the exclusive section; the write must not lose a
        // concurrent update to the same point.
        let mut point = self
            .store
            .get(id)
            .ok_or_else(|| IedError::PointNotFound(id.to_string()))?;
        point.set_value(DataValue::Integer(sentinel));
        self.store.update(point.clone());
        self.notifier.notify(&point);
        debug!(point = %id, operation = %operation, value = sentinel, "operated");
        Ok(point)
    }

    /// Release a held selection.
    ///
    /// A cancel with no selection held is a no-op success.
    pub fn cancel(&self, id: &str) -> Result<()> {
        self.controllable(id)?;
        let mut table = self.sessions.lock();
        if table.take(id).is_some() {
            debug!(point = %id, "selection cancelled");
        }
        Ok(())
    }

    /// Current handshake phase of a control point.
    pub fn phase(&self, id: &str) -> ControlPhase {
        if self.sessions.lock().is_held(id) {
            ControlPhase::Selected
        } else {
            ControlPhase::Idle
        }
    }

    /// Resolve a point id to its control model.
    fn controllable(&self, id: &str) -> Result<ControlModel> {
        PointId::parse(id)?;
        let point = self
            .store
            .get(id)
            .ok_or_else(|| IedError::PointNotFound(id.to_string()))?;
        if !point.is_controllable() {
            return Err(IedError::UnknownControl(id.to_string()));
        }
        point
            .control_model()
            .ok_or_else(|| IedError::UnknownControl(id.to_string()))
    }
}
