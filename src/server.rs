//! Per-device network front end.
//!
//! Accepts concurrent client connections on the device's port, frames
//! incoming requests with [`MmsCodec`], and dispatches them to the store
//! or the control executor. Unrecognized request types are logged and not
//! answered; the connection stays open for the next frame, which keeps
//! clients that probe with several message types working.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::MmsCodec;
use crate::control::ControlExecutor;
use crate::error::{IedError, Result};
use crate::store::DataPointStore;
use crate::types::{MmsPdu, PointId, Service, ServiceResponse};

/// Per-device TCP listener and connection handling.
pub struct IedServer {
    station: String,
    port: u16,
    store: Arc<DataPointStore>,
    executor: Arc<ControlExecutor>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl IedServer {
    /// Create a server for one device.
    ///
    /// Port 0 binds an ephemeral port; the bound address is reported by
    /// [`start`](Self::start) and [`local_addr`](Self::local_addr).
    pub fn new(
        station: impl Into<String>,
        port: u16,
        store: Arc<DataPointStore>,
        executor: Arc<ControlExecutor>,
    ) -> Self {
        Self {
            station: station.into(),
            port,
            store,
            executor,
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Bound address, if the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Starting an already-running server just returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let listener = TcpListener::bind(("127.0.0.1", self.port)).await?;
        let addr = listener.local_addr()?;
        info!(station = %self.station, address = %addr, "IED server listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let station = self.station.clone();
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);

        let handle = tokio::spawn(accept_loop(listener, station, store, executor, stop_rx));

        *self.stop_tx.lock() = Some(stop_tx);
        *self.handle.lock() = Some(handle);
        *self.local_addr.lock() = Some(addr);
        Ok(addr)
    }

    /// Close the listener and wait for the accept loop to exit.
    ///
    /// Open connections are not forcibly aborted; their handlers end on
    /// the stop signal or on their next failed read.
    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        *self.local_addr.lock() = None;
    }
}

async fn accept_loop(
    listener: TcpListener,
    station: String,
    store: Arc<DataPointStore>,
    executor: Arc<ControlExecutor>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(station = %station, peer = %peer, "client connected");
                    tokio::spawn(handle_connection(
                        stream,
                        peer,
                        station.clone(),
                        Arc::clone(&store),
                        Arc::clone(&executor),
                        stop_rx.clone(),
                    ));
                }
                Err(e) => {
                    if *stop_rx.borrow() {
                        break;
                    }
                    warn!(station = %station, error = %e, "accept failed");
                }
            }
        }
    }
    debug!(station = %station, "listener stopped");
}

/// One connection's read-dispatch-respond loop.
///
/// Runs until the client closes the stream, the device stops, or an I/O
/// error occurs. Errors close only this connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    station: String,
    store: Arc<DataPointStore>,
    executor: Arc<ControlExecutor>,
    mut stop_rx: watch::Receiver<bool>,
) {
    stream.set_nodelay(true).ok();
    let mut framed = Framed::new(stream, MmsCodec::new());
    let holder = peer.to_string();

    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            frame = framed.next() => match frame {
                None => break,
                Some(Err(e)) => {
                    warn!(station = %station, peer = %peer, error = %e, "transport error");
                    break;
                }
                Some(Ok(pdu)) => {
                    let Some(response) = dispatch(pdu, &station, &store, &executor, &holder)
                    else {
                        continue;
                    };
                    if let Err(e) = framed.send(response).await {
                        warn!(station = %station, peer = %peer, error = %e, "send failed");
                        break;
                    }
                }
            }
        }
    }
    debug!(station = %station, peer = %peer, "connection closed");
}

/// Map a request to its response, or `None` for requests that are not
/// answered.
fn dispatch(
    pdu: MmsPdu,
    station: &str,
    store: &DataPointStore,
    executor: &ControlExecutor,
    holder: &str,
) -> Option<MmsPdu> {
    match pdu {
        // The handshake is answered unconditionally with the fixed
        // capability set; the simulator does not negotiate parameters.
        MmsPdu::InitiateRequest { .. } => Some(MmsPdu::InitiateResponse),

        MmsPdu::ConfirmedRequest { invoke_id, service } => {
            let tag = service.tag();
            let response = match service {
                Service::GetNameList => ServiceResponse::NameList(store.ids()),
                Service::Read { item_id } => handle_read(store, &item_id),
                Service::Control { operation, item_id } => {
                    match executor.execute(&item_id, operation, holder) {
                        Ok(_) => ServiceResponse::ControlAck,
                        Err(e) => {
                            debug!(station = %station, point = %item_id, error = %e, "control refused");
                            ServiceResponse::Error((&e).into())
                        }
                    }
                }
            };
            Some(MmsPdu::response(invoke_id, tag, response))
        }

        MmsPdu::Unknown { tag } => {
            warn!(station = %station, tag, "unhandled request type");
            None
        }

        // Response PDUs have no business arriving at a server.
        MmsPdu::InitiateResponse | MmsPdu::ConfirmedResponse { .. } => {
            warn!(station = %station, "ignoring response-type PDU");
            None
        }
    }
}

/// Resolve a read request; unresolved ids get an explicit error, never a
/// default value.
fn handle_read(store: &DataPointStore, item_id: &str) -> ServiceResponse {
    match PointId::parse(item_id) {
        Ok(_) => match store.get(item_id) {
            Some(point) => ServiceResponse::Value(point.value),
            None => {
                ServiceResponse::Error((&IedError::PointNotFound(item_id.to_string())).into())
            }
        },
        Err(e) => ServiceResponse::Error((&e).into()),
    }
}
