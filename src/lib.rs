//! # ied_simulator
//!
//! IEC 61850 substation IED simulator for Rust.
//!
//! This crate simulates a fleet of substation automation devices (IEDs).
//! Each device is an independent TCP server with its own address space,
//! periodic telemetry updates, and a select-before-operate control state
//! machine for breaker and switch positions.
//!
//! ## Features
//!
//! - **Per-device servers**: one listener per IED, many concurrent clients
//! - **Live telemetry**: background loop regenerating measurement values
//! - **Control state machine**: Select / Operate / Cancel with deadlines
//! - **Event-driven**: change notifications via broadcast channels
//! - **Type safe**: tagged value union, typed error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ied_simulator::{ControlOperation, IedRegistry};
//!
//! #[tokio::main]
//! async fn main() -> ied_simulator::Result<()> {
//!     let registry = IedRegistry::new();
//!     registry.add_device("models/model_mmxu.icd")?;
//!     registry.add_device("models/model_xcbr.icd")?;
//!
//!     registry.enable_logging();
//!     registry.start_all().await;
//!
//!     // Operate the breaker: select, then close.
//!     registry.execute_control("IED_XCBR/XCBR1.Pos$ST", ControlOperation::Select)?;
//!     registry.execute_control("IED_XCBR/XCBR1.Pos$ST", ControlOperation::Close)?;
//!
//!     for (station, updates) in registry.stop_all().await {
//!         println!("{station}: {updates} updates");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Overview
//!
//! Clients speak a reduced MMS-flavoured request/response scheme over
//! TPKT-style frames. The handshake is always answered with a fixed
//! capability set; read and control requests address points by their
//! hierarchical id plus functional constraint
//! (`IED_XCBR/XCBR1.Pos$ST`).
//!
//! ### Frame Structure
//!
//! ```text
//! +--------+--------+-----------------+----------------+
//! | 0x03   | 0x00   | Length (2 bytes)| Payload ...    |
//! +--------+--------+-----------------+----------------+
//!   Version  Reserved  Total frame      PDU tag + body
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod control;
pub mod device;
pub mod error;
pub mod model;
pub mod registry;
pub mod server;
pub mod simulation;
pub mod store;
pub mod types;

// Re-export main types
pub use codec::MmsCodec;
pub use control::{ControlExecutor, DEFAULT_SELECT_TIMEOUT};
pub use device::{ChangeNotifier, IedConfiguration, IedDevice};
pub use error::{IedError, Result};
pub use registry::{ControllableEntry, IedRegistry};
pub use server::IedServer;
pub use simulation::{SimulationLoop, DEFAULT_TICK};
pub use store::DataPointStore;
pub use types::*;
