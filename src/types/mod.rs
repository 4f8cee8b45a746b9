//! Core type definitions for the IED simulator.
//!
//! This module contains the data model and wire payload types:
//!
//! - `DataPoint` / `DataValue` - addressable values and their tagged union
//! - `PointId` / `FunctionalConstraint` - identifier decomposition
//! - `ControlOperation` / `ControlModel` / `ControlSession` - control state
//! - `MmsPdu` / `Service` / `ServiceResponse` - application payloads

mod control;
mod frame;
mod point;

pub use control::*;
pub use frame::*;
pub use point::*;
