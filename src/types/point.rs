//! Data point types for the IED simulator.
//!
//! A data point is one addressable value of a simulated device, identified
//! by a hierarchical path plus a functional-constraint suffix, e.g.
//! `IED_XCBR/XCBR1.Pos$ST`.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{IedError, Result};

/// Metadata key carrying the logical-node class (e.g. `CSWI`, `XCBR`).
pub const META_LN_CLASS: &str = "lnClass";

/// Metadata key carrying the control model of a controllable point.
pub const META_CTL_MODEL: &str = "ctlModel";

/// Metadata key carrying the data-object name (e.g. `Pos`).
pub const META_DO_NAME: &str = "doName";

/// Metadata key carrying the data-attribute name (e.g. `stVal`).
pub const META_DA_NAME: &str = "daName";

/// Logical-node classes whose points accept switching controls.
const CONTROLLABLE_LN_CLASSES: [&str; 3] = ["CSWI", "XCBR", "XSWI"];

/// Value type of a data point.
///
/// Governs simulated-value generation and wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointType {
    /// Floating-point measurement
    Float,
    /// Integer status or counter
    Integer,
    /// Boolean status
    Boolean,
    /// Free-form text, never simulated
    Text,
}

impl FromStr for PointType {
    type Err = IedError;

    /// Parse the type strings used by model sources (`float`, `int`, ...).
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float" => Ok(Self::Float),
            "int" => Ok(Self::Integer),
            "bool" => Ok(Self::Boolean),
            "string" => Ok(Self::Text),
            _ => Err(IedError::invalid_request("Unknown point type")),
        }
    }
}

/// Data value variants.
///
/// The variant always matches the point's [`PointType`]; construction goes
/// through typed constructors rather than runtime inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// Floating-point value
    Float(f64),
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// Text value
    Text(String),
}

impl DataValue {
    /// Get the point type matching this value.
    #[inline]
    pub const fn point_type(&self) -> PointType {
        match self {
            Self::Float(_) => PointType::Float,
            Self::Integer(_) => PointType::Integer,
            Self::Boolean(_) => PointType::Boolean,
            Self::Text(_) => PointType::Text,
        }
    }

    /// Convert to f64 if numeric.
    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    /// Convert to i64 if integer.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert to bool if boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for DataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v:.2}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Functional constraint distinguishing a point's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionalConstraint {
    /// Status information
    St,
    /// Measurand
    Mx,
    /// Control
    Co,
    /// Setpoint
    Sp,
    /// Configuration
    Cf,
    /// Description
    Dc,
}

impl FunctionalConstraint {
    /// Mnemonic as it appears in point identifiers.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::St => "ST",
            Self::Mx => "MX",
            Self::Co => "CO",
            Self::Sp => "SP",
            Self::Cf => "CF",
            Self::Dc => "DC",
        }
    }
}

impl FromStr for FunctionalConstraint {
    type Err = IedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ST" => Ok(Self::St),
            "MX" => Ok(Self::Mx),
            "CO" => Ok(Self::Co),
            "SP" => Ok(Self::Sp),
            "CF" => Ok(Self::Cf),
            "DC" => Ok(Self::Dc),
            _ => Err(IedError::MalformedIdentifier(s.to_string())),
        }
    }
}

impl std::fmt::Display for FunctionalConstraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decomposed point identifier: `{path}${fc}`.
///
/// The path itself is hierarchical
/// (`{station}/{logical-node}.{data-object}.{attribute}`) but only the
/// leading station segment is interpreted; the rest is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointId {
    path: String,
    fc: FunctionalConstraint,
}

impl PointId {
    /// Parse an identifier into path and functional constraint.
    ///
    /// The id must split on `'$'` into at least a base path and a
    /// constraint suffix; anything else is [`IedError::MalformedIdentifier`].
    pub fn parse(id: &str) -> Result<Self> {
        let (path, fc) = id
            .split_once('$')
            .ok_or_else(|| IedError::MalformedIdentifier(id.to_string()))?;
        if path.is_empty() {
            return Err(IedError::MalformedIdentifier(id.to_string()));
        }
        let fc = fc.parse()?;
        Ok(Self {
            path: path.to_string(),
            fc,
        })
    }

    /// Base path without the functional constraint.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Functional constraint suffix.
    #[inline]
    pub fn fc(&self) -> FunctionalConstraint {
        self.fc
    }

    /// Leading station segment of the path.
    #[inline]
    pub fn station(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }
}

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}${}", self.path, self.fc)
    }
}

/// One addressable value of a simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Unique identifier within the device (path + functional constraint)
    pub id: String,
    /// Human-readable label
    pub name: String,
    /// Current value; the variant fixes the point type
    pub value: DataValue,
    /// Last-update time, refreshed together with the value
    pub timestamp: DateTime<Utc>,
    /// Creation-time tags; read-only afterwards
    pub metadata: HashMap<String, String>,
}

impl DataPoint {
    /// Create a new data point with the current time and no metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>, value: DataValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata tag (builder style, creation time only).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the point type.
    #[inline]
    pub fn point_type(&self) -> PointType {
        self.value.point_type()
    }

    /// Check whether this point accepts switching controls.
    ///
    /// A point is controllable when its logical-node class is one of the
    /// switch-controller/breaker classes and its control model is not
    /// status-only.
    pub fn is_controllable(&self) -> bool {
        let ln_ok = self
            .metadata
            .get(META_LN_CLASS)
            .is_some_and(|c| CONTROLLABLE_LN_CLASSES.contains(&c.as_str()));
        let model_ok = self
            .metadata
            .get(META_CTL_MODEL)
            .and_then(|m| m.parse::<crate::types::ControlModel>().ok())
            .is_some_and(|m| m != crate::types::ControlModel::StatusOnly);
        ln_ok && model_ok
    }

    /// Control model of the point, if it carries one.
    pub fn control_model(&self) -> Option<crate::types::ControlModel> {
        self.metadata
            .get(META_CTL_MODEL)
            .and_then(|m| m.parse().ok())
    }

    /// Replace value and timestamp in one step.
    pub fn set_value(&mut self, value: DataValue) {
        self.value = value;
        self.timestamp = Utc::now();
    }
}
