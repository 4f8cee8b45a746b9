//! Control types: operations, control models, and session state.

use std::str::FromStr;

use tokio::time::Instant;

use crate::error::{IedError, Result};

/// Supervisory control operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOperation {
    /// Reserve the control point (SBO models)
    Select,
    /// Drive the point to its open sentinel
    Open,
    /// Drive the point to its closed sentinel
    Close,
    /// Release a held selection
    Cancel,
}

impl ControlOperation {
    /// Wire code of the operation.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Select => 1,
            Self::Open => 2,
            Self::Close => 3,
            Self::Cancel => 4,
        }
    }

    /// Parse an operation from its wire code.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Select),
            2 => Ok(Self::Open),
            3 => Ok(Self::Close),
            4 => Ok(Self::Cancel),
            _ => Err(IedError::invalid_request("Unknown control operation")),
        }
    }

    /// Sentinel value an operate writes into the point, if any.
    ///
    /// Open and Close map to the position sentinels; Select and Cancel
    /// leave the value untouched.
    #[inline]
    pub const fn sentinel(&self) -> Option<i64> {
        match self {
            Self::Open => Some(1),
            Self::Close => Some(0),
            Self::Select | Self::Cancel => None,
        }
    }
}

impl std::fmt::Display for ControlOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Select => "select",
            Self::Open => "open",
            Self::Close => "close",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Per-control-point policy determining the operate discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlModel {
    /// No control allowed (0)
    StatusOnly = 0,
    /// Direct operate with normal security (1)
    DirectNormal = 1,
    /// Select before operate with normal security (2)
    SboNormal = 2,
    /// Direct operate with enhanced security (3)
    DirectEnhanced = 3,
    /// Select before operate with enhanced security (4)
    SboEnhanced = 4,
}

impl ControlModel {
    /// Check whether an operate must be preceded by a select.
    #[inline]
    pub const fn requires_select(&self) -> bool {
        matches!(self, Self::SboNormal | Self::SboEnhanced)
    }

    /// Model name as carried in point metadata.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatusOnly => "status-only",
            Self::DirectNormal => "direct-with-normal-security",
            Self::SboNormal => "sbo-with-normal-security",
            Self::DirectEnhanced => "direct-with-enhanced-security",
            Self::SboEnhanced => "sbo-with-enhanced-security",
        }
    }
}

impl FromStr for ControlModel {
    type Err = IedError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "status-only" => Ok(Self::StatusOnly),
            "direct-with-normal-security" => Ok(Self::DirectNormal),
            "sbo-with-normal-security" => Ok(Self::SboNormal),
            "direct-with-enhanced-security" => Ok(Self::DirectEnhanced),
            "sbo-with-enhanced-security" => Ok(Self::SboEnhanced),
            _ => Err(IedError::invalid_request("Unknown control model")),
        }
    }
}

impl std::fmt::Display for ControlModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a control point's select/operate handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    /// No selection held
    Idle,
    /// A selection is held and unexpired
    Selected,
}

/// Transient state for one control point's handshake.
///
/// Created on Select, destroyed on Operate completion, Cancel, or deadline
/// expiry. At most one session exists per point id.
#[derive(Debug, Clone)]
pub struct ControlSession {
    /// Controlled point id
    pub point_id: String,
    /// Identity of the connection that issued the select
    pub holder: String,
    /// Selection deadline
    pub deadline: Instant,
}

impl ControlSession {
    /// Create a session expiring after `timeout`.
    pub fn new(point_id: impl Into<String>, holder: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            point_id: point_id.into(),
            holder: holder.into(),
            deadline: Instant::now() + timeout,
        }
    }

    /// Check whether the selection deadline has passed.
    #[inline]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_operation_roundtrip() {
        for op in [
            ControlOperation::Select,
            ControlOperation::Open,
            ControlOperation::Close,
            ControlOperation::Cancel,
        ] {
            assert_eq!(ControlOperation::from_u8(op.as_u8()).unwrap(), op);
        }
        assert!(ControlOperation::from_u8(0).is_err());
        assert!(ControlOperation::from_u8(9).is_err());
    }

    #[test]
    fn test_operation_sentinels() {
        assert_eq!(ControlOperation::Open.sentinel(), Some(1));
        assert_eq!(ControlOperation::Close.sentinel(), Some(0));
        assert_eq!(ControlOperation::Select.sentinel(), None);
        assert_eq!(ControlOperation::Cancel.sentinel(), None);
    }

    #[test]
    fn test_control_model_select_requirement() {
        assert!(ControlModel::SboNormal.requires_select());
        assert!(ControlModel::SboEnhanced.requires_select());
        assert!(!ControlModel::DirectNormal.requires_select());
        assert!(!ControlModel::DirectEnhanced.requires_select());
        assert!(!ControlModel::StatusOnly.requires_select());
    }

    #[test]
    fn test_control_model_parse() {
        for model in [
            ControlModel::StatusOnly,
            ControlModel::DirectNormal,
            ControlModel::SboNormal,
            ControlModel::DirectEnhanced,
            ControlModel::SboEnhanced,
        ] {
            assert_eq!(model.as_str().parse::<ControlModel>().unwrap(), model);
        }
        assert!("sbo".parse::<ControlModel>().is_err());
    }

    #[tokio::test]
    async fn test_session_expiry() {
        let session = ControlSession::new("p", "client", Duration::from_millis(20));
        assert!(!session.is_expired());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(session.is_expired());
    }
}
