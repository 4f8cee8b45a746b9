//! Error types for the IED simulator.

use thiserror::Error;

/// Result type alias for simulator operations.
pub type Result<T> = std::result::Result<T, IedError>;

/// IED simulator error types.
#[derive(Debug, Error)]
pub enum IedError {
    /// Data point not found
    #[error("Data point not found: {0}")]
    PointNotFound(String),

    /// Station not found in the registry
    #[error("Unknown station: {0}")]
    UnknownStation(String),

    /// Station name already registered
    #[error("Duplicate station: {0}")]
    DuplicateStation(String),

    /// Point exists but carries no controllable metadata
    #[error("Not a controllable point: {0}")]
    UnknownControl(String),

    /// Another session already holds the selection
    #[error("Control already selected: {0}")]
    AlreadySelected(String),

    /// Operate without a prior select on an SBO point
    #[error("Control not selected: {0}")]
    NotSelected(String),

    /// Selection deadline passed before the operate arrived
    #[error("Selection expired: {0}")]
    StaleSelection(String),

    /// Point id does not decompose into path and functional constraint
    #[error("Malformed point identifier: {0}")]
    MalformedIdentifier(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid frame format
    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),

    /// Invalid request payload
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

impl IedError {
    /// Create an invalid frame error.
    pub fn invalid_frame(msg: &'static str) -> Self {
        Self::InvalidFrame(msg)
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: &'static str) -> Self {
        Self::InvalidRequest(msg)
    }

    /// Check if this error is a control sequencing violation.
    pub fn is_control_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownControl(_)
                | Self::AlreadySelected(_)
                | Self::NotSelected(_)
                | Self::StaleSelection(_)
        )
    }

    /// Check if this error indicates a transport problem.
    ///
    /// Transport errors terminate a single connection; they are never
    /// escalated to a device-wide failure.
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::Io(_) | Self::InvalidFrame(_) | Self::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IedError::PointNotFound("IED_XCBR/XCBR1.Pos$ST".into());
        assert_eq!(err.to_string(), "Data point not found: IED_XCBR/XCBR1.Pos$ST");

        let err = IedError::DuplicateStation("IED_CSWI".into());
        assert_eq!(err.to_string(), "Duplicate station: IED_CSWI");

        let err = IedError::StaleSelection("IED_XCBR/XCBR1.Pos$ST".into());
        assert_eq!(err.to_string(), "Selection expired: IED_XCBR/XCBR1.Pos$ST");
    }

    #[test]
    fn test_is_control_error() {
        assert!(IedError::AlreadySelected("x".into()).is_control_error());
        assert!(IedError::NotSelected("x".into()).is_control_error());
        assert!(IedError::StaleSelection("x".into()).is_control_error());
        assert!(!IedError::PointNotFound("x".into()).is_control_error());
    }

    #[test]
    fn test_is_transport_error() {
        assert!(IedError::ChannelClosed.is_transport_error());
        assert!(IedError::InvalidFrame("short").is_transport_error());
        assert!(!IedError::NotSelected("x".into()).is_transport_error());
    }
}
