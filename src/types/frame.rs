//! Application-layer payloads exchanged with clients.
//!
//! The simulator speaks a reduced MMS-flavoured request/response scheme.
//! Every payload starts with a PDU tag byte; confirmed requests carry an
//! invoke id and a service tag. The exact byte layout is simulator-defined,
//! the dispatch contract is not: the PDU tag at offset 0 classifies the
//! request, and unknown tags are skipped rather than answered.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{IedError, Result};
use crate::types::{ControlOperation, DataValue};

/// PDU tag: initiate (handshake) request.
pub const PDU_INITIATE_REQUEST: u8 = 0xA8;

/// PDU tag: initiate response.
pub const PDU_INITIATE_RESPONSE: u8 = 0xA9;

/// PDU tag: confirmed service request.
pub const PDU_CONFIRMED_REQUEST: u8 = 0xA0;

/// PDU tag: confirmed service response.
pub const PDU_CONFIRMED_RESPONSE: u8 = 0xA1;

/// Service tag: name list of all data points.
pub const SERVICE_GET_NAME_LIST: u8 = 0x01;

/// Service tag: read one data point.
pub const SERVICE_READ: u8 = 0x04;

/// Service tag: control operation on one point.
pub const SERVICE_CONTROL: u8 = 0x05;

/// Value tag: boolean (1 byte).
pub const TAG_BOOLEAN: u8 = 0x83;

/// Value tag: integer (8 bytes, big-endian).
pub const TAG_INTEGER: u8 = 0x85;

/// Value tag: float (8 bytes, IEEE-754 big-endian).
pub const TAG_FLOAT: u8 = 0x87;

/// Value tag: text (length-prefixed UTF-8).
pub const TAG_TEXT: u8 = 0x8A;

/// Fixed capability detail returned to every initiate request.
///
/// The simulator does not negotiate parameters; it always answers with the
/// same capability set.
pub const INITIATE_DETAIL: [u8; 16] = [
    0x11, 0xE0, 0x00, 0x00, 0x00, 0x01, 0x00, 0xA1, 0x07, 0x02, 0x01, 0x03, 0xA2, 0x02, 0x80,
    0x00,
];

/// Service-level error code carried in a confirmed response status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceError {
    /// Operate refused until a fresh select is taken
    TemporarilyUnavailable = 2,
    /// Selection held by another session
    ObjectAccessDenied = 3,
    /// Identifier does not decompose
    InvalidAddress = 5,
    /// Point carries no control
    ObjectAccessUnsupported = 9,
    /// No such point or station
    ObjectNonExistent = 10,
}

impl ServiceError {
    /// Status byte for this error.
    #[inline]
    pub const fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Parse a status byte; zero is success and therefore not an error.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            2 => Ok(Self::TemporarilyUnavailable),
            3 => Ok(Self::ObjectAccessDenied),
            5 => Ok(Self::InvalidAddress),
            9 => Ok(Self::ObjectAccessUnsupported),
            10 => Ok(Self::ObjectNonExistent),
            _ => Err(IedError::invalid_frame("Unknown service error code")),
        }
    }
}

impl From<&IedError> for ServiceError {
    fn from(err: &IedError) -> Self {
        match err {
            IedError::PointNotFound(_) | IedError::UnknownStation(_) => Self::ObjectNonExistent,
            IedError::AlreadySelected(_) => Self::ObjectAccessDenied,
            IedError::NotSelected(_) | IedError::StaleSelection(_) => {
                Self::TemporarilyUnavailable
            }
            IedError::MalformedIdentifier(_) => Self::InvalidAddress,
            IedError::UnknownControl(_) => Self::ObjectAccessUnsupported,
            _ => Self::ObjectAccessDenied,
        }
    }
}

/// Confirmed service request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Service {
    /// List every data point id of the device
    GetNameList,
    /// Read the current value of one point
    Read {
        /// Full point identifier
        item_id: String,
    },
    /// Apply a control operation to one point
    Control {
        /// Requested operation
        operation: ControlOperation,
        /// Full point identifier
        item_id: String,
    },
}

impl Service {
    /// Service tag byte.
    #[inline]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::GetNameList => SERVICE_GET_NAME_LIST,
            Self::Read { .. } => SERVICE_READ,
            Self::Control { .. } => SERVICE_CONTROL,
        }
    }

    /// Parse a service body for the given tag.
    pub fn parse(tag: u8, mut body: &[u8]) -> Result<Self> {
        match tag {
            SERVICE_GET_NAME_LIST => Ok(Self::GetNameList),
            SERVICE_READ => {
                let item_id = get_string(&mut body)?;
                Ok(Self::Read { item_id })
            }
            SERVICE_CONTROL => {
                if body.is_empty() {
                    return Err(IedError::invalid_request("Control body too short"));
                }
                let operation = ControlOperation::from_u8(body.get_u8())?;
                let item_id = get_string(&mut body)?;
                Ok(Self::Control { operation, item_id })
            }
            _ => Err(IedError::invalid_request("Unknown service tag")),
        }
    }

    /// Encode the service body (without the tag).
    pub fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            Self::GetNameList => {}
            Self::Read { item_id } => put_string(dst, item_id),
            Self::Control { operation, item_id } => {
                dst.put_u8(operation.as_u8());
                put_string(dst, item_id);
            }
        }
    }
}

/// Confirmed service response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    /// All point ids of the device
    NameList(Vec<String>),
    /// Current value of the requested point
    Value(DataValue),
    /// Control accepted and applied
    ControlAck,
    /// Service failed; the explicit indication, never a default value
    Error(ServiceError),
}

impl ServiceResponse {
    /// Status byte: zero for success, the error code otherwise.
    #[inline]
    pub fn status(&self) -> u8 {
        match self {
            Self::Error(e) => e.as_u8(),
            _ => 0,
        }
    }

    /// Parse a response body for the given service tag and status byte.
    pub fn parse(service: u8, status: u8, mut body: &[u8]) -> Result<Self> {
        if status != 0 {
            return Ok(Self::Error(ServiceError::from_u8(status)?));
        }
        match service {
            SERVICE_GET_NAME_LIST => {
                if body.len() < 2 {
                    return Err(IedError::invalid_frame("Name list too short"));
                }
                let count = body.get_u16() as usize;
                let mut names = Vec::with_capacity(count);
                for _ in 0..count {
                    names.push(get_string(&mut body)?);
                }
                Ok(Self::NameList(names))
            }
            SERVICE_READ => Ok(Self::Value(parse_value(&mut body)?)),
            SERVICE_CONTROL => Ok(Self::ControlAck),
            _ => Err(IedError::invalid_frame("Unknown service tag in response")),
        }
    }

    /// Encode the response body (without service tag and status).
    pub fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            Self::NameList(names) => {
                dst.put_u16(names.len() as u16);
                for name in names {
                    put_string(dst, name);
                }
            }
            Self::Value(value) => encode_value(value, dst),
            Self::ControlAck | Self::Error(_) => {}
        }
    }
}

/// One application-layer PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum MmsPdu {
    /// Handshake request; the payload is kept but never interpreted
    InitiateRequest {
        /// Raw request detail
        detail: Bytes,
    },
    /// Fixed capability response
    InitiateResponse,
    /// Confirmed service request
    ConfirmedRequest {
        /// Request/response correlation id
        invoke_id: u16,
        /// Requested service
        service: Service,
    },
    /// Confirmed service response
    ConfirmedResponse {
        /// Correlation id echoed from the request
        invoke_id: u16,
        /// Service tag echoed from the request
        service: u8,
        /// Outcome
        response: ServiceResponse,
    },
    /// Recognized envelope, unrecognized content; logged and not answered
    Unknown {
        /// PDU tag byte
        tag: u8,
    },
}

impl MmsPdu {
    /// Build a confirmed request.
    pub fn request(invoke_id: u16, service: Service) -> Self {
        Self::ConfirmedRequest { invoke_id, service }
    }

    /// Build a confirmed response.
    pub fn response(invoke_id: u16, service: u8, response: ServiceResponse) -> Self {
        Self::ConfirmedResponse {
            invoke_id,
            service,
            response,
        }
    }

    /// Classify and parse a frame payload.
    ///
    /// The PDU tag at offset 0 determines the request type. Unknown tags
    /// and unknown confirmed services produce [`MmsPdu::Unknown`] so the
    /// session can log and keep the connection open.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let tag = *payload
            .first()
            .ok_or(IedError::InvalidFrame("Empty payload"))?;
        match tag {
            PDU_INITIATE_REQUEST => Ok(Self::InitiateRequest {
                detail: Bytes::copy_from_slice(&payload[1..]),
            }),
            PDU_INITIATE_RESPONSE => Ok(Self::InitiateResponse),
            PDU_CONFIRMED_REQUEST => {
                if payload.len() < 4 {
                    return Err(IedError::invalid_frame("Confirmed request too short"));
                }
                let invoke_id = u16::from_be_bytes([payload[1], payload[2]]);
                match Service::parse(payload[3], &payload[4..]) {
                    Ok(service) => Ok(Self::ConfirmedRequest { invoke_id, service }),
                    Err(IedError::InvalidRequest(_)) => Ok(Self::Unknown { tag: payload[3] }),
                    Err(e) => Err(e),
                }
            }
            PDU_CONFIRMED_RESPONSE => {
                if payload.len() < 5 {
                    return Err(IedError::invalid_frame("Confirmed response too short"));
                }
                let invoke_id = u16::from_be_bytes([payload[1], payload[2]]);
                let service = payload[3];
                let response = ServiceResponse::parse(service, payload[4], &payload[5..])?;
                Ok(Self::ConfirmedResponse {
                    invoke_id,
                    service,
                    response,
                })
            }
            _ => Ok(Self::Unknown { tag }),
        }
    }

    /// Encode the PDU payload.
    pub fn encode_to(&self, dst: &mut BytesMut) {
        match self {
            Self::InitiateRequest { detail } => {
                dst.put_u8(PDU_INITIATE_REQUEST);
                dst.extend_from_slice(detail);
            }
            Self::InitiateResponse => {
                dst.put_u8(PDU_INITIATE_RESPONSE);
                dst.extend_from_slice(&INITIATE_DETAIL);
            }
            Self::ConfirmedRequest { invoke_id, service } => {
                dst.put_u8(PDU_CONFIRMED_REQUEST);
                dst.put_u16(*invoke_id);
                dst.put_u8(service.tag());
                service.encode_body(dst);
            }
            Self::ConfirmedResponse {
                invoke_id,
                service,
                response,
            } => {
                dst.put_u8(PDU_CONFIRMED_RESPONSE);
                dst.put_u16(*invoke_id);
                dst.put_u8(*service);
                dst.put_u8(response.status());
                response.encode_body(dst);
            }
            Self::Unknown { tag } => dst.put_u8(*tag),
        }
    }

    /// Encoded payload size in bytes.
    pub fn encoded_len(&self) -> usize {
        let mut buf = BytesMut::new();
        self.encode_to(&mut buf);
        buf.len()
    }
}

/// Encode a data value with its type tag.
pub fn encode_value(value: &DataValue, dst: &mut BytesMut) {
    match value {
        DataValue::Boolean(v) => {
            dst.put_u8(TAG_BOOLEAN);
            dst.put_u8(u8::from(*v));
        }
        DataValue::Integer(v) => {
            dst.put_u8(TAG_INTEGER);
            dst.put_i64(*v);
        }
        DataValue::Float(v) => {
            dst.put_u8(TAG_FLOAT);
            dst.put_f64(*v);
        }
        DataValue::Text(v) => {
            dst.put_u8(TAG_TEXT);
            put_string(dst, v);
        }
    }
}

/// Parse a tagged data value.
pub fn parse_value(buf: &mut &[u8]) -> Result<DataValue> {
    if buf.is_empty() {
        return Err(IedError::invalid_frame("Empty value"));
    }
    let tag = buf.get_u8();
    match tag {
        TAG_BOOLEAN => {
            if buf.is_empty() {
                return Err(IedError::invalid_frame("Boolean value too short"));
            }
            Ok(DataValue::Boolean(buf.get_u8() != 0))
        }
        TAG_INTEGER => {
            if buf.len() < 8 {
                return Err(IedError::invalid_frame("Integer value too short"));
            }
            Ok(DataValue::Integer(buf.get_i64()))
        }
        TAG_FLOAT => {
            if buf.len() < 8 {
                return Err(IedError::invalid_frame("Float value too short"));
            }
            Ok(DataValue::Float(buf.get_f64()))
        }
        TAG_TEXT => Ok(DataValue::Text(get_string(buf)?)),
        _ => Err(IedError::invalid_frame("Unknown value tag")),
    }
}

fn put_string(dst: &mut BytesMut, s: &str) {
    dst.put_u16(s.len() as u16);
    dst.extend_from_slice(s.as_bytes());
}

fn get_string(buf: &mut &[u8]) -> Result<String> {
    if buf.len() < 2 {
        return Err(IedError::invalid_frame("String length missing"));
    }
    let len = buf.get_u16() as usize;
    if buf.len() < len {
        return Err(IedError::invalid_frame("String truncated"));
    }
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| IedError::invalid_frame("String not UTF-8"))?
        .to_string();
    buf.advance(len);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(pdu: MmsPdu) -> MmsPdu {
        let mut buf = BytesMut::new();
        pdu.encode_to(&mut buf);
        MmsPdu::parse(&buf).unwrap()
    }

    #[test]
    fn test_initiate_classified_by_leading_tag() {
        let pdu = MmsPdu::parse(&[PDU_INITIATE_REQUEST, 0xDE, 0xAD]).unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_read_request_roundtrip() {
        let pdu = MmsPdu::request(
            7,
            Service::Read {
                item_id: "IED_MMXU/MMXU1.Amp.phsA$MX".into(),
            },
        );
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn test_control_request_roundtrip() {
        for op in [
            ControlOperation::Select,
            ControlOperation::Open,
            ControlOperation::Close,
            ControlOperation::Cancel,
        ] {
            let pdu = MmsPdu::request(
                99,
                Service::Control {
                    operation: op,
                    item_id: "IED_XCBR/XCBR1.Pos$ST".into(),
                },
            );
            assert_eq!(roundtrip(pdu.clone()), pdu);
        }
    }

    #[test]
    fn test_value_response_roundtrip() {
        for value in [
            DataValue::Float(42.25),
            DataValue::Integer(-3),
            DataValue::Boolean(true),
            DataValue::Text("breaker".into()),
        ] {
            let pdu = MmsPdu::response(1, SERVICE_READ, ServiceResponse::Value(value));
            assert_eq!(roundtrip(pdu.clone()), pdu);
        }
    }

    #[test]
    fn test_error_response_roundtrip() {
        let pdu = MmsPdu::response(
            5,
            SERVICE_READ,
            ServiceResponse::Error(ServiceError::ObjectNonExistent),
        );
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn test_name_list_roundtrip() {
        let names = vec![
            "IED_MMXU/MMXU1.Amp.phsA$MX".to_string(),
            "IED_MMXU/MMXU1.Amp.phsB$MX".to_string(),
        ];
        let pdu = MmsPdu::response(
            2,
            SERVICE_GET_NAME_LIST,
            ServiceResponse::NameList(names),
        );
        assert_eq!(roundtrip(pdu.clone()), pdu);
    }

    #[test]
    fn test_unknown_tag_is_not_an_error() {
        let pdu = MmsPdu::parse(&[0x42, 0x00]).unwrap();
        assert_eq!(pdu, MmsPdu::Unknown { tag: 0x42 });
    }

    #[test]
    fn test_unknown_service_is_not_an_error() {
        // Confirmed envelope with a service tag the simulator does not speak.
        let pdu = MmsPdu::parse(&[PDU_CONFIRMED_REQUEST, 0x00, 0x01, 0x7F]).unwrap();
        assert_eq!(pdu, MmsPdu::Unknown { tag: 0x7F });
    }

    #[test]
    fn test_truncated_payloads_rejected() {
        assert!(MmsPdu::parse(&[]).is_err());
        assert!(MmsPdu::parse(&[PDU_CONFIRMED_REQUEST, 0x00]).is_err());
        let mut body: &[u8] = &[0x00, 0x08, b'a', b'b'];
        assert!(get_string(&mut body).is_err());
    }

    #[test]
    fn test_service_error_mapping() {
        use crate::error::IedError;
        assert_eq!(
            ServiceError::from(&IedError::PointNotFound("x".into())),
            ServiceError::ObjectNonExistent
        );
        assert_eq!(
            ServiceError::from(&IedError::AlreadySelected("x".into())),
            ServiceError::ObjectAccessDenied
        );
        assert_eq!(
            ServiceError::from(&IedError::StaleSelection("x".into())),
            ServiceError::TemporarilyUnavailable
        );
        assert_eq!(
            ServiceError::from(&IedError::MalformedIdentifier("x".into())),
            ServiceError::InvalidAddress
        );
    }
}
