//! Session-layer framing codec for tokio.
//!
//! Frames are TPKT-style: a version byte, a reserved byte, and a 16-bit
//! big-endian length covering the whole frame, followed by the
//! application payload.
//!
//! ```text
//! +--------+--------+--------+--------+----------------+
//! | 0x03   | 0x00   | Length (2 bytes)| Payload ...    |
//! +--------+--------+--------+--------+----------------+
//! ```

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::IedError;
use crate::types::MmsPdu;

/// Version byte starting every frame.
pub const START_BYTE: u8 = 0x03;

/// Frame header size (version + reserved + length).
pub const HEADER_LENGTH: usize = 4;

/// Minimum total frame length (header plus one payload byte).
pub const MIN_FRAME_LENGTH: usize = HEADER_LENGTH + 1;

/// Maximum total frame length.
pub const MAX_FRAME_LENGTH: usize = 8192;

/// Session-layer framing codec.
///
/// Handles framing and payload parsing for simulator connections.
///
/// # Example
///
/// ```rust,ignore
/// use tokio_util::codec::Framed;
/// use ied_simulator::codec::MmsCodec;
///
/// let stream = TcpStream::connect("127.0.0.1:10104").await?;
/// let mut framed = Framed::new(stream, MmsCodec::new());
///
/// framed.send(MmsPdu::InitiateRequest { detail: Bytes::new() }).await?;
/// while let Some(pdu) = framed.next().await {
///     println!("Received: {:?}", pdu?);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MmsCodec {
    // State for handling partial frames
    state: DecodeState,
}

#[derive(Debug, Clone, Default)]
enum DecodeState {
    #[default]
    WaitingForStart,
    WaitingForHeader,
    WaitingForData {
        length: usize,
    },
}

impl MmsCodec {
    /// Create a new framing codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MmsCodec {
    type Item = MmsPdu;
    type Error = IedError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            match &self.state {
                DecodeState::WaitingForStart => {
                    // Skip bytes until we find the version byte
                    while !src.is_empty() && src[0] != START_BYTE {
                        src.advance(1);
                    }

                    if src.is_empty() {
                        return Ok(None);
                    }

                    self.state = DecodeState::WaitingForHeader;
                }

                DecodeState::WaitingForHeader => {
                    if src.len() < HEADER_LENGTH {
                        return Ok(None);
                    }

                    // Reserved byte must be zero; otherwise this was not a
                    // frame start and we resynchronize.
                    if src[1] != 0x00 {
                        src.advance(1);
                        self.state = DecodeState::WaitingForStart;
                        continue;
                    }

                    let length = u16::from_be_bytes([src[2], src[3]]) as usize;

                    if !(MIN_FRAME_LENGTH..=MAX_FRAME_LENGTH).contains(&length) {
                        // Invalid length, skip start byte and restart
                        src.advance(1);
                        self.state = DecodeState::WaitingForStart;
                        continue;
                    }

                    self.state = DecodeState::WaitingForData { length };
                }

                DecodeState::WaitingForData { length } => {
                    if src.len() < *length {
                        return Ok(None);
                    }

                    // We have a complete frame
                    let frame = src.split_to(*length);
                    self.state = DecodeState::WaitingForStart;

                    let pdu = MmsPdu::parse(&frame[HEADER_LENGTH..])?;
                    return Ok(Some(pdu));
                }
            }
        }
    }
}

impl Encoder<MmsPdu> for MmsCodec {
    type Error = IedError;

    fn encode(&mut self, item: MmsPdu, dst: &mut BytesMut) -> std::result::Result<(), Self::Error> {
        let payload_len = item.encoded_len();
        let total_len = HEADER_LENGTH + payload_len;

        if total_len > MAX_FRAME_LENGTH {
            return Err(IedError::invalid_frame("Payload too large"));
        }

        dst.reserve(total_len);
        dst.extend_from_slice(&[START_BYTE, 0x00]);
        dst.extend_from_slice(&(total_len as u16).to_be_bytes());
        item.encode_to(dst);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ControlOperation, Service, ServiceResponse, MmsPdu, PDU_INITIATE_REQUEST,
        SERVICE_GET_NAME_LIST,
    };
    use bytes::Bytes;

    #[test]
    fn test_decode_initiate() {
        let mut codec = MmsCodec::new();
        let mut buf = BytesMut::from(&[0x03, 0x00, 0x00, 0x05, PDU_INITIATE_REQUEST][..]);

        let pdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut codec = MmsCodec::new();

        // Send first part
        let mut buf = BytesMut::from(&[0x03, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Header complete, payload still missing
        buf.extend_from_slice(&[0x00, 0x05]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Send remaining part
        buf.extend_from_slice(&[PDU_INITIATE_REQUEST]);
        let pdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_decode_skip_garbage() {
        let mut codec = MmsCodec::new();
        // Garbage bytes before a valid frame
        let mut buf =
            BytesMut::from(&[0xFF, 0xAA, 0x03, 0x00, 0x00, 0x05, PDU_INITIATE_REQUEST][..]);

        let pdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_decode_bad_reserved_byte_resyncs() {
        let mut codec = MmsCodec::new();
        // 0x03 followed by a non-zero reserved byte is not a frame start
        let mut buf =
            BytesMut::from(&[0x03, 0x07, 0x03, 0x00, 0x00, 0x05, PDU_INITIATE_REQUEST][..]);

        let pdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_decode_invalid_length_resyncs() {
        let mut codec = MmsCodec::new();
        // Declared length below the minimum, then a valid frame
        let mut buf = BytesMut::from(
            &[0x03, 0x00, 0x00, 0x02, 0x03, 0x00, 0x00, 0x05, PDU_INITIATE_REQUEST][..],
        );

        let pdu = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(pdu, MmsPdu::InitiateRequest { .. }));
    }

    #[test]
    fn test_encode_header() {
        let mut codec = MmsCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(
                MmsPdu::InitiateRequest {
                    detail: Bytes::new(),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(&buf[..], &[0x03, 0x00, 0x00, 0x05, PDU_INITIATE_REQUEST]);
    }

    #[test]
    fn test_roundtrip() {
        let mut codec = MmsCodec::new();

        let pdus = [
            MmsPdu::InitiateResponse,
            MmsPdu::request(1, Service::GetNameList),
            MmsPdu::request(
                2,
                Service::Control {
                    operation: ControlOperation::Select,
                    item_id: "IED_XCBR/XCBR1.Pos$ST".into(),
                },
            ),
            MmsPdu::response(
                1,
                SERVICE_GET_NAME_LIST,
                ServiceResponse::NameList(vec!["IED_A/LN1.v$MX".into()]),
            ),
        ];

        for original in pdus {
            let mut buf = BytesMut::new();
            codec.encode(original.clone(), &mut buf).unwrap();

            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut codec = MmsCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(MmsPdu::request(1, Service::GetNameList), &mut buf)
            .unwrap();
        codec
            .encode(MmsPdu::request(2, Service::GetNameList), &mut buf)
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first, MmsPdu::request(1, Service::GetNameList));
        assert_eq!(second, MmsPdu::request(2, Service::GetNameList));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
