//! Pure framing functions: building and validating the wire frames
//! exchanged by the protocol engine. This module holds no state and
//! raises no errors other than the `None`/`Bad` results documented on
//! each function.
use crate::crc32::crc32;

/// Synchronous idle. Precedes every frame.
pub const SYN: u8 = 0x16;
/// Start of text. Follows `SYN` in a data frame.
pub const STX: u8 = 0x02;
/// Acknowledge.
pub const ACK: u8 = 0x06;
/// Enquiry -- request to send.
pub const ENQ: u8 = 0x05;
/// End of transmission.
pub const EOT: u8 = 0x04;
/// Reverse interrupt -- "give me the line".
pub const RVI: u8 = 0x12;

/// Size of the payload carried by a data frame.
pub const DATA_LENGTH: usize = 512;
/// Total size of a data frame on the wire: SYN + STX + payload + CRC.
pub const DATA_FRAME_SIZE: usize = 2 + DATA_LENGTH + 4;
/// Total size of a control frame on the wire: SYN + kind byte.
pub const CONTROL_FRAME_SIZE: usize = 2;

/// A single control-frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Ack,
    Enq,
    Eot,
    Rvi,
}

impl ControlKind {
    fn byte(self) -> u8 {
        match self {
            ControlKind::Ack => ACK,
            ControlKind::Enq => ENQ,
            ControlKind::Eot => EOT,
            ControlKind::Rvi => RVI,
        }
    }

    /// Map a raw control byte back to a kind, if it is a recognized one.
    pub fn from_byte(b: u8) -> Option<ControlKind> {
        match b {
            ACK => Some(ControlKind::Ack),
            ENQ => Some(ControlKind::Enq),
            EOT => Some(ControlKind::Eot),
            RVI => Some(ControlKind::Rvi),
            _ => None,
        }
    }
}

/// Build a 518-byte data frame from up to 512 bytes of payload. The
/// payload is right-padded with NUL to exactly 512 bytes before the
/// CRC-32 is computed.
pub fn build_data_frame(payload: &[u8]) -> [u8; DATA_FRAME_SIZE] {
    debug_assert!(payload.len() <= DATA_LENGTH);

    let mut frame = [0u8; DATA_FRAME_SIZE];
    frame[0] = SYN;
    frame[1] = STX;

    let n = payload.len().min(DATA_LENGTH);
    frame[2..2 + n].copy_from_slice(&payload[..n]);
    // bytes [2 + n .. 514) are already NUL from the array initializer.

    let crc = crc32(&frame[2..514]);
    frame[514..518].copy_from_slice(&crc.to_be_bytes());
    frame
}

/// Validate a candidate data frame. Returns the 512-byte payload if
/// the frame is exactly 518 bytes and its CRC-32 matches.
pub fn validate_data_frame(candidate: &[u8]) -> Result<[u8; DATA_LENGTH], ()> {
    if candidate.len() != DATA_FRAME_SIZE {
        return Err(());
    }
    let payload = &candidate[2..514];
    let crc = crc32(payload);
    let on_wire = u32::from_be_bytes([
        candidate[514],
        candidate[515],
        candidate[516],
        candidate[517],
    ]);
    if crc != on_wire {
        return Err(());
    }
    let mut out = [0u8; DATA_LENGTH];
    out.copy_from_slice(payload);
    Ok(out)
}

/// Build a 2-byte control frame of the given kind.
pub fn control_frame(kind: ControlKind) -> [u8; CONTROL_FRAME_SIZE] {
    [SYN, kind.byte()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_data_frame_pads_and_sizes() {
        let frame = build_data_frame(b"HI");
        assert_eq!(DATA_FRAME_SIZE, frame.len());
        assert_eq!(SYN, frame[0]);
        assert_eq!(STX, frame[1]);
        assert_eq!(b'H', frame[2]);
        assert_eq!(b'I', frame[3]);
        assert_eq!(0, frame[4]);
        assert_eq!(0, frame[513]);
    }

    #[test]
    fn test_round_trip() {
        for payload in [&b""[..], b"HI", b"a longer test payload"] {
            let frame = build_data_frame(payload);
            let decoded = validate_data_frame(&frame).expect("frame should validate");
            let mut expected = [0u8; DATA_LENGTH];
            expected[..payload.len()].copy_from_slice(payload);
            assert_eq!(expected, decoded);
        }
    }

    #[test]
    fn test_validate_rejects_wrong_length() {
        assert!(validate_data_frame(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_crc() {
        let mut frame = build_data_frame(b"HI");
        frame[2] ^= 0x01;
        assert!(validate_data_frame(&frame).is_err());
    }

    #[test]
    fn test_control_frame_bytes() {
        assert_eq!([SYN, ACK], control_frame(ControlKind::Ack));
        assert_eq!([SYN, ENQ], control_frame(ControlKind::Enq));
        assert_eq!([SYN, EOT], control_frame(ControlKind::Eot));
        assert_eq!([SYN, RVI], control_frame(ControlKind::Rvi));
    }

    #[test]
    fn test_control_kind_from_byte() {
        assert_eq!(Some(ControlKind::Ack), ControlKind::from_byte(ACK));
        assert_eq!(None, ControlKind::from_byte(STX));
    }
}
