//! Accumulates inbound bytes and recognizes control and data frames.
//!
//! The buffer is cleared wholesale on any recognition. This is correct
//! only because the protocol is half-duplex and at most one frame is
//! ever in flight -- do not relax this assumption without revisiting
//! the engine's decision ladder.
use crate::framer::{self, ControlKind, DATA_FRAME_SIZE};

/// What the classifier found on a given scan, to be applied to the
/// engine's shared flag set by the caller.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ClassifyResult {
    pub ack: bool,
    pub enq: bool,
    pub eot: bool,
    pub rvi: bool,
    pub data_ok: Option<[u8; 512]>,
    pub data_err: bool,
    /// The 512-byte payload of a frame that failed CRC validation, for
    /// the bit-error-rate telemetry (non-NUL byte count still needs
    /// counting even though the frame was rejected).
    pub data_err_payload: Option<[u8; 512]>,
}

impl ClassifyResult {
    fn any(&self) -> bool {
        self.ack || self.enq || self.eot || self.rvi || self.data_ok.is_some() || self.data_err
    }
}

/// An append-only byte accumulator, cleared wholesale whenever a frame
/// is recognized.
#[derive(Default)]
pub struct ReceiveBuffer {
    buf: Vec<u8>,
}

impl ReceiveBuffer {
    pub fn new() -> ReceiveBuffer {
        ReceiveBuffer { buf: Vec::new() }
    }

    /// Append bytes received from the adapter and scan for frames.
    /// Returns what was found; the buffer is cleared if anything was.
    pub fn append_and_scan(&mut self, bytes: &[u8]) -> ClassifyResult {
        self.buf.extend_from_slice(bytes);
        let result = self.scan();
        if result.any() {
            self.buf.clear();
        }
        result
    }

    fn scan(&self) -> ClassifyResult {
        let mut result = ClassifyResult::default();

        let mut i = 0;
        while i + 1 < self.buf.len() {
            if self.buf[i] != framer::SYN {
                i += 1;
                continue;
            }
            let second = self.buf[i + 1];
            if second == framer::STX {
                // Candidate data frame: cut 518 bytes starting here.
                if self.buf.len() >= i + DATA_FRAME_SIZE {
                    let candidate = &self.buf[i..i + DATA_FRAME_SIZE];
                    match framer::validate_data_frame(candidate) {
                        Ok(payload) => result.data_ok = Some(payload),
                        Err(()) => {
                            result.data_err = true;
                            let mut payload = [0u8; 512];
                            payload.copy_from_slice(&candidate[2..514]);
                            result.data_err_payload = Some(payload);
                        }
                    }
                }
                i += 2;
                continue;
            }
            match ControlKind::from_byte(second) {
                Some(ControlKind::Ack) => result.ack = true,
                Some(ControlKind::Enq) => result.enq = true,
                Some(ControlKind::Eot) => result.eot = true,
                Some(ControlKind::Rvi) => result.rvi = true,
                None => {}
            }
            i += 2;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::build_data_frame;

    #[test]
    fn test_recognizes_single_control_frame() {
        let mut buf = ReceiveBuffer::new();
        let r = buf.append_and_scan(&[framer::SYN, framer::ACK]);
        assert!(r.ack);
        assert!(!r.enq);
    }

    #[test]
    fn test_recognizes_multiple_control_frames_in_one_scan() {
        let mut buf = ReceiveBuffer::new();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[framer::SYN, framer::ENQ]);
        bytes.extend_from_slice(&[framer::SYN, framer::EOT]);
        let r = buf.append_and_scan(&bytes);
        assert!(r.enq);
        assert!(r.eot);
    }

    #[test]
    fn test_recognizes_valid_data_frame_and_clears_buffer() {
        let mut buf = ReceiveBuffer::new();
        let frame = build_data_frame(b"HI");
        let r = buf.append_and_scan(&frame);
        let payload = r.data_ok.expect("expected a valid data frame");
        assert_eq!(b'H', payload[0]);
        assert_eq!(b'I', payload[1]);
        assert_eq!(0, payload[2]);

        // Buffer was cleared: scanning again sees nothing.
        let r2 = buf.append_and_scan(&[]);
        assert!(!r2.any());
    }

    #[test]
    fn test_corrupted_data_frame_sets_data_err() {
        let mut buf = ReceiveBuffer::new();
        let mut frame = build_data_frame(b"HI");
        frame[2] ^= 0x01;
        let r = buf.append_and_scan(&frame);
        assert!(r.data_err);
        assert!(r.data_ok.is_none());
    }

    #[test]
    fn test_control_bytes_intermixed_with_data_frame() {
        let mut buf = ReceiveBuffer::new();
        let mut bytes = vec![framer::SYN, framer::ENQ];
        bytes.extend_from_slice(&build_data_frame(b"X"));
        let r = buf.append_and_scan(&bytes);
        assert!(r.enq);
        assert!(r.data_ok.is_some());
    }

    #[test]
    fn test_partial_data_frame_does_not_match_yet() {
        let mut buf = ReceiveBuffer::new();
        let frame = build_data_frame(b"HI");
        let r = buf.append_and_scan(&frame[..10]);
        assert!(!r.any());
        let r2 = buf.append_and_scan(&frame[10..]);
        assert!(r2.data_ok.is_some());
    }
}
