/*!
Telemetry and command frame encoding.

The link carries two independent byte streams with no header, checksum or
acknowledgement:

- inbound telemetry: `i16le position, i16le velocity` (4 bytes)
- outbound command: `i16le target_position` (2 bytes)

Every delivery from the channel is treated as one frame attempt. There is no
buffering or resynchronization; chunks of the wrong size are dropped.
*/

use crate::protocol::{COMMAND_FRAME_BYTES, TELEMETRY_FRAME_BYTES};
use serde::{Deserialize, Serialize};

/// Mechanism state reported once per sample interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Encoder position in steps
    pub position: i16,
    /// Steps travelled per sample interval
    pub velocity: i16,
}

impl TelemetryFrame {
    pub fn new(position: i16, velocity: i16) -> Self {
        Self { position, velocity }
    }

    /// Parse a telemetry frame from one channel delivery.
    ///
    /// Returns `None` unless the chunk is exactly four bytes long.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; TELEMETRY_FRAME_BYTES] = bytes.try_into().ok()?;

        Some(Self {
            position: i16::from_le_bytes([raw[0], raw[1]]),
            velocity: i16::from_le_bytes([raw[2], raw[3]]),
        })
    }

    /// Serialize back to the wire layout (used by the simulated mechanism)
    pub fn encode(&self) -> [u8; TELEMETRY_FRAME_BYTES] {
        let p = self.position.to_le_bytes();
        let v = self.velocity.to_le_bytes();
        [p[0], p[1], v[0], v[1]]
    }
}

/// Target position sent to the mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    /// Requested position in steps, before truncation to the wire width
    pub target_position: i32,
}

impl CommandFrame {
    pub fn new(target_position: i32) -> Self {
        Self { target_position }
    }

    /// Encode as low byte then high byte.
    ///
    /// Values outside the i16 range wrap: the mechanism's target register is
    /// 16 bits wide and takes the low half of whatever it is sent.
    pub fn encode(&self) -> [u8; COMMAND_FRAME_BYTES] {
        let wire = (self.target_position & 0xFFFF) as u16;
        [(wire & 0xFF) as u8, (wire >> 8) as u8]
    }

    /// The value the mechanism will actually see after truncation
    pub fn wire_position(&self) -> i16 {
        (self.target_position & 0xFFFF) as u16 as i16
    }

    /// Parse a command frame (used by the simulated mechanism)
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; COMMAND_FRAME_BYTES] = bytes.try_into().ok()?;
        Some(Self::new(i16::from_le_bytes(raw) as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian_fields() {
        // position = 0x0164 (356), velocity = -2 (0xFFFE)
        let frame = TelemetryFrame::decode(&[0x64, 0x01, 0xFE, 0xFF]).unwrap();
        assert_eq!(frame.position, 356);
        assert_eq!(frame.velocity, -2);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(TelemetryFrame::decode(&[]), None);
        assert_eq!(TelemetryFrame::decode(&[0x01]), None);
        assert_eq!(TelemetryFrame::decode(&[0x01, 0x02, 0x03]), None);
        assert_eq!(TelemetryFrame::decode(&[0x01, 0x02, 0x03, 0x04, 0x05]), None);
        // Two frames coalesced into one delivery are not split
        assert_eq!(TelemetryFrame::decode(&[0u8; 8]), None);
    }

    #[test]
    fn test_position_reencodes_to_same_bytes() {
        for position in i16::MIN..=i16::MAX {
            let [lo, hi] = position.to_le_bytes();
            let frame = TelemetryFrame::decode(&[lo, hi, 0xAA, 0x55]).unwrap();
            assert_eq!(frame.position, position);

            let command = CommandFrame::new(frame.position as i32).encode();
            assert_eq!(command, [lo, hi], "position {}", position);
            assert_eq!(CommandFrame::decode(&command).unwrap().wire_position(), position);
        }
    }

    #[test]
    fn test_only_four_byte_chunks_decode() {
        let bytes = [0x5Au8; 64];
        for len in 0..bytes.len() {
            let decoded = TelemetryFrame::decode(&bytes[..len]);
            assert_eq!(decoded.is_some(), len == TELEMETRY_FRAME_BYTES, "length {}", len);
        }
    }

    #[test]
    fn test_command_encoding_wraps_instead_of_saturating() {
        assert_eq!(CommandFrame::new(0).encode(), [0x00, 0x00]);
        assert_eq!(CommandFrame::new(5300).encode(), [0xB4, 0x14]);
        assert_eq!(CommandFrame::new(32767).encode(), [0xFF, 0x7F]);
        // 32768 wraps to i16::MIN rather than sticking at i16::MAX
        assert_eq!(CommandFrame::new(32768).encode(), [0x00, 0x80]);
        assert_eq!(CommandFrame::new(32768).wire_position(), i16::MIN);
        assert_eq!(CommandFrame::new(65536 + 7).encode(), [0x07, 0x00]);
        assert_eq!(CommandFrame::new(-1).encode(), [0xFF, 0xFF]);
    }

    #[test]
    fn test_telemetry_encode_matches_decode_layout() {
        let frame = TelemetryFrame::new(-300, 42);
        assert_eq!(TelemetryFrame::decode(&frame.encode()), Some(frame));
    }
}
