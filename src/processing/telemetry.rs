//! Status packets reported by the radio-linked peripheral
//!
//! Layout (big-endian, 16 bytes minimum):
//!
//! | bytes  | field                     |
//! |--------|---------------------------|
//! | 0..2   | flags (u16)               |
//! | 2..12  | multiranger F/B/L/R/U, mm |
//! | 12..14 | flow deck height, mm      |
//! | 14..16 | yaw, i16 scaled to 2^16   |

use std::fmt;
use thiserror::Error;

pub const TELEMETRY_PACKET_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TelemetryError {
    #[error("telemetry packet needs {required} bytes, got {available}")]
    TooShort { required: usize, available: usize },
    #[error("invalid hex payload: {details}")]
    InvalidHex { details: String },
}

/// Multiranger distances around the airframe (mm)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangerDistances {
    pub front: u16,
    pub back: u16,
    pub left: u16,
    pub right: u16,
    pub up: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    pub flags: u16,
    pub ranger: RangerDistances,
    /// Flow deck height above ground (mm)
    pub height_mm: u16,
    pub yaw_raw: i16,
}

impl TelemetryPacket {
    /// Decode a packet; trailing bytes beyond the fixed layout are ignored
    pub fn decode(data: &[u8]) -> Result<Self, TelemetryError> {
        if data.len() < TELEMETRY_PACKET_LEN {
            return Err(TelemetryError::TooShort {
                required: TELEMETRY_PACKET_LEN,
                available: data.len(),
            });
        }

        let u16_at = |offset: usize| u16::from_be_bytes([data[offset], data[offset + 1]]);

        Ok(Self {
            flags: u16_at(0),
            ranger: RangerDistances {
                front: u16_at(2),
                back: u16_at(4),
                left: u16_at(6),
                right: u16_at(8),
                up: u16_at(10),
            },
            height_mm: u16_at(12),
            yaw_raw: i16::from_be_bytes([data[14], data[15]]),
        })
    }

    /// Decode from a hex string such as `00 01 0a 0b ...` (spaces optional)
    pub fn decode_hex(text: &str) -> Result<Self, TelemetryError> {
        let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = hex::decode(&digits).map_err(|e| TelemetryError::InvalidHex {
            details: e.to_string(),
        })?;

        Self::decode(&bytes)
    }

    /// Heading in degrees, normalized to [0, 360)
    pub fn yaw_degrees(&self) -> f64 {
        (self.yaw_raw as f64 * 360.0 / 65536.0).rem_euclid(360.0)
    }
}

impl fmt::Display for TelemetryPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Flags ] 0x{:04X}", self.flags)?;
        writeln!(
            f,
            "[MultiR] F: {} B: {} L: {} R: {} U: {}",
            self.ranger.front, self.ranger.back, self.ranger.left, self.ranger.right, self.ranger.up
        )?;
        writeln!(f, "[FlowD ] Height: {} mm", self.height_mm)?;
        write!(f, "[IMU   ] Yaw: {:.2}°", self.yaw_degrees())
    }
}
