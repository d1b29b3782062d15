//! Measurement decoding: frame text to a distance vector
//!
//! Frames are list literals such as `[200, 183.5, -1, 97, 310, 402]`. The
//! payload is parsed strictly as a JSON array of numbers; anything else is a
//! decode failure.

use crate::core::constants::INVALID_DISTANCE;
use crate::core::{DistanceVector, Reading};
use thiserror::Error;

/// Reasons a frame payload is rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload is not a numeric list: {details}")]
    Syntax { details: String },
    #[error("expected {expected} distances, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("distance {value} at index {index} is neither a range nor the sentinel")]
    InvalidValue { index: usize, value: f64 },
    #[error("{invalid} anchors unavailable, at most {allowed} tolerated")]
    TooManyInvalid { invalid: usize, allowed: usize },
}

/// Decoder for one anchor configuration
#[derive(Debug, Clone)]
pub struct MeasurementParser {
    expected_len: usize,
    max_invalid: usize,
}

impl MeasurementParser {
    pub fn new(expected_len: usize, max_invalid: usize) -> Self {
        Self {
            expected_len,
            max_invalid,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    pub fn max_invalid(&self) -> usize {
        self.max_invalid
    }

    /// Parse one frame payload into a distance vector
    pub fn parse(&self, payload: &str) -> Result<DistanceVector, DecodeError> {
        let values: Vec<f64> =
            serde_json::from_str(payload.trim()).map_err(|e| DecodeError::Syntax {
                details: e.to_string(),
            })?;

        if values.len() != self.expected_len {
            return Err(DecodeError::WrongLength {
                expected: self.expected_len,
                actual: values.len(),
            });
        }

        let readings = values
            .iter()
            .enumerate()
            .map(|(index, &value)| classify(index, value))
            .collect::<Result<Vec<_>, _>>()?;
        let distances = DistanceVector::new(readings);

        let invalid = distances.invalid_count();
        if invalid > self.max_invalid {
            return Err(DecodeError::TooManyInvalid {
                invalid,
                allowed: self.max_invalid,
            });
        }

        Ok(distances)
    }
}

fn classify(index: usize, value: f64) -> Result<Reading, DecodeError> {
    if value == INVALID_DISTANCE {
        Ok(Reading::Unavailable)
    } else if value.is_finite() && value >= 0.0 {
        Ok(Reading::Range(value))
    } else {
        Err(DecodeError::InvalidValue { index, value })
    }
}
