//! Core data types for the recorder
//!
//! This module contains the fundamental types shared by the ingestion path,
//! the recording store and the export engine:
//!
//! - [`Frame`] - One device sample: channel readings plus a wrapping counter
//! - [`CounterPosition`] - Where in a frame the counter lives
//! - [`LossEvent`] - A detected counter discontinuity

use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Modulus of the device's sequence counter
pub const COUNTER_MODULUS: u16 = 256;

/// Position of the sequence counter inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterPosition {
    /// Counter is the first field, channel readings follow
    Leading,
    /// Channel readings come first, the counter is the last field
    #[default]
    Trailing,
}

/// A single sample received from the device
///
/// Frames are immutable once produced. Non-finite readings are kept in memory
/// as NaN and travel as `null` in JSON, since JSON has no representation for
/// them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    values: Vec<f64>,
}

impl Frame {
    /// Create a frame from its raw field values
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    /// All fields of the frame in device order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Number of fields, counter included
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the frame carries no fields at all
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a field by index
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    /// Read the sequence counter
    ///
    /// Returns `None` when the field is missing or is not an integer in
    /// `0..=255`.
    pub fn counter(&self, position: CounterPosition) -> Option<u8> {
        let raw = match position {
            CounterPosition::Leading => self.values.first(),
            CounterPosition::Trailing => self.values.last(),
        }?;
        if raw.is_finite() && raw.fract() == 0.0 && (0.0..=255.0).contains(raw) {
            Some(*raw as u8)
        } else {
            None
        }
    }
}

impl From<Vec<f64>> for Frame {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for Frame {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.values.len()))?;
        for value in &self.values {
            if value.is_finite() {
                seq.serialize_element(value)?;
            } else {
                seq.serialize_element(&Option::<f64>::None)?;
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(Self {
            values: raw.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        })
    }
}

/// A counter discontinuity reported by the integrity monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossEvent {
    /// Counter of the last frame seen before the gap
    pub previous: u8,
    /// Counter that should have followed `previous`
    pub expected: u8,
    /// Counter that actually arrived
    pub actual: u8,
}

impl LossEvent {
    /// Estimated number of frames lost in this gap
    ///
    /// Assumes the counter only moves forward, so a repeated or reordered
    /// frame reads as a large gap.
    pub fn missing_frames(&self) -> u32 {
        u32::from(self.actual.wrapping_sub(self.expected))
    }
}

impl fmt::Display for LossEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "previous counter {}, expected {}, got {}",
            self.previous, self.expected, self.actual
        )
    }
}
