//! Fixed-size binary encoding of history records.
//!
//! Binary format (little-endian), 32 bytes:
//! - timestamp: 4 bytes (u32)
//! - temperature: 4 bytes (f32)
//! - humidity: 4 bytes (f32)
//! - pressure: 4 bytes (f32)
//! - wind_speed: 4 bytes (f32)
//! - wind_direction: 1 byte (0 = unclassified)
//! - rain_intensity: 1 byte (0xFF = unclassified)
//! - padding: 10 bytes

use crate::sample::{RainIntensity, SensorSample, WindDirection};

pub const RECORD_SIZE: usize = 32;

const NO_DIRECTION: u8 = 0;
const NO_INTENSITY: u8 = 0xFF;

impl SensorSample {
    /// Converts the sample to a record for storage.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        let mut offset = 0;

        bytes[offset..offset + 4].copy_from_slice(&self.timestamp.to_le_bytes());
        offset += 4;

        for value in [self.temperature, self.humidity, self.pressure, self.wind_speed] {
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
            offset += 4;
        }

        bytes[offset] = self.wind_direction.map_or(NO_DIRECTION, WindDirection::code);
        bytes[offset + 1] = self.rain_intensity.map_or(NO_INTENSITY, RainIntensity::code);

        // Padding is already zero
        bytes
    }

    /// Creates a sample from a stored record.
    ///
    /// Unknown category codes decode as unclassified.
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let word = |offset: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[offset..offset + 4]);
            word
        };

        Self {
            timestamp: u32::from_le_bytes(word(0)),
            temperature: f32::from_le_bytes(word(4)),
            humidity: f32::from_le_bytes(word(8)),
            pressure: f32::from_le_bytes(word(12)),
            wind_speed: f32::from_le_bytes(word(16)),
            wind_direction: WindDirection::from_code(bytes[20]),
            rain_intensity: RainIntensity::from_code(bytes[21]),
        }
    }
}
