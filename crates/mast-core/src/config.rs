//! Station configuration
//!
//! The configuration is owned by the configuration collaborator (web UI,
//! console) and handed read-only to the station on every acquisition cycle.
//! It is persisted on the storage medium as a postcard blob.

use alloc::vec::Vec;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::classify::ThresholdTable;
use crate::sample::{RainIntensity, WindDirection};
use crate::storage::FileMedium;

/// Name of the configuration blob on the medium
pub const CONFIG_FILE: &str = "CONFIG.BIN";

const SECS_PER_DAY: u32 = 86_400;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StationConfig {
    pub wind_speed: WindSpeedConfig,
    pub wind_direction: ThresholdTable<WindDirection>,
    pub rain_intensity: ThresholdTable<RainIntensity>,
    pub cadence: CadenceConfig,
    pub retention: RetentionConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WindSpeedConfig {
    /// Anemometer cup wheel radius in metres
    pub radius_m: f32,
}

/// How often each periodic task runs
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceConfig {
    /// Sensor acquisition cycle
    pub acquisition_ms: u32,
    /// Rolling window sampling (window spans 90 of these)
    pub window_secs: u32,
    /// Averaged record written to the retention store, aligned to this slot
    pub retention_secs: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionConfig {
    pub horizon_days: u16,
}

impl RetentionConfig {
    pub const fn horizon_secs(&self) -> u32 {
        self.horizon_days as u32 * SECS_PER_DAY
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            wind_speed: WindSpeedConfig { radius_m: 0.15 },
            wind_direction: ThresholdTable::from_ranges(&[
                (WindDirection::SouthWest, 47, 52),
                (WindDirection::South, 518, 572),
                (WindDirection::West, 1078, 1192),
                (WindDirection::SouthEast, 1222, 1351),
                (WindDirection::NorthWest, 1966, 2173),
                (WindDirection::East, 2508, 2772),
                (WindDirection::North, 3094, 3420),
                (WindDirection::NorthEast, 3809, 4095),
            ]),
            rain_intensity: ThresholdTable::from_ranges(&[
                (RainIntensity::Dry, 0, 1000),
                (RainIntensity::Humid, 1001, 3000),
                (RainIntensity::Rainy, 3001, 4095),
            ]),
            cadence: CadenceConfig {
                acquisition_ms: 1000,
                window_secs: 10,
                retention_secs: 15 * 60,
            },
            retention: RetentionConfig { horizon_days: 45 },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to encode configuration")]
    Encode,
    #[error("Failed to decode configuration")]
    Decode,
}

impl StationConfig {
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)
    }

    /// Load the stored configuration, falling back to defaults.
    ///
    /// Missing, unreadable or undecodable blobs are logged and replaced by
    /// [`StationConfig::default`]. Overlapping threshold ranges are reported
    /// but kept as-is.
    pub fn load<M: FileMedium>(medium: &mut M) -> Self {
        let config = match read_blob(medium) {
            Ok(Some(bytes)) => match Self::from_bytes(&bytes) {
                Ok(config) => {
                    info!("Loaded configuration ({} bytes)", bytes.len());
                    config
                }
                Err(e) => {
                    warn!("Stored configuration unusable, using defaults: {}", e);
                    Self::default()
                }
            },
            Ok(None) => {
                debug!("No stored configuration, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!("Failed to read configuration, using defaults: {}", e);
                Self::default()
            }
        };

        for (a, b) in config.wind_direction.overlaps() {
            warn!("Wind direction ranges overlap: {} / {}", a, b);
        }
        for (a, b) in config.rain_intensity.overlaps() {
            warn!("Rain intensity ranges overlap: {} / {}", a, b);
        }

        config
    }

    pub fn save<M: FileMedium>(&self, medium: &mut M) -> Result<(), crate::StationError> {
        let bytes = self.to_bytes()?;
        medium.replace(CONFIG_FILE, &bytes)?;
        info!("Saved configuration ({} bytes)", bytes.len());
        Ok(())
    }
}

fn read_blob<M: FileMedium>(medium: &mut M) -> Result<Option<Vec<u8>>, crate::storage::StoreError> {
    let Some(len) = medium.size(CONFIG_FILE)? else {
        return Ok(None);
    };

    let mut bytes = alloc::vec![0u8; len as usize];
    let read = medium.read_at(CONFIG_FILE, 0, &mut bytes)?;
    bytes.truncate(read);
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ThresholdRange;
    use crate::storage::MemoryMedium;

    #[test]
    fn test_defaults() {
        let config = StationConfig::default();
        assert_eq!(config.rain_intensity.lookup(2500), Some(RainIntensity::Humid));
        assert_eq!(config.wind_direction.lookup(3200), Some(WindDirection::North));
        assert_eq!(config.wind_direction.overlaps().count(), 0);
        assert_eq!(config.retention.horizon_secs(), 45 * 86_400);
    }

    #[test]
    fn test_save_then_load() {
        let mut medium = MemoryMedium::new();
        let mut config = StationConfig::default();
        config.wind_speed.radius_m = 0.09;
        config
            .rain_intensity
            .set(RainIntensity::Storm, ThresholdRange::new(3900, 4095));
        config.save(&mut medium).unwrap();

        assert_eq!(StationConfig::load(&mut medium), config);
    }

    #[test]
    fn test_missing_blob_loads_defaults() {
        let mut medium = MemoryMedium::new();
        assert_eq!(StationConfig::load(&mut medium), StationConfig::default());
    }

    #[test]
    fn test_corrupt_blob_loads_defaults() {
        let mut medium = MemoryMedium::new();
        medium.replace(CONFIG_FILE, &[0xFF; 3]).unwrap();
        assert_eq!(StationConfig::load(&mut medium), StationConfig::default());
    }

    #[test]
    fn test_unavailable_medium_loads_defaults() {
        let mut medium = MemoryMedium::new();
        medium.set_available(false);
        assert_eq!(StationConfig::load(&mut medium), StationConfig::default());
        assert!(StationConfig::default().save(&mut medium).is_err());
    }
}
