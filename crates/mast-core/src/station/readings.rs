//! Last-known sensor readings and per-signal smoothing state

use log::warn;

use crate::classify::Classifier;
use crate::config::StationConfig;
use crate::sample::{RainIntensity, WindDirection};
use crate::sensors::{Board, ClimateReadings};
use crate::smoothing::ResponsiveFilter;

/// Everything the acquisition cycle remembers between runs.
///
/// Each signal keeps its last good value, so a failed read leaves the
/// previous reading in place.
#[derive(Debug, Clone)]
pub struct SensorsState {
    climate: ClimateReadings,
    vane_filter: ResponsiveFilter,
    rain_filter: ResponsiveFilter,
    direction: Classifier<WindDirection>,
    intensity: Classifier<RainIntensity>,
}

impl Default for SensorsState {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorsState {
    pub const fn new() -> Self {
        Self {
            climate: ClimateReadings {
                temperature: f32::NAN,
                humidity: f32::NAN,
                pressure: f32::NAN,
            },
            vane_filter: ResponsiveFilter::new(),
            rain_filter: ResponsiveFilter::new(),
            direction: Classifier::new(),
            intensity: Classifier::new(),
        }
    }

    /// Read every sensor once and classify the analog signals.
    ///
    /// Returns the number of sensors that failed; their previous values are
    /// kept.
    pub async fn read_all<B: Board>(&mut self, board: &mut B, config: &StationConfig) -> u8 {
        let mut failures = 0;

        match board.read_climate().await {
            Ok(climate) => self.climate = climate,
            Err(e) => {
                warn!("Climate read failed, keeping last values: {}", e);
                failures += 1;
            }
        }

        match board.read_wind_vane().await {
            Ok(raw) => {
                let smoothed = self.vane_filter.update(raw);
                self.direction.classify(&config.wind_direction, smoothed);
            }
            Err(e) => {
                warn!("Wind vane read failed, keeping last direction: {}", e);
                failures += 1;
            }
        }

        match board.read_rain_sensor().await {
            Ok(raw) => {
                let smoothed = self.rain_filter.update(raw);
                self.intensity.classify(&config.rain_intensity, smoothed);
            }
            Err(e) => {
                warn!("Rain sensor read failed, keeping last intensity: {}", e);
                failures += 1;
            }
        }

        failures
    }

    pub fn climate(&self) -> ClimateReadings {
        self.climate
    }

    pub fn direction(&self) -> Option<WindDirection> {
        self.direction.current()
    }

    pub fn intensity(&self) -> Option<RainIntensity> {
        self.intensity.current()
    }

    /// Smoothed raw vane and rain values, for calibration screens
    pub fn smoothed_raw(&self) -> (Option<u16>, Option<u16>) {
        (self.vane_filter.value(), self.rain_filter.value())
    }
}
