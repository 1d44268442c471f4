//! Hardware seam of the station.
//!
//! A [`Board`] hands out raw readings of every sensor on the mast and wires
//! the anemometer into a [`PulseCounter`]. Pin assignment, bus setup and
//! interrupt registration all live behind it.

use thiserror_no_std::Error;

use crate::pulse::PulseCounter;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out waiting to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// Typed readings from the combined temperature / humidity / pressure sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReadings {
    /// °C
    pub temperature: f32,
    /// %
    pub humidity: f32,
    /// hPa
    pub pressure: f32,
}

/// Everything the station needs from the hardware.
///
/// Analog inputs return raw 12-bit ADC counts; smoothing and classification
/// happen in the station.
pub trait Board {
    /// Bring up the climate sensor and analog inputs.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Route anemometer edges to [`PulseCounter::on_edge`] and a periodic
    /// timer of [`PulseCounter::period_ms`] to [`PulseCounter::on_tick`].
    ///
    /// Both run in interrupt context and must not touch anything else.
    fn start_pulse_capture(&mut self, counter: &'static PulseCounter) -> Result<(), SensorError>;

    fn read_climate(&mut self) -> impl Future<Output = Result<ClimateReadings, SensorError>>;

    fn read_wind_vane(&mut self) -> impl Future<Output = Result<u16, SensorError>>;

    fn read_rain_sensor(&mut self) -> impl Future<Output = Result<u16, SensorError>>;
}
