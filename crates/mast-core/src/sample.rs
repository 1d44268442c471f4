//! Sensor sample value type and the two classified categories.

use core::fmt::Display;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch
pub type Timestamp = u32;

/// Compass point reported by the wind vane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindDirection {
    North,
    South,
    East,
    West,
    NorthEast,
    SouthEast,
    SouthWest,
    NorthWest,
}

impl WindDirection {
    pub const ALL: [Self; 8] = [
        Self::North,
        Self::South,
        Self::East,
        Self::West,
        Self::NorthEast,
        Self::SouthEast,
        Self::SouthWest,
        Self::NorthWest,
    ];

    /// Stable on-medium code (1..=8). Zero is reserved for "not yet classified".
    pub const fn code(self) -> u8 {
        match self {
            Self::North => 1,
            Self::South => 2,
            Self::East => 3,
            Self::West => 4,
            Self::NorthEast => 5,
            Self::SouthEast => 6,
            Self::SouthWest => 7,
            Self::NorthWest => 8,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::North),
            2 => Some(Self::South),
            3 => Some(Self::East),
            4 => Some(Self::West),
            5 => Some(Self::NorthEast),
            6 => Some(Self::SouthEast),
            7 => Some(Self::SouthWest),
            8 => Some(Self::NorthWest),
            _ => None,
        }
    }

    /// Get the display label for this direction
    pub const fn label(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::NorthEast => "northeast",
            Self::SouthEast => "southeast",
            Self::SouthWest => "southwest",
            Self::NorthWest => "northwest",
        }
    }
}

/// Precipitation level reported by the rain sensor plate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RainIntensity {
    Dry,
    Humid,
    Rainy,
    Storm,
}

impl RainIntensity {
    pub const ALL: [Self; 4] = [Self::Dry, Self::Humid, Self::Rainy, Self::Storm];

    /// Stable on-medium code (0..=3). `0xFF` is reserved for "not yet classified".
    pub const fn code(self) -> u8 {
        match self {
            Self::Dry => 0,
            Self::Humid => 1,
            Self::Rainy => 2,
            Self::Storm => 3,
        }
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Dry),
            1 => Some(Self::Humid),
            2 => Some(Self::Rainy),
            3 => Some(Self::Storm),
            _ => None,
        }
    }

    /// Get the display label for this intensity
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dry => "dry",
            Self::Humid => "humid",
            Self::Rainy => "rainy",
            Self::Storm => "storm",
        }
    }
}

/// Returned when a label does not name any category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCategory;

impl FromStr for WindDirection {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s))
            .ok_or(UnknownCategory)
    }
}

impl FromStr for RainIntensity {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.label().eq_ignore_ascii_case(s))
            .ok_or(UnknownCategory)
    }
}

impl Display for WindDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl Display for RainIntensity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// One snapshot of every station reading
///
/// Samples are produced by the acquisition cycle, averaged by the rolling
/// window and persisted by the retention store. They are plain values and are
/// never mutated after construction.
///
/// The categorical fields are `None` only until the first successful
/// classification of the corresponding signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub timestamp: Timestamp,
    /// Air temperature in °C
    pub temperature: f32,
    /// Relative humidity in %
    pub humidity: f32,
    /// Barometric pressure in hPa
    pub pressure: f32,
    /// Wind speed in km/h
    pub wind_speed: f32,
    pub wind_direction: Option<WindDirection>,
    pub rain_intensity: Option<RainIntensity>,
}

impl SensorSample {
    /// True when every continuous reading is a finite number.
    ///
    /// Readings start out as NaN until their sensor answers for the first time.
    pub fn is_complete(&self) -> bool {
        self.temperature.is_finite()
            && self.humidity.is_finite()
            && self.pressure.is_finite()
            && self.wind_speed.is_finite()
    }
}

impl Display for SensorSample {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "[SensorSample] timestamp: {}, temperature: {:.2}°C, humidity: {:.2}%, pressure: {:.2} hPa, wind: {:.2} km/h",
            self.timestamp, self.temperature, self.humidity, self.pressure, self.wind_speed
        )?;

        match self.wind_direction {
            Some(direction) => write!(f, " {}", direction)?,
            None => f.write_str(" n/a")?,
        }

        match self.rain_intensity {
            Some(intensity) => write!(f, ", rain: {}", intensity),
            None => f.write_str(", rain: n/a"),
        }
    }
}
