//! CSV rendering of stored history.
//!
//! ```csv
//! timestamp,temperature,humidity,pressure,wind_speed,wind_direction,rain_intensity
//! 2023-11-14 22:13:20,21.50,48.25,1013.20,12.00,north,dry
//! ```
//!
//! Timestamps are UTC. Unclassified categories are left empty.

use alloc::string::String;
use chrono::DateTime;
use core::fmt::Write;

use crate::sample::{SensorSample, Timestamp};

pub const CSV_HEADER: &str =
    "timestamp,temperature,humidity,pressure,wind_speed,wind_direction,rain_intensity\n";

/// `YYYY-MM-DD HH:MM:SS` in UTC
pub fn format_timestamp(ts: Timestamp) -> heapless::String<24> {
    let mut text = heapless::String::new();
    // Every u32 timestamp is a valid date; 19 characters always fit.
    if let Some(time) = DateTime::from_timestamp(i64::from(ts), 0) {
        let _ = write!(text, "{}", time.format("%Y-%m-%d %H:%M:%S"));
    }
    text
}

pub fn write_row<W: Write>(out: &mut W, sample: &SensorSample) -> core::fmt::Result {
    writeln!(
        out,
        "{},{:.2},{:.2},{:.2},{:.2},{},{}",
        format_timestamp(sample.timestamp),
        sample.temperature,
        sample.humidity,
        sample.pressure,
        sample.wind_speed,
        sample.wind_direction.map_or("", |d| d.label()),
        sample.rain_intensity.map_or("", |r| r.label()),
    )
}

/// Pull-based CSV stream over any sample iterator (typically a store cursor).
///
/// Each [`CsvExport::read`] fills as much of the caller's buffer as it can,
/// so the export can be pushed out in chunks of whatever size the transport
/// wants without rendering the whole history in memory.
pub struct CsvExport<I> {
    samples: I,
    pending: String,
    pos: usize,
}

impl<I: Iterator<Item = SensorSample>> CsvExport<I> {
    pub fn new(samples: I) -> Self {
        Self {
            samples,
            pending: String::from(CSV_HEADER),
            pos: 0,
        }
    }

    /// Copy the next bytes of the export into `buf`.
    ///
    /// Returns 0 once the export is complete.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut written = 0;

        while written < buf.len() {
            if self.pos == self.pending.len() {
                let Some(sample) = self.samples.next() else {
                    break;
                };
                self.pending.clear();
                self.pos = 0;
                // Writing into a String cannot fail.
                let _ = write_row(&mut self.pending, &sample);
            }

            let bytes = &self.pending.as_bytes()[self.pos..];
            let count = bytes.len().min(buf.len() - written);
            buf[written..written + count].copy_from_slice(&bytes[..count]);
            written += count;
            self.pos += count;
        }

        written
    }
}
