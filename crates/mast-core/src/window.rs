//! Fixed-capacity window of recent samples feeding the retention store.

use crate::sample::SensorSample;

/// Slots in the default window (15 minutes at one sample per 10 s)
pub const WINDOW_CAPACITY: usize = 90;

/// Circular buffer that overwrites its oldest sample once full.
#[derive(Debug, Clone)]
pub struct RollingWindow<const N: usize = WINDOW_CAPACITY> {
    slots: [Option<SensorSample>; N],
    /// Slot the next sample goes into
    cursor: usize,
    count: usize,
}

impl<const N: usize> Default for RollingWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RollingWindow<N> {
    pub const fn new() -> Self {
        Self {
            slots: [None; N],
            cursor: 0,
            count: 0,
        }
    }

    pub fn record(&mut self, sample: SensorSample) {
        if N == 0 {
            return;
        }

        self.slots[self.cursor] = Some(sample);
        self.cursor = (self.cursor + 1) % N;
        self.count = (self.count + 1).min(N);
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn latest(&self) -> Option<&SensorSample> {
        if self.count == 0 {
            return None;
        }
        self.slots[(self.cursor + N - 1) % N].as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Mean of the continuous readings over the window.
    ///
    /// Timestamp and categories are those of the most recent sample. Returns
    /// `None` for an empty window.
    pub fn average(&self) -> Option<SensorSample> {
        let latest = *self.latest()?;

        let mut sums = [0f32; 4];
        for sample in self.slots.iter().flatten() {
            sums[0] += sample.temperature;
            sums[1] += sample.humidity;
            sums[2] += sample.pressure;
            sums[3] += sample.wind_speed;
        }

        let count = self.count as f32;
        Some(SensorSample {
            temperature: sums[0] / count,
            humidity: sums[1] / count,
            pressure: sums[2] / count,
            wind_speed: sums[3] / count,
            ..latest
        })
    }
}
