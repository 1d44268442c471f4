//! Responsive low-pass filter for noisy analog inputs
//!
//! The filter follows the raw value with an exponential smoother whose gain
//! grows with the distance to the current estimate: small jitter is damped
//! hard, real steps are tracked almost immediately. Values near either rail
//! snap to the rail so the ends of the range stay reachable.

/// Full-scale value of the 12-bit ADC
pub const ADC_RESOLUTION: u16 = 4096;

const DEFAULT_SNAP_MULTIPLIER: f32 = 0.01;
const DEFAULT_ACTIVITY_THRESHOLD: f32 = 4.0;
const ERROR_EMA_GAIN: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct ResponsiveFilter {
    smooth: Option<f32>,
    error_ema: f32,
    snap_multiplier: f32,
    activity_threshold: f32,
    sleep_enabled: bool,
    edge_snap: bool,
    resolution: u16,
}

impl Default for ResponsiveFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponsiveFilter {
    pub const fn new() -> Self {
        Self {
            smooth: None,
            error_ema: 0.0,
            snap_multiplier: DEFAULT_SNAP_MULTIPLIER,
            activity_threshold: DEFAULT_ACTIVITY_THRESHOLD,
            sleep_enabled: false,
            edge_snap: true,
            resolution: ADC_RESOLUTION,
        }
    }

    /// Freeze the output while the error average stays below the activity threshold.
    pub const fn with_sleep(mut self, enabled: bool) -> Self {
        self.sleep_enabled = enabled;
        self
    }

    /// Higher values track steps faster. Clamped to `0.0..=1.0`.
    pub fn with_snap_multiplier(mut self, multiplier: f32) -> Self {
        self.snap_multiplier = multiplier.clamp(0.0, 1.0);
        self
    }

    /// Feed one raw reading and return the smoothed value.
    pub fn update(&mut self, raw: u16) -> u16 {
        let max = (self.resolution - 1) as f32;
        let raw = (raw as f32).min(max);

        // The first reading seeds the estimate.
        let Some(smooth) = self.smooth else {
            self.smooth = Some(raw);
            return raw as u16;
        };

        let mut target = raw;
        if self.sleep_enabled && self.edge_snap {
            // Let the sleeping filter still reach both rails.
            if raw < self.activity_threshold {
                target = raw * 2.0 - self.activity_threshold;
            } else if raw > max - self.activity_threshold {
                target = raw * 2.0 - max + self.activity_threshold;
            }
        }

        let diff = libm::fabsf(target - smooth);
        self.error_ema += ((target - smooth) - self.error_ema) * ERROR_EMA_GAIN;

        if self.sleep_enabled && libm::fabsf(self.error_ema) < self.activity_threshold {
            return smooth as u16;
        }

        let snap = snap_curve(diff * self.snap_multiplier);
        let next = (smooth + (target - smooth) * snap).clamp(0.0, max);
        self.smooth = Some(next);
        next as u16
    }

    /// Current smoothed value, if at least one reading was fed
    pub fn value(&self) -> Option<u16> {
        self.smooth.map(|v| v as u16)
    }
}

/// Maps the scaled distance to a gain in `0.0..=1.0`.
fn snap_curve(x: f32) -> f32 {
    let y = 1.0 / (x + 1.0);
    let y = (1.0 - y) * 2.0;
    if y > 1.0 { 1.0 } else { y }
}
