//! Anemometer pulse counter shared between interrupt handlers and the
//! cooperative scheduler.
//!
//! The edge interrupt calls [`PulseCounter::on_edge`] once per reed-switch
//! closure. A periodic timer interrupt calls [`PulseCounter::on_tick`], which
//! swaps the count for zero and publishes the derived wind speed. Everything
//! is lock-free so a counter can live in a `static` and be touched from any
//! priority level or core.
//!
//! ```rust,ignore
//! static PULSES: PulseCounter = PulseCounter::new(RATE_PERIOD_MS);
//!
//! #[handler]
//! fn anemometer_edge() {
//!     PULSES.on_edge();
//! }
//! ```

use core::f32::consts::PI;
use core::sync::atomic::{AtomicU32, Ordering};

/// Default rate computation period
pub const RATE_PERIOD_MS: u32 = 1000;

/// m/s to km/h
const MS_TO_KMH: f32 = 3.6;

pub struct PulseCounter {
    /// Edges seen since the last rate tick
    pulses: AtomicU32,
    /// Last derived speed in km/h, stored as `f32` bits
    speed_bits: AtomicU32,
    /// Cup wheel radius in metres, stored as `f32` bits.
    /// Written only by the cooperative side when configuration is re-read.
    radius_bits: AtomicU32,
    period_ms: u32,
}

impl PulseCounter {
    /// Create a counter whose rate handler runs every `period_ms`.
    ///
    /// The radius starts at zero, so speed reads 0 until [`Self::set_radius`]
    /// is called.
    pub const fn new(period_ms: u32) -> Self {
        Self {
            pulses: AtomicU32::new(0),
            speed_bits: AtomicU32::new(0),
            radius_bits: AtomicU32::new(0),
            period_ms,
        }
    }

    /// Edge handler. Safe to call from interrupt context.
    #[inline]
    pub fn on_edge(&self) {
        self.pulses.fetch_add(1, Ordering::AcqRel);
    }

    /// Rate handler. Safe to call from interrupt context.
    ///
    /// Returns the number of pulses accounted to the interval that just ended.
    pub fn on_tick(&self) -> u32 {
        // Edges landing after the swap belong to the next interval.
        let pulses = self.pulses.swap(0, Ordering::AcqRel);
        let speed = speed_kmh(pulses, self.radius(), self.period_ms);
        self.speed_bits.store(speed.to_bits(), Ordering::Release);
        pulses
    }

    /// Last computed wind speed in km/h
    pub fn speed_kmh(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Acquire))
    }

    /// Update the calibration radius used by subsequent rate ticks.
    pub fn set_radius(&self, radius_m: f32) {
        self.radius_bits.store(radius_m.to_bits(), Ordering::Release);
    }

    pub fn radius(&self) -> f32 {
        f32::from_bits(self.radius_bits.load(Ordering::Acquire))
    }

    pub const fn period_ms(&self) -> u32 {
        self.period_ms
    }
}

/// Convert a pulse count over `period_ms` into km/h for a wheel of `radius_m`.
pub fn speed_kmh(pulses: u32, radius_m: f32, period_ms: u32) -> f32 {
    if period_ms == 0 {
        return 0.0;
    }
    let circumference = 2.0 * PI * radius_m;
    let period_secs = period_ms as f32 / 1000.0;
    pulses as f32 * circumference * MS_TO_KMH / period_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_twelve_pulses_per_second() {
        let counter = PulseCounter::new(1000);
        counter.set_radius(0.15);
        for _ in 0..12 {
            counter.on_edge();
        }

        assert_eq!(counter.on_tick(), 12);
        let speed = counter.speed_kmh();
        assert!((speed - 40.715).abs() < 0.01, "speed was {speed}");
    }

    #[test]
    fn test_idle_interval_reads_zero() {
        let counter = PulseCounter::new(1000);
        counter.set_radius(0.15);
        counter.on_edge();
        counter.on_tick();
        assert!(counter.speed_kmh() > 0.0);

        assert_eq!(counter.on_tick(), 0);
        assert_eq!(counter.speed_kmh(), 0.0);
    }

    #[test]
    fn test_longer_period_scales_down() {
        assert!((speed_kmh(12, 0.15, 2000) - 20.357).abs() < 0.01);
        assert_eq!(speed_kmh(12, 0.15, 0), 0.0);
    }

    #[test]
    fn test_concurrent_edges_are_never_lost() {
        const EDGES_PER_THREAD: u32 = 50_000;
        const THREADS: u32 = 4;

        let counter = Arc::new(PulseCounter::new(1000));
        let edge_threads: Vec<_> = (0..THREADS)
            .map(|_| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for _ in 0..EDGES_PER_THREAD {
                        counter.on_edge();
                    }
                })
            })
            .collect();

        let mut accounted = 0u64;
        while edge_threads.iter().any(|t| !t.is_finished()) {
            accounted += counter.on_tick() as u64;
        }
        for t in edge_threads {
            t.join().unwrap();
        }
        accounted += counter.on_tick() as u64;

        assert_eq!(accounted, (EDGES_PER_THREAD * THREADS) as u64);
    }

    proptest! {
        #[test]
        fn prop_ticks_account_for_every_edge(bursts in proptest::collection::vec(0u32..200, 0..50)) {
            let counter = PulseCounter::new(1000);
            let mut accounted = 0u32;
            for burst in &bursts {
                for _ in 0..*burst {
                    counter.on_edge();
                }
                accounted += counter.on_tick();
            }
            accounted += counter.on_tick();
            prop_assert_eq!(accounted, bursts.iter().sum::<u32>());
        }
    }
}
