//! Desktop simulator for the mast weather node engine.
//!
//! Runs the station loop against a synthetic mast (climate sensor, wind vane,
//! rain plate and anemometer) on an in-memory card, with simulated time
//! advancing one second per iteration. When the run ends the stored history
//! is printed to stdout as CSV.
//!
//! ```text
//! RUST_LOG=info mast-simulator [hours]
//! ```
//!
//! The card is pulled for the third simulated hour (when the run is long
//! enough) to exercise the storage fault path.

use std::cell::Cell;
use std::f64::consts::TAU;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_futures::block_on;
use embassy_sync::pubsub::WaitResult;
use log::{debug, error, info, warn};

use mast_core::config::StationConfig;
use mast_core::events::{EventChannel, EventSubscriber, StationEvent};
use mast_core::export::CsvExport;
use mast_core::pulse::{PulseCounter, RATE_PERIOD_MS};
use mast_core::schedule::Clock;
use mast_core::sensors::{Board, ClimateReadings, SensorError};
use mast_core::storage::{MemoryMedium, RetentionStore};
use mast_core::{Station, WindDirection};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Simulated hours when no argument is given.
const DEFAULT_HOURS: u64 = 6;

/// Simulated time per loop iteration.
const STEP_MS: u64 = 1000;

/// Every n-th climate read fails.
const CLIMATE_FAULT_EVERY: u64 = 97;

static PULSES: PulseCounter = PulseCounter::new(RATE_PERIOD_MS);
static EVENTS: EventChannel = EventChannel::new();

// ---------------------------------------------------------------------------
// Simulated time
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    fn starting_now() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(Rc::new(Cell::new(now_ms)))
    }

    fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }

    fn elapsed_secs(&self, since_ms: u64) -> f64 {
        (self.0.get() - since_ms) as f64 / 1000.0
    }
}

impl Clock for SimClock {
    fn now_millis(&self) -> u64 {
        self.0.get()
    }
}

// ---------------------------------------------------------------------------
// Synthetic mast
// ---------------------------------------------------------------------------

/// Generates sensor readings that vary over simulated time.
struct SyntheticMast {
    clock: SimClock,
    start_ms: u64,
    climate_reads: u64,
    /// Raw vane value at the centre of each direction's default range
    vane_positions: Vec<u16>,
}

impl SyntheticMast {
    fn new(clock: SimClock, config: &StationConfig) -> Self {
        let vane_positions = config
            .wind_direction
            .entries()
            .iter()
            .map(|entry| entry.range.min + entry.range.max.saturating_sub(entry.range.min) / 2)
            .collect();

        Self {
            start_ms: clock.now_millis(),
            clock,
            climate_reads: 0,
            vane_positions,
        }
    }

    fn t(&self) -> f64 {
        self.clock.elapsed_secs(self.start_ms)
    }

    /// Anemometer edges for the last second: gusts on top of a slow swell.
    fn pulses_this_second(&self) -> u32 {
        let t = self.t();
        let swell = 6.0 + 4.0 * (TAU * t / 3600.0).sin();
        let gust = 3.0 * (TAU * t / 47.0).sin().max(0.0);
        (swell + gust).max(0.0) as u32
    }
}

impl Board for SyntheticMast {
    async fn init(&mut self) -> Result<(), SensorError> {
        info!("Synthetic mast online");
        Ok(())
    }

    fn start_pulse_capture(&mut self, counter: &'static PulseCounter) -> Result<(), SensorError> {
        info!(
            "Anemometer capture simulated in the main loop ({} ms rate period)",
            counter.period_ms()
        );
        Ok(())
    }

    async fn read_climate(&mut self) -> Result<ClimateReadings, SensorError> {
        self.climate_reads += 1;
        if self.climate_reads % CLIMATE_FAULT_EVERY == 0 {
            return Err(SensorError::ReadFailed {
                sensor: "BME280",
                operation: "read measurement",
                details: "simulated I2C NACK",
            });
        }

        let t = self.t();
        Ok(ClimateReadings {
            temperature: (14.0 + 6.0 * (TAU * t / 86_400.0).sin() + 0.3 * (t / 37.0).cos()) as f32,
            humidity: (65.0 - 15.0 * (TAU * t / 86_400.0).sin() + 2.0 * (t / 23.0).cos()) as f32,
            pressure: (1013.0 + 4.0 * (TAU * t / 43_200.0).sin()) as f32,
        })
    }

    async fn read_wind_vane(&mut self) -> Result<u16, SensorError> {
        // Veer to the next compass point every ten minutes, with a bit of
        // ADC noise.
        let t = self.t();
        let index = (t / 600.0) as usize % self.vane_positions.len().max(1);
        let base = self.vane_positions.get(index).copied().unwrap_or(0);
        let noise = (3.0 * (t * 1.7).sin()) as i32;
        Ok((i32::from(base) + noise).clamp(0, 4095) as u16)
    }

    async fn read_rain_sensor(&mut self) -> Result<u16, SensorError> {
        let t = self.t();
        let level = 2000.0 - 1900.0 * (TAU * t / 10_800.0).cos();
        Ok(level.clamp(0.0, 4095.0) as u16)
    }
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

fn drain_events(subscriber: &mut EventSubscriber<'_>) -> u32 {
    let mut recorded = 0;
    while let Some(result) = subscriber.try_next_message() {
        match result {
            WaitResult::Lagged(missed) => debug!("Event log lagged by {} events", missed),
            WaitResult::Message(StationEvent::Sample(sample)) => debug!("{}", sample),
            WaitResult::Message(StationEvent::Recorded(record)) => {
                info!("Recorded {}", record);
                recorded += 1;
            }
        }
    }
    recorded
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::init();

    let hours = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<u64>() {
            Ok(hours) if hours > 0 => hours,
            _ => {
                error!("Expected a positive number of hours, got {:?}", arg);
                std::process::exit(2);
            }
        },
        None => DEFAULT_HOURS,
    };
    info!("Starting mast simulator for {} simulated hours", hours);

    let clock = SimClock::starting_now();
    let mut store = RetentionStore::new(MemoryMedium::new());

    let config = StationConfig::load(store.medium_mut());
    info!(
        "Cadence: acquisition {} ms, window {} s, retention {} s, horizon {} days",
        config.cadence.acquisition_ms,
        config.cadence.window_secs,
        config.cadence.retention_secs,
        config.retention.horizon_days
    );

    let Ok(publisher) = EVENTS.publisher() else {
        error!("No event publisher slot left");
        return;
    };
    let Ok(mut subscriber) = EVENTS.subscriber() else {
        error!("No event subscriber slot left");
        return;
    };

    let mast = SyntheticMast::new(clock.clone(), &config);
    let mut station =
        Station::new(mast, clock.clone(), &PULSES, store, &config).with_events(publisher);

    if let Err(e) = station.save_config(&config) {
        warn!("Could not persist configuration: {}", e);
    }
    if let Err(e) = block_on(station.initialize()) {
        warn!("Continuing after initialization failure: {}", e);
    }

    let steps = hours * 3600 * 1000 / STEP_MS;
    let outage = (hours >= 3).then_some(7200..10_800);
    let mut recorded = 0;
    let mut elapsed_secs = 0;

    for _ in 0..steps {
        // Interrupt side: edges during the last second, then the rate tick.
        for _ in 0..station.board_mut().pulses_this_second() {
            PULSES.on_edge();
        }
        PULSES.on_tick();

        if let Some(outage) = &outage {
            if elapsed_secs == outage.start {
                warn!("Pulling the SD card");
                station.store_mut().medium_mut().set_available(false);
            } else if elapsed_secs == outage.end {
                info!("Reinserting the SD card");
                station.store_mut().medium_mut().set_available(true);
            }
        }

        block_on(station.poll(&config));
        recorded += drain_events(&mut subscriber);

        clock.advance(STEP_MS);
        elapsed_secs += STEP_MS / 1000;
    }

    let latest = station.current_sample();
    info!(
        "Done: {} records written, {} on card, last wind from {}",
        recorded,
        station.store_mut().record_count().unwrap_or(0),
        latest
            .wind_direction
            .map_or("nowhere", WindDirection::label)
    );

    let mut export = CsvExport::new(station.query(None, None, u32::MAX));
    let mut stdout = std::io::stdout().lock();
    let mut chunk = [0u8; 256];
    loop {
        let n = export.read(&mut chunk);
        if n == 0 {
            break;
        }
        if let Err(e) = stdout.write_all(&chunk[..n]) {
            error!("CSV export failed: {}", e);
            return;
        }
    }

    info!("Simulator exiting");
}
