//! The station: acquisition, windowing and retention driven from one loop
//!
//! ```rust,ignore
//! static PULSES: PulseCounter = PulseCounter::new(RATE_PERIOD_MS);
//! static EVENTS: EventChannel = EventChannel::new();
//!
//! let mut store = RetentionStore::new(medium);
//! let config = StationConfig::load(store.medium_mut());
//! let mut station = Station::new(board, clock, &PULSES, store, &config)
//!     .with_events(EVENTS.publisher().unwrap());
//!
//! station.initialize().await?;
//! loop {
//!     station.poll(&config).await;
//!     Timer::after_millis(100).await;
//! }
//! ```

mod readings;

pub use readings::SensorsState;

use embassy_time::{Duration, Instant};
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::config::{CadenceConfig, ConfigError, StationConfig};
use crate::events::{EventPublisher, StationEvent};
use crate::pulse::PulseCounter;
use crate::sample::{SensorSample, Timestamp};
use crate::schedule::{Bound, Clock, Periodic};
use crate::sensors::{Board, SensorError};
use crate::storage::{Cursor, FileMedium, InsertOutcome, RetentionStore, StoreError};
use crate::window::RollingWindow;

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Sensor error: {0}")]
    Sensor(SensorError),
    #[error("Storage error: {0}")]
    Store(StoreError),
    #[error("Configuration error: {0}")]
    Config(ConfigError),
}

impl From<SensorError> for StationError {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

impl From<StoreError> for StationError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ConfigError> for StationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Readings are kept to two decimals for display and storage.
fn round2(value: f32) -> f32 {
    libm::roundf(value * 100.0) / 100.0
}

pub struct Station<'a, B, C, M>
where
    B: Board,
    C: Clock,
    M: FileMedium,
{
    board: B,
    clock: C,
    pulses: &'static PulseCounter,
    sensors: SensorsState,
    window: RollingWindow,
    store: RetentionStore<M>,
    acquisition: Periodic,
    windowing: Periodic,
    retention: Bound,
    publisher: Option<EventPublisher<'a>>,
    initialized: bool,
}

impl<'a, B, C, M> Station<'a, B, C, M>
where
    B: Board,
    C: Clock,
    M: FileMedium,
{
    pub fn new(
        board: B,
        clock: C,
        pulses: &'static PulseCounter,
        store: RetentionStore<M>,
        config: &StationConfig,
    ) -> Self {
        let cadence = &config.cadence;
        pulses.set_radius(config.wind_speed.radius_m);

        Self {
            board,
            clock,
            pulses,
            sensors: SensorsState::new(),
            window: RollingWindow::new(),
            store,
            acquisition: Periodic::new(Duration::from_millis(cadence.acquisition_ms.into())),
            windowing: Periodic::new(Duration::from_secs(cadence.window_secs.into())),
            retention: Bound::new(Duration::from_secs(cadence.retention_secs.into())),
            publisher: None,
            initialized: false,
        }
    }

    /// Publish every acquired sample and persisted record on `publisher`.
    pub fn with_events(mut self, publisher: EventPublisher<'a>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Bring up the sensors and start pulse capture.
    ///
    /// Runs at most once per boot; later calls return `Ok` without touching
    /// the hardware. Pulse capture is started even when sensor bring-up
    /// fails, so the anemometer keeps working next to a dead climate sensor.
    /// The first failure is returned.
    pub async fn initialize(&mut self) -> Result<(), StationError> {
        if self.initialized {
            debug!("Station already initialized");
            return Ok(());
        }
        self.initialized = true;

        let bring_up = self.board.init().await;
        if let Err(e) = &bring_up {
            error!("Sensor bring-up failed: {}", e);
        }

        let capture = self.board.start_pulse_capture(self.pulses);
        if let Err(e) = &capture {
            error!("Anemometer capture failed to start: {}", e);
        }

        bring_up.and(capture)?;

        info!(
            "Station initialized (rate period {} ms)",
            self.pulses.period_ms()
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Read every sensor, classify and publish the resulting sample.
    ///
    /// The configuration is re-read on every cycle, so threshold and radius
    /// edits apply from the next cycle on.
    pub async fn run_acquisition_cycle(&mut self, config: &StationConfig) -> SensorSample {
        self.pulses.set_radius(config.wind_speed.radius_m);

        let failures = self.sensors.read_all(&mut self.board, config).await;
        if failures > 0 {
            debug!("{} sensor(s) served stale values", failures);
        }

        let sample = self.current_sample();
        debug!("{}", sample);
        self.publish(StationEvent::Sample(sample));
        sample
    }

    /// Snapshot of the last readings, the last computed wind speed and the
    /// current categories.
    pub fn current_sample(&self) -> SensorSample {
        let climate = self.sensors.climate();

        SensorSample {
            timestamp: self.clock.now_secs(),
            temperature: round2(climate.temperature),
            humidity: round2(climate.humidity),
            pressure: round2(climate.pressure),
            wind_speed: round2(self.pulses.speed_kmh()),
            wind_direction: self.sensors.direction(),
            rain_intensity: self.sensors.intensity(),
        }
    }

    /// Push the current sample into the rolling window.
    ///
    /// Returns `false` while a continuous sensor has never been read.
    pub fn record_window(&mut self) -> bool {
        let sample = self.current_sample();
        if !sample.is_complete() {
            debug!("Skipping incomplete sample at {}", sample.timestamp);
            return false;
        }

        self.window.record(sample);
        true
    }

    /// Persist the window average and sweep expired history.
    ///
    /// The record is stamped with the retention slot containing `now`, so a
    /// loop polling off the window phase still writes on slot boundaries.
    /// Storage faults are logged and swallowed. Returns the stored record.
    pub fn run_persistence_cycle(&mut self, config: &StationConfig) -> Option<SensorSample> {
        self.apply_cadence(&config.cadence);
        let slot = self.retention.slot(self.clock.now()).as_secs() as Timestamp;

        let stored = match self.window.average() {
            Some(average) => self.store_average(SensorSample {
                timestamp: slot,
                ..average
            }),
            None => {
                debug!("Rolling window empty, nothing to persist");
                None
            }
        };

        let now = self.clock.now_secs();
        if let Err(e) = self.store.prune(now, config.retention.horizon_secs()) {
            error!("Retention sweep failed: {}", e);
        }

        stored
    }

    fn store_average(&mut self, average: SensorSample) -> Option<SensorSample> {
        let record = SensorSample {
            temperature: round2(average.temperature),
            humidity: round2(average.humidity),
            pressure: round2(average.pressure),
            wind_speed: round2(average.wind_speed),
            ..average
        };

        match self.store.insert(&record) {
            Ok(InsertOutcome::Inserted) => {
                info!("Stored {}", record);
                self.publish(StationEvent::Recorded(record));
                Some(record)
            }
            Ok(InsertOutcome::Duplicate) => {
                warn!("Record for {} already stored, skipped", record.timestamp);
                None
            }
            Err(e) => {
                error!("Failed to store record for {}: {}", record.timestamp, e);
                None
            }
        }
    }

    /// Run whichever jobs are due.
    ///
    /// Acquisition and windowing are periodic gates; retention is bound to
    /// multiples of its interval. Returns `true` if anything ran.
    pub async fn poll(&mut self, config: &StationConfig) -> bool {
        self.apply_cadence(&config.cadence);
        let now = self.clock.now();
        let mut ran = false;

        if self.acquisition.ready(now) {
            self.run_acquisition_cycle(config).await;
            ran = true;
        }

        if self.windowing.ready(now) {
            self.record_window();
            ran = true;
        }

        if self.retention.ready(now) {
            self.run_persistence_cycle(config);
            ran = true;
        }

        ran
    }

    fn apply_cadence(&mut self, cadence: &CadenceConfig) {
        self.acquisition
            .set_interval(Duration::from_millis(cadence.acquisition_ms.into()));
        self.windowing
            .set_interval(Duration::from_secs(cadence.window_secs.into()));
        self.retention
            .set_interval(Duration::from_secs(cadence.retention_secs.into()));
    }

    /// Earliest time any gate may open again
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.acquisition.next_deadline(),
            self.windowing.next_deadline(),
            self.retention.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Ascending history over `[start, end]`, at most `limit` records.
    pub fn query(
        &mut self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        limit: u32,
    ) -> Cursor<'_, M> {
        self.store.query(start, end, limit)
    }

    /// Persist `config` next to the history.
    pub fn save_config(&mut self, config: &StationConfig) -> Result<(), StationError> {
        config.save(self.store.medium_mut())
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn sensors(&self) -> &SensorsState {
        &self.sensors
    }

    pub fn store(&self) -> &RetentionStore<M> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RetentionStore<M> {
        &mut self.store
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn publish(&self, event: StationEvent) {
        if let Some(publisher) = &self.publisher {
            publisher.publish_immediate(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventChannel;
    use crate::pulse::RATE_PERIOD_MS;
    use crate::sample::{RainIntensity, WindDirection};
    use crate::sensors::ClimateReadings;
    use crate::storage::MemoryMedium;
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::Cell;
    use embassy_futures::block_on;

    const FAILED_READ: SensorError = SensorError::ReadFailed {
        sensor: "MOCK",
        operation: "read",
        details: "bus error",
    };

    struct MockBoard {
        init_calls: u32,
        init_result: Result<(), SensorError>,
        capture_calls: u32,
        capture_result: Result<(), SensorError>,
        climate: Result<ClimateReadings, SensorError>,
        vane: Result<u16, SensorError>,
        rain: Result<u16, SensorError>,
    }

    impl MockBoard {
        fn new() -> Self {
            Self {
                init_calls: 0,
                init_result: Ok(()),
                capture_calls: 0,
                capture_result: Ok(()),
                climate: Ok(ClimateReadings {
                    temperature: 21.456,
                    humidity: 48.0,
                    pressure: 1013.25,
                }),
                vane: Ok(3200),
                rain: Ok(2500),
            }
        }
    }

    impl Board for MockBoard {
        async fn init(&mut self) -> Result<(), SensorError> {
            self.init_calls += 1;
            self.init_result
        }

        fn start_pulse_capture(&mut self, _counter: &'static PulseCounter) -> Result<(), SensorError> {
            self.capture_calls += 1;
            self.capture_result
        }

        async fn read_climate(&mut self) -> Result<ClimateReadings, SensorError> {
            self.climate
        }

        async fn read_wind_vane(&mut self) -> Result<u16, SensorError> {
            self.vane
        }

        async fn read_rain_sensor(&mut self) -> Result<u16, SensorError> {
            self.rain
        }
    }

    #[derive(Clone)]
    struct TestClock(Rc<Cell<u64>>);

    impl TestClock {
        fn at_secs(secs: u64) -> Self {
            Self(Rc::new(Cell::new(secs * 1000)))
        }

        fn advance_secs(&self, secs: u64) {
            self.0.set(self.0.get() + secs * 1000);
        }
    }

    impl Clock for TestClock {
        fn now_millis(&self) -> u64 {
            self.0.get()
        }
    }

    fn leaked_counter() -> &'static PulseCounter {
        Box::leak(Box::new(PulseCounter::new(RATE_PERIOD_MS)))
    }

    fn station<'a>(
        board: MockBoard,
        clock: TestClock,
    ) -> Station<'a, MockBoard, TestClock, MemoryMedium> {
        Station::new(
            board,
            clock,
            leaked_counter(),
            RetentionStore::new(MemoryMedium::new()),
            &StationConfig::default(),
        )
    }

    #[test]
    fn test_initialize_runs_once() {
        let mut station = station(MockBoard::new(), TestClock::at_secs(0));

        block_on(station.initialize()).unwrap();
        block_on(station.initialize()).unwrap();

        assert!(station.is_initialized());
        assert_eq!(station.board_mut().init_calls, 1);
    }

    #[test]
    fn test_initialize_reports_failure() {
        let mut board = MockBoard::new();
        board.init_result = Err(SensorError::InitializationFailed {
            sensor: "MOCK",
            details: "no answer",
        });
        let mut station = station(board, TestClock::at_secs(0));

        let result = block_on(station.initialize());

        assert!(matches!(
            result,
            Err(StationError::Sensor(SensorError::InitializationFailed { .. }))
        ));
        // The anemometer is attached regardless.
        assert_eq!(station.board_mut().capture_calls, 1);
        // Still usable, and still only tried once.
        assert!(block_on(station.initialize()).is_ok());
        assert_eq!(station.board_mut().init_calls, 1);
        assert_eq!(station.board_mut().capture_calls, 1);
        let sample = block_on(station.run_acquisition_cycle(&StationConfig::default()));
        assert_eq!(sample.temperature, 21.46);
    }

    #[test]
    fn test_initialize_returns_first_failure() {
        let mut board = MockBoard::new();
        board.init_result = Err(SensorError::InitializationFailed {
            sensor: "MOCK",
            details: "no answer",
        });
        board.capture_result = Err(SensorError::InitializationFailed {
            sensor: "ANEMOMETER",
            details: "no timer",
        });
        let mut both_failing = station(board, TestClock::at_secs(0));

        let result = block_on(both_failing.initialize());

        assert!(matches!(
            result,
            Err(StationError::Sensor(SensorError::InitializationFailed { sensor: "MOCK", .. }))
        ));
        assert_eq!(both_failing.board_mut().capture_calls, 1);

        // Capture alone failing is reported too.
        let mut board = MockBoard::new();
        board.capture_result = Err(FAILED_READ);
        let mut capture_failing = station(board, TestClock::at_secs(0));
        assert!(matches!(
            block_on(capture_failing.initialize()),
            Err(StationError::Sensor(SensorError::ReadFailed { .. }))
        ));
    }

    #[test]
    fn test_acquisition_rounds_and_classifies() {
        let mut station = station(MockBoard::new(), TestClock::at_secs(1_700_000_000));
        let pulses = station.pulses;

        for _ in 0..12 {
            pulses.on_edge();
        }
        pulses.on_tick();

        let sample = block_on(station.run_acquisition_cycle(&StationConfig::default()));

        assert_eq!(sample.timestamp, 1_700_000_000);
        assert_eq!(sample.temperature, 21.46);
        assert_eq!(sample.pressure, 1013.25);
        assert!((sample.wind_speed - 40.72).abs() < 1e-3);
        assert_eq!(sample.wind_direction, Some(WindDirection::North));
        assert_eq!(sample.rain_intensity, Some(RainIntensity::Humid));
    }

    #[test]
    fn test_failed_reads_keep_last_values() {
        let config = StationConfig::default();
        let mut station = station(MockBoard::new(), TestClock::at_secs(100));
        block_on(station.run_acquisition_cycle(&config));

        let board = station.board_mut();
        board.climate = Err(FAILED_READ);
        board.vane = Err(FAILED_READ);
        board.rain = Ok(4200);

        let sample = block_on(station.run_acquisition_cycle(&config));

        assert_eq!(sample.temperature, 21.46);
        assert_eq!(sample.humidity, 48.0);
        assert_eq!(sample.wind_direction, Some(WindDirection::North));
        // Clamped to the ADC rail, a step this large is tracked at once.
        assert_eq!(sample.rain_intensity, Some(RainIntensity::Rainy));
    }

    #[test]
    fn test_incomplete_samples_skip_window() {
        let mut board = MockBoard::new();
        board.climate = Err(FAILED_READ);
        let mut station = station(board, TestClock::at_secs(100));

        block_on(station.run_acquisition_cycle(&StationConfig::default()));

        assert!(!station.record_window());
        assert!(station.window().is_empty());
        assert_eq!(station.run_persistence_cycle(&StationConfig::default()), None);
    }

    #[test]
    fn test_persistence_publishes_record() {
        let channel = EventChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let config = StationConfig::default();
        let clock = TestClock::at_secs(1_000);
        let mut station =
            station(MockBoard::new(), clock.clone()).with_events(channel.publisher().unwrap());

        for _ in 0..3 {
            block_on(station.run_acquisition_cycle(&config));
            assert!(station.record_window());
            clock.advance_secs(10);
        }

        // Called between boundaries: stamped with the slot started at 900.
        let record = station.run_persistence_cycle(&config).unwrap();
        assert_eq!(record.timestamp, 900);
        assert_eq!(record.temperature, 21.46);
        assert_eq!(station.store_mut().record_count().unwrap(), 1);

        let mut events = Vec::new();
        while let Some(event) = subscriber.try_next_message_pure() {
            events.push(event);
        }
        assert_eq!(events.len(), 4);
        assert!(matches!(events[3], StationEvent::Recorded(r) if r == record));
    }

    #[test]
    fn test_storage_fault_is_swallowed() {
        let config = StationConfig::default();
        let clock = TestClock::at_secs(5_000);
        let mut station = station(MockBoard::new(), clock.clone());
        block_on(station.run_acquisition_cycle(&config));
        station.record_window();

        station.store_mut().medium_mut().set_available(false);
        assert_eq!(station.run_persistence_cycle(&config), None);
        assert_eq!(station.query(None, None, 10).count(), 0);

        station.store_mut().medium_mut().set_available(true);
        clock.advance_secs(1);
        block_on(station.run_acquisition_cycle(&config));
        station.record_window();
        assert!(station.run_persistence_cycle(&config).is_some());
        assert_eq!(station.query(None, None, 10).count(), 1);
    }

    #[test]
    fn test_poll_follows_cadence() {
        let config = StationConfig::default();
        let clock = TestClock::at_secs(1_700_000_000);
        let mut station = station(MockBoard::new(), clock.clone());

        for _ in 0..3600 {
            block_on(station.poll(&config));
            clock.advance_secs(1);
        }

        // Boundaries at +100, +1000, +1900 and +2800 seconds.
        let stored: Vec<_> = station.query(None, None, 100).map(|s| s.timestamp).collect();
        assert_eq!(
            stored,
            [1_700_000_100, 1_700_001_000, 1_700_001_900, 1_700_002_800]
        );
        assert_eq!(station.window().len(), 90);
    }

    #[test]
    fn test_records_land_on_slot_when_window_is_off_phase() {
        let config = StationConfig::default();
        // Window samples at ...05, ...15, never on a 900 s boundary.
        let clock = TestClock::at_secs(1_700_000_005);
        let mut station = station(MockBoard::new(), clock.clone());

        for _ in 0..1800 {
            block_on(station.poll(&config));
            clock.advance_secs(1);
        }

        let stored: Vec<_> = station.query(None, None, 100).map(|s| s.timestamp).collect();
        assert_eq!(stored, [1_700_000_100, 1_700_001_000]);
        assert_eq!(station.window().latest().map(|s| s.timestamp), Some(1_700_001_795));
    }
}
