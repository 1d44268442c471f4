//! Day-segmented retention store.

use alloc::vec::Vec;
use core::fmt::Write;
use log::{debug, error, info, warn};

use super::cursor::{Cursor, QueryRange};
use super::{FileMedium, RECORD_SIZE, StoreError};
use crate::sample::{SensorSample, Timestamp};

/// Span of one segment file
pub const SEGMENT_SECS: u32 = 86_400;

const INDEX_FILE: &str = "SEGMENTS.IDX";

pub(crate) fn segment_name(day: u32) -> heapless::String<16> {
    let mut name = heapless::String::new();
    // Seven digits cover every day a u32 timestamp can reach.
    let _ = write!(name, "D{:07}.BIN", day);
    name
}

/// Day of a segment file name, `None` for anything else.
fn parse_segment_name(name: &str) -> Option<u32> {
    let digits = name.strip_prefix('D')?.strip_suffix(".BIN")?;
    if digits.len() != 7 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

const fn day_of(ts: Timestamp) -> u32 {
    ts / SEGMENT_SECS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same timestamp already exists and was left untouched
    Duplicate,
}

/// What a retention sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub records: u32,
    pub segments: u32,
}

/// Time-indexed history of averaged samples on a [`FileMedium`].
///
/// Single writer: the store owns its medium and every mutation goes through
/// `&mut self`.
pub struct RetentionStore<M: FileMedium> {
    medium: M,
}

impl<M: FileMedium> RetentionStore<M> {
    pub fn new(medium: M) -> Self {
        Self { medium }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }

    pub fn into_inner(self) -> M {
        self.medium
    }

    /// Insert one record, keeping its segment sorted.
    ///
    /// Records newer than everything in their segment are appended; older
    /// ones rewrite that segment. An existing timestamp is never overwritten.
    pub fn insert(&mut self, sample: &SensorSample) -> Result<InsertOutcome, StoreError> {
        let day = day_of(sample.timestamp);
        let name = segment_name(day);
        let size = self.medium.size(&name)?.unwrap_or(0);
        let whole = size - size % RECORD_SIZE as u32;

        // Fast path: clean segment, record goes at the end.
        if whole == size {
            let append = if whole == 0 {
                true
            } else {
                let mut last = [0u8; RECORD_SIZE];
                let read = self
                    .medium
                    .read_at(&name, whole - RECORD_SIZE as u32, &mut last)?;
                read == RECORD_SIZE
                    && sample.timestamp > SensorSample::from_bytes(&last).timestamp
            };

            if append {
                self.track_segment(day)?;
                if whole == 0 {
                    self.medium.replace(&name, &sample.to_bytes())?;
                } else {
                    self.medium.append(&name, &sample.to_bytes())?;
                }
                return Ok(InsertOutcome::Inserted);
            }
        }

        let mut records = self.read_segment(day)?;
        match records.binary_search_by_key(&sample.timestamp, |r| r.timestamp) {
            Ok(_) => return Ok(InsertOutcome::Duplicate),
            Err(pos) => records.insert(pos, *sample),
        }

        debug!("Rewriting segment {} ({} records)", name, records.len());
        self.track_segment(day)?;
        self.write_segment(day, &records)?;
        Ok(InsertOutcome::Inserted)
    }

    /// Remove every record older than `now - horizon_secs`.
    ///
    /// Idempotent: a second sweep with the same arguments removes nothing.
    pub fn prune(&mut self, now: Timestamp, horizon_secs: u32) -> Result<PruneReport, StoreError> {
        let cutoff = now.saturating_sub(horizon_secs);
        let mut days = self.segments()?;
        let mut report = PruneReport::default();

        // Segments that end at or before the cutoff go as a whole.
        let expired = days.partition_point(|&day| {
            (u64::from(day) + 1) * u64::from(SEGMENT_SECS) <= u64::from(cutoff)
        });
        for &day in &days[..expired] {
            let name = segment_name(day);
            let size = self.medium.size(&name)?.unwrap_or(0);
            self.medium.remove(&name)?;
            report.records += size / RECORD_SIZE as u32;
            report.segments += 1;
        }
        let mut changed = expired > 0;
        days.drain(..expired);

        if let Some(&day) = days.first()
            && day == day_of(cutoff)
        {
            let records = self.read_segment(day)?;
            let keep_from = records.partition_point(|r| r.timestamp < cutoff);
            if keep_from > 0 {
                self.write_segment(day, &records[keep_from..])?;
                report.records += keep_from as u32;
                if keep_from == records.len() {
                    days.remove(0);
                    report.segments += 1;
                    changed = true;
                }
            }
        }

        if changed {
            self.save_index(&days)?;
        }

        if report.records > 0 {
            info!(
                "Pruned {} records ({} segments) older than {}",
                report.records, report.segments, cutoff
            );
        }

        Ok(report)
    }

    /// Open an ascending cursor over `[start, end]`, yielding at most `limit`
    /// records.
    ///
    /// A store that cannot be read yields an already exhausted cursor.
    pub fn query(
        &mut self,
        start: Option<Timestamp>,
        end: Option<Timestamp>,
        limit: u32,
    ) -> Cursor<'_, M> {
        if limit == 0 {
            return Cursor::exhausted();
        }

        let days = match self.segments() {
            Ok(days) => days,
            Err(e) => {
                error!("Failed to open history query: {}", e);
                return Cursor::exhausted();
            }
        };

        let first = start.map(day_of);
        let last = end.map(day_of);
        let days = days
            .into_iter()
            .filter(|&day| first.is_none_or(|f| day >= f) && last.is_none_or(|l| day <= l))
            .collect();

        Cursor::open(&mut self.medium, days, QueryRange::new(start, end), limit)
    }

    /// Number of whole records currently stored
    pub fn record_count(&mut self) -> Result<u32, StoreError> {
        let mut count = 0;
        for day in self.segments()? {
            let size = self.medium.size(&segment_name(day))?.unwrap_or(0);
            count += size / RECORD_SIZE as u32;
        }
        Ok(count)
    }

    /// Live segment days, ascending. A corrupt index is rebuilt from the
    /// segment files on the medium.
    fn segments(&mut self) -> Result<Vec<u32>, StoreError> {
        match self.load_index() {
            Err(StoreError::CorruptIndex) => {
                warn!("Segment index corrupt, rebuilding from segment files");
                let days = self.scan_segments()?;
                self.save_index(&days)?;
                info!("Segment index rebuilt ({} segments)", days.len());
                Ok(days)
            }
            other => other,
        }
    }

    fn scan_segments(&mut self) -> Result<Vec<u32>, StoreError> {
        let mut days = Vec::new();
        self.medium.for_each_name(&mut |name| {
            if let Some(day) = parse_segment_name(name) {
                days.push(day);
            }
        })?;
        days.sort_unstable();
        days.dedup();
        Ok(days)
    }

    fn load_index(&mut self) -> Result<Vec<u32>, StoreError> {
        let Some(len) = self.medium.size(INDEX_FILE)? else {
            return Ok(Vec::new());
        };

        let mut bytes = alloc::vec![0u8; len as usize];
        let read = self.medium.read_at(INDEX_FILE, 0, &mut bytes)?;
        postcard::from_bytes(&bytes[..read]).map_err(|_| StoreError::CorruptIndex)
    }

    fn save_index(&mut self, days: &[u32]) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(days).map_err(StoreError::io)?;
        self.medium.replace(INDEX_FILE, &bytes)
    }

    /// Add `day` to the index if it is new.
    fn track_segment(&mut self, day: u32) -> Result<(), StoreError> {
        let mut days = self.segments()?;
        if let Err(pos) = days.binary_search(&day) {
            days.insert(pos, day);
            self.save_index(&days)?;
        }
        Ok(())
    }

    /// Decode every whole record of a segment; a torn tail is skipped.
    fn read_segment(&mut self, day: u32) -> Result<Vec<SensorSample>, StoreError> {
        let name = segment_name(day);
        let Some(size) = self.medium.size(&name)? else {
            return Ok(Vec::new());
        };

        let mut bytes = alloc::vec![0u8; size as usize];
        let read = self.medium.read_at(&name, 0, &mut bytes)?;

        Ok(bytes[..read]
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let mut record = [0u8; RECORD_SIZE];
                record.copy_from_slice(chunk);
                SensorSample::from_bytes(&record)
            })
            .collect())
    }

    fn write_segment(&mut self, day: u32, records: &[SensorSample]) -> Result<(), StoreError> {
        let name = segment_name(day);
        if records.is_empty() {
            return self.medium.remove(&name);
        }

        let mut bytes = Vec::with_capacity(records.len() * RECORD_SIZE);
        for record in records {
            bytes.extend_from_slice(&record.to_bytes());
        }
        self.medium.replace(&name, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{RainIntensity, WindDirection};
    use crate::storage::MemoryMedium;

    fn sample(timestamp: Timestamp) -> SensorSample {
        SensorSample {
            timestamp,
            temperature: 20.0,
            humidity: 50.0,
            pressure: 1013.0,
            wind_speed: 5.0,
            wind_direction: Some(WindDirection::West),
            rain_intensity: Some(RainIntensity::Dry),
        }
    }

    fn store_with(timestamps: &[Timestamp]) -> RetentionStore<MemoryMedium> {
        let mut store = RetentionStore::new(MemoryMedium::new());
        for &ts in timestamps {
            assert_eq!(store.insert(&sample(ts)).unwrap(), InsertOutcome::Inserted);
        }
        store
    }

    fn timestamps(store: &mut RetentionStore<MemoryMedium>) -> Vec<Timestamp> {
        store.query(None, None, u32::MAX).map(|s| s.timestamp).collect()
    }

    #[test]
    fn test_segment_name() {
        assert_eq!(segment_name(0).as_str(), "D0000000.BIN");
        assert_eq!(segment_name(19723).as_str(), "D0019723.BIN");
    }

    #[test]
    fn test_prune_before_horizon() {
        let mut store = store_with(&[100, 200, 300]);

        let report = store.prune(320, 150).unwrap();

        assert_eq!(report, PruneReport { records: 1, segments: 0 });
        assert_eq!(timestamps(&mut store), [200, 300]);
    }

    #[test]
    fn test_horizon_boundaries() {
        let horizon = 45 * SEGMENT_SECS;
        let now = 10_000_000;
        let mut store = store_with(&[now - horizon - 1, now - horizon, now - horizon + 1]);

        store.prune(now, horizon).unwrap();

        assert_eq!(timestamps(&mut store), [now - horizon, now - horizon + 1]);
    }

    #[test]
    fn test_prune_drops_whole_segments() {
        let mut all = Vec::new();
        for day in 0..3 {
            for hour in 0..4 {
                all.push(day * SEGMENT_SECS + hour * 3600);
            }
        }
        let mut store = store_with(&all);

        let report = store.prune(2 * SEGMENT_SECS + 3600, SEGMENT_SECS).unwrap();

        assert_eq!(report, PruneReport { records: 5, segments: 1 });
        assert!(store.medium().contents("D0000000.BIN").is_none());
        assert_eq!(timestamps(&mut store)[0], SEGMENT_SECS + 3600);
        assert_eq!(store.record_count().unwrap(), 7);

        // Same sweep again removes nothing.
        let report = store.prune(2 * SEGMENT_SECS + 3600, SEGMENT_SECS).unwrap();
        assert_eq!(report, PruneReport::default());
    }

    #[test]
    fn test_prune_empties_boundary_segment() {
        let mut store = store_with(&[10, 20]);

        let report = store.prune(1000, 100).unwrap();

        assert_eq!(report, PruneReport { records: 2, segments: 1 });
        assert_eq!(store.record_count().unwrap(), 0);
        assert!(store.medium().contents("D0000000.BIN").is_none());
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let mut store = store_with(&[500]);
        let mut other = sample(500);
        other.temperature = -3.0;

        assert_eq!(store.insert(&other).unwrap(), InsertOutcome::Duplicate);

        let stored: Vec<_> = store.query(None, None, 10).collect();
        assert_eq!(stored, [sample(500)]);
    }

    #[test]
    fn test_out_of_order_insert() {
        let mut store = store_with(&[300, 100, 200]);
        assert_eq!(timestamps(&mut store), [100, 200, 300]);
        assert_eq!(
            store.insert(&sample(100)).unwrap(),
            InsertOutcome::Duplicate
        );
    }

    #[test]
    fn test_query_bounds_and_limit() {
        let mut all = Vec::new();
        for day in 0..3 {
            for hour in 0..4 {
                all.push(day * SEGMENT_SECS + hour * 3600);
            }
        }
        let mut store = store_with(&all);
        assert_eq!(timestamps(&mut store), all);

        let start = SEGMENT_SECS + 3600;
        let end = 2 * SEGMENT_SECS + 3600;
        let bounded: Vec<_> = store
            .query(Some(start), Some(end), 100)
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(
            bounded,
            [
                SEGMENT_SECS + 3600,
                SEGMENT_SECS + 7200,
                SEGMENT_SECS + 10800,
                2 * SEGMENT_SECS,
                2 * SEGMENT_SECS + 3600,
            ]
        );

        let limited: Vec<_> = store
            .query(Some(start), None, 2)
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(limited, [SEGMENT_SECS + 3600, SEGMENT_SECS + 7200]);

        assert_eq!(store.query(Some(end), Some(start), 10).count(), 0);
        assert_eq!(store.query(None, None, 0).count(), 0);
    }

    #[test]
    fn test_cursor_released_on_exhaustion() {
        let mut store = store_with(&[1, 2, 3]);
        let mut cursor = store.query(None, None, 2);

        assert!(cursor.next().is_some());
        assert!(cursor.next().is_some());
        assert!(!cursor.is_exhausted());
        assert!(cursor.next().is_none());
        assert!(cursor.is_exhausted());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn test_unavailable_medium() {
        let mut store = store_with(&[100]);
        store.medium_mut().set_available(false);

        assert_eq!(store.insert(&sample(200)), Err(StoreError::Unavailable));
        assert_eq!(store.prune(1000, 10), Err(StoreError::Unavailable));
        assert!(store.query(None, None, 10).is_exhausted());

        store.medium_mut().set_available(true);
        assert_eq!(store.insert(&sample(200)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(timestamps(&mut store), [100, 200]);
    }

    #[test]
    fn test_torn_tail_is_ignored() {
        let mut store = store_with(&[100, 200]);
        store
            .medium_mut()
            .append("D0000000.BIN", &[0xAB; 10])
            .unwrap();

        assert_eq!(timestamps(&mut store), [100, 200]);

        store.insert(&sample(300)).unwrap();
        assert_eq!(timestamps(&mut store), [100, 200, 300]);
        assert_eq!(
            store.medium().contents("D0000000.BIN").map(<[u8]>::len),
            Some(3 * RECORD_SIZE)
        );
    }

    #[test]
    fn test_parse_segment_name() {
        assert_eq!(parse_segment_name("D0019723.BIN"), Some(19723));
        assert_eq!(parse_segment_name(segment_name(0).as_str()), Some(0));
        assert_eq!(parse_segment_name("SEGMENTS.IDX"), None);
        assert_eq!(parse_segment_name("CONFIG.BIN"), None);
        assert_eq!(parse_segment_name("D12.BIN"), None);
        assert_eq!(parse_segment_name("D00A0000.BIN"), None);
    }

    #[test]
    fn test_corrupt_index_without_segments() {
        let mut medium = MemoryMedium::new();
        medium.replace(INDEX_FILE, &[0xFF; 3]).unwrap();
        let mut store = RetentionStore::new(medium);

        assert_eq!(store.insert(&sample(42)).unwrap(), InsertOutcome::Inserted);
        assert_eq!(timestamps(&mut store), [42]);
    }

    #[test]
    fn test_corrupt_index_is_rebuilt_from_segments() {
        let mut store = store_with(&[100, SEGMENT_SECS + 100]);
        // Torn index write: truncated, nothing decodable left.
        store.medium_mut().replace(INDEX_FILE, &[0xFF; 3]).unwrap();

        assert_eq!(
            store.insert(&sample(2 * SEGMENT_SECS + 100)).unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            timestamps(&mut store),
            [100, SEGMENT_SECS + 100, 2 * SEGMENT_SECS + 100]
        );
        assert_eq!(store.record_count().unwrap(), 3);

        let report = store.prune(10 * SEGMENT_SECS, SEGMENT_SECS).unwrap();

        assert_eq!(report, PruneReport { records: 3, segments: 3 });
        let names: Vec<_> = store.medium().file_names().collect();
        assert_eq!(names, [INDEX_FILE]);
    }

    #[test]
    fn test_corrupt_index_rebuilt_on_query() {
        let mut store = store_with(&[100, SEGMENT_SECS + 100]);
        store.medium_mut().replace(INDEX_FILE, &[]).unwrap();

        assert_eq!(timestamps(&mut store), [100, SEGMENT_SECS + 100]);
        assert_eq!(store.load_index().unwrap(), [0, 1]);
    }
}
