//! Forward-only query cursor over the retention store.
//!
//! A cursor walks the segment files of its query in day order and decodes
//! records in small batches, so memory stays bounded whatever the query
//! size. Once the last record is yielded (or the limit is hit, or a read
//! fails) it drops its medium borrow and buffers immediately and reports
//! exhaustion from then on.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::iter::FusedIterator;
use log::error;

use super::store::segment_name;
use super::{FileMedium, RECORD_SIZE, StoreError};
use crate::sample::{SensorSample, Timestamp};

/// Records decoded per medium read
const BATCH_RECORDS: usize = 16;

/// Inclusive timestamp bounds; `None` means unbounded on that side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryRange {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

impl QueryRange {
    pub const fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        Self { start, end }
    }

    pub const fn all() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start.is_none_or(|start| ts >= start) && self.end.is_none_or(|end| ts <= end)
    }

    fn is_past_end(&self, ts: Timestamp) -> bool {
        self.end.is_some_and(|end| ts > end)
    }
}

pub struct Cursor<'s, M: FileMedium> {
    state: CursorState<'s, M>,
}

enum CursorState<'s, M: FileMedium> {
    Open(OpenCursor<'s, M>),
    Exhausted,
}

struct OpenCursor<'s, M: FileMedium> {
    medium: &'s mut M,
    /// Segment days still to visit, ascending
    segments: Vec<u32>,
    next_segment: usize,
    /// Byte offset of the next unread record in the current segment
    offset: u32,
    batch: VecDeque<SensorSample>,
    range: QueryRange,
    remaining: u32,
    /// A record past the end bound was seen; nothing later can match
    past_end: bool,
}

impl<'s, M: FileMedium> Cursor<'s, M> {
    pub(super) fn open(
        medium: &'s mut M,
        segments: Vec<u32>,
        range: QueryRange,
        limit: u32,
    ) -> Self {
        if limit == 0 || segments.is_empty() {
            return Self::exhausted();
        }

        Self {
            state: CursorState::Open(OpenCursor {
                medium,
                segments,
                next_segment: 0,
                offset: 0,
                batch: VecDeque::with_capacity(BATCH_RECORDS),
                range,
                remaining: limit,
                past_end: false,
            }),
        }
    }

    /// A cursor that yields nothing
    pub fn exhausted() -> Self {
        Self {
            state: CursorState::Exhausted,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, CursorState::Exhausted)
    }

    fn release(&mut self) {
        self.state = CursorState::Exhausted;
    }
}

impl<M: FileMedium> Iterator for Cursor<'_, M> {
    type Item = SensorSample;

    fn next(&mut self) -> Option<SensorSample> {
        let CursorState::Open(open) = &mut self.state else {
            return None;
        };

        match open.advance() {
            Ok(Some(sample)) => Some(sample),
            Ok(None) => {
                self.release();
                None
            }
            Err(e) => {
                error!("History query aborted: {}", e);
                self.release();
                None
            }
        }
    }
}

impl<M: FileMedium> FusedIterator for Cursor<'_, M> {}

impl<M: FileMedium> OpenCursor<'_, M> {
    fn advance(&mut self) -> Result<Option<SensorSample>, StoreError> {
        loop {
            if self.remaining == 0 {
                return Ok(None);
            }

            if let Some(sample) = self.batch.pop_front() {
                self.remaining -= 1;
                return Ok(Some(sample));
            }

            if self.past_end || !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Decode the next batch of in-range records.
    ///
    /// Returns `false` once every segment has been read.
    fn fill(&mut self) -> Result<bool, StoreError> {
        let mut buf = [0u8; RECORD_SIZE * BATCH_RECORDS];

        while self.next_segment < self.segments.len() {
            let name = segment_name(self.segments[self.next_segment]);
            let bytes_read = self.medium.read_at(&name, self.offset, &mut buf)?;

            // A torn trailing record is not a record.
            let whole = bytes_read / RECORD_SIZE * RECORD_SIZE;
            if whole == 0 {
                self.next_segment += 1;
                self.offset = 0;
                continue;
            }
            self.offset += whole as u32;

            for chunk in buf[..whole].chunks_exact(RECORD_SIZE) {
                let mut record = [0u8; RECORD_SIZE];
                record.copy_from_slice(chunk);
                let sample = SensorSample::from_bytes(&record);

                if self.range.is_past_end(sample.timestamp) {
                    self.past_end = true;
                    break;
                }
                if self.range.contains(sample.timestamp) {
                    self.batch.push_back(sample);
                }
            }

            if !self.batch.is_empty() || self.past_end {
                return Ok(true);
            }
        }

        Ok(false)
    }
}
