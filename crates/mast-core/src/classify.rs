//! Threshold classification of smoothed analog readings
//!
//! A [`ThresholdTable`] is an ordered list of `(category, range)` pairs. The
//! scan is first-match in declaration order, so overlapping tables are legal
//! and resolved by position. A [`Classifier`] keeps the last category and only
//! moves when a reading falls inside some declared range.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Inclusive raw ADC range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdRange {
    pub min: u16,
    pub max: u16,
}

impl ThresholdRange {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    #[inline]
    pub const fn contains(&self, raw: u16) -> bool {
        self.min <= raw && raw <= self.max
    }

    pub const fn overlaps(&self, other: &ThresholdRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdEntry<C> {
    pub category: C,
    pub range: ThresholdRange,
}

/// Ordered category → range mapping for one analog signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdTable<C> {
    entries: Vec<ThresholdEntry<C>>,
}

impl<C> Default for ThresholdTable<C> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<C: Copy + PartialEq> ThresholdTable<C> {
    /// Build a table from `(category, min, max)` triples, keeping their order.
    pub fn from_ranges(ranges: &[(C, u16, u16)]) -> Self {
        Self {
            entries: ranges
                .iter()
                .map(|&(category, min, max)| ThresholdEntry {
                    category,
                    range: ThresholdRange::new(min, max),
                })
                .collect(),
        }
    }

    /// First category whose range contains `raw`
    pub fn lookup(&self, raw: u16) -> Option<C> {
        self.entries
            .iter()
            .find(|entry| entry.range.contains(raw))
            .map(|entry| entry.category)
    }

    pub fn get(&self, category: C) -> Option<ThresholdRange> {
        self.entries
            .iter()
            .find(|entry| entry.category == category)
            .map(|entry| entry.range)
    }

    /// Replace the range of `category` in place, or append it at the end.
    pub fn set(&mut self, category: C, range: ThresholdRange) {
        match self.entries.iter_mut().find(|e| e.category == category) {
            Some(entry) => entry.range = range,
            None => self.entries.push(ThresholdEntry { category, range }),
        }
    }

    pub fn entries(&self) -> &[ThresholdEntry<C>] {
        &self.entries
    }

    /// Pairs of declared categories whose ranges intersect.
    ///
    /// Overlaps are not an error, the earlier entry wins, but they usually
    /// point at a calibration mistake.
    pub fn overlaps(&self) -> impl Iterator<Item = (C, C)> + '_ {
        self.entries.iter().enumerate().flat_map(move |(i, a)| {
            self.entries[i + 1..]
                .iter()
                .filter(move |b| a.range.overlaps(&b.range))
                .map(move |b| (a.category, b.category))
        })
    }
}

/// Sticky classification state for one signal
#[derive(Debug, Clone, Copy)]
pub struct Classifier<C> {
    current: Option<C>,
}

impl<C> Default for Classifier<C> {
    fn default() -> Self {
        Self { current: None }
    }
}

impl<C: Copy + PartialEq> Classifier<C> {
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Classify `raw` against `table`.
    ///
    /// When no range matches, the previous category is kept.
    pub fn classify(&mut self, table: &ThresholdTable<C>, raw: u16) -> Option<C> {
        if let Some(category) = table.lookup(raw) {
            self.current = Some(category);
        }
        self.current
    }

    pub fn current(&self) -> Option<C> {
        self.current
    }
}
