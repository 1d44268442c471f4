//! Hardware-independent core library for the mast weather node
//!
//! This crate contains all platform-agnostic logic of the node: the
//! interrupt-driven anemometer pulse counter, the sampling and threshold
//! classification cycle, the rolling averaging window and the on-card
//! retention store with its query cursors.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod classify;
pub mod config;
pub mod events;
pub mod export;
pub mod pulse;
pub mod sample;
pub mod schedule;
pub mod sensors;
pub mod smoothing;
pub mod station;
pub mod storage;
pub mod window;

pub use sample::{RainIntensity, SensorSample, Timestamp, WindDirection};
pub use station::{Station, StationError};
