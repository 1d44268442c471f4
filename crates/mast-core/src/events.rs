//! Station events for whoever wants to follow the node live (display, web
//! surface, logger).

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};

use crate::sample::SensorSample;

/// Channel capacity for pub-sub events
/// Subscribers lagging more than this lose the oldest events
pub const EVENT_CHANNEL_CAPACITY: usize = 8;

/// Number of subscribers that can listen to station events
pub const EVENT_SUBSCRIBERS: usize = 2;

/// Number of publishers (just the station loop)
pub const EVENT_PUBLISHERS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StationEvent {
    /// A sample was acquired (rounded, not yet averaged)
    Sample(SensorSample),
    /// A window average was persisted
    Recorded(SensorSample),
}

pub type EventChannel = PubSubChannel<
    CriticalSectionRawMutex,
    StationEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventPublisher<'a> = Publisher<
    'a,
    CriticalSectionRawMutex,
    StationEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    StationEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;
