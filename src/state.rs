//! Shared application state
//!
//! The store is the single point of truth between the producers (hand tracker,
//! config generator) and the consumer (particle renderer). Every field group
//! has exactly one writer handle, so no field can be written from two places.
//! Readers take cheap snapshots and never block on I/O.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use glam::Vec3;
use parking_lot::Mutex;

use crate::appearance::{AppearanceConfig, AppearanceUpdate};

/// Coarse hand pose
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gesture {
    /// Zero or one finger folded
    Open,
    /// Two or three fingers folded
    Neutral,
    /// Four fingers folded
    Closed,
}

impl Gesture {
    /// Label shown in the camera panel
    pub fn label(&self) -> &'static str {
        match self {
            Gesture::Open => "OPEN",
            Gesture::Neutral => "NEUTRAL",
            Gesture::Closed => "CLOSED",
        }
    }
}

/// Latest hand observation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandSample {
    /// Index fingertip in scene coordinates
    pub position: Vec3,
    /// Whether a hand was visible in the last processed frame
    pub detected: bool,
    /// Gesture label, `None` when no hand is visible
    pub gesture: Option<Gesture>,
}

impl HandSample {
    /// The "no hand" sample
    pub const NONE: Self = Self {
        position: Vec3::ZERO,
        detected: false,
        gesture: None,
    };

    pub fn detected(position: Vec3, gesture: Gesture) -> Self {
        Self {
            position,
            detected: true,
            gesture: Some(gesture),
        }
    }
}

impl Default for HandSample {
    fn default() -> Self {
        Self::NONE
    }
}

/// Tracker lifecycle as seen by the shell
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum TrackerStatus {
    /// Camera and model are being set up
    #[default]
    Starting,
    /// Frames are flowing through the detector
    Running,
    /// Initialization failed; tracking never starts
    Failed(String),
}

/// Which part of the store changed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateChange {
    Hand,
    TrackerStatus,
    Appearance,
}

struct Inner {
    hand: Mutex<HandSample>,
    tracker_status: Mutex<TrackerStatus>,
    appearance: Mutex<AppearanceConfig>,
    /// Bumped on every appearance write so consumers can detect changes cheaply
    appearance_revision: AtomicU64,
    subscribers: Mutex<Vec<Subscriber>>,
}

struct Subscriber {
    topics: Vec<StateChange>,
    tx: Sender<StateChange>,
}

impl Inner {
    fn notify(&self, change: StateChange) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| !sub.topics.contains(&change) || sub.tx.send(change).is_ok());
    }
}

/// Owner of the shared state before it is split into handles
pub struct StateStore {
    inner: Arc<Inner>,
}

impl StateStore {
    /// Create a store with the given startup appearance
    pub fn new(appearance: AppearanceConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                hand: Mutex::new(HandSample::NONE),
                tracker_status: Mutex::new(TrackerStatus::Starting),
                appearance: Mutex::new(appearance),
                appearance_revision: AtomicU64::new(0),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Split into one reader and the single writer for each field group
    pub fn split(self) -> (StateReader, HandWriter, ConfigWriter) {
        (
            StateReader {
                inner: self.inner.clone(),
            },
            HandWriter {
                inner: self.inner.clone(),
            },
            ConfigWriter { inner: self.inner },
        )
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(AppearanceConfig::default())
    }
}

/// Read-only view of the store
#[derive(Clone)]
pub struct StateReader {
    inner: Arc<Inner>,
}

impl StateReader {
    pub fn hand(&self) -> HandSample {
        *self.inner.hand.lock()
    }

    pub fn tracker_status(&self) -> TrackerStatus {
        self.inner.tracker_status.lock().clone()
    }

    pub fn appearance(&self) -> AppearanceConfig {
        self.inner.appearance.lock().clone()
    }

    pub fn appearance_revision(&self) -> u64 {
        self.inner.appearance_revision.load(Ordering::Acquire)
    }

    /// Receive a message for every subsequent change to one of `topics`.
    ///
    /// Hand samples change at camera rate; consumers that only drain once per
    /// rendered frame should leave `StateChange::Hand` out and read
    /// [`StateReader::hand`] directly.
    pub fn subscribe(&self, topics: &[StateChange]) -> Receiver<StateChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.inner.subscribers.lock().push(Subscriber {
            topics: topics.to_vec(),
            tx,
        });
        rx
    }
}

/// Sole writer of the hand sample and tracker status
pub struct HandWriter {
    inner: Arc<Inner>,
}

impl HandWriter {
    /// Publish a new sample; subscribers are notified only if it differs
    pub fn publish(&self, sample: HandSample) {
        let changed = {
            let mut hand = self.inner.hand.lock();
            let changed = *hand != sample;
            *hand = sample;
            changed
        };
        if changed {
            self.inner.notify(StateChange::Hand);
        }
    }

    /// Clear position, detection flag and gesture
    pub fn clear(&self) {
        self.publish(HandSample::NONE);
    }

    pub fn set_status(&self, status: TrackerStatus) {
        *self.inner.tracker_status.lock() = status;
        self.inner.notify(StateChange::TrackerStatus);
    }
}

/// Sole writer of the appearance configuration
pub struct ConfigWriter {
    inner: Arc<Inner>,
}

impl ConfigWriter {
    /// Merge a generated partial configuration
    pub fn apply(&self, update: &AppearanceUpdate) {
        self.inner.appearance.lock().apply(update);
        self.bump();
    }

    /// Replace the whole configuration
    pub fn replace(&self, config: AppearanceConfig) {
        *self.inner.appearance.lock() = config;
        self.bump();
    }

    fn bump(&self) {
        self.inner.appearance_revision.fetch_add(1, Ordering::AcqRel);
        self.inner.notify(StateChange::Appearance);
    }
}
