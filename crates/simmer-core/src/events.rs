use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every state change in the engine produces an Event.
/// The session/UI layer subscribes to the service's broadcast bus;
/// completion events additionally drive the haptic/sound trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        id: String,
        title: String,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        id: String,
        time_left_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        id: String,
        time_left_secs: u64,
        at: DateTime<Utc>,
    },
    /// An adjustment committed a new remaining time (and possibly a raised
    /// target, when the delta pushed remaining past the old total).
    TimerAdjusted {
        id: String,
        time_left_secs: u64,
        total_secs: u64,
        at: DateTime<Utc>,
    },
    /// A running timer reached zero on a tick. Emitted exactly once per
    /// completed countdown.
    TimerCompleted {
        id: String,
        title: String,
        at: DateTime<Utc>,
    },
    TimersCleared {
        count: usize,
        at: DateTime<Utc>,
    },
}
