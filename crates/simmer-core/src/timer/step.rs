use serde::{Deserialize, Serialize};

use crate::notify::NotificationHandle;

/// One recipe step's countdown state.
///
/// Owned exclusively by the registry; external readers only ever see a
/// [`TimerView`] copied out of it.
#[derive(Debug, Clone)]
pub struct StepTimer {
    pub title: String,
    /// Target duration in seconds. Never shrinks below `time_left`; an
    /// adjustment past the original duration raises it instead.
    pub total_secs: u64,
    /// Seconds remaining.
    pub time_left: u64,
    /// Whether the shared clock is advancing this timer. Running implies
    /// `time_left > 0`, except for at most one tick cycle after an adjust
    /// lands a running timer on zero -- the next tick performs the terminal
    /// transition.
    pub running: bool,
    /// Pending background alert committed for this countdown, if any.
    pub(crate) handle: Option<NotificationHandle>,
    /// Generation stamp, bumped on every identity-relevant transition. An
    /// asynchronously resolved notification handle is committed only if the
    /// stamp still matches the one its schedule call was issued under.
    pub(crate) epoch: u64,
}

impl StepTimer {
    pub(crate) fn new(title: String, duration_secs: u64) -> Self {
        Self {
            title,
            total_secs: duration_secs,
            time_left: duration_secs,
            running: false,
            handle: None,
            epoch: 0,
        }
    }

    pub fn view(&self) -> TimerView {
        TimerView {
            title: self.title.clone(),
            total_secs: self.total_secs,
            time_left: self.time_left,
            running: self.running,
        }
    }
}

/// Read-only snapshot of one countdown, for countdown displays and progress
/// rings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerView {
    pub title: String,
    pub total_secs: u64,
    pub time_left: u64,
    pub running: bool,
}

impl TimerView {
    /// 0.0 .. 1.0 progress toward the (possibly adjusted) target.
    pub fn progress(&self) -> f64 {
        if self.total_secs == 0 {
            return 0.0;
        }
        1.0 - (self.time_left as f64 / self.total_secs as f64)
    }
}
