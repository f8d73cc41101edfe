//! The keyed timer state machine.
//!
//! `TimerRegistry` owns the id -> [`StepTimer`] map and is the only place
//! countdown state changes. Operations mutate the map and return a
//! [`Transition`] describing the event to publish and the notification work
//! the caller must carry out; the registry itself performs no I/O, which is
//! what keeps it unit-testable without a notification stack behind it.
//!
//! ## Handle write-back discipline
//!
//! Scheduling a background alert is asynchronous, so by the time a handle
//! resolves the timer may have been paused, cleared, or restarted. Every
//! [`ScheduleRequest`] therefore carries the epoch stamp it was issued
//! under, and [`TimerRegistry::commit_handle`] refuses the write-back when
//! the stamp no longer matches. A refused handle names a live alert nobody
//! wants anymore; the caller must cancel it.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::events::Event;
use crate::notify::NotificationHandle;
use crate::timer::step::{StepTimer, TimerView};

/// A notification to schedule, tagged with the epoch it was issued under.
///
/// The handle that eventually resolves must be offered back through
/// [`TimerRegistry::commit_handle`] together with this epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub id: String,
    pub title: String,
    pub delay_secs: u64,
    pub epoch: u64,
}

/// The outcome of a state-changing operation: the event to publish plus the
/// notification side effects it requires.
#[derive(Debug)]
pub struct Transition {
    pub event: Event,
    /// A previously committed handle whose alert must be cancelled (best
    /// effort).
    pub cancel: Option<NotificationHandle>,
    /// A replacement alert to schedule.
    pub schedule: Option<ScheduleRequest>,
}

/// One countdown that reached zero on a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub title: String,
}

/// The result of tearing down the whole registry.
#[derive(Debug)]
pub struct ClearOutcome {
    pub cleared: usize,
    /// Outstanding handles whose alerts must be cancelled (best effort).
    pub cancel: Vec<NotificationHandle>,
    pub event: Event,
}

/// Keyed map of every countdown in the cooking session.
///
/// One instance per session, owned by the service task. All operations are
/// no-ops (returning `None`) when their preconditions do not hold; invalid
/// ids are ignored, never an error.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    timers: BTreeMap<String, StepTimer>,
    /// Mints epoch stamps. Global across timers so a cleared-and-recreated
    /// id can never collide with an in-flight schedule call issued for its
    /// predecessor.
    next_epoch: u64,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start the countdown for `id`, creating it on first use.
    ///
    /// A timer that is already running is left untouched: double-start must
    /// never double-schedule an alert. An existing entry keeps its remaining
    /// time (start after pause behaves like resume), and an entry already at
    /// zero is not silently restarted.
    pub fn start(&mut self, id: &str, title: &str, duration_secs: u64) -> Option<Transition> {
        match self.timers.get(id) {
            Some(existing) if existing.running => return None,
            Some(existing) if existing.time_left == 0 => return None,
            None if duration_secs == 0 => return None,
            _ => {}
        }
        let epoch = self.bump_epoch();
        let timer = self
            .timers
            .entry(id.to_string())
            .or_insert_with(|| StepTimer::new(title.to_string(), duration_secs));
        timer.title = title.to_string();
        timer.running = true;
        timer.epoch = epoch;
        Some(Transition {
            event: Event::TimerStarted {
                id: id.to_string(),
                title: timer.title.clone(),
                duration_secs: timer.time_left,
                at: Utc::now(),
            },
            cancel: None,
            schedule: Some(ScheduleRequest {
                id: id.to_string(),
                title: timer.title.clone(),
                delay_secs: timer.time_left,
                epoch,
            }),
        })
    }

    /// Pause a running countdown, preserving its remaining time.
    pub fn pause(&mut self, id: &str) -> Option<Transition> {
        if !self.timers.get(id).is_some_and(|t| t.running) {
            return None;
        }
        let epoch = self.bump_epoch();
        let timer = self.timers.get_mut(id)?;
        timer.running = false;
        timer.epoch = epoch;
        let cancel = timer.handle.take();
        Some(Transition {
            event: Event::TimerPaused {
                id: id.to_string(),
                time_left_secs: timer.time_left,
                at: Utc::now(),
            },
            cancel,
            schedule: None,
        })
    }

    /// Resume a paused countdown that still has time remaining.
    pub fn resume(&mut self, id: &str) -> Option<Transition> {
        if !self
            .timers
            .get(id)
            .is_some_and(|t| !t.running && t.time_left > 0)
        {
            return None;
        }
        let epoch = self.bump_epoch();
        let timer = self.timers.get_mut(id)?;
        timer.running = true;
        timer.epoch = epoch;
        Some(Transition {
            event: Event::TimerResumed {
                id: id.to_string(),
                time_left_secs: timer.time_left,
                at: Utc::now(),
            },
            cancel: None,
            schedule: Some(ScheduleRequest {
                id: id.to_string(),
                title: timer.title.clone(),
                delay_secs: timer.time_left,
                epoch,
            }),
        })
    }

    /// Add or remove remaining time.
    ///
    /// Negative deltas clamp at zero; a delta that pushes remaining time
    /// past the original target raises the target with it, so a progress
    /// ratio never exceeds 1. Zeroing a running timer does not complete it
    /// here -- the next tick performs the terminal transition, keeping
    /// completion in exactly one place.
    pub fn adjust(&mut self, id: &str, delta_secs: i64) -> Option<Transition> {
        if !self.timers.contains_key(id) {
            return None;
        }
        let epoch = self.bump_epoch();
        let timer = self.timers.get_mut(id)?;
        let new_left = if delta_secs >= 0 {
            timer.time_left.saturating_add(delta_secs as u64)
        } else {
            timer.time_left.saturating_sub(delta_secs.unsigned_abs())
        };
        let new_total = timer.total_secs.max(new_left);

        let mut cancel = None;
        let mut schedule = None;
        if timer.running {
            timer.epoch = epoch;
            cancel = timer.handle.take();
            if new_left > 0 {
                schedule = Some(ScheduleRequest {
                    id: id.to_string(),
                    title: timer.title.clone(),
                    delay_secs: new_left,
                    epoch,
                });
            }
        }
        timer.time_left = new_left;
        timer.total_secs = new_total;
        Some(Transition {
            event: Event::TimerAdjusted {
                id: id.to_string(),
                time_left_secs: new_left,
                total_secs: new_total,
                at: Utc::now(),
            },
            cancel,
            schedule,
        })
    }

    /// Apply one clock tick to every running countdown.
    ///
    /// A running timer parked at zero by an adjust completes here too. Spent
    /// handles are dropped without cancelling: the background alert firing
    /// at completion is what the schedule was for.
    pub fn tick(&mut self) -> Vec<Completion> {
        let mut completed = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            if !timer.running {
                continue;
            }
            timer.time_left = timer.time_left.saturating_sub(1);
            if timer.time_left == 0 {
                timer.running = false;
                timer.handle = None;
                completed.push(Completion {
                    id: id.clone(),
                    title: timer.title.clone(),
                });
            }
        }
        completed
    }

    /// Offer back the handle from a resolved schedule call.
    ///
    /// The handle is stored only if the timer still exists, is still
    /// running, and has been through no transition since the call was issued
    /// (epoch match). Returns `false` when the write-back is refused; the
    /// caller keeps ownership of the handle and must cancel it.
    pub fn commit_handle(&mut self, id: &str, epoch: u64, handle: NotificationHandle) -> bool {
        match self.timers.get_mut(id) {
            Some(timer) if timer.running && timer.epoch == epoch => {
                timer.handle = Some(handle);
                true
            }
            _ => false,
        }
    }

    /// Remove every countdown, handing back the outstanding handles so their
    /// alerts can be cancelled (best effort).
    pub fn clear_all(&mut self) -> ClearOutcome {
        let cleared = self.timers.len();
        let cancel = self
            .timers
            .values_mut()
            .filter_map(|t| t.handle.take())
            .collect();
        self.timers.clear();
        ClearOutcome {
            cleared,
            cancel,
            event: Event::TimersCleared {
                count: cleared,
                at: Utc::now(),
            },
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Count of currently running countdowns.
    pub fn active_count(&self) -> usize {
        self.timers.values().filter(|t| t.running).count()
    }

    pub fn view(&self, id: &str) -> Option<TimerView> {
        self.timers.get(id).map(StepTimer::view)
    }

    /// Snapshot of every countdown, keyed by timer id.
    pub fn snapshot(&self) -> BTreeMap<String, TimerView> {
        self.timers
            .iter()
            .map(|(id, timer)| (id.clone(), timer.view()))
            .collect()
    }

    /// Whether a background alert handle is currently committed for `id`.
    pub fn has_alert(&self, id: &str) -> bool {
        self.timers.get(id).is_some_and(|t| t.handle.is_some())
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(reg: &mut TimerRegistry, req: &ScheduleRequest) -> NotificationHandle {
        let handle = NotificationHandle::new();
        assert!(reg.commit_handle(&req.id, req.epoch, handle));
        handle
    }

    #[test]
    fn start_creates_running_timer_and_requests_alert() {
        let mut reg = TimerRegistry::new();
        let transition = reg.start("card-1", "Simmer", 180).unwrap();

        let req = transition.schedule.unwrap();
        assert_eq!(req.delay_secs, 180);
        assert_eq!(req.title, "Simmer");
        assert!(transition.cancel.is_none());

        let view = reg.view("card-1").unwrap();
        assert!(view.running);
        assert_eq!(view.time_left, 180);
        assert_eq!(view.total_secs, 180);
    }

    #[test]
    fn double_start_is_a_noop() {
        let mut reg = TimerRegistry::new();
        assert!(reg.start("card-1", "Simmer", 180).is_some());
        assert!(reg.start("card-1", "Simmer", 180).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn zero_duration_start_creates_nothing() {
        let mut reg = TimerRegistry::new();
        assert!(reg.start("card-1", "Simmer", 0).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn start_does_not_restart_an_expired_timer() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 1).unwrap();
        assert_eq!(reg.tick().len(), 1);

        assert!(reg.start("card-1", "Simmer", 180).is_none());
        assert_eq!(reg.view("card-1").unwrap().time_left, 0);
    }

    #[test]
    fn start_after_pause_keeps_remaining_time() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 180).unwrap();
        for _ in 0..60 {
            reg.tick();
        }
        reg.pause("card-1").unwrap();

        let transition = reg.start("card-1", "Simmer", 999).unwrap();
        assert_eq!(transition.schedule.unwrap().delay_secs, 120);
        let view = reg.view("card-1").unwrap();
        assert_eq!(view.time_left, 120);
        assert_eq!(view.total_secs, 180);
    }

    #[test]
    fn pause_freezes_time_and_returns_handle_for_cancellation() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 180).unwrap();
        let handle = commit(&mut reg, &started.schedule.unwrap());

        for _ in 0..60 {
            reg.tick();
        }
        let paused = reg.pause("card-1").unwrap();
        assert_eq!(paused.cancel, Some(handle));
        assert!(!reg.has_alert("card-1"));

        for _ in 0..10 {
            reg.tick();
        }
        let view = reg.view("card-1").unwrap();
        assert!(!view.running);
        assert_eq!(view.time_left, 120);
    }

    #[test]
    fn pause_on_missing_or_paused_timer_is_a_noop() {
        let mut reg = TimerRegistry::new();
        assert!(reg.pause("ghost").is_none());

        reg.start("card-1", "Simmer", 180).unwrap();
        reg.pause("card-1").unwrap();
        assert!(reg.pause("card-1").is_none());
    }

    #[test]
    fn resume_reschedules_for_remaining_time() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 180).unwrap();
        for _ in 0..60 {
            reg.tick();
        }
        reg.pause("card-1").unwrap();

        let resumed = reg.resume("card-1").unwrap();
        assert_eq!(resumed.schedule.unwrap().delay_secs, 120);
        assert!(reg.view("card-1").unwrap().running);
    }

    #[test]
    fn resume_requires_paused_with_time_left() {
        let mut reg = TimerRegistry::new();
        assert!(reg.resume("ghost").is_none());

        reg.start("card-1", "Simmer", 1).unwrap();
        assert!(reg.resume("card-1").is_none());

        reg.tick();
        assert!(reg.resume("card-1").is_none());
    }

    #[test]
    fn scenario_pause_resume_round_trip() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 180).unwrap();
        for _ in 0..60 {
            reg.tick();
        }
        assert_eq!(reg.view("card-1").unwrap().time_left, 120);

        reg.pause("card-1").unwrap();
        reg.resume("card-1").unwrap();

        let mut completions = 0;
        for _ in 0..120 {
            completions += reg.tick().len();
        }
        assert_eq!(completions, 1);
        let view = reg.view("card-1").unwrap();
        assert_eq!(view.time_left, 0);
        assert!(!view.running);
    }

    #[test]
    fn adjust_clamps_at_zero_and_cancels_without_replacement() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-2", "Boil", 60).unwrap();
        let handle = commit(&mut reg, &started.schedule.unwrap());

        let adjusted = reg.adjust("card-2", -100).unwrap();
        assert_eq!(adjusted.cancel, Some(handle));
        assert!(adjusted.schedule.is_none());
        assert_eq!(reg.view("card-2").unwrap().time_left, 0);

        // Terminal transition happens on the next tick, exactly once.
        assert_eq!(reg.tick().len(), 1);
        for _ in 0..5 {
            assert!(reg.tick().is_empty());
        }
        let view = reg.view("card-2").unwrap();
        assert_eq!(view.time_left, 0);
        assert!(!view.running);
    }

    #[test]
    fn adjust_swaps_exactly_one_notification_while_running() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 60).unwrap();
        let first = commit(&mut reg, &started.schedule.unwrap());

        let adjusted = reg.adjust("card-1", 30).unwrap();
        assert_eq!(adjusted.cancel, Some(first));
        let req = adjusted.schedule.unwrap();
        assert_eq!(req.delay_secs, 90);
        commit(&mut reg, &req);
    }

    #[test]
    fn adjust_raises_total_when_extended_past_it() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 60).unwrap();
        reg.adjust("card-1", 120).unwrap();

        let view = reg.view("card-1").unwrap();
        assert_eq!(view.time_left, 180);
        assert_eq!(view.total_secs, 180);
        assert!(view.progress() >= 0.0);
    }

    #[test]
    fn adjust_on_paused_timer_touches_no_notification() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 60).unwrap();
        reg.pause("card-1").unwrap();

        let adjusted = reg.adjust("card-1", -30).unwrap();
        assert!(adjusted.cancel.is_none());
        assert!(adjusted.schedule.is_none());
        assert_eq!(reg.view("card-1").unwrap().time_left, 30);
    }

    #[test]
    fn adjust_on_missing_id_is_a_noop() {
        let mut reg = TimerRegistry::new();
        assert!(reg.adjust("ghost", 30).is_none());
    }

    #[test]
    fn adjust_can_revive_a_timer_parked_at_zero() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 60).unwrap();
        reg.adjust("card-1", -60).unwrap();

        // Still running, parked at zero, waiting for the terminal tick.
        assert!(reg.view("card-1").unwrap().running);

        let revived = reg.adjust("card-1", 5).unwrap();
        assert_eq!(revived.schedule.unwrap().delay_secs, 5);

        let mut completions = 0;
        for _ in 0..10 {
            completions += reg.tick().len();
        }
        assert_eq!(completions, 1);
    }

    #[test]
    fn stale_handle_is_refused_after_pause() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 180).unwrap();
        let req = started.schedule.unwrap();
        reg.pause("card-1").unwrap();

        assert!(!reg.commit_handle(&req.id, req.epoch, NotificationHandle::new()));
        assert!(!reg.has_alert("card-1"));
    }

    #[test]
    fn stale_handle_is_refused_after_clear_and_restart() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 180).unwrap();
        let old_req = started.schedule.unwrap();

        reg.clear_all();
        reg.start("card-1", "Simmer", 180).unwrap();

        assert!(!reg.commit_handle(&old_req.id, old_req.epoch, NotificationHandle::new()));
        assert!(!reg.has_alert("card-1"));
    }

    #[test]
    fn stale_handle_is_refused_after_completion() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 1).unwrap();
        let req = started.schedule.unwrap();
        reg.tick();

        assert!(!reg.commit_handle(&req.id, req.epoch, NotificationHandle::new()));
    }

    #[test]
    fn current_handle_is_accepted() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 180).unwrap();
        commit(&mut reg, &started.schedule.unwrap());
        assert!(reg.has_alert("card-1"));
    }

    #[test]
    fn completion_fires_exactly_once() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 2).unwrap();

        assert!(reg.tick().is_empty());
        let completed = reg.tick();
        assert_eq!(
            completed,
            vec![Completion {
                id: "card-1".into(),
                title: "Simmer".into(),
            }]
        );
        assert!(reg.tick().is_empty());
    }

    #[test]
    fn completion_drops_handle_without_cancel() {
        let mut reg = TimerRegistry::new();
        let started = reg.start("card-1", "Simmer", 1).unwrap();
        commit(&mut reg, &started.schedule.unwrap());

        reg.tick();
        assert!(!reg.has_alert("card-1"));
    }

    #[test]
    fn scenario_staggered_completion() {
        let mut reg = TimerRegistry::new();
        reg.start("a", "Sear", 30).unwrap();
        reg.start("b", "Rest", 45).unwrap();

        let mut completions = Vec::new();
        for _ in 0..30 {
            completions.extend(reg.tick());
        }
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].id, "a");

        let b = reg.view("b").unwrap();
        assert!(b.running);
        assert_eq!(b.time_left, 15);
        assert_eq!(reg.active_count(), 1);
    }

    #[test]
    fn active_count_matches_scan_after_every_operation() {
        let mut reg = TimerRegistry::new();
        reg.start("a", "Sear", 30).unwrap();
        reg.start("b", "Rest", 45).unwrap();
        reg.pause("a").unwrap();

        let scan = |reg: &TimerRegistry| {
            reg.snapshot().values().filter(|view| view.running).count()
        };
        assert_eq!(reg.active_count(), scan(&reg));

        reg.resume("a").unwrap();
        assert_eq!(reg.active_count(), scan(&reg));

        for _ in 0..45 {
            reg.tick();
        }
        assert_eq!(reg.active_count(), 0);
        assert_eq!(scan(&reg), 0);
    }

    #[test]
    fn clear_all_returns_every_outstanding_handle() {
        let mut reg = TimerRegistry::new();
        let a = reg.start("a", "Sear", 30).unwrap();
        let b = reg.start("b", "Rest", 45).unwrap();
        let ha = commit(&mut reg, &a.schedule.unwrap());
        let hb = commit(&mut reg, &b.schedule.unwrap());

        let outcome = reg.clear_all();
        assert_eq!(outcome.cleared, 2);
        assert_eq!(outcome.cancel.len(), 2);
        assert!(outcome.cancel.contains(&ha));
        assert!(outcome.cancel.contains(&hb));
        assert!(reg.is_empty());
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn completed_timer_stays_queryable_until_cleared() {
        let mut reg = TimerRegistry::new();
        reg.start("card-1", "Simmer", 1).unwrap();
        reg.tick();

        let view = reg.view("card-1").unwrap();
        assert!(!view.running);
        assert_eq!(view.time_left, 0);

        reg.clear_all();
        assert!(reg.view("card-1").is_none());
    }
}
