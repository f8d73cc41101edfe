//! The owning task that serializes every mutation.
//!
//! All operations and clock ticks funnel through one mpsc channel into a
//! single task that owns the registry -- the exclusive-writer discipline
//! that rules out two operations racing on the same timer. Notification
//! scheduling is the one thing that leaves this task: `schedule` calls are
//! spawned, and their resolved handles re-enter the channel as
//! [`Command::NotificationReady`] to be committed under the epoch guard.
//! A refused handle is cancelled on the spot, so a pause or teardown that
//! raced a slow schedule call can never leak a phantom alert.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::EngineError;
use crate::events::Event;
use crate::notify::{AlertRequest, CompletionSignal, NotificationHandle, NotificationScheduler};
use crate::timer::driver::ClockDriver;
use crate::timer::registry::{ScheduleRequest, TimerRegistry, Transition};
use crate::timer::step::TimerView;

const EVENT_BUS_CAPACITY: usize = 256;

pub(crate) enum Command {
    Start {
        id: String,
        title: String,
        duration_secs: u64,
    },
    Pause {
        id: String,
    },
    Resume {
        id: String,
    },
    Adjust {
        id: String,
        delta_secs: i64,
    },
    Tick,
    NotificationReady {
        id: String,
        epoch: u64,
        handle: NotificationHandle,
    },
    Snapshot {
        reply: oneshot::Sender<BTreeMap<String, TimerView>>,
    },
    ActiveCount {
        reply: oneshot::Sender<usize>,
    },
    ClearAll {
        done: oneshot::Sender<usize>,
    },
}

/// Handle to the engine's owning task.
///
/// Cloneable; every clone talks to the same registry. Operations are
/// fire-and-forget, matching the UI layer's tap-and-move-on gestures;
/// queries round-trip through the task so they observe a consistent
/// snapshot. The owning task exits when the last handle is dropped.
#[derive(Clone)]
pub struct TimerService {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
}

impl TimerService {
    /// Spawn the owning task with the given collaborators.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, C>(scheduler: S, signal: C, config: Config) -> Self
    where
        S: NotificationScheduler,
        C: CompletionSignal,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let worker = Worker {
            registry: TimerRegistry::new(),
            driver: ClockDriver::new(
                Duration::from_millis(config.timer.tick_interval_ms),
                tx.downgrade(),
            ),
            scheduler: Arc::new(scheduler),
            signal,
            events: events.clone(),
            tx: tx.downgrade(),
            config,
        };
        tokio::spawn(worker.run(rx));
        Self { tx, events }
    }

    /// Start (or restart after a pause) the countdown for `id`.
    pub fn start(&self, id: &str, title: &str, duration_secs: u64) {
        self.send(Command::Start {
            id: id.to_string(),
            title: title.to_string(),
            duration_secs,
        });
    }

    pub fn pause(&self, id: &str) {
        self.send(Command::Pause { id: id.to_string() });
    }

    pub fn resume(&self, id: &str) {
        self.send(Command::Resume { id: id.to_string() });
    }

    /// Add (positive) or remove (negative) remaining seconds.
    pub fn adjust(&self, id: &str, delta_secs: i64) {
        self.send(Command::Adjust {
            id: id.to_string(),
            delta_secs,
        });
    }

    /// Cancel every outstanding alert, stop the clock and empty the
    /// registry. Resolves once the teardown has been applied; returns how
    /// many timers were dropped.
    pub async fn clear_all(&self) -> Result<usize, EngineError> {
        let (done, rx) = oneshot::channel();
        self.send(Command::ClearAll { done });
        rx.await.map_err(|_| EngineError::ServiceStopped)
    }

    /// Snapshot of every countdown, keyed by timer id.
    pub async fn snapshot(&self) -> Result<BTreeMap<String, TimerView>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply });
        rx.await.map_err(|_| EngineError::ServiceStopped)
    }

    /// Count of currently running countdowns.
    pub async fn active_count(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ActiveCount { reply });
        rx.await.map_err(|_| EngineError::ServiceStopped)
    }

    /// Subscribe to the engine's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("timer service task is gone; command dropped");
        }
    }
}

struct Worker<S: NotificationScheduler, C: CompletionSignal> {
    registry: TimerRegistry,
    driver: ClockDriver,
    scheduler: Arc<S>,
    signal: C,
    events: broadcast::Sender<Event>,
    /// Weak so in-flight schedule tasks never keep a dead service alive.
    tx: mpsc::WeakUnboundedSender<Command>,
    config: Config,
}

impl<S: NotificationScheduler, C: CompletionSignal> Worker<S, C> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            self.handle(command);
            self.sync_driver();
        }
        self.driver.stop();
        debug!("timer service task exiting");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start {
                id,
                title,
                duration_secs,
            } => match self.registry.start(&id, &title, duration_secs) {
                Some(transition) => {
                    info!(id = %id, duration_secs, "timer started");
                    self.execute(transition);
                }
                None => debug!(id = %id, "start ignored"),
            },
            Command::Pause { id } => match self.registry.pause(&id) {
                Some(transition) => {
                    info!(id = %id, "timer paused");
                    self.execute(transition);
                }
                None => debug!(id = %id, "pause ignored"),
            },
            Command::Resume { id } => match self.registry.resume(&id) {
                Some(transition) => {
                    info!(id = %id, "timer resumed");
                    self.execute(transition);
                }
                None => debug!(id = %id, "resume ignored"),
            },
            Command::Adjust { id, delta_secs } => match self.registry.adjust(&id, delta_secs) {
                Some(transition) => {
                    info!(id = %id, delta_secs, "timer adjusted");
                    self.execute(transition);
                }
                None => debug!(id = %id, "adjust ignored"),
            },
            Command::Tick => {
                for completion in self.registry.tick() {
                    info!(id = %completion.id, "timer completed");
                    self.signal.timer_completed(&completion.id, &completion.title);
                    self.publish(Event::TimerCompleted {
                        id: completion.id,
                        title: completion.title,
                        at: Utc::now(),
                    });
                }
            }
            Command::NotificationReady { id, epoch, handle } => {
                if !self.registry.commit_handle(&id, epoch, handle) {
                    debug!(id = %id, "refusing stale notification handle");
                    self.spawn_cancel(handle);
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
            Command::ActiveCount { reply } => {
                let _ = reply.send(self.registry.active_count());
            }
            Command::ClearAll { done } => {
                let outcome = self.registry.clear_all();
                info!(
                    cleared = outcome.cleared,
                    cancelled = outcome.cancel.len(),
                    "clearing all timers"
                );
                for handle in outcome.cancel {
                    self.spawn_cancel(handle);
                }
                self.publish(outcome.event);
                let _ = done.send(outcome.cleared);
            }
        }
    }

    /// Carry out the notification work a transition requires, then publish
    /// its event.
    fn execute(&mut self, transition: Transition) {
        if let Some(handle) = transition.cancel {
            self.spawn_cancel(handle);
        }
        if let Some(request) = transition.schedule {
            self.spawn_schedule(request);
        }
        self.publish(transition.event);
    }

    fn spawn_schedule(&self, request: ScheduleRequest) {
        if !self.config.notifications.enabled {
            debug!(id = %request.id, "notifications disabled; no background alert");
            return;
        }
        let ScheduleRequest {
            id,
            title,
            delay_secs,
            epoch,
        } = request;
        let alert = AlertRequest {
            message: self.config.notifications.render_message(&title),
            title,
            delay_secs,
        };
        let scheduler = Arc::clone(&self.scheduler);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            match scheduler.schedule(&alert).await {
                Ok(handle) => {
                    let committed = tx
                        .upgrade()
                        .is_some_and(|tx| tx.send(Command::NotificationReady { id, epoch, handle }).is_ok());
                    if !committed {
                        // Service gone before the handle could be offered
                        // back; the alert is orphaned.
                        scheduler.cancel(handle).await;
                    }
                }
                Err(err) => {
                    warn!(id = %id, error = %err, "background alert unavailable");
                }
            }
        });
    }

    fn spawn_cancel(&self, handle: NotificationHandle) {
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            scheduler.cancel(handle).await;
        });
    }

    fn publish(&self, event: Event) {
        // Failing to send only means nobody is subscribed right now.
        let _ = self.events.send(event);
    }

    /// Keep the clock driver's liveness in lockstep with the active count.
    fn sync_driver(&mut self) {
        if self.registry.active_count() > 0 {
            self.driver.ensure_running();
        } else {
            self.driver.stop();
        }
    }
}
