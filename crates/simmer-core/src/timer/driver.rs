//! The shared tick source.
//!
//! One interval task serves every running countdown. The service starts it
//! when an operation leaves at least one timer running and stops it the
//! moment none remains, so the process does not wake on an empty schedule.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::service::Command;

pub(crate) struct ClockDriver {
    period: Duration,
    tick_tx: mpsc::WeakUnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl ClockDriver {
    pub(crate) fn new(period: Duration, tick_tx: mpsc::WeakUnboundedSender<Command>) -> Self {
        Self {
            period,
            tick_tx,
            task: None,
        }
    }

    /// Start the interval task unless it is already alive.
    pub(crate) fn ensure_running(&mut self) {
        if self.is_running() {
            return;
        }
        let period = self.period;
        let tx = self.tick_tx.clone();
        debug!(period_ms = period.as_millis() as u64, "clock driver starting");
        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately; a
            // timer must run a full period before losing its first second.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(tx) = tx.upgrade() else { break };
                if tx.send(Command::Tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Abort the interval task and release its timer resource.
    pub(crate) fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("clock driver stopped");
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}
