//! Collaborator boundary for background alerts and completion signals.
//!
//! The engine never talks to a platform notification stack directly. It is
//! handed a [`NotificationScheduler`] and a [`CompletionSignal`] at
//! construction and works against those, so the whole timer core runs (and
//! tests) without a notification permission stack behind it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::NotifyError;

/// Opaque token correlating a scheduled background alert with the timer that
/// requested it. Used to cancel that specific alert later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationHandle(Uuid);

impl NotificationHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NotificationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A request for one fire-once background alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub title: String,
    pub message: String,
    pub delay_secs: u64,
}

/// Schedules and cancels fire-once background alerts.
///
/// `schedule` resolving to `Err` means "no background alert": the engine
/// logs it and the countdown proceeds unaffected. Implementations must not
/// panic. `cancel` is best effort; failures are swallowed inside the
/// implementation, never surfaced.
pub trait NotificationScheduler: Send + Sync + 'static {
    fn schedule(
        &self,
        req: &AlertRequest,
    ) -> impl Future<Output = Result<NotificationHandle, NotifyError>> + Send;

    fn cancel(&self, handle: NotificationHandle) -> impl Future<Output = ()> + Send;
}

/// Fire-and-forget completion trigger.
///
/// The single point where haptics/sound/"step done" UI state hang off the
/// engine. Called from the owning task; implementations should return
/// quickly.
pub trait CompletionSignal: Send + Sync + 'static {
    fn timer_completed(&self, id: &str, title: &str);
}

/// Degrade path: behaves as if notification permission was never granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScheduler;

impl NotificationScheduler for NullScheduler {
    async fn schedule(&self, _req: &AlertRequest) -> Result<NotificationHandle, NotifyError> {
        Err(NotifyError::PermissionDenied)
    }

    async fn cancel(&self, _handle: NotificationHandle) {}
}

/// No-op completion signal for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSignal;

impl CompletionSignal for NullSignal {
    fn timer_completed(&self, _id: &str, _title: &str) {}
}

/// An alert delivered by [`LocalScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredAlert {
    pub title: String,
    pub message: String,
}

/// In-process scheduler for hosts without a platform notification stack.
///
/// Each scheduled alert is a sleep task that delivers on the channel handed
/// to [`LocalScheduler::new`] when its delay elapses; cancelling aborts the
/// pending task. Delivery runs on the tokio clock independently of the
/// engine's tick stream, the same shape as a platform alert outliving a
/// backgrounded UI.
pub struct LocalScheduler {
    deliver_tx: mpsc::UnboundedSender<DeliveredAlert>,
    pending: Arc<Mutex<HashMap<NotificationHandle, JoinHandle<()>>>>,
}

impl LocalScheduler {
    pub fn new(deliver_tx: mpsc::UnboundedSender<DeliveredAlert>) -> Self {
        Self {
            deliver_tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of alerts scheduled but not yet delivered or cancelled.
    pub fn pending_count(&self) -> usize {
        let mut pending = lock(&self.pending);
        pending.retain(|_, task| !task.is_finished());
        pending.len()
    }
}

fn lock<'a>(
    pending: &'a Arc<Mutex<HashMap<NotificationHandle, JoinHandle<()>>>>,
) -> MutexGuard<'a, HashMap<NotificationHandle, JoinHandle<()>>> {
    // A poisoned lock only means a delivery task panicked mid-insert; the
    // map itself is still usable.
    pending.lock().unwrap_or_else(|e| e.into_inner())
}

impl NotificationScheduler for LocalScheduler {
    async fn schedule(&self, req: &AlertRequest) -> Result<NotificationHandle, NotifyError> {
        if self.deliver_tx.is_closed() {
            return Err(NotifyError::Scheduling("alert channel closed".into()));
        }
        let handle = NotificationHandle::new();
        let alert = DeliveredAlert {
            title: req.title.clone(),
            message: req.message.clone(),
        };
        let delay = Duration::from_secs(req.delay_secs);
        let tx = self.deliver_tx.clone();
        let pending = Arc::clone(&self.pending);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(alert);
            lock(&pending).remove(&handle);
        });
        lock(&self.pending).insert(handle, task);
        Ok(handle)
    }

    async fn cancel(&self, handle: NotificationHandle) {
        if let Some(task) = lock(&self.pending).remove(&handle) {
            task.abort();
        }
    }
}
