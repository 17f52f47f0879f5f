//! Scheduler thread: serialised execution of asynchronous tasks keyed by
//! name. Submitting under a name already pending (e.g. a second
//! `SetRate`) cancels and replaces the first, the way the retune task
//! (`"PrivateInstanceAAMP_Retune"`) coalesces repeated submissions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use pipeline_common::CancellationToken;
use tokio::task::JoinHandle;

struct Slot {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

/// A single-flight-per-name async task runner. Each named task gets its
/// own `CancellationToken`; resubmitting under the same name cancels the
/// previous instance and starts the new one fresh.
#[derive(Clone)]
pub struct Scheduler {
    root_token: CancellationToken,
    tasks: Arc<Mutex<HashMap<String, Slot>>>,
}

impl Scheduler {
    pub fn new(root_token: CancellationToken) -> Self {
        Self { root_token, tasks: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Submit `fut` under `name`, cancelling any task currently running
    /// under that name. `fut` receives a child token it should honour
    /// for early exit; the token is also cancelled automatically if the
    /// scheduler's root token fires.
    pub fn submit<F, Fut>(&self, name: impl Into<String>, fut: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let child = self.root_token.child_token();
        let handle = tokio::spawn(fut(child.clone()));
        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.insert(name, Slot { handle, token: child }) {
            previous.token.cancel();
            previous.handle.abort();
        }
    }

    /// Cancel and remove a named task. Idempotent: cancelling an unknown
    /// or already-finished name is a no-op.
    pub fn remove(&self, name: &str) {
        if let Some(slot) = self.tasks.lock().remove(name) {
            slot.token.cancel();
            slot.handle.abort();
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.tasks.lock().contains_key(name)
    }

    /// Cancel every pending task, e.g. on session `Stop`.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock();
        for (_, slot) in tasks.drain() {
            slot.token.cancel();
            slot.handle.abort();
        }
    }
}

/// The literal task name used for coalesced retune submissions, per the
/// retune-scheduling rule.
pub const RETUNE_TASK_NAME: &str = "PrivateInstanceAAMP_Retune";

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn resubmitting_same_name_cancels_previous() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let first_ran_to_completion = Arc::new(AtomicBool::new(false));
        let first_flag = first_ran_to_completion.clone();

        scheduler.submit("task", move |token| async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    first_flag.store(true, Ordering::SeqCst);
                }
            }
        });

        scheduler.submit("task", |_token| async move {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!first_ran_to_completion.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let scheduler = Scheduler::new(CancellationToken::new());
        scheduler.remove("nonexistent");
        scheduler.submit(RETUNE_TASK_NAME, |_token| async move {});
        tokio::time::sleep(Duration::from_millis(5)).await;
        scheduler.remove(RETUNE_TASK_NAME);
        scheduler.remove(RETUNE_TASK_NAME);
        assert!(!scheduler.is_pending(RETUNE_TASK_NAME));
    }

    #[tokio::test]
    async fn cancel_all_stops_every_pending_task() {
        let scheduler = Scheduler::new(CancellationToken::new());
        let counter = Arc::new(AtomicU32::new(0));
        for i in 0..3 {
            let c = counter.clone();
            scheduler.submit(format!("task-{i}"), move |token| async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {
                        c.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
        scheduler.cancel_all();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
