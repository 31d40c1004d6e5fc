//! Keyed async work for one map mount
//!
//! Every task resolves to at most one action, sent back to the runtime's
//! loop. Tasks never touch map state directly.
//!
//! - Spawning under a key that is still running aborts the older task
//! - `debounce` delays the work and restarts the delay on each call
//! - `cancel_all` (unmount) aborts everything, so no action is delivered
//!
//! ```ignore
//! tasks.spawn(TaskKey::new("geocode-3"), async move {
//!     let result = lookup(geocoder.as_ref(), &query).await;
//!     MapAction::SearchDidResolve { generation, sequence: 3, result }
//! });
//!
//! tasks.debounce("url-write", Duration::from_millis(400), async move {
//!     MapAction::UrlWriteDue { generation, write_generation }
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::Action;

/// Identifies a task for replacement and cancellation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TaskKey(String);

impl TaskKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for TaskKey {
    fn from(s: &'static str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

pub struct TaskManager<A> {
    tasks: HashMap<TaskKey, AbortHandle>,
    action_tx: mpsc::UnboundedSender<A>,
}

impl<A> std::fmt::Debug for TaskManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("running", &self.tasks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<A> TaskManager<A>
where
    A: Action,
{
    pub fn new(action_tx: mpsc::UnboundedSender<A>) -> Self {
        Self {
            tasks: HashMap::new(),
            action_tx,
        }
    }

    /// Spawn `future` under `key`, aborting any task already holding it.
    ///
    /// The future may resolve to `A` or `Option<A>`; `None` and aborted
    /// tasks send nothing.
    pub fn spawn<F, R>(&mut self, key: impl Into<TaskKey>, future: F) -> &mut Self
    where
        F: Future<Output = R> + Send + 'static,
        R: Into<Option<A>> + Send + 'static,
    {
        let key = key.into();
        self.cancel(&key);
        self.prune();

        let tx = self.action_tx.clone();
        let handle = tokio::spawn(async move {
            if let Some(action) = future.await.into() {
                let _ = tx.send(action);
            }
        });

        self.tasks.insert(key, handle.abort_handle());
        self
    }

    /// Run `future` after `duration` of quiet on `key`.
    ///
    /// Calling again before the delay elapses aborts the pending task and
    /// restarts the delay.
    pub fn debounce<F, R>(
        &mut self,
        key: impl Into<TaskKey>,
        duration: Duration,
        future: F,
    ) -> &mut Self
    where
        F: Future<Output = R> + Send + 'static,
        R: Into<Option<A>> + Send + 'static,
    {
        self.spawn(key, async move {
            tokio::time::sleep(duration).await;
            future.await
        })
    }

    /// Abort the task under `key`, if any.
    pub fn cancel(&mut self, key: &TaskKey) {
        if let Some(handle) = self.tasks.remove(key) {
            handle.abort();
        }
    }

    /// Abort every task. Used on unmount.
    pub fn cancel_all(&mut self) {
        for (key, handle) in self.tasks.drain() {
            tracing::debug!(task = key.name(), "Aborting map task");
            handle.abort();
        }
    }

    /// Whether a task under `key` is still running.
    pub fn is_running(&self, key: &TaskKey) -> bool {
        self.tasks
            .get(key)
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn running_keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    // Finished tasks would otherwise accumulate for the mount's lifetime.
    fn prune(&mut self) {
        self.tasks.retain(|_, handle| !handle.is_finished());
    }
}

impl<A> Drop for TaskManager<A> {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}
