use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

type TaskMap = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

/// A set of background tasks owned by a service.
///
/// Finished tasks drop out of the set on their own; `stop` aborts whatever is
/// still running.
#[derive(Default)]
pub struct TaskGroup {
    next_id: AtomicU64,
    tasks: TaskMap,
}

fn lock(tasks: &TaskMap) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked task and return its id
    pub fn spawn<F>(&self, future: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Hold the lock across spawn so a fast task cannot remove itself before it is inserted
        let mut guard = lock(&self.tasks);
        let handle = tokio::spawn(async move {
            future.await;
            lock(&tasks).remove(&id);
        });
        guard.insert(id, handle);
        tracing::trace!("Spawned task {id}");
        id
    }

    /// Number of tasks still running
    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort all running tasks and wait until they are gone
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = lock(&self.tasks).drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }
        tracing::debug!("Stopping {} background tasks", handles.len());
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            let _ = handle.await;
        }
    }
}
