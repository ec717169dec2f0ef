//! In-memory task store
//!
//! Mirrors the PostgreSQL semantics closely enough for the dispatch protocol:
//! monotonically assigned ids, a notification fired after every successful
//! insert, and a non-blocking lock set standing in for `FOR UPDATE SKIP
//! LOCKED`. The state mutex is never held across an `.await`.

use crate::db::models::{NewTask, Task, TaskId};
use crate::db::schema::TASKS_CHANNEL;
use crate::error::{DispatchError, Result};
use crate::notify::{MemoryNotificationSource, Notification};
use crate::store::{TaskClaim, TaskStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Default number of notifications buffered per subscriber before it lags
const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

struct MemoryState {
    /// All rows, ordered by id.
    rows: BTreeMap<TaskId, Task>,

    /// Rows currently held by a live claim.
    locked: HashSet<TaskId>,

    next_id: i32,
}

impl MemoryState {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            locked: HashSet::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn is_claimable(&self, task: &Task) -> bool {
        task.is_pending() && !self.locked.contains(&task.id)
    }

    /// Lock and return a copy of the row
    fn lock_row(&mut self, task_id: TaskId) -> Option<Task> {
        let task = self.rows.get(&task_id)?.clone();
        self.locked.insert(task_id);
        Some(task)
    }

    fn mark_executed(&mut self, task_id: TaskId) -> Result<()> {
        let task = self
            .rows
            .get_mut(&task_id)
            .ok_or(DispatchError::TaskNotFound(task_id))?;
        if task.executed_at.is_none() {
            task.executed_at = Some(Utc::now());
        }
        Ok(())
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory `TaskStore`
#[derive(Clone)]
pub struct MemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
    notify_tx: broadcast::Sender<Notification>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::with_notification_capacity(DEFAULT_NOTIFICATION_CAPACITY)
    }

    /// Subscribers that fall more than `capacity` events behind miss events
    /// and observe a gap instead.
    pub fn with_notification_capacity(capacity: usize) -> Self {
        let (notify_tx, _) = broadcast::channel(capacity);
        Self {
            state: Arc::new(Mutex::new(MemoryState::new())),
            notify_tx,
        }
    }

    /// Start listening for insert notifications.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(&self) -> MemoryNotificationSource {
        MemoryNotificationSource::new(self.notify_tx.subscribe())
    }

    /// Publish an arbitrary payload on the tasks channel, like a manual
    /// `SELECT pg_notify('tasks_inserted', ...)`.
    pub fn publish(&self, payload: impl Into<String>) {
        // No subscribers means the event is lost, same as NOTIFY.
        let _ = self.notify_tx.send(Notification::new(TASKS_CHANNEL, payload));
    }

    /// Snapshot of every row, ordered by id
    pub fn all_tasks(&self) -> Vec<Task> {
        lock(&self.state).rows.values().cloned().collect()
    }

    /// Number of rows currently locked by live claims
    pub fn locked_count(&self) -> usize {
        lock(&self.state).locked.len()
    }

    fn claim_locked(&self, task: Task) -> Box<dyn TaskClaim> {
        Box::new(MemoryClaim {
            task,
            state: Arc::clone(&self.state),
        })
    }
}

impl Default for MemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &NewTask) -> Result<TaskId> {
        let id = {
            let mut state = lock(&self.state);
            let id = state.allocate_id();
            state.rows.insert(
                id,
                Task {
                    id,
                    name: task.name.clone(),
                    payload: task.payload.clone(),
                    created_at: Utc::now(),
                    executed_at: None,
                },
            );
            id
        };

        // Fire only after the row is stored.
        self.publish(id.to_string());
        Ok(id)
    }

    async fn claim_pending_excluding(
        &self,
        exclude: &[TaskId],
    ) -> Result<Option<Box<dyn TaskClaim>>> {
        let mut state = lock(&self.state);
        let next = state
            .rows
            .values()
            .find(|task| state.is_claimable(task) && !exclude.contains(&task.id))
            .map(|task| task.id);

        Ok(next
            .and_then(|id| state.lock_row(id))
            .map(|task| self.claim_locked(task)))
    }

    async fn claim_by_id(&self, task_id: TaskId) -> Result<Option<Box<dyn TaskClaim>>> {
        let mut state = lock(&self.state);
        let claimable = state
            .rows
            .get(&task_id)
            .is_some_and(|task| state.is_claimable(task));
        if !claimable {
            return Ok(None);
        }

        Ok(state.lock_row(task_id).map(|task| self.claim_locked(task)))
    }

    async fn fetch(&self, task_id: TaskId) -> Result<Task> {
        lock(&self.state)
            .rows
            .get(&task_id)
            .cloned()
            .ok_or(DispatchError::TaskNotFound(task_id))
    }

    async fn mark_executed(&self, task_id: TaskId) -> Result<()> {
        lock(&self.state).mark_executed(task_id)
    }

    async fn count_pending(&self) -> Result<i64> {
        let state = lock(&self.state);
        Ok(state.rows.values().filter(|task| task.is_pending()).count() as i64)
    }
}

/// Claim over a row in the lock set; released on complete or drop.
struct MemoryClaim {
    task: Task,
    state: Arc<Mutex<MemoryState>>,
}

#[async_trait]
impl TaskClaim for MemoryClaim {
    fn task(&self) -> &Task {
        &self.task
    }

    async fn complete(self: Box<Self>) -> Result<()> {
        // The lock itself is released by Drop.
        lock(&self.state).mark_executed(self.task.id)
    }

    async fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        lock(&self.state).locked.remove(&self.task.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationSource, Signal};

    fn sample() -> NewTask {
        NewTask::new("task", "payload")
    }

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryTaskStore::new();
        let first = store.insert(&sample()).await.unwrap();
        let second = store.insert(&sample()).await.unwrap();
        assert!(first < second);
        assert_eq!(store.count_pending().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_insert_notifies_subscribers_with_id() {
        let store = MemoryTaskStore::new();
        let mut source = store.subscribe();
        let id = store.insert(&sample()).await.unwrap();

        match source.next_signal().await.unwrap() {
            Some(Signal::Notified(notification)) => {
                assert_eq!(notification.channel, TASKS_CHANNEL);
                assert_eq!(notification.task_id().unwrap(), id);
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_claim_skips_locked_rows() {
        let store = MemoryTaskStore::new();
        let a = store.insert(&sample()).await.unwrap();
        let b = store.insert(&sample()).await.unwrap();

        let first = store.claim_one_pending().await.unwrap().unwrap();
        let second = store.claim_one_pending().await.unwrap().unwrap();
        assert_eq!(first.task().id, a);
        assert_eq!(second.task().id, b);
        assert!(store.claim_one_pending().await.unwrap().is_none());
        assert!(store.claim_by_id(a).await.unwrap().is_none());
        assert_eq!(store.locked_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_claim_leaves_task_pending() {
        let store = MemoryTaskStore::new();
        let id = store.insert(&sample()).await.unwrap();

        let claim = store.claim_one_pending().await.unwrap().unwrap();
        drop(claim);
        assert_eq!(store.locked_count(), 0);

        let claim = store.claim_one_pending().await.unwrap().unwrap();
        claim.release().await.unwrap();
        assert_eq!(store.locked_count(), 0);
        assert!(store.fetch(id).await.unwrap().is_pending());
        let again = store.claim_one_pending().await.unwrap().unwrap();
        assert_eq!(again.task().id, id);
    }

    #[tokio::test]
    async fn test_complete_marks_executed_and_unlocks() {
        let store = MemoryTaskStore::new();
        let id = store.insert(&sample()).await.unwrap();

        let claim = store.claim_by_id(id).await.unwrap().unwrap();
        claim.complete().await.unwrap();

        assert_eq!(store.locked_count(), 0);
        assert!(!store.fetch(id).await.unwrap().is_pending());
        assert!(store.claim_by_id(id).await.unwrap().is_none());
        assert!(store.claim_one_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_excluding_skips_listed_ids() {
        let store = MemoryTaskStore::new();
        let a = store.insert(&sample()).await.unwrap();
        let b = store.insert(&sample()).await.unwrap();

        let claim = store.claim_pending_excluding(&[a]).await.unwrap().unwrap();
        assert_eq!(claim.task().id, b);
        drop(claim);
        assert!(store.claim_pending_excluding(&[a, b]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_store_claims_nothing() {
        let store = MemoryTaskStore::new();
        assert!(store.claim_one_pending().await.unwrap().is_none());
        assert!(store.claim_by_id(TaskId::new(7)).await.unwrap().is_none());
        assert_eq!(store.locked_count(), 0);
        assert!(store.all_tasks().is_empty());
    }

    #[tokio::test]
    async fn test_mark_executed_keeps_first_timestamp() {
        let store = MemoryTaskStore::new();
        let id = store.insert(&sample()).await.unwrap();

        store.mark_executed(id).await.unwrap();
        let first = store.fetch(id).await.unwrap().executed_at;
        store.mark_executed(id).await.unwrap();
        let second = store.fetch(id).await.unwrap().executed_at;

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_mark_executed_missing_task() {
        let store = MemoryTaskStore::new();
        let err = store.mark_executed(TaskId::new(404)).await.unwrap_err();
        assert!(matches!(err, DispatchError::TaskNotFound(_)));
    }

    #[tokio::test]
    async fn test_fetch_missing_task() {
        let store = MemoryTaskStore::new();
        let err = store.fetch(TaskId::new(404)).await.unwrap_err();
        assert!(matches!(err, DispatchError::TaskNotFound(id) if id == TaskId::new(404)));
    }
}
