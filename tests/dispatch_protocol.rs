//! End-to-end tests of the dispatch protocol against the in-memory store.
//!
//! Run with: cargo test --test dispatch_protocol

use async_trait::async_trait;
use futures::future::join_all;
use pg_dispatch::{
    Dispatcher, DispatcherConfig, MemoryTaskStore, NewTask, Result, Task, TaskClaim, TaskHandler,
    TaskId, TaskStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_test::assert_ok;

/// Records every execution, yielding mid-task so dispatchers interleave
#[derive(Default)]
struct RecordingHandler {
    runs: Mutex<HashMap<TaskId, usize>>,
}

impl RecordingHandler {
    fn snapshot(&self) -> HashMap<TaskId, usize> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: &Task) -> Result<()> {
        tokio::task::yield_now().await;
        *self.runs.lock().unwrap().entry(task.id).or_default() += 1;
        Ok(())
    }
}

fn config() -> DispatcherConfig {
    DispatcherConfig::builder()
        .reconciliation_interval(Duration::from_millis(200))
        .task_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn wait_until_drained(store: &MemoryTaskStore) {
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while store.count_pending().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "tasks were not drained in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_hand_out_the_same_task() {
    let store = MemoryTaskStore::new();
    for _ in 0..64 {
        assert_ok!(store.insert(&NewTask::new("task", "payload")).await);
    }

    // every claimant keeps its claims alive until the end
    let claimants = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut held: Vec<Box<dyn TaskClaim>> = Vec::new();
            while let Some(claim) = store.claim_one_pending().await.unwrap() {
                held.push(claim);
                tokio::task::yield_now().await;
            }
            held.iter().map(|claim| claim.task().id).collect::<Vec<_>>()
        })
    });

    let mut seen = HashSet::new();
    for ids in join_all(claimants).await {
        for id in ids.unwrap() {
            assert!(seen.insert(id), "task {id} was claimed twice");
        }
    }
    assert_eq!(seen.len(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_dispatchers_execute_each_task_once() {
    let store = MemoryTaskStore::new();
    let handler = Arc::new(RecordingHandler::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // backlog from before any dispatcher was up
    for _ in 0..20 {
        assert_ok!(store.insert(&NewTask::new("task", "payload")).await);
    }

    let dispatchers = (0..4).map(|_| {
        let dispatcher = Dispatcher::new(Arc::new(store.clone()), handler.clone(), config());
        let source = store.subscribe();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { dispatcher.run(source, shutdown).await })
    });
    let dispatchers: Vec<_> = dispatchers.collect();

    // every dispatcher receives every one of these notifications
    for _ in 0..100 {
        assert_ok!(store.insert(&NewTask::new("task", "payload")).await);
    }

    wait_until_drained(&store).await;
    shutdown_tx.send(true).unwrap();
    for result in join_all(dispatchers).await {
        assert_ok!(result);
    }

    let runs = handler.snapshot();
    assert_eq!(runs.len(), 120);
    assert!(runs.values().all(|&count| count == 1), "a task ran twice: {runs:?}");
    assert_eq!(store.locked_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tasks_are_executed_when_every_notification_is_lost() {
    let store = MemoryTaskStore::new();
    let handler = Arc::new(RecordingHandler::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(Arc::new(store.clone()), handler.clone(), config());
    // subscribed to a channel nothing publishes on
    let (_keep_open, rx) = tokio::sync::broadcast::channel(1);
    let source = pg_dispatch::MemoryNotificationSource::new(rx);
    let run = tokio::spawn(async move { dispatcher.run(source, shutdown_rx).await });

    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(store.insert(&NewTask::new("task", "payload")).await.unwrap());
    }

    wait_until_drained(&store).await;
    shutdown_tx.send(true).unwrap();
    assert_ok!(run.await);

    let runs = handler.snapshot();
    for id in ids {
        assert_eq!(runs.get(&id), Some(&1));
    }
}

#[tokio::test]
async fn inserted_task_round_trips_through_dispatch() {
    let store = MemoryTaskStore::new();
    let handler = Arc::new(RecordingHandler::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatcher = Dispatcher::new(Arc::new(store.clone()), handler.clone(), config());
    let source = store.subscribe();
    let run = tokio::spawn(async move { dispatcher.run(source, shutdown_rx).await });

    let id = store.insert(&NewTask::new("task", "payload")).await.unwrap();
    wait_until_drained(&store).await;

    let task = store.fetch(id).await.unwrap();
    assert_eq!(task.name, "task");
    assert_eq!(task.payload.as_deref(), Some("payload"));
    assert!(task.executed_at.is_some());
    assert!(task.executed_at.unwrap() >= task.created_at);
    assert_eq!(handler.snapshot().get(&id), Some(&1));

    shutdown_tx.send(true).unwrap();
    assert_ok!(run.await);
}
