// Copyright 2026 Query Fan-out Engine Authors. Licensed under Apache-2.0.
// Async Task Manager (C9), per spec §4.6. Wraps a Batch Processor run as a
// cancellable task with progress snapshots and a retrievable result
// artifact. Built the way the teacher builds `LazyWorker`/`Scheduler`: a
// concurrent map from task id to `Arc<TaskHandle>`, with the running
// execution holding only a `Weak` back-reference for progress writes (spec
// §3 "Ownership").

pub mod store;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::batch::heartbeat::HeartbeatEvent;
use crate::batch::ProgressSink;
use crate::error::{EngineError, Result};
use crate::metrics::TASK_TERMINAL_METRICS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Status transitions are monotonic; only `Running -> Cancelled` is
    /// externally triggerable, per spec §3.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskProgress {
    pub elapsed: Duration,
    pub rows_so_far: u64,
    pub mem_pct: f64,
    pub shards_done: usize,
    pub total_shards: usize,
}

#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: String,
    pub task_type: String,
    pub status: TaskStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
    pub progress: TaskProgress,
    pub error_msg: Option<String>,
}

/// Holds the mutable task state. Indexed by `TaskManager`; the running
/// execution is given only a `Weak<TaskHandle>` so a manager-side cleanup
/// can drop the task without waiting on a still-running future.
pub struct TaskHandle {
    id: String,
    task_type: String,
    status: Mutex<TaskStatus>,
    created_at: SystemTime,
    started_at: Mutex<Option<SystemTime>>,
    finished_at: Mutex<Option<SystemTime>>,
    progress_rows: AtomicU64,
    progress: Mutex<TaskProgress>,
    error_msg: Mutex<Option<String>>,
    cancel: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new(id: String, task_type: String) -> Self {
        TaskHandle {
            id,
            task_type,
            status: Mutex::new(TaskStatus::Queued),
            created_at: SystemTime::now(),
            started_at: Mutex::new(None),
            finished_at: Mutex::new(None),
            progress_rows: AtomicU64::new(0),
            progress: Mutex::new(TaskProgress::default()),
            error_msg: Mutex::new(None),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn transition(&self, next: TaskStatus) -> bool {
        let mut status = self.status.lock();
        if !status.can_transition_to(next) {
            return false;
        }
        *status = next;
        match next {
            TaskStatus::Running => *self.started_at.lock() = Some(SystemTime::now()),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                *self.finished_at.lock() = Some(SystemTime::now());
                match next {
                    TaskStatus::Completed => TASK_TERMINAL_METRICS.completed.inc(),
                    TaskStatus::Failed => TASK_TERMINAL_METRICS.failed.inc(),
                    TaskStatus::Cancelled => TASK_TERMINAL_METRICS.cancelled.inc(),
                    _ => unreachable!(),
                }
            }
            _ => {}
        }
        true
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            task_type: self.task_type.clone(),
            status: *self.status.lock(),
            created_at: self.created_at,
            started_at: *self.started_at.lock(),
            finished_at: *self.finished_at.lock(),
            progress: self.progress.lock().clone(),
            error_msg: self.error_msg.lock().clone(),
        }
    }
}

impl ProgressSink for TaskHandle {
    fn on_heartbeat(&self, event: HeartbeatEvent) {
        self.progress_rows.store(event.rows_so_far, Ordering::Relaxed);
        *self.progress.lock() = TaskProgress {
            elapsed: event.elapsed,
            rows_so_far: event.rows_so_far,
            mem_pct: event.mem_pct,
            shards_done: event.shards_done,
            total_shards: event.total_shards,
        };
    }
}

/// A `Weak`-backed progress sink handed to a running execution, matching
/// §3's "weak reference from any running execution back to its Task".
pub struct WeakProgressSink(Weak<TaskHandle>);

impl ProgressSink for WeakProgressSink {
    fn on_heartbeat(&self, event: HeartbeatEvent) {
        if let Some(handle) = self.0.upgrade() {
            handle.on_heartbeat(event);
        }
    }
}

pub struct TaskManager {
    tasks: DashMap<String, Arc<TaskHandle>>,
    results: Arc<dyn store::ResultStore>,
}

impl TaskManager {
    pub fn new(results: Arc<dyn store::ResultStore>) -> Arc<Self> {
        Arc::new(TaskManager {
            tasks: DashMap::new(),
            results,
        })
    }

    /// Creates a task in `QUEUED` and returns its id and handle immediately;
    /// the caller is expected to drive the handle to `Running` and then a
    /// terminal status as the execution proceeds, per §4.6 `submit`.
    pub fn submit(&self, task_type: impl Into<String>) -> (String, Arc<TaskHandle>) {
        let id = Uuid::new_v4().to_string();
        let handle = Arc::new(TaskHandle::new(id.clone(), task_type.into()));
        self.tasks.insert(id.clone(), handle.clone());
        (id, handle)
    }

    pub fn mark_running(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).map(|h| h.transition(TaskStatus::Running)).unwrap_or(false)
    }

    pub fn mark_completed(&self, task_id: &str, artifact: Vec<u8>) -> bool {
        let Some(handle) = self.tasks.get(task_id) else { return false };
        self.results.put(task_id, artifact);
        handle.transition(TaskStatus::Completed)
    }

    pub fn mark_failed(&self, task_id: &str, error_msg: impl Into<String>) -> bool {
        let Some(handle) = self.tasks.get(task_id) else { return false };
        *handle.error_msg.lock() = Some(error_msg.into());
        handle.transition(TaskStatus::Failed)
    }

    pub fn mark_cancelled(&self, task_id: &str) -> bool {
        self.tasks.get(task_id).map(|h| h.transition(TaskStatus::Cancelled)).unwrap_or(false)
    }

    pub fn status(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.tasks
            .get(task_id)
            .map(|h| h.snapshot())
            .ok_or_else(|| EngineError::TaskNotFound { task_id: task_id.to_string() })
    }

    /// Valid only in `QUEUED|RUNNING`; signals cooperative cancellation,
    /// observed at the next shard boundary or batch flush, per §4.6.
    pub fn cancel(&self, task_id: &str) -> Result<()> {
        let handle = self
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::TaskNotFound { task_id: task_id.to_string() })?;
        let status = handle.snapshot().status;
        if status.is_terminal() {
            return Err(EngineError::NotCancellable);
        }
        handle.cancel.store(true, Ordering::Release);
        if status == TaskStatus::Queued {
            handle.transition(TaskStatus::Cancelled);
        }
        Ok(())
    }

    /// Valid only in `COMPLETED`; returns the serialized result artifact.
    pub fn fetch(&self, task_id: &str) -> Result<Vec<u8>> {
        let handle = self
            .tasks
            .get(task_id)
            .ok_or_else(|| EngineError::TaskNotFound { task_id: task_id.to_string() })?;
        if handle.snapshot().status != TaskStatus::Completed {
            return Err(EngineError::NotReady { task_id: task_id.to_string() });
        }
        self.results
            .get(task_id)
            .ok_or_else(|| EngineError::internal(format!("completed task {task_id} missing its artifact")))
    }

    /// Removes terminal tasks older than `age`, per §4.6 `cleanup`.
    pub fn cleanup(&self, age: Duration) -> usize {
        let now = SystemTime::now();
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|entry| {
                let snapshot = entry.value().snapshot();
                snapshot.status.is_terminal()
                    && snapshot
                        .finished_at
                        .map(|finished| now.duration_since(finished).unwrap_or_default() > age)
                        .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for task_id in &expired {
            self.tasks.remove(task_id);
            self.results.remove(task_id);
        }
        expired.len()
    }

    /// Hands a running execution a `Weak`-backed progress sink instead of a
    /// strong `Arc`, per §3's ownership rule.
    pub fn weak_progress_sink(handle: &Arc<TaskHandle>) -> Arc<dyn ProgressSink> {
        Arc::new(WeakProgressSink(Arc::downgrade(handle)))
    }
}
