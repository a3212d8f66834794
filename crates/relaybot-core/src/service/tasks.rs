use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TaskEntry {
    task_id: Uuid,
    user_input: String,
    started: Instant,
}

/// Background requests currently in flight, keyed by conversation id.
///
/// Used only for liveness reporting; a newer request for the same
/// conversation replaces the older entry.
#[derive(Debug, Default)]
pub struct InFlightTasks {
    tasks: DashMap<String, TaskEntry>,
}

/// Liveness classification of an in-flight task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Stuck,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub user_input: String,
    pub duration_seconds: f64,
    pub status: TaskStatus,
}

/// Removes its task entry when dropped, however the task ends.
#[must_use = "the task is unregistered as soon as the guard is dropped"]
pub struct TaskGuard {
    tasks: Arc<InFlightTasks>,
    conversation_id: String,
    task_id: Uuid,
}

impl TaskGuard {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let removed = self
            .tasks
            .tasks
            .remove_if(&self.conversation_id, |_, entry| entry.task_id == self.task_id);
        if removed.is_some() {
            debug!("Task {} for {} finished", self.task_id, self.conversation_id);
        }
    }
}

impl InFlightTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return the guard that unregisters it.
    pub fn start(self: &Arc<Self>, conversation_id: &str, user_input: &str) -> TaskGuard {
        let task_id = Uuid::new_v4();
        self.tasks.insert(
            conversation_id.to_string(),
            TaskEntry {
                task_id,
                user_input: user_input.to_string(),
                started: Instant::now(),
            },
        );
        debug!("Task {} for {} started", task_id, conversation_id);
        TaskGuard {
            tasks: Arc::clone(self),
            conversation_id: conversation_id.to_string(),
            task_id,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, conversation_id: &str) -> bool {
        self.tasks.contains_key(conversation_id)
    }

    /// Current tasks; those running for at least `stuck_after` are `Stuck`.
    pub fn snapshot(&self, stuck_after: Duration) -> BTreeMap<String, TaskInfo> {
        let now = Instant::now();
        self.tasks
            .iter()
            .map(|entry| {
                let elapsed = now.saturating_duration_since(entry.started);
                let info = TaskInfo {
                    user_input: entry.user_input.clone(),
                    duration_seconds: (elapsed.as_secs_f64() * 10.0).round() / 10.0,
                    status: if elapsed >= stuck_after {
                        TaskStatus::Stuck
                    } else {
                        TaskStatus::Running
                    },
                };
                (entry.key().clone(), info)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_removes_entry_on_drop() {
        let tasks = Arc::new(InFlightTasks::new());
        {
            let _guard = tasks.start("cid1", "weather?");
            assert!(tasks.contains("cid1"));
            assert_eq!(tasks.len(), 1);
        }
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_old_guard_keeps_newer_entry() {
        let tasks = Arc::new(InFlightTasks::new());
        let first = tasks.start("cid1", "first");
        let second = tasks.start("cid1", "second");
        assert_ne!(first.task_id(), second.task_id());

        drop(first);
        let snap = tasks.snapshot(Duration::from_secs(300));
        assert_eq!(snap["cid1"].user_input, "second");

        drop(second);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_guard_removed_on_panic() {
        let tasks = Arc::new(InFlightTasks::new());
        let t = tasks.clone();
        let result = std::thread::spawn(move || {
            let _guard = t.start("cid1", "boom");
            panic!("task failed");
        })
        .join();
        assert!(result.is_err());
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_snapshot_classifies_stuck() {
        let tasks = Arc::new(InFlightTasks::new());
        let _g = tasks.start("cid1", "slow");

        let snap = tasks.snapshot(Duration::from_secs(300));
        assert_eq!(snap["cid1"].status, TaskStatus::Running);
        assert!(snap["cid1"].duration_seconds < 300.0);

        let snap = tasks.snapshot(Duration::ZERO);
        assert_eq!(snap["cid1"].status, TaskStatus::Stuck);
    }

    #[test]
    fn test_task_info_serializes_lowercase_status() {
        let info = TaskInfo {
            user_input: "x".to_string(),
            duration_seconds: 1.5,
            status: TaskStatus::Stuck,
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["status"], "stuck");
        assert_eq!(v["duration_seconds"], 1.5);
    }
}
