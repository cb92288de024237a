use crate::types::OrchestratedTask;
use std::collections::VecDeque;
use tracing::info;
use uuid::Uuid;

/// Holding area for undispatched tasks, ordered by priority.
///
/// Equal priorities keep insertion order, so the queue is a stable sort over
/// the five priority levels.
pub struct TaskQueue {
    tasks: VecDeque<OrchestratedTask>,
}

impl TaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
        }
    }

    /// Insert a task behind every task of equal or higher priority.
    /// Returns the position it landed at.
    pub fn enqueue(&mut self, task: OrchestratedTask) -> usize {
        let position = self
            .tasks
            .iter()
            .position(|queued| queued.priority > task.priority)
            .unwrap_or(self.tasks.len());

        info!(
            task_id = %task.id,
            priority = %task.priority,
            position,
            queue_size = self.tasks.len() + 1,
            "Task enqueued"
        );
        self.tasks.insert(position, task);
        position
    }

    /// Remove and return the first task, scanning from the head, for which
    /// `is_ready` holds. Tasks that are not ready keep their position.
    pub fn dequeue_ready<F>(&mut self, mut is_ready: F) -> Option<OrchestratedTask>
    where
        F: FnMut(&OrchestratedTask) -> bool,
    {
        let index = self.tasks.iter().position(|t| is_ready(t))?;
        self.tasks.remove(index)
    }

    /// Remove a task by id.
    pub fn remove(&mut self, id: Uuid) -> Option<OrchestratedTask> {
        let index = self.position(id)?;
        self.tasks.remove(index)
    }

    /// Zero-based dispatch position of a queued task.
    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Whether the task is still queued.
    pub fn contains(&self, id: Uuid) -> bool {
        self.position(id).is_some()
    }

    /// Queued tasks in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &OrchestratedTask> {
        self.tasks.iter()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
