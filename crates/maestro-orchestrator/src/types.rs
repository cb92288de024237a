use chrono::{DateTime, Utc};
use maestro_core::{Capability, MaestroError, MaestroResult, Outcome, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

/// Five-level task priority. Declaration order is urgency order, so
/// `Urgent < High < Normal < Low < Background` under `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Dispatched before everything else.
    Urgent,
    /// Ahead of normal work.
    High,
    /// The default.
    #[default]
    Normal,
    /// Behind normal work.
    Low,
    /// Only when nothing else is queued ahead of it.
    Background,
}

impl Priority {
    /// Integer priority forwarded to workers (10 = most urgent).
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Urgent => 10,
            Priority::High => 8,
            Priority::Normal => 5,
            Priority::Low => 3,
            Priority::Background => 1,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Urgent => "urgent",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urgent" => Ok(Priority::Urgent),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "background" => Ok(Priority::Background),
            other => Err(MaestroError::Configuration(format!(
                "Unknown priority: '{other}'"
            ))),
        }
    }
}

/// Status of an orchestrated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Queued or not yet dispatched.
    Pending,
    /// Held by a worker.
    Running,
    /// Finished with a successful outcome.
    Completed,
    /// Finished with a failed outcome.
    Failed,
    /// Withdrawn before it ran, or cancelled while running.
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed, or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Forward-only transitions: Pending → Running → terminal, plus
    /// Pending → Cancelled for tasks withdrawn from the queue.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Cancelled)
                | (TaskStatus::Running, TaskStatus::Completed)
                | (TaskStatus::Running, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A unit of work addressed to a capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratedTask {
    /// Unique task id.
    pub id: Uuid,
    /// Set when the task belongs to a workflow.
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    /// Free-form task type forwarded to the worker.
    pub task_type: String,
    /// Capability whose worker runs the task.
    pub capability: Capability,
    /// Input payload, opaque to the orchestrator.
    pub input: Payload,
    /// Shared context handed to the worker.
    #[serde(default)]
    pub context: Payload,
    /// Queue priority.
    #[serde(default)]
    pub priority: Priority,
    /// Informational deadline. Reported in queue status, never enforced.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    /// Tasks that must be satisfied before this one may run.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Tasks that depend on this one. Informational only.
    #[serde(default)]
    pub dependents: Vec<Uuid>,
    /// Current lifecycle state. Only moves forward.
    pub status: TaskStatus,
    /// Name of the worker that ran the task.
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task entered Running.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Retries consumed so far. Recorded only; nothing re-enqueues.
    #[serde(default)]
    pub retry_count: u32,
    /// Retry allowance. Recorded only.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Error of the failed outcome, if any.
    #[serde(default)]
    pub last_error: Option<String>,
    /// The worker outcome once the task finished.
    #[serde(default)]
    pub result: Option<Outcome>,
}

fn default_max_retries() -> u32 {
    3
}

impl OrchestratedTask {
    /// A Pending task with normal priority and no dependencies.
    pub fn new(capability: Capability, task_type: impl Into<String>, input: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id: None,
            task_type: task_type.into(),
            capability,
            input,
            context: Payload::new(),
            priority: Priority::Normal,
            deadline: None,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            status: TaskStatus::Pending,
            assigned_to: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: default_max_retries(),
            last_error: None,
            result: None,
        }
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the dependency list. A task never depends on itself, so its own id
    /// is dropped if present.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        let own = self.id;
        self.dependencies = deps.into_iter().filter(|d| *d != own).collect();
        self
    }

    /// Sets the shared context handed to the worker.
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = context;
        self
    }

    /// Sets the retry allowance.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets or clears the deadline.
    pub fn with_deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Move to `next`, stamping the matching timestamp.
    ///
    /// Rejects anything that is not a forward transition.
    pub fn transition(&mut self, next: TaskStatus) -> MaestroResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(MaestroError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        let now = Utc::now();
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                self.completed_at = Some(now);
            }
            TaskStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    /// Record the worker outcome and move to Completed or Failed.
    pub fn finish(&mut self, outcome: Outcome) -> MaestroResult<()> {
        let next = if outcome.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.transition(next)?;
        if !outcome.success {
            self.last_error = outcome.error.clone();
        }
        self.result = Some(outcome);
        Ok(())
    }
}

/// Status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Built but not started.
    Pending,
    /// Tasks are being dispatched.
    Running,
    /// Every task completed.
    Completed,
    /// At least one task failed or was skipped.
    Failed,
    /// Stopped on a cancellation request.
    Cancelled,
    /// Reserved; no operation currently pauses a workflow.
    Paused,
}

impl WorkflowStatus {
    /// Completed, Failed, or Cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
            WorkflowStatus::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// How the steps of a workflow are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Declared order, one task at a time.
    #[default]
    Sequential,
    /// Dependency levels in ascending order, each level concurrently.
    Parallel,
}

impl FromStr for ExecutionStrategy {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            other => Err(MaestroError::Configuration(format!(
                "Unknown execution strategy: '{other}'"
            ))),
        }
    }
}

/// What a workflow does when one of its tasks fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStrategy {
    /// Abort on the first failure.
    #[default]
    FailFast,
    /// Run every runnable task and enumerate failures.
    #[serde(rename = "continue", alias = "continue_on_error")]
    ContinueOnError,
}

impl FromStr for ErrorStrategy {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" => Ok(ErrorStrategy::FailFast),
            "continue" | "continue_on_error" => Ok(ErrorStrategy::ContinueOnError),
            other => Err(MaestroError::Configuration(format!(
                "Unknown error strategy: '{other}'"
            ))),
        }
    }
}

/// A named, ordered set of tasks executed under one strategy and error policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow id.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Tasks in declared order.
    pub tasks: Vec<OrchestratedTask>,
    /// Sequential or parallel.
    pub execution_strategy: ExecutionStrategy,
    /// FailFast or ContinueOnError.
    pub error_strategy: ErrorStrategy,
    /// Current lifecycle state.
    pub status: WorkflowStatus,
    /// Context handed to each task, accumulating successful context updates.
    pub shared_context: Payload,
    /// Outcome per executed task id.
    pub results: HashMap<Uuid, Outcome>,
    /// Ids of tasks whose outcome failed, in completion order.
    pub failed_tasks: Vec<Uuid>,
    /// Tasks never dispatched because a dependency was not satisfied.
    pub skipped_tasks: Vec<Uuid>,
    /// Reason of the first failure.
    pub error: Option<String>,
    /// When the workflow was built.
    pub created_at: DateTime<Utc>,
    /// When the workflow entered Running.
    pub started_at: Option<DateTime<Utc>>,
    /// Set only once the workflow is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    /// An empty Pending workflow with FailFast error handling.
    pub fn new(name: impl Into<String>, execution_strategy: ExecutionStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            execution_strategy,
            error_strategy: ErrorStrategy::FailFast,
            status: WorkflowStatus::Pending,
            shared_context: Payload::new(),
            results: HashMap::new(),
            failed_tasks: Vec::new(),
            skipped_tasks: Vec::new(),
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Sets the error strategy.
    pub fn with_error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_strategy = strategy;
        self
    }

    /// Append a task, claiming it for this workflow.
    pub fn add_task(&mut self, mut task: OrchestratedTask) -> Uuid {
        task.workflow_id = Some(self.id);
        let id = task.id;
        self.tasks.push(task);
        id
    }

    /// Enter Running. Only valid from Pending.
    pub fn start(&mut self) -> MaestroResult<()> {
        if self.status != WorkflowStatus::Pending {
            return Err(MaestroError::InvalidTransition {
                from: self.status.to_string(),
                to: WorkflowStatus::Running.to_string(),
            });
        }
        self.status = WorkflowStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Make the single terminal transition and stamp the completion time.
    pub fn finish(&mut self, status: WorkflowStatus) -> MaestroResult<()> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(MaestroError::InvalidTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Number of tasks that completed successfully.
    pub fn completed_count(&self) -> usize {
        self.results.values().filter(|o| o.success).count()
    }

    /// Compact view of the current state.
    pub fn summary(&self) -> WorkflowSummary {
        let execution_time = match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0)
            }
            _ => None,
        };
        WorkflowSummary {
            workflow_id: self.id,
            name: self.name.clone(),
            status: self.status,
            completed_tasks: self.completed_count(),
            failed_tasks: self.failed_tasks.len(),
            skipped_tasks: self.skipped_tasks.len(),
            total_tasks: self.tasks.len(),
            execution_time,
            error: self.error.clone(),
            completed_at: self.completed_at,
        }
    }
}

/// Compact report of a workflow's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow id.
    pub workflow_id: Uuid,
    /// Workflow name.
    pub name: String,
    /// Current status.
    pub status: WorkflowStatus,
    /// Tasks with a successful outcome.
    pub completed_tasks: usize,
    /// Tasks with a failed outcome.
    pub failed_tasks: usize,
    /// Tasks skipped for unmet dependencies.
    pub skipped_tasks: usize,
    /// Tasks in the workflow.
    pub total_tasks: usize,
    /// Seconds between start and terminal state.
    pub execution_time: Option<f64>,
    /// Reason of the first failure.
    pub error: Option<String>,
    /// Set once the workflow is terminal.
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Requests ---

/// Request to delegate one ad-hoc task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    /// Capability whose worker should run the task.
    pub capability: Capability,
    /// Task input. Its `"type"` entry names the task type.
    pub task_input: Payload,
    /// Queue priority.
    #[serde(default)]
    pub priority: Priority,
    /// Context handed to the worker.
    #[serde(default)]
    pub context: Payload,
    /// Ids of tasks that must not be active when this one is dispatched.
    #[serde(default)]
    pub dependencies: Vec<Uuid>,
    /// Retry allowance, recorded on the task.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Informational deadline, recorded on the task.
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

impl DelegationRequest {
    /// A normal-priority request with no dependencies.
    pub fn new(capability: Capability, task_input: Payload) -> Self {
        Self {
            capability,
            task_input,
            priority: Priority::Normal,
            context: Payload::new(),
            dependencies: Vec::new(),
            max_retries: default_max_retries(),
            deadline: None,
        }
    }

    /// Sets the queue priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the ad-hoc dependencies.
    pub fn with_dependencies(mut self, deps: Vec<Uuid>) -> Self {
        self.dependencies = deps;
        self
    }

    /// Sets the deadline.
    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Task type taken from the input's `"type"` (or `"task_type"`) entry.
    pub fn task_type(&self) -> String {
        self.task_input
            .get("type")
            .or_else(|| self.task_input.get("task_type"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("generic")
            .to_string()
    }

    pub(crate) fn into_task(self) -> OrchestratedTask {
        let task_type = self.task_type();
        OrchestratedTask::new(self.capability, task_type, self.task_input)
            .with_priority(self.priority)
            .with_context(self.context)
            .with_dependencies(self.dependencies)
            .with_max_retries(self.max_retries)
            .with_deadline(self.deadline)
    }
}

/// One step of a [`WorkflowDefinition`].
///
/// Capability and priority stay as strings so an unknown value surfaces as a
/// configuration error when the workflow is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Local key that other steps use in `dependencies`. Defaults to `task-<index>`.
    #[serde(default)]
    pub id: Option<String>,
    /// Task type forwarded to the worker.
    pub task_type: String,
    /// Capability name, parsed when the workflow is built.
    pub capability: String,
    /// Task input.
    #[serde(default)]
    pub input: Payload,
    /// Priority name. Defaults to normal.
    #[serde(default)]
    pub priority: Option<String>,
    /// Local keys of the steps this one waits on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl TaskDefinition {
    /// A step with an explicit local key.
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        capability: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            task_type: task_type.into(),
            capability: capability.into(),
            input: Payload::new(),
            priority: None,
            dependencies: Vec::new(),
        }
    }

    /// Sets the task input.
    pub fn with_input(mut self, input: Payload) -> Self {
        self.input = input;
        self
    }

    /// Adds a dependency on another step's local key.
    pub fn depends_on(mut self, key: impl Into<String>) -> Self {
        self.dependencies.push(key.into());
        self
    }
}

fn default_execution_strategy() -> String {
    "sequential".to_string()
}

fn default_error_strategy() -> String {
    "fail_fast".to_string()
}

/// Declarative description of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow name.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// `sequential` (default) or `parallel`.
    #[serde(default = "default_execution_strategy")]
    pub execution_strategy: String,
    /// `fail_fast` (default) or `continue_on_error`.
    #[serde(default = "default_error_strategy")]
    pub error_strategy: String,
    /// Initial shared context.
    #[serde(default)]
    pub shared_context: Payload,
    /// Steps in declared order.
    pub tasks: Vec<TaskDefinition>,
}

impl WorkflowDefinition {
    /// An empty definition with fail-fast error handling.
    pub fn new(name: impl Into<String>, execution_strategy: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            execution_strategy: execution_strategy.into(),
            error_strategy: default_error_strategy(),
            shared_context: Payload::new(),
            tasks: Vec::new(),
        }
    }

    /// Sets the error strategy name.
    pub fn with_error_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.error_strategy = strategy.into();
        self
    }

    /// Appends a step.
    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let mut ps = vec![Priority::Low, Priority::Urgent, Priority::Background, Priority::Normal, Priority::High];
        ps.sort();
        assert_eq!(
            ps,
            vec![Priority::Urgent, Priority::High, Priority::Normal, Priority::Low, Priority::Background]
        );
        assert_eq!(Priority::Urgent.weight(), 10);
        assert_eq!(Priority::Background.weight(), 1);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
        assert!(matches!(
            "asap".parse::<Priority>(),
            Err(MaestroError::Configuration(_))
        ));
    }

    #[test]
    fn test_task_transitions_are_forward_only() {
        let mut task = OrchestratedTask::new(Capability::Email, "triage", Payload::new());
        assert!(task.transition(TaskStatus::Completed).is_err());

        task.transition(TaskStatus::Running).unwrap();
        assert!(task.started_at.is_some());
        task.transition(TaskStatus::Completed).unwrap();
        assert!(task.completed_at.is_some());

        let err = task.transition(TaskStatus::Running).unwrap_err();
        assert!(matches!(err, MaestroError::InvalidTransition { .. }));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn test_queued_task_can_be_cancelled() {
        let mut task = OrchestratedTask::new(Capability::Email, "triage", Payload::new());
        task.transition(TaskStatus::Cancelled).unwrap();
        assert!(task.status.is_terminal());
        assert!(task.transition(TaskStatus::Running).is_err());
    }

    #[test]
    fn test_finish_records_error() {
        let mut task = OrchestratedTask::new(Capability::Content, "draft", Payload::new());
        task.transition(TaskStatus::Running).unwrap();
        task.finish(Outcome::failure("model timeout")).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.last_error.as_deref(), Some("model timeout"));
        assert!(task.result.is_some());
    }

    #[test]
    fn test_task_never_depends_on_itself() {
        let task = OrchestratedTask::new(Capability::Email, "x", Payload::new());
        let own = task.id;
        let other = Uuid::new_v4();
        let task = task.with_dependencies(vec![own, other]);
        assert_eq!(task.dependencies, vec![other]);
    }

    #[test]
    fn test_workflow_single_terminal_transition() {
        let mut wf = Workflow::new("wf", ExecutionStrategy::Sequential);
        assert!(wf.finish(WorkflowStatus::Completed).is_err());
        wf.start().unwrap();
        assert!(wf.start().is_err());
        assert!(wf.completed_at.is_none());
        wf.finish(WorkflowStatus::Completed).unwrap();
        assert!(wf.completed_at.is_some());
        assert!(wf.finish(WorkflowStatus::Failed).is_err());
        assert_eq!(wf.status, WorkflowStatus::Completed);
        assert!(wf.summary().execution_time.is_some());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Parallel".parse::<ExecutionStrategy>().unwrap(), ExecutionStrategy::Parallel);
        assert!("conditional".parse::<ExecutionStrategy>().is_err());
        assert_eq!("continue".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::ContinueOnError);
        assert_eq!("fail_fast".parse::<ErrorStrategy>().unwrap(), ErrorStrategy::FailFast);
        assert!("retry".parse::<ErrorStrategy>().is_err());
    }

    #[test]
    fn test_delegation_request_task_type() {
        let mut input = Payload::new();
        input.insert("type".into(), serde_json::json!("draft_reply"));
        let req = DelegationRequest::new(Capability::Email, input);
        assert_eq!(req.task_type(), "draft_reply");
        assert_eq!(DelegationRequest::new(Capability::Email, Payload::new()).task_type(), "generic");
    }

    #[test]
    fn test_delegation_request_deserialize_defaults() {
        let req: DelegationRequest = serde_json::from_value(serde_json::json!({
            "capability": "schedule",
            "task_input": {"type": "book"},
            "priority": "high"
        }))
        .unwrap();
        assert_eq!(req.capability, Capability::Schedule);
        assert_eq!(req.priority, Priority::High);
        assert_eq!(req.max_retries, 3);
        assert!(req.dependencies.is_empty());
    }

    #[test]
    fn test_delegation_request_carries_deadline() {
        let due = Utc::now() + chrono::Duration::minutes(30);
        let task = DelegationRequest::new(Capability::Schedule, Payload::new())
            .with_deadline(due)
            .into_task();
        assert_eq!(task.deadline, Some(due));

        let task = DelegationRequest::new(Capability::Schedule, Payload::new()).into_task();
        assert!(task.deadline.is_none());
    }

    #[test]
    fn test_workflow_definition_defaults() {
        let def: WorkflowDefinition = serde_json::from_value(serde_json::json!({
            "name": "onboard",
            "tasks": [{"task_type": "welcome", "capability": "email"}]
        }))
        .unwrap();
        assert_eq!(def.execution_strategy, "sequential");
        assert_eq!(def.error_strategy, "fail_fast");
        assert!(def.tasks[0].id.is_none());
    }
}
