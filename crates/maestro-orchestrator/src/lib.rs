//! Task dispatching and workflow orchestration across capability workers.
//!
//! Ad-hoc tasks go through a stable priority queue and are drained under a
//! concurrency cap. Workflows run their tasks directly, either one by one or
//! level by level over the dependency graph.
//!
//! # Main types
//!
//! - [`Orchestrator`]: the dispatcher (delegate, execute_workflow, monitor, cancel).
//! - [`TaskQueue`]: priority queue of pending ad-hoc tasks.
//! - [`DependencyResolver`]: readiness checks, cycle detection, and leveling.
//! - [`MetricsTracker`]: per-capability rolling metrics.
//! - [`WorkflowEngine`]: sequential and parallel workflow execution.
//! - [`MaintenanceHandle`]: periodic maintenance ticker.

/// Orchestrator configuration.
pub mod config;
/// The dispatcher and its response types.
pub mod engine;
/// Periodic maintenance loop.
pub mod maintenance;
/// Per-capability metrics.
pub mod monitor;
/// Dependency readiness and topological leveling.
pub mod resolver;
/// Priority task queue.
pub mod task_queue;
/// Shared orchestration types (tasks, workflows, priorities, definitions).
pub mod types;
/// Workflow construction and execution strategies.
pub mod workflow;

pub use config::OrchestratorConfig;
pub use engine::{
    ActiveTaskInfo, CancelResponse, CancelStatus, DelegationHandle, HealthReport,
    MonitorSnapshot, Orchestrator, OrchestratorReport, OrchestratorStats, QueueStatus,
    QueuedTaskInfo,
};
pub use maintenance::MaintenanceHandle;
pub use monitor::{AgentMetrics, CapabilityMetrics, MetricsTracker};
pub use resolver::DependencyResolver;
pub use task_queue::TaskQueue;
pub use types::{
    DelegationRequest, ErrorStrategy, ExecutionStrategy, OrchestratedTask, Priority,
    TaskDefinition, TaskStatus, Workflow, WorkflowDefinition, WorkflowStatus, WorkflowSummary,
};
pub use workflow::{build_workflow, TaskExecutor, WorkflowEngine};
