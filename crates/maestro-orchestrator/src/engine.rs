use crate::config::OrchestratorConfig;
use crate::maintenance::MaintenanceHandle;
use crate::monitor::{CapabilityMetrics, MetricsTracker};
use crate::resolver::DependencyResolver;
use crate::task_queue::TaskQueue;
use crate::types::{
    DelegationRequest, OrchestratedTask, Priority, TaskStatus, Workflow, WorkflowDefinition,
    WorkflowStatus, WorkflowSummary,
};
use crate::workflow::{build_workflow, TaskExecutor, WorkflowEngine};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use maestro_core::{Capability, MaestroResult, Outcome};
use maestro_workers::{WorkerRegistry, WorkerTask};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Health score above which a capability counts as healthy in [`Orchestrator::stats`].
const HEALTHY_SCORE: f64 = 0.7;

/// A task currently held by a worker.
struct ActiveTask {
    task: OrchestratedTask,
    cancellation: CancellationToken,
    cancel_requested: bool,
}

struct WorkflowEntry {
    workflow: Workflow,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct WorkflowCounters {
    total: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

/// The dispatcher: owns the priority queue, the active-task set, metrics, and
/// workflow state, and hands tasks to workers from the injected registry.
///
/// Cloning is cheap; every clone drives the same state.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    registry: Arc<WorkerRegistry>,
    queue: Arc<RwLock<TaskQueue>>,
    active: Arc<RwLock<HashMap<Uuid, ActiveTask>>>,
    metrics: Arc<RwLock<MetricsTracker>>,
    workflows: Arc<RwLock<HashMap<Uuid, WorkflowEntry>>>,
    counters: Arc<RwLock<WorkflowCounters>>,
    waiters: Arc<Mutex<HashMap<Uuid, oneshot::Sender<Outcome>>>>,
}

impl Orchestrator {
    /// An orchestrator over `registry`. Fails on a config that
    /// [`OrchestratorConfig::validate`] rejects.
    pub fn new(registry: Arc<WorkerRegistry>, config: OrchestratorConfig) -> MaestroResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            registry,
            queue: Arc::new(RwLock::new(TaskQueue::new())),
            active: Arc::new(RwLock::new(HashMap::new())),
            metrics: Arc::new(RwLock::new(MetricsTracker::new())),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(WorkflowCounters::default())),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The effective configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The worker registry tasks are dispatched through.
    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    // --- Delegation ---

    /// Accept an ad-hoc task, enqueue it, and try to dispatch immediately.
    ///
    /// Never fails: a missing worker shows up later as a failed outcome.
    pub async fn delegate(&self, request: DelegationRequest) -> DelegationHandle {
        let capability = request.capability;
        let task = request.into_task();
        let task_id = task.id;

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(task_id, tx);
        self.queue.write().await.enqueue(task);
        self.drain().await;

        let queue_position = self.queue.read().await.position(task_id);
        let status = if queue_position.is_some() {
            TaskStatus::Pending
        } else {
            TaskStatus::Running
        };

        DelegationHandle {
            task_id,
            status,
            queue_position,
            message: format!("Task delegated to {capability} worker"),
            completion: rx,
        }
    }

    /// Pull ready tasks off the queue until the concurrency cap is reached or
    /// nothing queued is ready.
    pub fn drain(&self) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move { this.drain_pass().await }.boxed()
    }

    async fn drain_pass(&self) {
        loop {
            let (task, token) = {
                let mut queue = self.queue.write().await;
                let mut active = self.active.write().await;
                if queue.is_empty() {
                    break;
                }
                if active.len() >= self.config.max_concurrent_tasks {
                    debug!(
                        active = active.len(),
                        queued = queue.len(),
                        "Concurrency cap reached"
                    );
                    break;
                }
                let active_ids: HashSet<Uuid> = active.keys().copied().collect();
                let Some(mut task) =
                    queue.dequeue_ready(|t| DependencyResolver::is_ready_adhoc(t, &active_ids))
                else {
                    debug!(queued = queue.len(), "No queued task is ready");
                    break;
                };
                match admit(&mut active, &mut task) {
                    Ok(token) => {
                        self.metrics.write().await.task_started(task.capability);
                        (task, token)
                    }
                    Err(e) => {
                        error!(task_id = %task.id, error = %e, "Could not admit task");
                        continue;
                    }
                }
            };

            let this = self.clone();
            tokio::spawn(async move {
                let done = this.run_task(task, token).await;
                this.notify(&done).await;
                this.drain().await;
            });
        }
    }

    /// Invoke the worker for a task that has already been admitted to the
    /// active set, then retire it.
    async fn run_task(
        &self,
        mut task: OrchestratedTask,
        cancellation: CancellationToken,
    ) -> OrchestratedTask {
        let capability = task.capability;
        let start = Instant::now();

        let (outcome, processed) = match self.registry.get_with_config(capability) {
            None => {
                warn!(task_id = %task.id, capability = %capability, "Capability not registered");
                (
                    Outcome::failure(format!("Capability '{capability}' not registered")),
                    false,
                )
            }
            Some((worker, config)) => {
                task.assigned_to = Some(worker.name().to_string());
                let request = WorkerTask {
                    id: task.id,
                    task_type: task.task_type.clone(),
                    input: task.input.clone(),
                    context: task.context.clone(),
                    priority: task.priority.weight(),
                    timeout: self.config.task_timeout(),
                    config,
                    cancellation,
                };
                info!(
                    task_id = %task.id,
                    capability = %capability,
                    worker = %worker.name(),
                    "Dispatching task"
                );

                let handle = tokio::spawn(async move { worker.process(request).await });
                let mut outcome = match handle.await {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        error!(task_id = %task.id, capability = %capability, error = %e, "Worker fault");
                        Outcome::failure(e.to_string())
                    }
                    Err(e) => {
                        let reason = panic_message(e);
                        error!(task_id = %task.id, capability = %capability, error = %reason, "Worker panicked");
                        Outcome::failure(format!("Worker fault: {reason}"))
                    }
                };
                if !outcome.processing_time.is_finite() || outcome.processing_time <= 0.0 {
                    outcome.processing_time = start.elapsed().as_secs_f64();
                }
                (outcome, true)
            }
        };

        let (success, processing_time) = (outcome.success, outcome.processing_time);
        if let Err(e) = task.finish(outcome) {
            error!(task_id = %task.id, error = %e, "Could not record outcome");
        }

        {
            let mut active = self.active.write().await;
            let mut metrics = self.metrics.write().await;
            active.remove(&task.id);
            if processed {
                metrics.record(capability, success, processing_time);
            }
            metrics.task_finished(capability);
        }

        info!(task_id = %task.id, capability = %capability, status = %task.status, "Task finished");
        task
    }

    async fn notify(&self, task: &OrchestratedTask) {
        let waiter = self.waiters.lock().await.remove(&task.id);
        if let (Some(tx), Some(outcome)) = (waiter, &task.result) {
            // The caller may have dropped its handle.
            let _ = tx.send(outcome.clone());
        }
    }

    // --- Workflows ---

    /// Build and run a workflow to its terminal state.
    ///
    /// Only a malformed definition is an error; task failures are reported in
    /// the returned summary.
    pub async fn execute_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> MaestroResult<WorkflowSummary> {
        let mut workflow = build_workflow(definition)?;
        workflow.start()?;
        let id = workflow.id;
        let cancel = CancellationToken::new();

        self.workflows.write().await.insert(
            id,
            WorkflowEntry {
                workflow: workflow.clone(),
                cancel: cancel.clone(),
            },
        );
        self.counters.write().await.total += 1;

        let run = WorkflowEngine::new(self, cancel.clone())
            .run(&mut workflow)
            .await;

        {
            let mut counters = self.counters.write().await;
            match workflow.status {
                WorkflowStatus::Completed => counters.completed += 1,
                WorkflowStatus::Failed => counters.failed += 1,
                WorkflowStatus::Cancelled => counters.cancelled += 1,
                _ => {}
            }
        }

        let summary = workflow.summary();
        self.workflows
            .write()
            .await
            .insert(id, WorkflowEntry { workflow, cancel });
        run?;
        Ok(summary)
    }

    /// Snapshot of a stored workflow.
    pub async fn workflow(&self, id: Uuid) -> Option<Workflow> {
        self.workflows
            .read()
            .await
            .get(&id)
            .map(|e| e.workflow.clone())
    }

    /// Request cancellation of a running workflow. It stops before its next
    /// step or level; tasks already dispatched run to completion.
    pub async fn cancel_workflow(&self, id: Uuid) -> CancelStatus {
        let workflows = self.workflows.read().await;
        match workflows.get(&id) {
            Some(entry) if !entry.workflow.status.is_terminal() => {
                entry.cancel.cancel();
                info!(workflow_id = %id, "Workflow cancellation requested");
                CancelStatus::CancellationRequested
            }
            _ => CancelStatus::NotFound,
        }
    }

    // --- Cancellation ---

    /// Cancel a task. Queued tasks are withdrawn; running tasks are only
    /// flagged and may still complete.
    pub async fn cancel(&self, task_id: Uuid) -> CancelResponse {
        let response = {
            let mut queue = self.queue.write().await;
            if let Some(mut task) = queue.remove(task_id) {
                if let Err(e) = task.transition(TaskStatus::Cancelled) {
                    error!(task_id = %task_id, error = %e, "Could not cancel queued task");
                }
                info!(task_id = %task_id, "Queued task cancelled");
                CancelResponse {
                    task_id,
                    status: CancelStatus::Cancelled,
                    message: "Task removed from queue".to_string(),
                }
            } else {
                let mut active = self.active.write().await;
                match active.get_mut(&task_id) {
                    Some(entry) => {
                        entry.cancel_requested = true;
                        entry.cancellation.cancel();
                        info!(task_id = %task_id, "Cancellation requested for running task");
                        CancelResponse {
                            task_id,
                            status: CancelStatus::CancellationRequested,
                            message: "Cancellation requested for active task".to_string(),
                        }
                    }
                    None => CancelResponse {
                        task_id,
                        status: CancelStatus::NotFound,
                        message: "Task not found in queue or active tasks".to_string(),
                    },
                }
            }
        };

        if response.status == CancelStatus::Cancelled {
            // Dropping the sender resolves the handle's wait() with None.
            self.waiters.lock().await.remove(&task_id);
        }
        response
    }

    // --- Monitoring ---

    /// Read-only snapshot of per-capability metrics and orchestrator counters.
    pub async fn monitor(&self) -> MonitorSnapshot {
        let agent_metrics = self.metrics.read().await.snapshot();
        let queued_tasks = self.queue.read().await.len();
        let active_tasks = self.active.read().await.len();
        let (active_workflows, workflows) = {
            let workflows = self.workflows.read().await;
            let active = workflows
                .values()
                .filter(|e| e.workflow.status == WorkflowStatus::Running)
                .count();
            let mut summaries: Vec<WorkflowSummary> =
                workflows.values().map(|e| e.workflow.summary()).collect();
            summaries.sort_by_key(|s| s.completed_at);
            (active, summaries)
        };
        let counters = self.counters.read().await;

        MonitorSnapshot {
            agent_metrics,
            orchestrator_stats: OrchestratorStats {
                total_workflows: counters.total,
                completed_workflows: counters.completed,
                failed_workflows: counters.failed,
                cancelled_workflows: counters.cancelled,
                success_rate: counters.completed as f64 / counters.total.max(1) as f64,
                active_tasks,
                queued_tasks,
                active_workflows,
            },
            workflows,
        }
    }

    /// Queued tasks in dispatch order and the tasks currently running.
    pub async fn get_queue_status(&self) -> QueueStatus {
        let queue = self.queue.read().await;
        let active = self.active.read().await;

        let queued = queue
            .iter()
            .map(|t| QueuedTaskInfo {
                task_id: t.id,
                priority: t.priority,
                capability: t.capability,
                task_type: t.task_type.clone(),
                created_at: t.created_at,
                deadline: t.deadline,
            })
            .collect();

        let mut running: Vec<ActiveTaskInfo> = active
            .values()
            .map(|a| ActiveTaskInfo {
                task_id: a.task.id,
                capability: a.task.capability,
                workflow_id: a.task.workflow_id,
                started_at: a.task.started_at,
                cancellation_requested: a.cancel_requested,
            })
            .collect();
        running.sort_by_key(|a| a.started_at);

        QueueStatus {
            queued,
            active: running,
        }
    }

    /// Orchestrator-wide statistics and effective configuration.
    pub async fn stats(&self) -> OrchestratorReport {
        let (monitored, healthy) = {
            let metrics = self.metrics.read().await;
            (metrics.monitored(), metrics.healthy_count(HEALTHY_SCORE))
        };
        let snapshot = self.monitor().await;
        let stats = snapshot.orchestrator_stats;

        OrchestratorReport {
            workflows: WorkflowTotals {
                total: stats.total_workflows,
                completed: stats.completed_workflows,
                failed: stats.failed_workflows,
                active: stats.active_workflows,
            },
            tasks: TaskTotals {
                active: stats.active_tasks,
                queued: stats.queued_tasks,
                max_concurrent: self.config.max_concurrent_tasks,
            },
            agents: AgentTotals { monitored, healthy },
            configuration: (*self.config).clone(),
        }
    }

    /// Probe every registered worker. The orchestrator is healthy when at
    /// least one worker is.
    pub async fn health_check(&self) -> HealthReport {
        let workers = self.registry.health_check().await;
        HealthReport {
            healthy: workers.values().any(|ok| *ok),
            workers,
        }
    }

    // --- Maintenance ---

    /// One maintenance pass: reconcile per-capability load with the active
    /// set, drain the queue, and drop expired terminal workflows.
    pub async fn maintenance_tick(&self) {
        {
            let active = self.active.read().await;
            let loads: HashMap<Capability, usize> =
                active.values().fold(HashMap::new(), |mut acc, a| {
                    *acc.entry(a.task.capability).or_insert(0) += 1;
                    acc
                });
            self.metrics.write().await.reconcile_load(&loads);
        }

        self.drain().await;

        let removed = self.collect_expired_workflows().await;
        debug!(removed, "Maintenance tick complete");
    }

    async fn collect_expired_workflows(&self) -> usize {
        let secs = self.config.workflow_retention_secs.min(i64::MAX as u64 / 1_000) as i64;
        let Some(cutoff) = Utc::now().checked_sub_signed(chrono::Duration::seconds(secs)) else {
            return 0;
        };

        let mut workflows = self.workflows.write().await;
        let before = workflows.len();
        workflows.retain(|id, entry| {
            let expired = entry.workflow.status.is_terminal()
                && entry.workflow.completed_at.is_some_and(|at| at <= cutoff);
            if expired {
                info!(workflow_id = %id, status = %entry.workflow.status, "Workflow expired");
            }
            !expired
        });
        before - workflows.len()
    }

    /// Start the periodic maintenance ticker at the configured interval.
    pub fn start_maintenance(&self) -> MaestroResult<MaintenanceHandle> {
        MaintenanceHandle::start(self.clone(), self.config.health_check_interval())
    }
}

#[async_trait]
impl TaskExecutor for Orchestrator {
    async fn execute(&self, mut task: OrchestratedTask) -> OrchestratedTask {
        let admitted = {
            let mut active = self.active.write().await;
            let admitted = admit(&mut active, &mut task);
            if admitted.is_ok() {
                self.metrics.write().await.task_started(task.capability);
            }
            admitted
        };
        let token = match admitted {
            Ok(token) => token,
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Could not admit workflow task");
                task.result = Some(Outcome::failure(e.to_string()));
                return task;
            }
        };

        let done = self.run_task(task, token).await;
        // A freed slot may unblock queued ad-hoc work.
        self.drain().await;
        done
    }

    async fn on_progress(&self, workflow: &Workflow) {
        if let Some(entry) = self.workflows.write().await.get_mut(&workflow.id) {
            entry.workflow = workflow.clone();
        }
    }
}

/// Mark a task Running and add it to the active set.
fn admit(
    active: &mut HashMap<Uuid, ActiveTask>,
    task: &mut OrchestratedTask,
) -> MaestroResult<CancellationToken> {
    task.transition(TaskStatus::Running)?;
    let token = CancellationToken::new();
    active.insert(
        task.id,
        ActiveTask {
            task: task.clone(),
            cancellation: token.clone(),
            cancel_requested: false,
        },
    );
    Ok(token)
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

// --- Responses ---

/// Receipt for an accepted ad-hoc task.
#[derive(Debug)]
pub struct DelegationHandle {
    /// Id of the accepted task.
    pub task_id: Uuid,
    /// Pending while queued, Running once dispatched.
    pub status: TaskStatus,
    /// Position in the queue, if still queued.
    pub queue_position: Option<usize>,
    /// Human-readable acknowledgement.
    pub message: String,
    completion: oneshot::Receiver<Outcome>,
}

impl DelegationHandle {
    /// Wait for the task's outcome. `None` if it was cancelled before it ran.
    pub async fn wait(self) -> Option<Outcome> {
        self.completion.await.ok()
    }
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    /// The task was withdrawn from the queue and will never run.
    Cancelled,
    /// The task or workflow is running and has been flagged.
    CancellationRequested,
    /// Nothing with that id is queued or running.
    NotFound,
}

/// Result of [`Orchestrator::cancel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    /// The task the request named.
    pub task_id: Uuid,
    /// What happened.
    pub status: CancelStatus,
    /// Human-readable detail.
    pub message: String,
}

/// Orchestrator-wide counters inside a [`MonitorSnapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStats {
    /// Workflows ever started.
    pub total_workflows: u64,
    /// Workflows that ended Completed.
    pub completed_workflows: u64,
    /// Workflows that ended Failed.
    pub failed_workflows: u64,
    /// Workflows that ended Cancelled.
    pub cancelled_workflows: u64,
    /// Completed over total workflows.
    pub success_rate: f64,
    /// Tasks held by workers.
    pub active_tasks: usize,
    /// Ad-hoc tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Workflows currently running.
    pub active_workflows: usize,
}

/// Result of [`Orchestrator::monitor`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// Metrics per capability.
    pub agent_metrics: BTreeMap<Capability, CapabilityMetrics>,
    /// Orchestrator-wide counters.
    pub orchestrator_stats: OrchestratorStats,
    /// Workflows still within the retention window.
    pub workflows: Vec<WorkflowSummary>,
}

/// One queued task in a [`QueueStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTaskInfo {
    /// Task id.
    pub task_id: Uuid,
    /// Queue priority.
    pub priority: Priority,
    /// Target capability.
    pub capability: Capability,
    /// Task type.
    pub task_type: String,
    /// When the task was accepted.
    pub created_at: DateTime<Utc>,
    /// Informational deadline, if one was given.
    pub deadline: Option<DateTime<Utc>>,
}

/// One running task in a [`QueueStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTaskInfo {
    /// Task id.
    pub task_id: Uuid,
    /// Capability whose worker holds it.
    pub capability: Capability,
    /// Owning workflow, if any.
    pub workflow_id: Option<Uuid>,
    /// When it entered Running.
    pub started_at: Option<DateTime<Utc>>,
    /// Whether a cancellation has been requested.
    pub cancellation_requested: bool,
}

/// Result of [`Orchestrator::get_queue_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Queued tasks in dispatch order.
    pub queued: Vec<QueuedTaskInfo>,
    /// Running tasks, oldest first.
    pub active: Vec<ActiveTaskInfo>,
}

/// Workflow counts in an [`OrchestratorReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTotals {
    /// Workflows ever started.
    pub total: u64,
    /// Workflows that ended Completed.
    pub completed: u64,
    /// Workflows that ended Failed.
    pub failed: u64,
    /// Workflows currently running.
    pub active: usize,
}

/// Task counts in an [`OrchestratorReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTotals {
    /// Tasks held by workers.
    pub active: usize,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// The concurrency cap.
    pub max_concurrent: usize,
}

/// Capability counts in an [`OrchestratorReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTotals {
    /// Capabilities with a metrics entry.
    pub monitored: usize,
    /// Capabilities whose health score is above 0.7.
    pub healthy: usize,
}

/// Result of [`Orchestrator::stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorReport {
    /// Workflow counts.
    pub workflows: WorkflowTotals,
    /// Task counts.
    pub tasks: TaskTotals,
    /// Capability counts.
    pub agents: AgentTotals,
    /// The effective configuration.
    pub configuration: OrchestratorConfig,
}

/// Result of [`Orchestrator::health_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// True when at least one worker reports healthy.
    pub healthy: bool,
    /// Probe result per registered capability.
    pub workers: BTreeMap<Capability, bool>,
}
