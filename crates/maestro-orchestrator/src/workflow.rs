use crate::resolver::DependencyResolver;
use crate::types::{
    ErrorStrategy, ExecutionStrategy, OrchestratedTask, Priority, TaskStatus, Workflow,
    WorkflowDefinition, WorkflowStatus,
};
use async_trait::async_trait;
use futures_util::future::join_all;
use maestro_core::{Capability, MaestroError, MaestroResult, Outcome};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Runs one task to completion.
///
/// Implementations take a Pending task and hand back the same task in a
/// terminal state with its `result` set. Worker faults must be folded into a
/// failed outcome rather than returned or raised.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run `task` and return it terminal, with its outcome attached.
    async fn execute(&self, task: OrchestratedTask) -> OrchestratedTask;

    /// Called with the workflow after every recorded or skipped step, so
    /// observers can see partial results while the run is in flight.
    async fn on_progress(&self, _workflow: &Workflow) {}
}

/// Build a [`Workflow`] from its definition.
///
/// Unknown capabilities, priorities, or strategies, duplicate step keys,
/// references to unknown steps, self-dependencies, and cycles are all
/// configuration errors.
pub fn build_workflow(def: WorkflowDefinition) -> MaestroResult<Workflow> {
    let strategy: ExecutionStrategy = def.execution_strategy.parse()?;
    let error_strategy: ErrorStrategy = def.error_strategy.parse()?;

    let mut workflow = Workflow::new(def.name, strategy).with_error_strategy(error_strategy);
    workflow.description = def.description;
    workflow.shared_context = def.shared_context;

    let keys: Vec<String> = def
        .tasks
        .iter()
        .enumerate()
        .map(|(i, t)| t.id.clone().unwrap_or_else(|| format!("task-{i}")))
        .collect();

    let mut ids: HashMap<&str, Uuid> = HashMap::new();
    let mut tasks = Vec::with_capacity(def.tasks.len());
    for (key, task_def) in keys.iter().zip(&def.tasks) {
        let capability: Capability = task_def.capability.parse()?;
        let priority = match &task_def.priority {
            Some(p) => p.parse()?,
            None => Priority::Normal,
        };
        let task = OrchestratedTask::new(capability, task_def.task_type.clone(), task_def.input.clone())
            .with_priority(priority);
        if ids.insert(key.as_str(), task.id).is_some() {
            return Err(MaestroError::Configuration(format!(
                "Duplicate task key '{key}' in workflow '{}'",
                workflow.name
            )));
        }
        tasks.push(task);
    }

    for ((key, task_def), task) in keys.iter().zip(&def.tasks).zip(tasks.iter_mut()) {
        for dep in &task_def.dependencies {
            if dep == key {
                return Err(MaestroError::Configuration(format!(
                    "Task '{key}' depends on itself"
                )));
            }
            let dep_id = ids.get(dep.as_str()).ok_or_else(|| {
                MaestroError::Configuration(format!(
                    "Task '{key}' depends on unknown task '{dep}'"
                ))
            })?;
            task.dependencies.push(*dep_id);
        }
    }

    DependencyResolver::validate(&tasks)?;

    let dependents: HashMap<Uuid, Vec<Uuid>> =
        tasks.iter().fold(HashMap::new(), |mut acc, t| {
            for dep in &t.dependencies {
                acc.entry(*dep).or_default().push(t.id);
            }
            acc
        });
    for mut task in tasks {
        task.dependents = dependents.get(&task.id).cloned().unwrap_or_default();
        task.context = workflow.shared_context.clone();
        workflow.add_task(task);
    }

    Ok(workflow)
}

/// Drives a [`Workflow`] through its execution strategy.
pub struct WorkflowEngine<'a, E: TaskExecutor + ?Sized> {
    executor: &'a E,
    cancel: CancellationToken,
}

impl<'a, E: TaskExecutor + ?Sized> WorkflowEngine<'a, E> {
    /// An engine that runs tasks through `executor` and stops between steps
    /// once `cancel` fires.
    pub fn new(executor: &'a E, cancel: CancellationToken) -> Self {
        Self { executor, cancel }
    }

    /// Run the workflow to its single terminal state.
    ///
    /// A Pending workflow is started first. Completed requires every task to
    /// complete; any failed or skipped task makes the workflow Failed;
    /// a cancellation request observed between steps makes it Cancelled.
    pub async fn run(&self, workflow: &mut Workflow) -> MaestroResult<()> {
        if workflow.status == WorkflowStatus::Pending {
            workflow.start()?;
        }
        info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            strategy = ?workflow.execution_strategy,
            tasks = workflow.tasks.len(),
            "Workflow started"
        );

        let cancelled = match workflow.execution_strategy {
            ExecutionStrategy::Sequential => self.run_sequential(workflow).await,
            ExecutionStrategy::Parallel => self.run_parallel(workflow).await,
        };

        let status = if cancelled {
            WorkflowStatus::Cancelled
        } else if workflow.failed_tasks.is_empty()
            && workflow.skipped_tasks.is_empty()
            && workflow.tasks.iter().all(|t| t.status == TaskStatus::Completed)
        {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        workflow.finish(status)?;

        info!(
            workflow_id = %workflow.id,
            status = %workflow.status,
            completed = workflow.completed_count(),
            failed = workflow.failed_tasks.len(),
            skipped = workflow.skipped_tasks.len(),
            "Workflow finished"
        );
        Ok(())
    }

    /// Returns true when the run stopped on a cancellation request.
    async fn run_sequential(&self, workflow: &mut Workflow) -> bool {
        for index in 0..workflow.tasks.len() {
            if self.cancel.is_cancelled() {
                return true;
            }

            if !DependencyResolver::is_ready_in_workflow(&workflow.tasks[index], &workflow.results) {
                skip(workflow, index);
                self.executor.on_progress(workflow).await;
                continue;
            }

            let mut task = workflow.tasks[index].clone();
            task.context = workflow.shared_context.clone();
            let done = self.executor.execute(task).await;
            let success = record(workflow, index, done);
            self.executor.on_progress(workflow).await;

            if !success && workflow.error_strategy == ErrorStrategy::FailFast {
                break;
            }
        }
        false
    }

    async fn run_parallel(&self, workflow: &mut Workflow) -> bool {
        let levels = DependencyResolver::compute_levels(&workflow.tasks);
        let index_of: HashMap<Uuid, usize> = workflow
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id, i))
            .collect();

        for (level, ids) in levels {
            if self.cancel.is_cancelled() {
                return true;
            }

            let mut batch = Vec::new();
            for id in ids {
                let Some(&index) = index_of.get(&id) else {
                    continue;
                };
                if DependencyResolver::is_ready_in_workflow(&workflow.tasks[index], &workflow.results) {
                    let mut task = workflow.tasks[index].clone();
                    task.context = workflow.shared_context.clone();
                    batch.push((index, task));
                } else {
                    skip(workflow, index);
                }
            }

            info!(workflow_id = %workflow.id, level, tasks = batch.len(), "Dispatching level");
            let (indices, tasks): (Vec<usize>, Vec<OrchestratedTask>) = batch.into_iter().unzip();
            let finished = join_all(tasks.into_iter().map(|t| self.executor.execute(t))).await;

            let mut level_failed = false;
            for (index, done) in indices.into_iter().zip(finished) {
                if !record(workflow, index, done) {
                    level_failed = true;
                }
            }
            self.executor.on_progress(workflow).await;

            if level_failed && workflow.error_strategy == ErrorStrategy::FailFast {
                break;
            }
        }
        false
    }
}

fn skip(workflow: &mut Workflow, index: usize) {
    let task_id = workflow.tasks[index].id;
    warn!(
        workflow_id = %workflow.id,
        task_id = %task_id,
        "Skipping task with unmet dependencies"
    );
    workflow.skipped_tasks.push(task_id);
}

/// Store a finished task and its outcome. Returns whether it succeeded.
fn record(workflow: &mut Workflow, index: usize, done: OrchestratedTask) -> bool {
    let outcome = done
        .result
        .clone()
        .unwrap_or_else(|| Outcome::failure("Task finished without an outcome"));
    let id = done.id;
    workflow.tasks[index] = done;

    if outcome.success {
        if let Some(updates) = outcome.context_updates() {
            for (key, value) in updates {
                workflow.shared_context.insert(key.clone(), value.clone());
            }
        }
    } else {
        let reason = format!(
            "Task {id} failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        if workflow.error.is_none() {
            workflow.error = Some(reason);
        }
        workflow.failed_tasks.push(id);
    }

    let success = outcome.success;
    workflow.results.insert(id, outcome);
    success
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::TaskDefinition;
    use maestro_core::{Payload, CONTEXT_UPDATES_KEY};
    use std::sync::Mutex;

    /// Completes tasks in-process; task types starting with "fail" fail.
    #[derive(Default)]
    struct ScriptedExecutor {
        seen: Mutex<Vec<(String, Payload)>>,
    }

    #[async_trait]
    impl TaskExecutor for ScriptedExecutor {
        async fn execute(&self, mut task: OrchestratedTask) -> OrchestratedTask {
            self.seen
                .lock()
                .unwrap()
                .push((task.task_type.clone(), task.context.clone()));
            task.transition(TaskStatus::Running).unwrap();
            let outcome = if task.task_type.starts_with("fail") {
                Outcome::failure(format!("{} failed", task.task_type))
            } else {
                Outcome::success(Payload::new()).with_entry(
                    CONTEXT_UPDATES_KEY,
                    serde_json::json!({ "last": task.task_type.clone() }),
                )
            };
            task.finish(outcome).unwrap();
            task
        }
    }

    /// Wraps [`ScriptedExecutor`] and keeps the completed count of every
    /// progress report.
    #[derive(Default)]
    struct ObservedExecutor {
        inner: ScriptedExecutor,
        progress: Mutex<Vec<(WorkflowStatus, usize)>>,
    }

    #[async_trait]
    impl TaskExecutor for ObservedExecutor {
        async fn execute(&self, task: OrchestratedTask) -> OrchestratedTask {
            self.inner.execute(task).await
        }

        async fn on_progress(&self, workflow: &Workflow) {
            self.progress
                .lock()
                .unwrap()
                .push((workflow.status, workflow.results.len()));
        }
    }

    impl ScriptedExecutor {
        fn order(&self) -> Vec<String> {
            self.seen.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
        }
    }

    fn def(strategy: &str, error: &str, steps: Vec<TaskDefinition>) -> WorkflowDefinition {
        steps
            .into_iter()
            .fold(WorkflowDefinition::new("test", strategy).with_error_strategy(error), |d, s| {
                d.with_task(s)
            })
    }

    fn step(key: &str) -> TaskDefinition {
        TaskDefinition::new(key, key, "email")
    }

    async fn run(def: WorkflowDefinition) -> (Workflow, ScriptedExecutor) {
        let mut wf = build_workflow(def).unwrap();
        let exec = ScriptedExecutor::default();
        WorkflowEngine::new(&exec, CancellationToken::new())
            .run(&mut wf)
            .await
            .unwrap();
        (wf, exec)
    }

    #[test]
    fn test_build_rejects_unknown_capability_and_strategy() {
        let bad_cap = def("sequential", "fail_fast", vec![TaskDefinition::new("a", "a", "billing")]);
        assert!(matches!(build_workflow(bad_cap), Err(MaestroError::Configuration(_))));

        let bad_strategy = def("conditional", "fail_fast", vec![step("a")]);
        assert!(matches!(build_workflow(bad_strategy), Err(MaestroError::Configuration(_))));

        let bad_error = def("parallel", "retry", vec![step("a")]);
        assert!(build_workflow(bad_error).is_err());
    }

    #[test]
    fn test_build_rejects_bad_graphs() {
        let unknown = def("parallel", "fail_fast", vec![step("a").depends_on("zzz")]);
        assert!(build_workflow(unknown).unwrap_err().to_string().contains("zzz"));

        let self_dep = def("parallel", "fail_fast", vec![step("a").depends_on("a")]);
        assert!(build_workflow(self_dep).is_err());

        let cycle = def(
            "parallel",
            "fail_fast",
            vec![step("a").depends_on("b"), step("b").depends_on("a")],
        );
        assert!(build_workflow(cycle).unwrap_err().to_string().contains("cycle"));

        let dup = def("sequential", "fail_fast", vec![step("a"), step("a")]);
        assert!(build_workflow(dup).is_err());
    }

    #[test]
    fn test_build_links_dependencies_and_dependents() {
        let wf = build_workflow(def(
            "parallel",
            "fail_fast",
            vec![step("a"), step("b").depends_on("a")],
        ))
        .unwrap();
        let (a, b) = (&wf.tasks[0], &wf.tasks[1]);
        assert_eq!(b.dependencies, vec![a.id]);
        assert_eq!(a.dependents, vec![b.id]);
        assert_eq!(a.workflow_id, Some(wf.id));
        assert_eq!(wf.status, WorkflowStatus::Pending);
    }

    #[tokio::test]
    async fn test_sequential_fail_fast_stops_at_first_failure() {
        let (wf, exec) = run(def(
            "sequential",
            "fail_fast",
            vec![step("a"), step("fail_b"), step("c")],
        ))
        .await;

        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(exec.order(), vec!["a", "fail_b"]);
        assert_eq!(wf.results.len(), 2);
        assert_eq!(wf.tasks[2].status, TaskStatus::Pending);
        assert!(wf.error.as_deref().unwrap().contains("fail_b failed"));
        assert!(wf.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_sequential_continue_runs_everything() {
        let (wf, exec) = run(def(
            "sequential",
            "continue",
            vec![step("a"), step("fail_b"), step("c")],
        ))
        .await;

        assert_eq!(exec.order(), vec!["a", "fail_b", "c"]);
        assert_eq!(wf.results.len(), 3);
        assert_eq!(wf.failed_tasks.len(), 1);
        assert_eq!(wf.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_sequential_context_flows_forward() {
        let (wf, exec) = run(def("sequential", "fail_fast", vec![step("a"), step("b")])).await;

        assert_eq!(wf.status, WorkflowStatus::Completed);
        let seen = exec.seen.lock().unwrap();
        assert!(seen[0].1.get("last").is_none());
        assert_eq!(seen[1].1["last"], serde_json::json!("a"));
        assert_eq!(wf.shared_context["last"], serde_json::json!("b"));
    }

    #[tokio::test]
    async fn test_sequential_skips_unmet_dependencies() {
        // b is declared before the step it depends on.
        let (wf, exec) = run(def(
            "sequential",
            "continue",
            vec![step("b").depends_on("a"), step("a")],
        ))
        .await;

        assert_eq!(exec.order(), vec!["a"]);
        assert_eq!(wf.skipped_tasks.len(), 1);
        assert_eq!(wf.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_parallel_levels_run_in_order() {
        let (wf, exec) = run(def(
            "parallel",
            "fail_fast",
            vec![step("a"), step("b").depends_on("a"), step("c")],
        ))
        .await;

        assert_eq!(wf.status, WorkflowStatus::Completed);
        let order = exec.order();
        assert_eq!(order.len(), 3);
        assert_eq!(order[2], "b");
        assert_eq!(wf.completed_count(), 3);
    }

    #[tokio::test]
    async fn test_parallel_fail_fast_finishes_level_then_stops() {
        let (wf, exec) = run(def(
            "parallel",
            "fail_fast",
            vec![step("fail_a"), step("b"), step("c").depends_on("b")],
        ))
        .await;

        let order = exec.order();
        assert!(order.contains(&"fail_a".to_string()));
        assert!(order.contains(&"b".to_string()));
        assert!(!order.contains(&"c".to_string()));
        assert_eq!(wf.status, WorkflowStatus::Failed);
        assert_eq!(wf.results.len(), 2);
    }

    #[tokio::test]
    async fn test_parallel_continue_skips_dependents_of_failures() {
        let (wf, exec) = run(def(
            "parallel",
            "continue",
            vec![step("fail_a"), step("b").depends_on("fail_a"), step("c")],
        ))
        .await;

        assert_eq!(exec.order().len(), 2);
        assert_eq!(wf.skipped_tasks, vec![wf.tasks[1].id]);
        assert_eq!(wf.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn test_progress_reported_after_each_step() {
        let mut wf = build_workflow(def(
            "sequential",
            "continue",
            vec![step("a"), step("b"), step("c")],
        ))
        .unwrap();
        let exec = ObservedExecutor::default();
        WorkflowEngine::new(&exec, CancellationToken::new())
            .run(&mut wf)
            .await
            .unwrap();

        let progress = exec.progress.lock().unwrap().clone();
        assert_eq!(
            progress,
            vec![
                (WorkflowStatus::Running, 1),
                (WorkflowStatus::Running, 2),
                (WorkflowStatus::Running, 3),
            ]
        );
        assert_eq!(wf.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_parallel_progress_reported_per_level() {
        let mut wf = build_workflow(def(
            "parallel",
            "fail_fast",
            vec![step("a"), step("b"), step("c").depends_on("a")],
        ))
        .unwrap();
        let exec = ObservedExecutor::default();
        WorkflowEngine::new(&exec, CancellationToken::new())
            .run(&mut wf)
            .await
            .unwrap();

        let progress = exec.progress.lock().unwrap().clone();
        assert_eq!(
            progress,
            vec![(WorkflowStatus::Running, 2), (WorkflowStatus::Running, 3)]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let mut wf = build_workflow(def("sequential", "fail_fast", vec![step("a")])).unwrap();
        let exec = ScriptedExecutor::default();
        let token = CancellationToken::new();
        token.cancel();
        WorkflowEngine::new(&exec, token).run(&mut wf).await.unwrap();

        assert_eq!(wf.status, WorkflowStatus::Cancelled);
        assert!(exec.order().is_empty());
    }
}
