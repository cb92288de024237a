use crate::types::{OrchestratedTask, Workflow};
use maestro_core::{MaestroError, MaestroResult, Outcome};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// Readiness checks and topological leveling for tasks.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Whether `task` may be dispatched.
    ///
    /// Inside a workflow every dependency must have a successful outcome in
    /// the workflow's results. Outside a workflow a dependency only counts as
    /// satisfied once it is no longer in the active set; earlier ad-hoc
    /// outcomes are not consulted.
    pub fn is_ready(
        task: &OrchestratedTask,
        workflow: Option<&Workflow>,
        active: &HashSet<Uuid>,
    ) -> bool {
        match workflow {
            Some(wf) => Self::is_ready_in_workflow(task, &wf.results),
            None => Self::is_ready_adhoc(task, active),
        }
    }

    /// Every dependency has a successful outcome in `results`.
    pub fn is_ready_in_workflow(task: &OrchestratedTask, results: &HashMap<Uuid, Outcome>) -> bool {
        task.dependencies
            .iter()
            .all(|dep| results.get(dep).is_some_and(|o| o.success))
    }

    /// No dependency is still in the active set.
    pub fn is_ready_adhoc(task: &OrchestratedTask, active: &HashSet<Uuid>) -> bool {
        task.dependencies.iter().all(|dep| !active.contains(dep))
    }

    /// Reject dependency graphs that reference unknown tasks, point at
    /// themselves, or contain a cycle (Kahn's algorithm).
    pub fn validate(tasks: &[OrchestratedTask]) -> MaestroResult<()> {
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        if ids.len() != tasks.len() {
            return Err(MaestroError::Configuration(
                "Duplicate task id in workflow".to_string(),
            ));
        }

        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            in_degree.entry(task.id).or_insert(0);
            for dep in &task.dependencies {
                if *dep == task.id {
                    return Err(MaestroError::Configuration(format!(
                        "Task {} depends on itself",
                        task.id
                    )));
                }
                if !ids.contains(dep) {
                    return Err(MaestroError::Configuration(format!(
                        "Task {} depends on unknown task {dep}",
                        task.id
                    )));
                }
                *in_degree.entry(task.id).or_insert(0) += 1;
                dependents.entry(*dep).or_default().push(task.id);
            }
        }

        let mut ready: VecDeque<Uuid> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop_front() {
            visited += 1;
            for next in dependents.get(&id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push_back(*next);
                    }
                }
            }
        }

        if visited != tasks.len() {
            return Err(MaestroError::Configuration(
                "Dependency cycle detected in workflow".to_string(),
            ));
        }
        Ok(())
    }

    /// Group tasks into execution levels.
    ///
    /// `level(t) = 0` without dependencies, otherwise `1 + max(level(dep))`.
    /// Dependencies outside `tasks` are ignored. Within a level, tasks keep
    /// their declared order. The graph must be acyclic; run [`Self::validate`]
    /// first.
    pub fn compute_levels(tasks: &[OrchestratedTask]) -> BTreeMap<usize, Vec<Uuid>> {
        let by_id: HashMap<Uuid, &OrchestratedTask> = tasks.iter().map(|t| (t.id, t)).collect();
        let mut memo: HashMap<Uuid, usize> = HashMap::new();
        let mut levels: BTreeMap<usize, Vec<Uuid>> = BTreeMap::new();

        for task in tasks {
            let level = Self::level_of(task, &by_id, &mut memo);
            levels.entry(level).or_default().push(task.id);
        }
        levels
    }

    fn level_of(
        task: &OrchestratedTask,
        by_id: &HashMap<Uuid, &OrchestratedTask>,
        memo: &mut HashMap<Uuid, usize>,
    ) -> usize {
        if let Some(level) = memo.get(&task.id) {
            return *level;
        }
        let level = task
            .dependencies
            .iter()
            .filter_map(|dep| by_id.get(dep))
            .map(|dep| Self::level_of(dep, by_id, memo) + 1)
            .max()
            .unwrap_or(0);
        memo.insert(task.id, level);
        level
    }
}
