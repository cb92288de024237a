use async_trait::async_trait;
use maestro_core::{MaestroResult, Outcome, Payload};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One unit of work handed to a [`Worker`].
#[derive(Debug, Clone)]
pub struct WorkerTask {
    /// Id of the orchestrated task this envelope was built from.
    pub id: Uuid,
    /// Free-form task type, e.g. `"draft_reply"`.
    pub task_type: String,
    /// Task input as submitted.
    pub input: Payload,
    /// Shared context snapshot. For workflow steps this reflects every context
    /// update published by earlier steps.
    pub context: Payload,
    /// Integer priority, 10 = most urgent, 1 = background.
    pub priority: u8,
    /// Timeout hint. The orchestrator never enforces it.
    pub timeout: Duration,
    /// Configuration registered alongside the worker for this capability.
    pub config: Payload,
    /// Cancelled when someone requests cancellation of the running task.
    /// Observing it is optional.
    pub cancellation: CancellationToken,
}

impl WorkerTask {
    /// A standalone task with default priority and timeout.
    pub fn new(task_type: impl Into<String>, input: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            input,
            context: Payload::new(),
            priority: 5,
            timeout: Duration::from_secs(300),
            config: Payload::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// The contract every capability worker implements.
///
/// Workers are opaque to the orchestrator: it only hands them tasks and asks
/// whether they are alive. An `Err` from [`Worker::process`] is treated as a
/// worker fault and converted into a failed [`Outcome`] by the dispatcher.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Human-readable worker name, used as the assigned-worker id.
    fn name(&self) -> &str;

    /// Perform one task and report its outcome.
    async fn process(&self, task: WorkerTask) -> MaestroResult<Outcome>;

    /// Liveness probe. Errors are recorded as unhealthy by the registry.
    async fn health_probe(&self) -> MaestroResult<bool> {
        Ok(true)
    }
}
