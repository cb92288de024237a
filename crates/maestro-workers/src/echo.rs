use crate::worker::{Worker, WorkerTask};
use async_trait::async_trait;
use maestro_core::{Capability, MaestroResult, Outcome, Payload, CONTEXT_UPDATES_KEY};
use std::time::{Duration, Instant};

/// Reference worker that echoes its input back.
///
/// Recognised input keys:
/// - `"fail"`: when `true`, returns a failed outcome.
/// - `"delay_ms"`: sleeps before answering.
///
/// On success it publishes `last_<capability>` = task type as a context update.
/// A `"confidence"` number in the registered worker config overrides the
/// default confidence of 0.9.
pub struct EchoWorker {
    name: String,
    capability: Capability,
}

impl EchoWorker {
    /// An echo worker named `echo-<capability>`.
    pub fn new(capability: Capability) -> Self {
        Self {
            name: format!("echo-{capability}"),
            capability,
        }
    }
}

#[async_trait]
impl Worker for EchoWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, task: WorkerTask) -> MaestroResult<Outcome> {
        let start = Instant::now();

        if let Some(ms) = task.input.get("delay_ms").and_then(serde_json::Value::as_u64) {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => {}
                _ = task.cancellation.cancelled() => {
                    return Ok(Outcome::failure("cancelled by request")
                        .with_processing_time(start.elapsed().as_secs_f64()));
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        if task.input.get("fail").and_then(serde_json::Value::as_bool) == Some(true) {
            return Ok(Outcome::failure(format!("{} asked to fail", task.task_type))
                .with_processing_time(elapsed));
        }

        let mut payload = Payload::new();
        payload.insert("echo".to_string(), serde_json::to_value(&task.input)?);
        payload.insert("task_type".to_string(), serde_json::json!(task.task_type));
        let mut updates = serde_json::Map::new();
        updates.insert(
            format!("last_{}", self.capability),
            serde_json::Value::String(task.task_type.clone()),
        );
        payload.insert(
            CONTEXT_UPDATES_KEY.to_string(),
            serde_json::Value::Object(updates),
        );

        let confidence = task
            .config
            .get("confidence")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.9);
        Ok(Outcome::success(payload)
            .with_confidence(confidence)
            .with_processing_time(elapsed))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, serde_json::Value)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_echo_success_publishes_context() {
        let worker = EchoWorker::new(Capability::Email);
        let task = WorkerTask::new("draft_reply", input(&[("to", serde_json::json!("a@b.c"))]));
        let outcome = worker.process(task).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.payload["echo"]["to"], serde_json::json!("a@b.c"));
        let updates = outcome.context_updates().unwrap();
        assert_eq!(updates["last_email"], serde_json::json!("draft_reply"));
    }

    #[tokio::test]
    async fn test_echo_confidence_from_config() {
        let worker = EchoWorker::new(Capability::Content);
        let default = worker.process(WorkerTask::new("draft", Payload::new())).await.unwrap();
        assert!((default.confidence - 0.9).abs() < 1e-9);

        let mut task = WorkerTask::new("draft", Payload::new());
        task.config.insert("confidence".into(), serde_json::json!(0.55));
        let outcome = worker.process(task).await.unwrap();
        assert!((outcome.confidence - 0.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_echo_fail_flag() {
        let worker = EchoWorker::new(Capability::Schedule);
        let task = WorkerTask::new("book", input(&[("fail", serde_json::json!(true))]));
        let outcome = worker.process(task).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("book"));
    }

    #[tokio::test]
    async fn test_echo_observes_cancellation() {
        let worker = EchoWorker::new(Capability::Knowledge);
        let task = WorkerTask::new("search", input(&[("delay_ms", serde_json::json!(10_000))]));
        task.cancellation.cancel();
        let outcome = worker.process(task).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("cancelled by request"));
    }
}
