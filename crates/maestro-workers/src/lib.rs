//! Worker capability contract and registry.
//!
//! Workers are the opaque units that actually perform tasks. The orchestrator
//! only knows the small [`Worker`] interface (`process` + `health_probe`) and
//! finds workers through a [`WorkerRegistry`] keyed by capability.
//!
//! # Main types
//!
//! - [`Worker`]: Trait every capability worker implements.
//! - [`WorkerTask`]: The unit of work handed to a worker.
//! - [`WorkerRegistry`]: Capability → worker mapping with liveness aggregation.
//! - [`EchoWorker`]: Reference worker that echoes its input.

/// Reference echo worker.
pub mod echo;
/// Capability-keyed worker registry.
pub mod registry;
/// The worker trait and task envelope.
pub mod worker;

pub use echo::EchoWorker;
pub use registry::{RegistryStats, WorkerRegistry};
pub use worker::{Worker, WorkerTask};
