//! Core types and error definitions for the maestro orchestrator.
//!
//! This crate provides the foundational types shared across all maestro crates:
//! the error taxonomy, the set of worker capabilities, and the outcome record a
//! worker returns for one unit of work.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`Capability`]: A worker role that tasks are addressed to.
//! - [`Outcome`]: The structured success/failure result of one task.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// --- Error types ---

/// Top-level error type for the maestro orchestrator.
///
/// Only malformed requests and internal invariant violations surface as errors.
/// Worker faults are normally folded into a failed [`Outcome`] before they reach
/// a caller.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// A request referenced an unknown capability, strategy, or dependency,
    /// or described an invalid dependency graph.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A worker failed while processing a task.
    #[error("Worker fault: {0}")]
    WorkerFault(String),

    /// A status change that would move a task or workflow backwards.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Status the entity is currently in.
        from: String,
        /// Status that was requested.
        to: String,
    },

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Opaque key/value map used for task input, shared context, and result payloads.
pub type Payload = HashMap<String, serde_json::Value>;

// --- Capability ---

/// A worker role that tasks are addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Email triage and draft generation.
    Email,
    /// Calendar and scheduling work.
    Schedule,
    /// Knowledge-base search and retrieval.
    Knowledge,
    /// Content generation.
    Content,
}

impl Capability {
    /// Every capability, in a stable order.
    pub const ALL: [Capability; 4] = [
        Capability::Email,
        Capability::Schedule,
        Capability::Knowledge,
        Capability::Content,
    ];

    /// The lowercase wire name of this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Email => "email",
            Capability::Schedule => "schedule",
            Capability::Knowledge => "knowledge",
            Capability::Content => "content",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| MaestroError::Configuration(format!("Unknown capability: '{s}'")))
    }
}

// --- Outcome ---

/// Payload key a worker uses to publish updates to a workflow's shared context.
pub const CONTEXT_UPDATES_KEY: &str = "context_updates";

/// The structured result a worker returns for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the task completed successfully.
    pub success: bool,
    /// Confidence in the result, clamped to `0.0..=1.0`.
    pub confidence: f64,
    /// Structured result payload. May carry a [`CONTEXT_UPDATES_KEY`] object.
    #[serde(default)]
    pub payload: Payload,
    /// Error details when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Processing duration in seconds.
    pub processing_time: f64,
}

impl Outcome {
    /// A successful outcome with full confidence.
    pub fn success(payload: Payload) -> Self {
        Self {
            success: true,
            confidence: 1.0,
            payload,
            error: None,
            processing_time: 0.0,
        }
    }

    /// A failed outcome with zero confidence. The error is mirrored into the
    /// payload under `"error"`.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let mut payload = Payload::new();
        payload.insert("error".to_string(), serde_json::Value::String(error.clone()));
        Self {
            success: false,
            confidence: 0.0,
            payload,
            error: Some(error),
            processing_time: 0.0,
        }
    }

    /// Sets the confidence, clamped to `0.0..=1.0`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Sets the processing time in seconds.
    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = seconds.max(0.0);
        self
    }

    /// Adds a single entry to the result payload.
    pub fn with_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// The context updates this outcome publishes, if it carries an object under
    /// [`CONTEXT_UPDATES_KEY`].
    pub fn context_updates(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.payload
            .get(CONTEXT_UPDATES_KEY)
            .and_then(serde_json::Value::as_object)
    }
}
