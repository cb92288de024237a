use chrono::{DateTime, Utc};
use maestro_core::Capability;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Rolling statistics for one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Capability these numbers belong to.
    pub capability: Capability,
    /// Tasks recorded so far.
    pub total_tasks: u64,
    /// Recorded tasks with a successful outcome.
    pub successful_tasks: u64,
    /// Recorded tasks with a failed outcome.
    pub failed_tasks: u64,
    /// Mean processing time in seconds.
    pub avg_processing_time: f64,
    /// Tasks currently in flight.
    pub current_load: usize,
    /// `min(1, success_rate * 1.2)`; 1.0 before any task completes.
    pub health_score: f64,
    /// Time of the last recorded task.
    pub last_activity: Option<DateTime<Utc>>,
}

impl AgentMetrics {
    /// Zeroed metrics with a full health score.
    pub fn new(capability: Capability) -> Self {
        Self {
            capability,
            total_tasks: 0,
            successful_tasks: 0,
            failed_tasks: 0,
            avg_processing_time: 0.0,
            current_load: 0,
            health_score: 1.0,
            last_activity: None,
        }
    }

    /// Successful over total; 0.0 before any task.
    pub fn success_rate(&self) -> f64 {
        self.successful_tasks as f64 / self.total_tasks.max(1) as f64
    }

    /// Fold one completed task into the counters. A negative or non-finite
    /// processing time counts as zero.
    pub fn record(&mut self, success: bool, processing_time: f64) {
        let processing_time = if processing_time.is_finite() {
            processing_time.max(0.0)
        } else {
            0.0
        };
        self.total_tasks += 1;
        if success {
            self.successful_tasks += 1;
        } else {
            self.failed_tasks += 1;
        }
        let n = self.total_tasks as f64;
        self.avg_processing_time = (self.avg_processing_time * (n - 1.0) + processing_time) / n;
        self.health_score = (self.success_rate() * 1.2).min(1.0);
        self.last_activity = Some(Utc::now());
    }

    /// The monitoring view of these metrics.
    pub fn view(&self) -> CapabilityMetrics {
        CapabilityMetrics {
            total_tasks: self.total_tasks,
            success_rate: self.success_rate(),
            avg_processing_time: self.avg_processing_time,
            current_load: self.current_load,
            health_score: self.health_score,
            last_activity: self.last_activity,
        }
    }
}

/// Monitoring view of one capability's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityMetrics {
    /// Tasks recorded so far.
    pub total_tasks: u64,
    /// Successful over total.
    pub success_rate: f64,
    /// Mean processing time in seconds.
    pub avg_processing_time: f64,
    /// Tasks currently in flight.
    pub current_load: usize,
    /// Health score in `[0, 1]`.
    pub health_score: f64,
    /// Time of the last recorded task.
    pub last_activity: Option<DateTime<Utc>>,
}

/// Per-capability metrics store.
pub struct MetricsTracker {
    metrics: HashMap<Capability, AgentMetrics>,
}

impl MetricsTracker {
    /// A tracker with an entry for every known capability.
    pub fn new() -> Self {
        Self {
            metrics: Capability::ALL
                .into_iter()
                .map(|c| (c, AgentMetrics::new(c)))
                .collect(),
        }
    }

    fn entry(&mut self, capability: Capability) -> &mut AgentMetrics {
        self.metrics
            .entry(capability)
            .or_insert_with(|| AgentMetrics::new(capability))
    }

    /// Record one completed task for `capability`.
    pub fn record(&mut self, capability: Capability, success: bool, processing_time: f64) {
        self.entry(capability).record(success, processing_time);
    }

    /// One more task in flight.
    pub fn task_started(&mut self, capability: Capability) {
        self.entry(capability).current_load += 1;
    }

    /// One task fewer in flight. Never goes below zero.
    pub fn task_finished(&mut self, capability: Capability) {
        let m = self.entry(capability);
        m.current_load = m.current_load.saturating_sub(1);
    }

    /// Overwrite every capability's load from an authoritative count.
    pub fn reconcile_load(&mut self, loads: &HashMap<Capability, usize>) {
        for (capability, metrics) in &mut self.metrics {
            metrics.current_load = loads.get(capability).copied().unwrap_or(0);
        }
    }

    /// Metrics of one capability.
    pub fn get(&self, capability: Capability) -> Option<&AgentMetrics> {
        self.metrics.get(&capability)
    }

    /// Monitoring view of every capability, in capability order.
    pub fn snapshot(&self) -> BTreeMap<Capability, CapabilityMetrics> {
        self.metrics.iter().map(|(c, m)| (*c, m.view())).collect()
    }

    /// Number of capabilities tracked.
    pub fn monitored(&self) -> usize {
        self.metrics.len()
    }

    /// Capabilities whose health score is above `threshold`.
    pub fn healthy_count(&self, threshold: f64) -> usize {
        self.metrics
            .values()
            .filter(|m| m.health_score > threshold)
            .count()
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
