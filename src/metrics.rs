//! Outcome counters for triage calls.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use serde::Serialize;

use crate::models::Priority;

#[derive(Debug, Default)]
pub struct TriageMetrics {
    /// Total classify calls
    requests: AtomicU64,
    /// Calls answered from a parsed classifier reply
    classified: AtomicU64,
    high: AtomicU64,
    medium: AtomicU64,
    low: AtomicU64,
    /// Fallbacks keyed by failure kind
    fallbacks: RwLock<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub classified: u64,
    pub fallbacks: BTreeMap<String, u64>,
    pub by_priority: BTreeMap<String, u64>,
}

impl TriageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_classified(&self, priority: Priority) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.classified.fetch_add(1, Ordering::Relaxed);
        self.priority_counter(priority).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self, kind: &str) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.low.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut fallbacks) = self.fallbacks.write() {
            *fallbacks.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let fallbacks = self
            .fallbacks
            .read()
            .map(|f| f.clone())
            .unwrap_or_default();

        let by_priority = [Priority::High, Priority::Medium, Priority::Low]
            .into_iter()
            .map(|p| {
                (
                    p.as_str().to_string(),
                    self.priority_counter(p).load(Ordering::Relaxed),
                )
            })
            .collect();

        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            classified: self.classified.load(Ordering::Relaxed),
            fallbacks,
            by_priority,
        }
    }

    fn priority_counter(&self, priority: Priority) -> &AtomicU64 {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_outcomes() {
        let metrics = TriageMetrics::new();
        metrics.record_classified(Priority::High);
        metrics.record_classified(Priority::Medium);
        metrics.record_fallback("timeout");
        metrics.record_fallback("timeout");
        metrics.record_fallback("no_json_object");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 5);
        assert_eq!(snapshot.classified, 2);
        assert_eq!(snapshot.fallbacks["timeout"], 2);
        assert_eq!(snapshot.fallbacks["no_json_object"], 1);
        assert_eq!(snapshot.by_priority["LOW"], 3);
        assert_eq!(snapshot.by_priority["HIGH"], 1);
    }
}
