//! In-memory statistics collaborator.
//!
//! The one process-wide mutable structure touched by the request path.
//! Writes are serialized behind a mutex; the store keeps monotonic
//! counters plus a bounded ring of recent request records for the
//! (external) dashboard to read.  Nothing here persists, and no record
//! field can hold inspected content.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Ring capacity for recent request records.
const RECENT_CAPACITY: usize = 100;

// ── Record types ───────────────────────────────────────────────────────

/// Outcome classification of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Forwarded upstream.
    Allowed,
    /// Rejected by a security filter.
    Blocked,
    /// Failed at the proxy layer.
    Error,
}

impl RequestStatus {
    /// Stable label for metrics and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

/// One request's outcome, as stored in the recent ring.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    /// Request id.
    pub id: String,
    /// When the request was recorded.
    pub timestamp: DateTime<Utc>,
    /// Outcome classification.
    pub status: RequestStatus,
    /// Number of PII findings.
    pub pii_count: usize,
    /// Highest injection confidence observed.
    pub injection_score: f32,
    /// Entry-to-response-start latency.
    pub latency_ms: f64,
    /// Requested model id.
    pub model: String,
}

/// Monotonic counters since process start.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// Requests recorded.
    pub total_requests: u64,
    /// Requests blocked by a filter.
    pub blocked_requests: u64,
    /// PII findings across all requests.
    pub pii_detected: u64,
    /// Requests whose injection score crossed the threshold.
    pub injection_detected: u64,
    /// When the store was created.
    pub start_time: DateTime<Utc>,
}

// ── StatsStore ─────────────────────────────────────────────────────────

struct Inner {
    snapshot: StatsSnapshot,
    recent: VecDeque<RequestRecord>,
}

/// Mutex-serialized statistics store.
pub struct StatsStore {
    injection_threshold: f32,
    inner: Mutex<Inner>,
}

impl StatsStore {
    /// Create a store; `injection_threshold` decides which scores count
    /// as detections.
    #[must_use]
    pub fn new(injection_threshold: f32) -> Self {
        Self {
            injection_threshold,
            inner: Mutex::new(Inner {
                snapshot: StatsSnapshot {
                    total_requests: 0,
                    blocked_requests: 0,
                    pii_detected: 0,
                    injection_detected: 0,
                    start_time: Utc::now(),
                },
                recent: VecDeque::with_capacity(RECENT_CAPACITY),
            }),
        }
    }

    /// Record one request outcome.
    pub fn record_request(&self, record: RequestRecord) {
        let Ok(mut inner) = self.inner.lock() else {
            // A poisoned lock means a panic mid-update; stats are advisory,
            // so drop the record rather than propagate.
            return;
        };

        inner.snapshot.total_requests += 1;
        if record.status == RequestStatus::Blocked {
            inner.snapshot.blocked_requests += 1;
        }
        inner.snapshot.pii_detected += record.pii_count as u64;
        if record.injection_score >= self.injection_threshold {
            inner.snapshot.injection_detected += 1;
        }

        if inner.recent.len() == RECENT_CAPACITY {
            inner.recent.pop_back();
        }
        inner.recent.push_front(record);
    }

    /// Current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .map(|inner| inner.snapshot.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().snapshot.clone())
    }

    /// Recent records, newest first.
    #[must_use]
    pub fn recent(&self) -> Vec<RequestRecord> {
        self.inner
            .lock()
            .map(|inner| inner.recent.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: RequestStatus, pii: usize, injection: f32) -> RequestRecord {
        RequestRecord {
            id: "req".into(),
            timestamp: Utc::now(),
            status,
            pii_count: pii,
            injection_score: injection,
            latency_ms: 1.5,
            model: "gpt-4".into(),
        }
    }

    #[test]
    fn counters_accumulate() {
        let store = StatsStore::new(0.7);
        store.record_request(record(RequestStatus::Allowed, 2, 0.0));
        store.record_request(record(RequestStatus::Blocked, 0, 0.84));
        store.record_request(record(RequestStatus::Error, 0, 0.0));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.blocked_requests, 1);
        assert_eq!(snapshot.pii_detected, 2);
        assert_eq!(snapshot.injection_detected, 1);
    }

    #[test]
    fn injection_detection_uses_threshold() {
        let store = StatsStore::new(0.9);
        store.record_request(record(RequestStatus::Allowed, 0, 0.8));
        assert_eq!(store.snapshot().injection_detected, 0);

        store.record_request(record(RequestStatus::Blocked, 0, 0.95));
        assert_eq!(store.snapshot().injection_detected, 1);
    }

    #[test]
    fn ring_is_bounded_and_newest_first() {
        let store = StatsStore::new(0.7);
        for i in 0..150 {
            let mut r = record(RequestStatus::Allowed, 0, 0.0);
            r.id = format!("req-{i}");
            store.record_request(r);
        }

        let recent = store.recent();
        assert_eq!(recent.len(), RECENT_CAPACITY);
        assert_eq!(recent[0].id, "req-149");
        assert_eq!(recent[RECENT_CAPACITY - 1].id, "req-50");
        // Counters keep the full total even as the ring drops records.
        assert_eq!(store.snapshot().total_requests, 150);
    }

    #[test]
    fn concurrent_writers_serialize() {
        use std::sync::Arc;

        let store = Arc::new(StatsStore::new(0.7));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    store.record_request(record(RequestStatus::Allowed, 1, 0.0));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.total_requests, 800);
        assert_eq!(snapshot.pii_detected, 800);
    }
}
