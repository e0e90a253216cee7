use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Running statistics for one tool name.
///
/// `average_latency_ms` and `success_rate` are true running means, updated
/// with weight `1/calls` on every completed dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageRecord {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub last_called_at: Option<DateTime<Utc>>,
}

impl UsageRecord {
    pub fn record(&mut self, success: bool, latency_ms: f64, at: DateTime<Utc>) {
        self.calls += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        let n = self.calls as f64;
        let indicator = if success { 1.0 } else { 0.0 };
        self.average_latency_ms = self.average_latency_ms * (n - 1.0) / n + latency_ms / n;
        self.success_rate = self.success_rate * (n - 1.0) / n + indicator / n;
        self.last_called_at = Some(at);
    }
}

/// One entry of the append-only lesson log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRecord {
    pub text: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub applied: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut record = UsageRecord::default();
        let now = Utc::now();

        record.record(true, 100.0, now);
        record.record(false, 300.0, now);
        record.record(true, 200.0, now);

        assert_eq!(record.calls, 3);
        assert_eq!(record.successes, 2);
        assert_eq!(record.failures, 1);
        assert!((record.average_latency_ms - 200.0).abs() < 1e-9);
        assert!((record.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(record.last_called_at, Some(now));
    }

    #[test]
    fn test_first_call_sets_exact_values() {
        let mut record = UsageRecord::default();
        record.record(false, 42.5, Utc::now());

        assert_eq!(record.average_latency_ms, 42.5);
        assert_eq!(record.success_rate, 0.0);
    }

    #[test]
    fn test_camel_case_serialization() {
        let mut record = UsageRecord::default();
        record.record(true, 10.0, Utc::now());

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("averageLatencyMs").is_some());
        assert!(json.get("lastCalledAt").is_some());
        assert!(json.get("successRate").is_some());
    }
}
