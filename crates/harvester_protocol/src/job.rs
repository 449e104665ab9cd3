//! Client -> daemon command requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::SettingsSnapshot;

/// One command request flowing through the job queue.
///
/// Jobs are never mutated after creation; the id matches the queue slot the
/// payload was written under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub requested_at: DateTime<Utc>,
    pub request: JobRequest,
}

/// The closed set of job kinds the daemon recognizes.
///
/// Unrecognized tags from a newer peer deserialize as [`JobRequest::Unknown`]
/// so the consumer can log them and keep its cursor moving.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum JobRequest {
    /// Run a folder scan and upload pass with this settings snapshot.
    Refresh { settings: SettingsSnapshot },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_round_trips() {
        let job = Job {
            id: 1,
            requested_at: Utc::now(),
            request: JobRequest::Refresh {
                settings: SettingsSnapshot::default(),
            },
        };
        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 1);
        assert!(matches!(back.request, JobRequest::Refresh { .. }));
    }

    #[test]
    fn unknown_kind_deserializes_to_unknown() {
        let json = r#"{"id":3,"requested_at":"2026-01-01T00:00:00Z",
                       "request":{"kind":"Reindex","payload":{}}}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert!(matches!(job.request, JobRequest::Unknown));
    }
}
