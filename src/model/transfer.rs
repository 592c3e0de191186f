use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-destination status, persisted into `status/<destination>.json`
/// in the archive (§4.F). Allowed transitions: `PENDING -> PROCESSING ->
/// {SUCCESS, FAILED}`; `FAILED -> RETRY_PENDING -> PROCESSING -> ...`
/// until `attempts >= max_retries`, at which point `FAILED` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DestinationStatus {
    Pending,
    Processing,
    Success,
    Failed,
    RetryPending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationResult {
    pub name: String,
    pub status: DestinationStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
    pub files_transferred: u64,
    pub attempts: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl DestinationResult {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: DestinationStatus::Pending,
            message: None,
            duration_ms: 0,
            files_transferred: 0,
            attempts: 0,
            last_attempt_at: None,
            next_retry_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DestinationStatus::Success | DestinationStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Received,
    Processing,
    Forwarding,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    pub route_ae: String,
    pub study_instance_uid: String,
    pub arrival_time: DateTime<Utc>,
    pub file_count: usize,
    pub total_bytes: u64,
    pub status: TransferStatus,
    pub destinations: Vec<DestinationResult>,
}

impl TransferRecord {
    pub fn new(route_ae: impl Into<String>, study_instance_uid: impl Into<String>, file_count: usize, total_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_ae: route_ae.into(),
            study_instance_uid: study_instance_uid.into(),
            arrival_time: Utc::now(),
            file_count,
            total_bytes,
            status: TransferStatus::Received,
            destinations: Vec::new(),
        }
    }

    /// Recompute overall status from per-destination terminal results
    /// (§3 invariant): all SUCCESS -> COMPLETED, mixed -> PARTIAL, none
    /// SUCCESS -> FAILED. Only called once every destination result is
    /// terminal.
    pub fn recompute_status(&mut self) {
        if !self.destinations.iter().all(|d| d.is_terminal()) {
            return;
        }

        let success_count = self
            .destinations
            .iter()
            .filter(|d| d.status == DestinationStatus::Success)
            .count();

        self.status = if success_count == 0 {
            TransferStatus::Failed
        } else if success_count == self.destinations.len() {
            TransferStatus::Completed
        } else {
            TransferStatus::Partial
        };
    }

    pub fn destination_mut(&mut self, name: &str) -> Option<&mut DestinationResult> {
        self.destinations.iter_mut().find(|d| d.name == name)
    }
}
