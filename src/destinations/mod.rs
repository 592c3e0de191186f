//! Destination fan-out (§4.D): one `DestinationClient` per configured
//! destination, behind a uniform probe/send contract. The concrete
//! transports (XNAT's REST import, a DICOM C-STORE peer, a plain
//! filesystem sink) are documented contracts this engine drives — the
//! wire protocols and storage targets themselves are owned elsewhere.

pub mod dicom_peer;
pub mod file_sink;
pub mod manager;
pub mod xnat;

pub use manager::DestinationManager;

use async_trait::async_trait;
use std::path::PathBuf;

/// A single processed file ready to hand to a destination. Distinct
/// from [`crate::model::Instance`]: this always points at the
/// post-anonymization artifact, never the original ingest path.
#[derive(Debug, Clone)]
pub struct FileToSend {
    pub path: PathBuf,
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
}

/// Resolved routing parameters for one destination send (§4.D, §4.C).
#[derive(Debug, Clone, Default)]
pub struct SendParams {
    pub study_instance_uid: String,
    pub patient_id: String,
    pub project_id: Option<String>,
    pub subject_label: Option<String>,
    pub session_label: Option<String>,
    pub calling_ae: Option<String>,
    pub modality: Option<String>,
    pub study_date: Option<String>,
    pub auto_archive: bool,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub files_transferred: usize,
    pub duration_ms: u64,
    pub message: String,
    /// Whether a failure is worth retrying later (network/5xx) as
    /// opposed to permanent (rejected SOP class, bad credentials).
    pub retryable: bool,
}

impl SendOutcome {
    pub fn success(files_transferred: usize, duration_ms: u64) -> Self {
        Self {
            success: true,
            files_transferred,
            duration_ms,
            message: "ok".to_string(),
            retryable: false,
        }
    }

    pub fn failure(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            files_transferred: 0,
            duration_ms: 0,
            message: message.into(),
            retryable,
        }
    }
}

#[async_trait]
pub trait DestinationClient: Send + Sync {
    /// Cheap liveness check (XNAT: `/xapi/siteConfig`; DICOM peer:
    /// C-ECHO; file sink: path exists and is writable).
    async fn probe(&self) -> bool;

    async fn send(&self, files: &[FileToSend], params: &SendParams) -> SendOutcome;
}
