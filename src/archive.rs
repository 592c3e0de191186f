//! Study Archive (§4.F): the durable, per-study record of what was
//! received, what was sent where, and how that send went. Every write
//! lands in a sibling `.tmp` path and is renamed into place so a crash
//! mid-write never leaves a half-written file where a reader expects a
//! complete one — the same staged-write discipline the receiver uses
//! for incoming instances.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::model::{DestinationResult, DestinationStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub route_ae: String,
    pub study_instance_uid: String,
    pub archived_at: DateTime<Utc>,
    pub file_count: usize,
    pub total_bytes: u64,
    pub has_anonymized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedStudySummary {
    pub route_ae: String,
    pub study_instance_uid: String,
    pub archived_at: DateTime<Utc>,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedStudy {
    pub manifest: Manifest,
    pub destinations: Vec<DestinationResult>,
}

pub struct StudyArchive {
    root: PathBuf,
}

impl StudyArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn study_dir(&self, route_ae: &str, study_uid: &str) -> PathBuf {
        self.root.join(route_ae).join(study_uid)
    }

    async fn stage_and_rename(dest: &Path, bytes_src: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = dest.with_extension("tmp");
        fs::copy(bytes_src, &tmp).await?;
        fs::rename(&tmp, dest).await?;
        Ok(())
    }

    /// Copies one original instance into `original/<sop_instance_uid>.dcm`.
    pub async fn archive_original(&self, route_ae: &str, study_uid: &str, sop_instance_uid: &str, src: &Path) -> Result<()> {
        let dest = self.study_dir(route_ae, study_uid).join("original").join(format!("{sop_instance_uid}.dcm"));
        Self::stage_and_rename(&dest, src).await
    }

    /// Copies one anonymized instance into `anonymized/<sop_instance_uid>.dcm`.
    pub async fn archive_anonymized(&self, route_ae: &str, study_uid: &str, sop_instance_uid: &str, src: &Path) -> Result<()> {
        let dest = self.study_dir(route_ae, study_uid).join("anonymized").join(format!("{sop_instance_uid}.dcm"));
        Self::stage_and_rename(&dest, src).await
    }

    pub async fn original_instance_path(&self, route_ae: &str, study_uid: &str, sop_instance_uid: &str) -> PathBuf {
        self.study_dir(route_ae, study_uid).join("original").join(format!("{sop_instance_uid}.dcm"))
    }

    pub async fn anonymized_instance_path(&self, route_ae: &str, study_uid: &str, sop_instance_uid: &str) -> Option<PathBuf> {
        let path = self.study_dir(route_ae, study_uid).join("anonymized").join(format!("{sop_instance_uid}.dcm"));
        if fs::metadata(&path).await.is_ok() {
            Some(path)
        } else {
            None
        }
    }

    /// List every anonymized SOP instance UID archived for a study, if
    /// any anonymized set exists at all.
    pub async fn anonymized_instance_uids(&self, route_ae: &str, study_uid: &str) -> Vec<String> {
        self.instance_uids_in(route_ae, study_uid, "anonymized").await
    }

    /// List every original SOP instance UID archived for a study —
    /// used by the Retry Manager to rebuild the file list for a resend
    /// when no anonymized set exists (§4.J).
    pub async fn original_instance_uids(&self, route_ae: &str, study_uid: &str) -> Vec<String> {
        self.instance_uids_in(route_ae, study_uid, "original").await
    }

    async fn instance_uids_in(&self, route_ae: &str, study_uid: &str, subdir: &str) -> Vec<String> {
        let dir = self.study_dir(route_ae, study_uid).join(subdir);
        let mut out = Vec::new();
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            return out;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                out.push(stem.to_string());
            }
        }
        out
    }

    pub async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let dest = self.study_dir(&manifest.route_ae, &manifest.study_instance_uid).join("study.json");
        let tmp = dest.with_extension("tmp");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| CoreError::ArchiveIOFailed(e.to_string()))?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    async fn read_manifest(&self, route_ae: &str, study_uid: &str) -> Option<Manifest> {
        let path = self.study_dir(route_ae, study_uid).join("study.json");
        let bytes = fs::read(&path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Per-destination status record, written to
    /// `status/<destination>.json`. Status transitions are the caller's
    /// responsibility (§4.F); this only persists the current value.
    pub async fn write_status(&self, route_ae: &str, study_uid: &str, result: &DestinationResult) -> Result<()> {
        let dest = self.study_dir(route_ae, study_uid).join("status").join(format!("{}.json", result.name));
        let tmp = dest.with_extension("tmp");
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(result).map_err(|e| CoreError::ArchiveIOFailed(e.to_string()))?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &dest).await?;
        Ok(())
    }

    pub async fn read_status(&self, route_ae: &str, study_uid: &str, destination: &str) -> Option<DestinationResult> {
        let path = self.study_dir(route_ae, study_uid).join("status").join(format!("{destination}.json"));
        let bytes = fs::read(&path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// All per-destination status records for a study. Readers tolerate
    /// a partial `status/` directory (§4.F) — a destination whose first
    /// attempt hasn't been recorded yet simply doesn't appear.
    pub async fn list_statuses(&self, route_ae: &str, study_uid: &str) -> Vec<DestinationResult> {
        let dir = self.study_dir(route_ae, study_uid).join("status");
        let mut out = Vec::new();
        let Ok(mut entries) = fs::read_dir(&dir).await else {
            return out;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(bytes) = fs::read(entry.path()).await {
                if let Ok(result) = serde_json::from_slice::<DestinationResult>(&bytes) {
                    out.push(result);
                }
            }
        }
        out
    }

    /// Destination status records across the whole archive still
    /// needing attention (§4.J): `FAILED` or `RETRY_PENDING` with
    /// `attempts < max_retries`.
    pub async fn pending_retries(&self, max_retries: u32) -> Vec<(String, String, DestinationResult)> {
        let mut out = Vec::new();
        let Ok(mut routes) = fs::read_dir(&self.root).await else {
            return out;
        };
        while let Ok(Some(route_entry)) = routes.next_entry().await {
            if !route_entry.path().is_dir() {
                continue;
            }
            let route_ae = route_entry.file_name().to_string_lossy().to_string();
            let Ok(mut studies) = fs::read_dir(route_entry.path()).await else {
                continue;
            };
            while let Ok(Some(study_entry)) = studies.next_entry().await {
                if !study_entry.path().is_dir() {
                    continue;
                }
                let study_uid = study_entry.file_name().to_string_lossy().to_string();
                for result in self.list_statuses(&route_ae, &study_uid).await {
                    let retryable = matches!(result.status, DestinationStatus::Failed | DestinationStatus::RetryPending) && result.attempts < max_retries;
                    if retryable {
                        out.push((route_ae.clone(), study_uid.clone(), result));
                    }
                }
            }
        }
        out
    }

    pub async fn list_archived_studies(&self, route_ae: &str, limit: usize) -> Vec<ArchivedStudySummary> {
        let route_dir = self.root.join(route_ae);
        let mut summaries = Vec::new();

        let Ok(mut entries) = fs::read_dir(&route_dir).await else {
            return summaries;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.path().is_dir() {
                continue;
            }
            let study_uid = entry.file_name().to_string_lossy().to_string();
            if let Some(manifest) = self.read_manifest(route_ae, &study_uid).await {
                summaries.push(ArchivedStudySummary {
                    route_ae: route_ae.to_string(),
                    study_instance_uid: study_uid,
                    archived_at: manifest.archived_at,
                    file_count: manifest.file_count,
                });
            }
        }

        summaries.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
        summaries.truncate(limit);
        summaries
    }

    pub async fn get_archived_study(&self, route_ae: &str, study_uid: &str) -> Option<ArchivedStudy> {
        let manifest = self.read_manifest(route_ae, study_uid).await?;
        let destinations = self.list_statuses(route_ae, study_uid).await;
        Some(ArchivedStudy { manifest, destinations })
    }

    /// Removes archived studies older than `retention_days` whose
    /// destinations are all in a terminal state (§4.F).
    pub async fn clean_expired(&self, retention_days: u32) -> usize {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);
        let mut removed = 0;

        let Ok(mut routes) = fs::read_dir(&self.root).await else {
            return removed;
        };
        while let Ok(Some(route_entry)) = routes.next_entry().await {
            if !route_entry.path().is_dir() {
                continue;
            }
            let route_ae = route_entry.file_name().to_string_lossy().to_string();
            let Ok(mut studies) = fs::read_dir(route_entry.path()).await else {
                continue;
            };
            while let Ok(Some(study_entry)) = studies.next_entry().await {
                if !study_entry.path().is_dir() {
                    continue;
                }
                let study_uid = study_entry.file_name().to_string_lossy().to_string();
                let Some(manifest) = self.read_manifest(&route_ae, &study_uid).await else {
                    continue;
                };
                if manifest.archived_at > cutoff {
                    continue;
                }
                let statuses = self.list_statuses(&route_ae, &study_uid).await;
                let all_terminal = statuses.iter().all(|s| s.is_terminal());
                if all_terminal {
                    if let Err(e) = fs::remove_dir_all(study_entry.path()).await {
                        warn!(route = %route_ae, study = %study_uid, error = %e, "failed to remove expired archived study");
                    } else {
                        removed += 1;
                        info!(route = %route_ae, study = %study_uid, "removed expired archived study");
                    }
                }
            }
        }

        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest(route: &str, study: &str) -> Manifest {
        Manifest {
            route_ae: route.to_string(),
            study_instance_uid: study.to_string(),
            archived_at: Utc::now(),
            file_count: 1,
            total_bytes: 100,
            has_anonymized: false,
        }
    }

    #[tokio::test]
    async fn archive_original_stages_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let archive = StudyArchive::new(dir.path());

        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("in.dcm");
        tokio::fs::write(&src, b"dicom bytes").await.unwrap();

        archive.archive_original("ROUTE1", "1.2.3", "1.2.3.4", &src).await.unwrap();

        let dest = archive.original_instance_path("ROUTE1", "1.2.3", "1.2.3.4").await;
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"dicom bytes");
        assert!(!dest.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn list_archived_studies_sorts_descending_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let archive = StudyArchive::new(dir.path());

        for (study, offset_secs) in [("s1", 30), ("s2", 10), ("s3", 20)] {
            let mut manifest = sample_manifest("ROUTE1", study);
            manifest.archived_at = Utc::now() - chrono::Duration::seconds(offset_secs);
            archive.write_manifest(&manifest).await.unwrap();
        }

        let summaries = archive.list_archived_studies("ROUTE1", 2).await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].study_instance_uid, "s2");
        assert_eq!(summaries[1].study_instance_uid, "s3");
    }

    #[tokio::test]
    async fn clean_expired_only_removes_terminal_studies_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let archive = StudyArchive::new(dir.path());

        let mut old_terminal = sample_manifest("ROUTE1", "old-terminal");
        old_terminal.archived_at = Utc::now() - chrono::Duration::days(100);
        archive.write_manifest(&old_terminal).await.unwrap();
        archive
            .write_status(
                "ROUTE1",
                "old-terminal",
                &DestinationResult {
                    name: "dest1".to_string(),
                    status: DestinationStatus::Success,
                    message: Some("ok".to_string()),
                    duration_ms: 10,
                    files_transferred: 1,
                    attempts: 1,
                    last_attempt_at: Some(Utc::now()),
                    next_retry_at: None,
                },
            )
            .await
            .unwrap();

        let mut old_pending = sample_manifest("ROUTE1", "old-pending");
        old_pending.archived_at = Utc::now() - chrono::Duration::days(100);
        archive.write_manifest(&old_pending).await.unwrap();
        archive
            .write_status(
                "ROUTE1",
                "old-pending",
                &DestinationResult {
                    name: "dest1".to_string(),
                    status: DestinationStatus::RetryPending,
                    message: Some("retrying".to_string()),
                    duration_ms: 10,
                    files_transferred: 0,
                    attempts: 1,
                    last_attempt_at: Some(Utc::now()),
                    next_retry_at: Some(Utc::now()),
                },
            )
            .await
            .unwrap();

        let removed = archive.clean_expired(90).await;
        assert_eq!(removed, 1);
        assert!(archive.get_archived_study("ROUTE1", "old-terminal").await.is_none());
        assert!(archive.get_archived_study("ROUTE1", "old-pending").await.is_some());
    }
}
