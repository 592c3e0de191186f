//! Retry Manager (§4.J): a scheduler plus a small worker pool that
//! scans the archive for destination status records stuck in `FAILED`
//! or `RETRY_PENDING` and resends them until they succeed or exhaust
//! `max_retries`. Uses the same destination-send path as the Route
//! Processor (`resolve_send_params_raw` in `processor`), just sourcing
//! its files from the archive instead of a live `Study`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use dicom_core::Tag;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::archive::StudyArchive;
use crate::broker::HonestBroker;
use crate::config::{BackoffPolicy, DestinationBindingConfig, DestinationConfig, ResilienceConfig, RouteConfig};
use crate::destinations::{DestinationManager, FileToSend};
use crate::error::{CoreError, Result};
use crate::model::{DestinationResult, DestinationStatus};

const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
const MODALITY: Tag = Tag(0x0008, 0x0060);
const STUDY_DATE: Tag = Tag(0x0008, 0x0020);

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct RetryKey {
    route_ae: String,
    study_uid: String,
    destination: String,
}

pub struct RetryManager {
    archive: Arc<StudyArchive>,
    destinations: Arc<DestinationManager>,
    resilience: ResilienceConfig,
    routes: HashMap<String, RouteConfig>,
    destination_configs: HashMap<String, DestinationConfig>,
    brokers: HashMap<String, Arc<dyn HonestBroker>>,
    /// In-memory record of pending retry tasks, keyed by
    /// (route, study, destination) — prevents double-scheduling the
    /// same destination (§4.J `isRetryScheduled`).
    scheduled: Mutex<HashMap<RetryKey, JoinHandle<()>>>,
    executor: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl RetryManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resilience: ResilienceConfig,
        archive: Arc<StudyArchive>,
        destinations: Arc<DestinationManager>,
        routes: HashMap<String, RouteConfig>,
        destination_configs: HashMap<String, DestinationConfig>,
        brokers: HashMap<String, Arc<dyn HonestBroker>>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            archive,
            destinations,
            resilience,
            routes,
            destination_configs,
            brokers,
            scheduled: Mutex::new(HashMap::new()),
            executor: Arc::new(Semaphore::new(4)),
            shutdown,
        })
    }

    fn binding_for(&self, route_ae: &str, destination: &str) -> Option<&DestinationBindingConfig> {
        self.routes.get(route_ae)?.destinations.iter().find(|b| b.destination == destination)
    }

    fn next_retry_at(&self, binding: &DestinationBindingConfig, result: &DestinationResult) -> DateTime<Utc> {
        let last = result.last_attempt_at.unwrap_or_else(Utc::now);
        let delay_seconds = match &self.resilience.backoff {
            BackoffPolicy::Linear => binding.retry_delay_seconds,
            BackoffPolicy::Exponential { cap_seconds } => {
                let attempt = result.attempts.max(1);
                let scaled = binding.retry_delay_seconds.saturating_mul(1u64 << attempt.min(16));
                scaled.min(*cap_seconds)
            }
        };
        last + chrono::Duration::seconds(delay_seconds as i64)
    }

    fn max_retries_for(&self, binding: &DestinationBindingConfig) -> u32 {
        if binding.retry_count > 0 {
            binding.retry_count
        } else {
            self.resilience.max_retries
        }
    }

    /// Scheduler loop (§4.J): scans every `retry_scan_interval_seconds`
    /// until shutdown.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(StdDuration::from_secs(self.resilience.retry_scan_interval_seconds));

        loop {
            tokio::select! {
                _ = ticker.tick() => self.scan_once().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("retry manager shutting down");
                        self.cancel_all().await;
                        return;
                    }
                }
            }
        }
    }

    async fn scan_once(&self) {
        let max_retries = self.resilience.max_retries;
        let pending = self.archive.pending_retries(max_retries).await;
        if pending.is_empty() {
            return;
        }
        info!(count = pending.len(), "retry manager scan found pending destination statuses");

        for (route_ae, study_uid, result) in pending {
            let Some(binding) = self.binding_for(&route_ae, &result.name) else {
                warn!(route = %route_ae, destination = %result.name, "no route binding found for pending retry, skipping");
                continue;
            };
            if result.attempts >= self.max_retries_for(binding) {
                continue;
            }

            let next_at = self.next_retry_at(binding, &result);
            self.schedule(route_ae, study_uid, result.name.clone(), next_at).await;
        }
    }

    /// Schedules (or reschedules) one destination for retry at
    /// `next_at`. Transitions the status record to `RETRY_PENDING`
    /// immediately so it's observable in the archive/UI (§4.J), even
    /// when the actual send is deferred to the future.
    async fn schedule(self: &Arc<Self>, route_ae: String, study_uid: String, destination: String, next_at: DateTime<Utc>) {
        let key = RetryKey {
            route_ae: route_ae.clone(),
            study_uid: study_uid.clone(),
            destination: destination.clone(),
        };

        {
            let scheduled = self.scheduled.lock().await;
            if scheduled.contains_key(&key) {
                return;
            }
        }

        if let Some(mut result) = self.archive.read_status(&route_ae, &study_uid, &destination).await {
            if result.status != DestinationStatus::RetryPending {
                result.status = DestinationStatus::RetryPending;
                result.next_retry_at = Some(next_at);
                if let Err(e) = self.archive.write_status(&route_ae, &study_uid, &result).await {
                    error!(route = %route_ae, study = %study_uid, destination = %destination, error = %e, "failed to persist RETRY_PENDING status");
                }
            }
        }

        let delay = (next_at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.execute(route_ae.clone(), study_uid.clone(), destination.clone()).await;
            this.scheduled.lock().await.remove(&RetryKey { route_ae, study_uid, destination });
        });

        self.scheduled.lock().await.insert(key, handle);
    }

    /// Runs one retry attempt end to end: `RETRY_PENDING -> PROCESSING`,
    /// resend, then `SUCCESS` or `FAILED`/scheduled-again (§4.J).
    async fn execute(&self, route_ae: String, study_uid: String, destination: String) {
        let _permit = match self.executor.acquire().await {
            Ok(p) => p,
            Err(_) => return,
        };

        let Some(mut result) = self.archive.read_status(&route_ae, &study_uid, &destination).await else {
            warn!(route = %route_ae, study = %study_uid, destination = %destination, "retry fired for a status record that no longer exists");
            return;
        };

        let Some(binding) = self.binding_for(&route_ae, &destination) else {
            return;
        };
        let max_retries = self.max_retries_for(binding);

        result.status = DestinationStatus::Processing;
        result.attempts += 1;
        result.last_attempt_at = Some(Utc::now());
        let _ = self.archive.write_status(&route_ae, &study_uid, &result).await;

        let start = std::time::Instant::now();
        let outcome = self.attempt_send(&route_ae, &study_uid, binding).await;

        result.duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(send_outcome) if send_outcome.success => {
                result.status = DestinationStatus::Success;
                result.files_transferred = send_outcome.files_transferred as u64;
                result.message = Some(send_outcome.message);
                result.next_retry_at = None;
                info!(route = %route_ae, study = %study_uid, destination = %destination, attempts = result.attempts, "retry succeeded");
            }
            Ok(send_outcome) => {
                result.message = Some(send_outcome.message);
                self.finish_failed_attempt(&mut result, binding, max_retries);
            }
            Err(e) => {
                result.message = Some(e.to_string());
                self.finish_failed_attempt(&mut result, binding, max_retries);
            }
        }

        if let Err(e) = self.archive.write_status(&route_ae, &study_uid, &result).await {
            error!(route = %route_ae, study = %study_uid, destination = %destination, error = %e, "failed to persist retry outcome");
        }

        // A destination left in RETRY_PENDING here is picked up again
        // by the next periodic `scan_once` rather than self-chaining —
        // simpler, and avoids racing this task's own removal from
        // `scheduled` against a nested re-insertion under the same key.
    }

    fn finish_failed_attempt(&self, result: &mut DestinationResult, binding: &DestinationBindingConfig, max_retries: u32) {
        if result.attempts >= max_retries {
            result.status = DestinationStatus::Failed;
            result.next_retry_at = None;
            warn!(destination = %binding.destination, attempts = result.attempts, "retry cap reached, destination failed terminally");
        } else {
            result.status = DestinationStatus::RetryPending;
            result.next_retry_at = Some(self.next_retry_at(binding, result));
        }
    }

    /// Rebuilds the file list and send params, then invokes the same
    /// destination client the Route Processor uses. Prefers anonymized
    /// files when the binding requested anonymization and an anonymized
    /// set was archived; falls back to originals otherwise (§4.J).
    async fn attempt_send(&self, route_ae: &str, study_uid: &str, binding: &DestinationBindingConfig) -> Result<crate::destinations::SendOutcome> {
        let destination_config = self
            .destination_configs
            .get(&binding.destination)
            .ok_or_else(|| CoreError::DestinationUnavailable(format!("destination {} not configured", binding.destination)))?;

        let anonymized_uids = if binding.anonymize {
            self.archive.anonymized_instance_uids(route_ae, study_uid).await
        } else {
            Vec::new()
        };

        let (uids, subdir): (Vec<String>, &str) = if !anonymized_uids.is_empty() {
            (anonymized_uids, "anonymized")
        } else {
            (self.archive.original_instance_uids(route_ae, study_uid).await, "original")
        };

        if uids.is_empty() {
            return Err(CoreError::ArchiveIOFailed(format!("no archived files found for study {study_uid}")));
        }

        let mut files = Vec::with_capacity(uids.len());
        for sop_instance_uid in &uids {
            let path = if subdir == "anonymized" {
                self.archive.anonymized_instance_path(route_ae, study_uid, sop_instance_uid).await.unwrap_or_default()
            } else {
                self.archive.original_instance_path(route_ae, study_uid, sop_instance_uid).await
            };
            let instance = crate::model::Instance::from_path(&path)?;
            files.push(FileToSend {
                path,
                sop_class_uid: instance.sop_class_uid,
                sop_instance_uid: instance.sop_instance_uid,
            });
        }

        let (raw_patient_id, raw_accession, raw_modality, raw_study_date) = self.read_identifiers(route_ae, study_uid).await;
        let requires_session = matches!(destination_config, DestinationConfig::Xnat { .. });

        let params = crate::processor::resolve_send_params_raw(
            &self.brokers,
            binding,
            study_uid,
            None,
            &raw_patient_id,
            &raw_accession,
            raw_modality.as_deref(),
            raw_study_date.as_deref(),
            requires_session,
        )
        .await?;

        if !self.destinations.is_available(&binding.destination).await {
            self.destinations.check(&binding.destination).await;
        }

        Ok(self.destinations.send(&binding.destination, &files, &params).await)
    }

    /// Reads PatientID/AccessionNumber off whichever original instance
    /// is archived first — identical source the Route Processor reads
    /// from, since honest-broker lookups always key off the raw source
    /// identifiers, never the anonymized ones.
    async fn read_identifiers(&self, route_ae: &str, study_uid: &str) -> (String, String, Option<String>, Option<String>) {
        let uids = self.archive.original_instance_uids(route_ae, study_uid).await;
        let Some(first) = uids.first() else {
            return (String::new(), String::new(), None, None);
        };
        let path = self.archive.original_instance_path(route_ae, study_uid, first).await;
        let Ok(obj) = dicom_object::open_file(&path) else {
            return (String::new(), String::new(), None, None);
        };
        let read = |tag| obj.element(tag).ok().and_then(|e| e.string().ok()).map(|s| s.trim().to_string());
        let patient_id = read(PATIENT_ID).unwrap_or_default();
        let accession = read(ACCESSION_NUMBER).unwrap_or_default();
        let modality = read(MODALITY).filter(|s| !s.is_empty());
        let study_date = read(STUDY_DATE).filter(|s| !s.is_empty());
        (patient_id, accession, modality, study_date)
    }

    async fn cancel_all(&self) {
        let mut scheduled = self.scheduled.lock().await;
        for (_, handle) in scheduled.drain() {
            handle.abort();
        }
    }

    /// Manual API (§4.J): cancel any pending task for (route, study,
    /// destination) and schedule it immediately.
    pub async fn retry_destination(self: &Arc<Self>, route_ae: &str, study_uid: &str, destination: &str) -> Result<()> {
        let key = RetryKey {
            route_ae: route_ae.to_string(),
            study_uid: study_uid.to_string(),
            destination: destination.to_string(),
        };
        if let Some(handle) = self.scheduled.lock().await.remove(&key) {
            handle.abort();
        }

        self.binding_for(route_ae, destination)
            .ok_or_else(|| CoreError::Config(format!("no binding for destination {destination} on route {route_ae}")))?;

        self.schedule(route_ae.to_string(), study_uid.to_string(), destination.to_string(), Utc::now()).await;
        Ok(())
    }

    /// Manual API (§4.J): retry every non-terminal destination for a
    /// study immediately.
    pub async fn retry_all_failed(self: &Arc<Self>, route_ae: &str, study_uid: &str) -> Result<()> {
        for result in self.archive.list_statuses(route_ae, study_uid).await {
            if !result.is_terminal() {
                self.retry_destination(route_ae, study_uid, &result.name).await?;
            }
        }
        Ok(())
    }

    pub async fn is_retry_scheduled(&self, route_ae: &str, study_uid: &str, destination: &str) -> bool {
        let key = RetryKey {
            route_ae: route_ae.to_string(),
            study_uid: study_uid.to_string(),
            destination: destination.to_string(),
        };
        self.scheduled.lock().await.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DestinationBindingConfig, RouteConfig};

    fn binding(name: &str) -> DestinationBindingConfig {
        DestinationBindingConfig {
            destination: name.to_string(),
            anonymize: false,
            anon_script: None,
            project_id: None,
            subject_prefix: None,
            session_prefix: None,
            use_honest_broker: false,
            honest_broker: None,
            auto_archive: false,
            priority: 0,
            retry_count: 2,
            retry_delay_seconds: 1,
            enabled: true,
        }
    }

    fn route(ae: &str, bindings: Vec<DestinationBindingConfig>) -> RouteConfig {
        RouteConfig {
            ae_title: ae.to_string(),
            port: 11112,
            worker_threads: 4,
            max_concurrent_transfers: 8,
            study_timeout_seconds: 30,
            max_study_age_seconds: None,
            enabled: true,
            destinations: bindings,
        }
    }

    fn manager_with(routes: HashMap<String, RouteConfig>, resilience: ResilienceConfig, archive: Arc<StudyArchive>) -> Arc<RetryManager> {
        let (_tx, shutdown) = watch::channel(false);
        let destinations = Arc::new(DestinationManager::new(shutdown.clone()));
        RetryManager::new(resilience, archive, destinations, routes, HashMap::new(), HashMap::new(), shutdown)
    }

    #[tokio::test]
    async fn scan_skips_destinations_with_no_route_binding() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(StudyArchive::new(dir.path()));
        archive
            .write_status(
                "ROUTE1",
                "1.2.3",
                &DestinationResult {
                    name: "ghost".to_string(),
                    status: DestinationStatus::Failed,
                    message: None,
                    duration_ms: 0,
                    files_transferred: 0,
                    attempts: 1,
                    last_attempt_at: Some(Utc::now() - chrono::Duration::seconds(10)),
                    next_retry_at: None,
                },
            )
            .await
            .unwrap();

        let mgr = manager_with(HashMap::new(), ResilienceConfig::default(), archive.clone());
        mgr.scan_once().await;

        let status = archive.read_status("ROUTE1", "1.2.3", "ghost").await.unwrap();
        assert_eq!(status.status, DestinationStatus::Failed);
    }

    #[tokio::test]
    async fn scan_marks_eligible_destination_retry_pending_and_schedules_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(StudyArchive::new(dir.path()));
        archive
            .write_status(
                "ROUTE1",
                "1.2.3",
                &DestinationResult {
                    name: "dest1".to_string(),
                    status: DestinationStatus::Failed,
                    message: Some("boom".to_string()),
                    duration_ms: 0,
                    files_transferred: 0,
                    attempts: 1,
                    last_attempt_at: Some(Utc::now()),
                    next_retry_at: None,
                },
            )
            .await
            .unwrap();

        let mut routes = HashMap::new();
        let mut b = binding("dest1");
        b.retry_delay_seconds = 3600;
        routes.insert("ROUTE1".to_string(), route("ROUTE1", vec![b]));

        let mgr = manager_with(routes, ResilienceConfig::default(), archive.clone());
        mgr.scan_once().await;

        let status = archive.read_status("ROUTE1", "1.2.3", "dest1").await.unwrap();
        assert_eq!(status.status, DestinationStatus::RetryPending);
        assert!(mgr.is_retry_scheduled("ROUTE1", "1.2.3", "dest1").await);

        // Second scan must not double-schedule the same destination.
        mgr.scan_once().await;
        assert_eq!(mgr.scheduled.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn retry_cap_reached_marks_failed_terminally() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(StudyArchive::new(dir.path()));

        let mut routes = HashMap::new();
        let mut b = binding("dest1");
        b.retry_count = 1;
        routes.insert("ROUTE1".to_string(), route("ROUTE1", vec![b.clone()]));

        let mgr = manager_with(routes, ResilienceConfig::default(), archive.clone());

        let mut result = DestinationResult::pending("dest1");
        result.status = DestinationStatus::RetryPending;
        result.attempts = 1;
        result.last_attempt_at = Some(Utc::now());
        mgr.finish_failed_attempt(&mut result, &b, mgr.max_retries_for(&b));

        assert_eq!(result.status, DestinationStatus::Failed);
        assert!(result.next_retry_at.is_none());
    }
}
