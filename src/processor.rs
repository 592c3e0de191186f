//! Route Processor (§4.I): the per-route pipeline that turns one
//! emitted study into archived files and destination sends. Runs
//! synchronously within a per-route worker loop — one study at a time,
//! in emission order — so destination state for a given study never
//! races itself; different studies on the same route still queue
//! behind each other, matching the "single Study-Emission thread"
//! concurrency model (§5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dicom_core::Tag;
use dicom_object::{FileDicomObject, InMemDicomObject};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::anonymizer::enhancer::{EnhancedScript, EnhancementRequest, ScriptEnhancer};
use crate::anonymizer::script::Script;
use crate::anonymizer::{AnonymizationContext, Anonymizer, Verifier, VerifierConfig};
use crate::archive::{Manifest, StudyArchive};
use crate::assembler::CompletedStudy;
use crate::broker::HonestBroker;
use crate::config::{DestinationBindingConfig, DestinationConfig, HonestBrokerConfig, RouteConfig};
use crate::destinations::{DestinationManager, FileToSend, SendOutcome, SendParams};
use crate::error::{CoreError, Result};
use crate::model::{DestinationResult, DestinationStatus, Instance, Study, TransferRecord, TransferStatus};

const PATIENT_ID: Tag = Tag(0x0010, 0x0020);
const ACCESSION_NUMBER: Tag = Tag(0x0008, 0x0050);
const MODALITY: Tag = Tag(0x0008, 0x0060);
const STUDY_DATE: Tag = Tag(0x0008, 0x0020);

pub struct RouteProcessor {
    route: RouteConfig,
    route_dir: PathBuf,
    scripts_dir: PathBuf,
    archive: Arc<StudyArchive>,
    destinations: Arc<DestinationManager>,
    destination_configs: HashMap<String, DestinationConfig>,
    brokers: HashMap<String, Arc<dyn HonestBroker>>,
    broker_configs: HashMap<String, HonestBrokerConfig>,
    script_cache: Mutex<HashMap<String, Arc<Script>>>,
}

impl RouteProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        route: RouteConfig,
        route_dir: PathBuf,
        scripts_dir: PathBuf,
        archive: Arc<StudyArchive>,
        destinations: Arc<DestinationManager>,
        destination_configs: HashMap<String, DestinationConfig>,
        brokers: HashMap<String, Arc<dyn HonestBroker>>,
        broker_configs: HashMap<String, HonestBrokerConfig>,
    ) -> Self {
        Self {
            route,
            route_dir,
            scripts_dir,
            archive,
            destinations,
            destination_configs,
            brokers,
            broker_configs,
            script_cache: Mutex::new(HashMap::new()),
        }
    }

    fn incoming_dir(&self) -> PathBuf {
        self.route_dir.join("incoming")
    }

    fn completed_dir(&self) -> PathBuf {
        self.route_dir.join("completed")
    }

    fn failed_dir(&self) -> PathBuf {
        self.route_dir.join("failed")
    }

    fn scratch_dir(&self, study_uid: &str) -> PathBuf {
        self.route_dir.join("scratch").join(study_uid)
    }

    /// Drains studies emitted by the assembler, one at a time, until
    /// shutdown. A study that the processor fails to handle at all
    /// (panicking task aside) is still moved to `failed/` by
    /// `process_study`'s own error paths — this loop never drops one.
    pub async fn run(self: Arc<Self>, mut completed_rx: mpsc::Receiver<CompletedStudy>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                received = completed_rx.recv() => {
                    match received {
                        Some(completed) => self.process_study(completed.study).await,
                        None => return,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(route = %self.route.ae_title, "route processor shutting down");
                        return;
                    }
                }
            }
        }
    }

    async fn process_study(&self, study: Study) {
        let route_ae = self.route.ae_title.clone();
        let study_uid = study.study_instance_uid.clone();

        info!(route = %route_ae, study = %study_uid, instances = study.instances.len(), "processing completed study");

        let mut record = TransferRecord::new(route_ae.clone(), study_uid.clone(), study.instances.len(), study.total_bytes);
        record.status = TransferStatus::Processing;

        for instance in &study.instances {
            if let Err(e) = self.archive.archive_original(&route_ae, &study_uid, &instance.sop_instance_uid, &instance.path).await {
                error!(route = %route_ae, study = %study_uid, error = %e, "failed to archive original instance");
            }
        }

        let mut bindings: Vec<&DestinationBindingConfig> = self.route.destinations.iter().filter(|b| b.enabled).collect();
        bindings.sort_by_key(|b| b.priority);

        let scratch_root = self.scratch_dir(&study_uid);
        let mut has_anonymized = false;

        for binding in &bindings {
            let mut result = DestinationResult::pending(binding.destination.clone());
            result.status = DestinationStatus::Processing;
            result.attempts = 1;
            result.last_attempt_at = Some(chrono::Utc::now());

            let start = Instant::now();
            let outcome = self.process_destination(&study, binding, &scratch_root, &mut has_anonymized).await;

            result.duration_ms = start.elapsed().as_millis() as u64;
            match outcome {
                Ok(send_outcome) => {
                    result.status = if send_outcome.success { DestinationStatus::Success } else { DestinationStatus::Failed };
                    result.files_transferred = send_outcome.files_transferred as u64;
                    result.message = Some(send_outcome.message);
                }
                Err(e) => {
                    result.status = DestinationStatus::Failed;
                    result.message = Some(e.to_string());
                }
            }

            if let Err(e) = self.archive.write_status(&route_ae, &study_uid, &result).await {
                error!(route = %route_ae, study = %study_uid, destination = %binding.destination, error = %e, "failed to persist destination status");
            }

            record.destinations.push(result);
        }

        record.recompute_status();

        let manifest = Manifest {
            route_ae: route_ae.clone(),
            study_instance_uid: study_uid.clone(),
            archived_at: chrono::Utc::now(),
            file_count: study.instances.len(),
            total_bytes: study.total_bytes,
            has_anonymized,
        };
        if let Err(e) = self.archive.write_manifest(&manifest).await {
            error!(route = %route_ae, study = %study_uid, error = %e, "failed to write study manifest");
        }

        let any_success = record.destinations.iter().any(|d| d.status == DestinationStatus::Success);
        let outcome_dir = if any_success { self.completed_dir() } else { self.failed_dir() };
        let src = self.incoming_dir().join(&study_uid);
        let dest = outcome_dir.join(&study_uid);
        if let Some(parent) = dest.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(e) = tokio::fs::rename(&src, &dest).await {
            warn!(route = %route_ae, study = %study_uid, error = %e, "failed to move study into its outcome directory");
        }

        let _ = tokio::fs::remove_dir_all(&scratch_root).await;

        info!(route = %route_ae, study = %study_uid, status = ?record.status, "study processing complete");
    }

    /// Runs one destination binding end to end: anonymize (if
    /// configured), resolve identifiers, send. Any error here fails
    /// only this destination — the caller records it and moves to the
    /// next binding (§4.I guarantee: failures of one destination never
    /// affect another).
    async fn process_destination(&self, study: &Study, binding: &DestinationBindingConfig, scratch_root: &std::path::Path, has_anonymized: &mut bool) -> Result<SendOutcome> {
        let destination_config = self
            .destination_configs
            .get(&binding.destination)
            .ok_or_else(|| CoreError::DestinationUnavailable(format!("destination {} not configured", binding.destination)))?;

        let files: Vec<FileToSend> = if binding.anonymize {
            let scratch_dir = scratch_root.join(&binding.destination);
            let anonymized = self.anonymize_study(study, binding, &scratch_dir).await?;
            *has_anonymized = true;
            for instance in &anonymized {
                if let Err(e) = self.archive.archive_anonymized(&self.route.ae_title, &study.study_instance_uid, &instance.sop_instance_uid, &instance.path).await {
                    warn!(study = %study.study_instance_uid, error = %e, "failed to archive anonymized instance");
                }
            }
            anonymized
        } else {
            study
                .instances
                .iter()
                .map(|i| FileToSend {
                    path: i.path.clone(),
                    sop_class_uid: i.sop_class_uid.clone(),
                    sop_instance_uid: i.sop_instance_uid.clone(),
                })
                .collect()
        };

        let params = self.resolve_send_params(study, binding, matches!(destination_config, DestinationConfig::Xnat { .. })).await?;

        if !self.destinations.is_available(&binding.destination).await {
            self.destinations.check(&binding.destination).await;
        }

        Ok(self.destinations.send(&binding.destination, &files, &params).await)
    }

    async fn resolve_send_params(&self, study: &Study, binding: &DestinationBindingConfig, requires_session: bool) -> Result<SendParams> {
        let first = study
            .instances
            .first()
            .ok_or_else(|| CoreError::AnonymizationFailed("study has no instances".to_string()))?;
        let obj = first.open()?;

        let raw_patient_id = read_string(&obj, PATIENT_ID).unwrap_or_default();
        let raw_accession = read_string(&obj, ACCESSION_NUMBER).unwrap_or_default();
        let raw_modality = read_string(&obj, MODALITY).filter(|s| !s.is_empty());
        let raw_study_date = read_string(&obj, STUDY_DATE).filter(|s| !s.is_empty());

        resolve_send_params_raw(
            &self.brokers,
            binding,
            &study.study_instance_uid,
            Some(&study.calling_ae),
            &raw_patient_id,
            &raw_accession,
            raw_modality.as_deref(),
            raw_study_date.as_deref(),
            requires_session,
        )
        .await
    }

    async fn anonymize_study(&self, study: &Study, binding: &DestinationBindingConfig, scratch_dir: &std::path::Path) -> Result<Vec<FileToSend>> {
        let script_name = binding.resolved_script_name();
        let base_script = self.load_script(script_name).await?;

        let broker_cfg = binding.honest_broker.as_deref().and_then(|name| self.broker_configs.get(name));
        let first_patient_id = study
            .instances
            .first()
            .map(|i| i.open().ok())
            .flatten()
            .and_then(|obj| read_string(&obj, PATIENT_ID))
            .unwrap_or_default();

        let date_shift_days = match broker_cfg {
            Some(cfg) if cfg.date_shift_enabled => {
                let broker_name = binding.honest_broker.as_deref().unwrap_or_default();
                let broker = self.brokers.get(broker_name).ok_or_else(|| CoreError::Config(format!("unknown honest broker {broker_name}")))?;
                Some(broker.date_shift_for(&first_patient_id).await?)
            }
            _ => None,
        };
        let hash_uids = broker_cfg.map(|cfg| cfg.hash_uids_enabled).unwrap_or(false);

        let request = EnhancementRequest {
            date_shift_days,
            hash_uids,
            engine_double_applies_shift: false,
        };
        let EnhancedScript { script, expected_shift_days } = ScriptEnhancer::compose(&base_script, &request);

        let ctx = AnonymizationContext {
            broker_name: binding.honest_broker.clone().unwrap_or_else(|| "none".to_string()),
        };

        let verifier_config = VerifierConfig {
            check_uids_differ: true,
            check_patient_identity_differs: true,
            expected_shift_days,
        };

        let mut out = Vec::with_capacity(study.instances.len());
        for instance in &study.instances {
            let dest_path = scratch_dir.join(format!("{}.dcm", instance.sop_instance_uid));

            let original = instance.open()?;
            let anonymized = Anonymizer::run(&script, &ctx, &instance.path, &dest_path)?;

            if let Err(failures) = Verifier::verify(&verifier_config, &original, &anonymized) {
                let _ = tokio::fs::remove_dir_all(scratch_dir).await;
                return Err(CoreError::VerificationFailed(failures));
            }

            out.push(FileToSend {
                path: dest_path,
                sop_class_uid: instance.sop_class_uid.clone(),
                sop_instance_uid: instance.sop_instance_uid.clone(),
            });
        }

        Ok(out)
    }

    /// `hipaa_standard` is the built-in default: an empty base script,
    /// relying entirely on the enhancer's standard date-shift/UID-hash
    /// blocks. Any other name is read from `scripts_dir/<name>.descript`
    /// and cached after first parse.
    async fn load_script(&self, name: &str) -> Result<Arc<Script>> {
        if name == "hipaa_standard" || name == "passthrough" {
            return Ok(Arc::new(Script::default()));
        }

        let mut cache = self.script_cache.lock().await;
        if let Some(script) = cache.get(name) {
            return Ok(Arc::clone(script));
        }

        let path = self.scripts_dir.join(format!("{name}.descript"));
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::AnonymizationFailed(format!("reading script {}: {e}", path.display())))?;
        let script = Arc::new(Script::parse(&text)?);
        cache.insert(name.to_string(), Arc::clone(&script));
        Ok(script)
    }
}

fn read_string(obj: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
    obj.element(tag).ok().and_then(|e| e.string().ok()).map(|s| s.trim().to_string())
}

/// Shared identifier-resolution logic behind `send_params` for both the
/// Route Processor's first attempt and the Retry Manager's re-sends
/// (§4.I, §4.J "invoke the same destination-send path"). Takes the raw
/// identifiers already read off an instance rather than the instance
/// itself, so the retry path can supply them from an archived original
/// instead of a live `Study`.
pub(crate) async fn resolve_send_params_raw(
    brokers: &HashMap<String, Arc<dyn HonestBroker>>,
    binding: &DestinationBindingConfig,
    study_instance_uid: &str,
    calling_ae: Option<&str>,
    raw_patient_id: &str,
    raw_accession: &str,
    raw_modality: Option<&str>,
    raw_study_date: Option<&str>,
    requires_session: bool,
) -> Result<SendParams> {
    let (subject_raw, session_raw) = if binding.use_honest_broker {
        let broker_name = binding
            .honest_broker
            .as_deref()
            .ok_or_else(|| CoreError::Config(format!("destination {} has use_honest_broker=true but no honest_broker set", binding.destination)))?;
        let broker = brokers.get(broker_name).ok_or_else(|| CoreError::Config(format!("unknown honest broker {broker_name}")))?;

        let subject = broker.lookup("patient", raw_patient_id).await?;

        let session = if requires_session {
            if raw_accession.trim().is_empty() {
                return Err(CoreError::AnonymizationFailed(format!(
                    "AccessionNumber is required for destination {} but the instance has none",
                    binding.destination
                )));
            }
            let pseudo_accession = broker.lookup("accession", raw_accession).await?;
            format!("{subject}-{pseudo_accession}")
        } else {
            String::new()
        };

        (subject, session)
    } else {
        (raw_patient_id.to_string(), raw_accession.to_string())
    };

    let subject_label = format!("{}{}", binding.subject_prefix.as_deref().unwrap_or(""), subject_raw);
    let session_label = if session_raw.is_empty() { None } else { Some(format!("{}{}", binding.session_prefix.as_deref().unwrap_or(""), session_raw)) };

    Ok(SendParams {
        study_instance_uid: study_instance_uid.to_string(),
        patient_id: subject_raw,
        project_id: binding.project_id.clone(),
        subject_label: Some(subject_label),
        session_label,
        calling_ae: calling_ae.map(|s| s.to_string()),
        modality: raw_modality.map(|s| s.to_string()),
        study_date: raw_study_date.map(|s| s.to_string()),
        auto_archive: binding.auto_archive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackoffPolicy, RouteConfig};

    fn empty_route(ae: &str) -> RouteConfig {
        RouteConfig {
            ae_title: ae.to_string(),
            port: 11112,
            worker_threads: 4,
            max_concurrent_transfers: 8,
            study_timeout_seconds: 30,
            max_study_age_seconds: None,
            enabled: true,
            destinations: Vec::new(),
        }
    }

    #[tokio::test]
    async fn processing_a_study_with_no_destinations_moves_it_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let route_dir = dir.path().join("ROUTE1");
        tokio::fs::create_dir_all(route_dir.join("incoming").join("1.2.3")).await.unwrap();

        let archive = Arc::new(StudyArchive::new(dir.path().join("archive")));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let destinations = Arc::new(DestinationManager::new(shutdown_rx));

        let processor = RouteProcessor::new(empty_route("ROUTE1"), route_dir.clone(), dir.path().join("scripts"), archive.clone(), destinations, HashMap::new(), HashMap::new(), HashMap::new());

        let study = Study::new("1.2.3", "SCANNER1");
        processor.process_study(study).await;

        assert!(route_dir.join("failed").join("1.2.3").exists());
        assert!(!route_dir.join("incoming").join("1.2.3").exists());

        let archived = archive.get_archived_study("ROUTE1", "1.2.3").await;
        assert!(archived.is_some());
        assert!(archived.unwrap().destinations.is_empty());
        let _ = BackoffPolicy::Linear;
    }
}
