//! Study Assembler (§4.H): groups instances arriving on one route by
//! Study Instance UID and decides when a study is done receiving.
//! Quiescence is judged on a one-second tick rather than per-arrival,
//! matching the polling cadence the spec calls for instead of a timer
//! per study.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

use crate::model::{Instance, Study};

/// A study hand-off to the Route Processor — emitted exactly once per
/// study, per the atomic remove-and-emit guarantee in §4.H.
pub struct CompletedStudy {
    pub route_ae: String,
    pub study: Study,
}

pub struct StudyAssembler {
    route_ae: String,
    study_timeout: chrono::Duration,
    max_study_age: Option<chrono::Duration>,
    studies: Mutex<HashMap<String, Study>>,
    /// Study UIDs that have already emitted once; instances arriving
    /// after emission are late arrivals, not a new study (§4.H).
    emitted: Mutex<std::collections::HashSet<String>>,
    late_arrivals_dir: std::path::PathBuf,
    completed_tx: mpsc::Sender<CompletedStudy>,
}

impl StudyAssembler {
    pub fn new(route_ae: impl Into<String>, study_timeout: chrono::Duration, max_study_age: Option<chrono::Duration>, late_arrivals_dir: std::path::PathBuf, completed_tx: mpsc::Sender<CompletedStudy>) -> Self {
        Self {
            route_ae: route_ae.into(),
            study_timeout,
            max_study_age,
            studies: Mutex::new(HashMap::new()),
            emitted: Mutex::new(std::collections::HashSet::new()),
            late_arrivals_dir,
            completed_tx,
        }
    }

    /// Enqueue a freshly-received instance. Returns `true` if it was
    /// accepted into an in-progress study, `false` if the study had
    /// already emitted and the instance was diverted to `late-arrivals/`.
    pub async fn enqueue(&self, calling_ae: &str, instance: Instance) -> bool {
        let study_uid = instance.study_instance_uid.clone();

        if self.emitted.lock().await.contains(&study_uid) {
            self.divert_late_arrival(&instance).await;
            return false;
        }

        let mut studies = self.studies.lock().await;
        let study = studies.entry(study_uid.clone()).or_insert_with(|| Study::new(study_uid.clone(), calling_ae.to_string()));
        study.add_instance(instance);
        true
    }

    async fn divert_late_arrival(&self, instance: &Instance) {
        if let Some(parent) = self.late_arrivals_dir.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let _ = tokio::fs::create_dir_all(&self.late_arrivals_dir).await;
        let dest = self.late_arrivals_dir.join(instance.path.file_name().unwrap_or_default());
        warn!(
            route = %self.route_ae,
            study = %instance.study_instance_uid,
            sop_instance = %instance.sop_instance_uid,
            "late arrival for already-emitted study, moving to late-arrivals/"
        );
        if let Err(e) = tokio::fs::rename(&instance.path, &dest).await {
            warn!(error = %e, "failed to move late arrival, leaving in place");
        }
    }

    /// One tick of the one-second scan described in §4.H: emits every
    /// study that has gone quiescent or hit its max age, exactly once.
    pub async fn tick(&self) {
        let now = Utc::now();
        let ready: Vec<String> = {
            let studies = self.studies.lock().await;
            studies
                .values()
                .filter(|s| s.is_quiescent(self.study_timeout, now) || s.exceeds_max_age(self.max_study_age, now))
                .map(|s| s.study_instance_uid.clone())
                .collect()
        };

        for study_uid in ready {
            let study = {
                let mut studies = self.studies.lock().await;
                studies.remove(&study_uid)
            };

            let Some(study) = study else { continue };

            self.emitted.lock().await.insert(study_uid.clone());

            info!(route = %self.route_ae, study = %study_uid, instances = study.instances.len(), "study quiescent, emitting to processor");

            if self.completed_tx.send(CompletedStudy { route_ae: self.route_ae.clone(), study }).await.is_err() {
                warn!(route = %self.route_ae, study = %study_uid, "processor channel closed, study dropped");
            }
        }
    }

    /// Background loop: ticks every second until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn instance(study_uid: &str, sop_uid: &str) -> Instance {
        Instance::new(sop_uid, "1.2.840.10008.5.1.4.1.1.7", study_uid, "1.2.3.series", PathBuf::from(format!("/tmp/{sop_uid}.dcm")), 100)
    }

    #[tokio::test]
    async fn emits_study_once_quiescent() {
        let (tx, mut rx) = mpsc::channel(8);
        let dir = tempfile::tempdir().unwrap();
        let assembler = StudyAssembler::new("ROUTE1", chrono::Duration::seconds(0), None, dir.path().join("late-arrivals"), tx);

        assembler.enqueue("SCANNER1", instance("1.2.3", "1.2.3.1")).await;
        assembler.enqueue("SCANNER1", instance("1.2.3", "1.2.3.2")).await;

        assembler.tick().await;

        let completed = rx.recv().await.unwrap();
        assert_eq!(completed.study.study_instance_uid, "1.2.3");
        assert_eq!(completed.study.instances.len(), 2);
    }

    #[tokio::test]
    async fn late_arrival_after_emit_is_diverted_not_reprocessed() {
        let (tx, mut rx) = mpsc::channel(8);
        let dir = tempfile::tempdir().unwrap();
        let late_dir = dir.path().join("late-arrivals");
        let assembler = StudyAssembler::new("ROUTE1", chrono::Duration::seconds(0), None, late_dir.clone(), tx);

        let src_dir = dir.path().join("incoming");
        tokio::fs::create_dir_all(&src_dir).await.unwrap();
        let src_path = src_dir.join("1.2.3.1.dcm");
        tokio::fs::write(&src_path, b"data").await.unwrap();

        let mut inst = instance("1.2.3", "1.2.3.1");
        inst.path = src_path;
        assembler.enqueue("SCANNER1", inst).await;
        assembler.tick().await;
        let _ = rx.recv().await.unwrap();

        let src_path2 = src_dir.join("1.2.3.2.dcm");
        tokio::fs::write(&src_path2, b"data").await.unwrap();
        let mut late_inst = instance("1.2.3", "1.2.3.2");
        late_inst.path = src_path2;

        let accepted = assembler.enqueue("SCANNER1", late_inst).await;
        assert!(!accepted);
        assert!(late_dir.join("1.2.3.2.dcm").exists());
    }

    #[tokio::test]
    async fn study_not_yet_quiescent_is_not_emitted() {
        let (tx, mut rx) = mpsc::channel(8);
        let dir = tempfile::tempdir().unwrap();
        let assembler = StudyAssembler::new("ROUTE1", chrono::Duration::seconds(30), None, dir.path().join("late-arrivals"), tx);

        assembler.enqueue("SCANNER1", instance("1.2.3", "1.2.3.1")).await;
        assembler.tick().await;

        assert!(rx.try_recv().is_err());
    }
}
