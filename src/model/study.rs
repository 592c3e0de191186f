use chrono::{DateTime, Utc};

use super::instance::Instance;

/// Lifecycle state machine from §3: `RECEIVING -> COMPLETE -> PROCESSING
/// -> {COMPLETED, PARTIAL, FAILED}`. Once a study advances past
/// `Receiving` it is immutable in the assembler — the processor and
/// archive own it from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyState {
    Receiving,
    Complete,
    Processing,
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Study {
    pub study_instance_uid: String,
    pub calling_ae: String,
    pub instances: Vec<Instance>,
    pub total_bytes: u64,
    pub first_arrival: DateTime<Utc>,
    pub last_arrival: DateTime<Utc>,
    pub state: StudyState,
}

impl Study {
    pub fn new(study_instance_uid: impl Into<String>, calling_ae: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            study_instance_uid: study_instance_uid.into(),
            calling_ae: calling_ae.into(),
            instances: Vec::new(),
            total_bytes: 0,
            first_arrival: now,
            last_arrival: now,
            state: StudyState::Receiving,
        }
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.total_bytes += instance.file_size;
        self.last_arrival = Utc::now();
        self.instances.push(instance);
    }

    /// A study is COMPLETE when no new instance has arrived within
    /// `study_timeout`, or (if configured) once it has lived past
    /// `max_study_age`, whichever comes first (see the wall-clock-cap
    /// Open Question in §9).
    pub fn is_quiescent(&self, study_timeout: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_arrival >= study_timeout
    }

    pub fn exceeds_max_age(&self, max_age: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        match max_age {
            Some(max) => now - self.first_arrival >= max,
            None => false,
        }
    }
}
