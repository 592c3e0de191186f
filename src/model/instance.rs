use std::path::{Path, PathBuf};

use dicom_object::{open_file, FileDicomObject, InMemDicomObject};

use crate::error::{CoreError, Result};

/// The atomic unit received: one DICOM object, identified by SOP
/// Instance UID, carrying its Study/Series UID and a path to the bytes
/// on disk. The attribute map itself is not cached here — callers parse
/// lazily via [`Instance::open`], matching the dicom-rs idiom the
/// teacher's client code already uses (`dicom_object::open_file`).
#[derive(Debug, Clone)]
pub struct Instance {
    pub sop_instance_uid: String,
    pub sop_class_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub path: PathBuf,
    pub file_size: u64,
}

impl Instance {
    pub fn new(
        sop_instance_uid: impl Into<String>,
        sop_class_uid: impl Into<String>,
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        path: impl Into<PathBuf>,
        file_size: u64,
    ) -> Self {
        Self {
            sop_instance_uid: sop_instance_uid.into(),
            sop_class_uid: sop_class_uid.into(),
            study_instance_uid: study_instance_uid.into(),
            series_instance_uid: series_instance_uid.into(),
            path: path.into(),
            file_size,
        }
    }

    /// Parse attributes from disk. Bulk pixel data stays a lazy value
    /// inside the returned object rather than being copied into RAM
    /// (see the memory contract in §4.B).
    pub fn open(&self) -> Result<FileDicomObject<InMemDicomObject>> {
        open_file(&self.path)
            .map_err(|e| CoreError::AnonymizationFailed(format!("opening {}: {e}", self.path.display())))
    }

    /// Build an [`Instance`] by reading just the identifying tags out of
    /// a file already on disk (used by the receiver right after a
    /// C-STORE write, and by `import`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let obj = open_file(path)
            .map_err(|e| CoreError::AnonymizationFailed(format!("opening {}: {e}", path.display())))?;

        let study_instance_uid = read_str(&obj, dicom_dictionary_std::tags::STUDY_INSTANCE_UID)
            .unwrap_or_else(|| "UNKNOWN_STUDY".to_string());
        let series_instance_uid = read_str(&obj, dicom_dictionary_std::tags::SERIES_INSTANCE_UID)
            .unwrap_or_else(|| "UNKNOWN_SERIES".to_string());
        let sop_instance_uid = read_str(&obj, dicom_dictionary_std::tags::SOP_INSTANCE_UID)
            .unwrap_or_else(|| "UNKNOWN_SOP_INSTANCE".to_string());
        let sop_class_uid = read_str(&obj, dicom_dictionary_std::tags::SOP_CLASS_UID)
            .unwrap_or_else(|| "UNKNOWN_SOP_CLASS".to_string());

        let file_size = std::fs::metadata(path)?.len();

        Ok(Self::new(
            sop_instance_uid,
            sop_class_uid,
            study_instance_uid,
            series_instance_uid,
            path,
            file_size,
        ))
    }
}

fn read_str(obj: &InMemDicomObject, tag: dicom_core::Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.string().ok())
        .map(|s| s.trim().to_string())
}
