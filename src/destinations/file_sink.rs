//! Filesystem destination (§4.D): copies processed instances into a
//! directory tree derived from a configurable pattern. The simplest of
//! the three destinations — no network, no auth — but it shares the
//! placeholder-substitution idea the spec calls out for directory
//! layout, grounded the same way the study/series naming in the
//! project's own directory-organizing logic resolves `{Placeholder}`
//! tokens against tag values.

use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;

use super::{DestinationClient, FileToSend, SendOutcome, SendParams};

const UNKNOWN: &str = "UNKNOWN";

pub struct FileSinkClient {
    name: String,
    root: PathBuf,
    directory_pattern: String,
}

impl FileSinkClient {
    pub fn new(name: impl Into<String>, root: PathBuf, directory_pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root,
            directory_pattern: directory_pattern.into(),
        }
    }

    fn resolve_directory(&self, params: &SendParams) -> PathBuf {
        let mut rendered = self.directory_pattern.clone();
        let substitutions: &[(&str, Option<&str>)] = &[
            ("{StudyInstanceUID}", Some(params.study_instance_uid.as_str())),
            ("{PatientID}", Some(params.patient_id.as_str())),
            ("{CallingAE}", params.calling_ae.as_deref()),
            ("{ProjectID}", params.project_id.as_deref()),
            ("{Subject}", params.subject_label.as_deref()),
            ("{Session}", params.session_label.as_deref()),
            ("{Modality}", params.modality.as_deref()),
            ("{StudyDate}", params.study_date.as_deref()),
        ];

        for (token, value) in substitutions {
            rendered = rendered.replace(token, &sanitize(value.unwrap_or(UNKNOWN)));
        }

        rendered = blank_unresolved_placeholders(&rendered);

        self.root.join(rendered)
    }
}

/// Any `{...}` token still present after the known substitutions ran is
/// one this appliance doesn't recognize (§4.D "unresolved placeholders
/// become `UNKNOWN`") — replaced wholesale rather than left for
/// `sanitize` to mangle character by character.
fn blank_unresolved_placeholders(rendered: &str) -> String {
    let mut out = String::with_capacity(rendered.len());
    let mut chars = rendered.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        let mut token = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            token.push(c);
        }
        if closed {
            out.push_str(UNKNOWN);
        } else {
            out.push('{');
            out.push_str(&token);
        }
    }

    out
}

/// Restricts path segments to characters safe across the filesystems
/// this appliance is likely to run on: alphanumerics, `_`, `.`, `-`,
/// and `/` as a path separator. Anything else becomes `_`.
fn sanitize(segment: &str) -> String {
    if segment.is_empty() {
        return UNKNOWN.to_string();
    }
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/') { c } else { '_' })
        .collect()
}

#[async_trait]
impl DestinationClient for FileSinkClient {
    async fn probe(&self) -> bool {
        if tokio::fs::create_dir_all(&self.root).await.is_err() {
            return false;
        }
        let probe_file = self.root.join(".probe");
        let ok = tokio::fs::write(&probe_file, b"").await.is_ok();
        let _ = tokio::fs::remove_file(&probe_file).await;
        ok
    }

    async fn send(&self, files: &[FileToSend], params: &SendParams) -> SendOutcome {
        let start = Instant::now();

        if files.is_empty() {
            return SendOutcome::success(0, 0);
        }

        let dest_dir = self.resolve_directory(params);
        if let Err(e) = tokio::fs::create_dir_all(&dest_dir).await {
            return SendOutcome::failure(format!("creating {}: {e}", dest_dir.display()), true);
        }

        let mut copied = 0;
        for file in files {
            let file_name = format!("{}.dcm", file.sop_instance_uid);
            let dest_path = dest_dir.join(file_name);
            let tmp_path = dest_dir.join(format!("{}.tmp", file.sop_instance_uid));

            if let Err(e) = tokio::fs::copy(&file.path, &tmp_path).await {
                return SendOutcome::failure(format!("copying {} to {}: {e}", file.path.display(), tmp_path.display()), true);
            }
            if let Err(e) = tokio::fs::rename(&tmp_path, &dest_path).await {
                return SendOutcome::failure(format!("finalizing {}: {e}", dest_path.display()), true);
            }
            copied += 1;
        }

        tracing::debug!(destination = %self.name, dir = %dest_dir.display(), copied, "file sink write complete");
        SendOutcome::success(copied, start.elapsed().as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_placeholders() {
        let client = FileSinkClient::new("fs1", PathBuf::from("/archive"), "{CallingAE}/{PatientID}/{StudyInstanceUID}");
        let params = SendParams {
            study_instance_uid: "1.2.3".to_string(),
            patient_id: "anon-1".to_string(),
            calling_ae: Some("SCANNER1".to_string()),
            ..Default::default()
        };
        let dir = client.resolve_directory(&params);
        assert_eq!(dir, PathBuf::from("/archive/SCANNER1/anon-1/1.2.3"));
    }

    #[test]
    fn falls_back_to_unknown_for_missing_optional_fields() {
        let client = FileSinkClient::new("fs1", PathBuf::from("/archive"), "{ProjectID}/{StudyInstanceUID}");
        let params = SendParams {
            study_instance_uid: "1.2.3".to_string(),
            patient_id: "anon-1".to_string(),
            ..Default::default()
        };
        let dir = client.resolve_directory(&params);
        assert_eq!(dir, PathBuf::from("/archive/UNKNOWN/1.2.3"));
    }

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize("a b:c"), "a_b_c");
        assert_eq!(sanitize(""), "UNKNOWN");
    }

    #[test]
    fn resolves_modality_and_study_date() {
        let client = FileSinkClient::new("fs1", PathBuf::from("/archive"), "{Modality}/{StudyDate}/{StudyInstanceUID}");
        let params = SendParams {
            study_instance_uid: "1.2.3".to_string(),
            patient_id: "anon-1".to_string(),
            modality: Some("CT".to_string()),
            study_date: Some("20260115".to_string()),
            ..Default::default()
        };
        let dir = client.resolve_directory(&params);
        assert_eq!(dir, PathBuf::from("/archive/CT/20260115/1.2.3"));
    }

    #[test]
    fn unrecognized_placeholder_becomes_unknown() {
        let client = FileSinkClient::new("fs1", PathBuf::from("/archive"), "{NotARealPlaceholder}/{StudyInstanceUID}");
        let params = SendParams {
            study_instance_uid: "1.2.3".to_string(),
            patient_id: "anon-1".to_string(),
            ..Default::default()
        };
        let dir = client.resolve_directory(&params);
        assert_eq!(dir, PathBuf::from("/archive/UNKNOWN/1.2.3"));
    }
}
