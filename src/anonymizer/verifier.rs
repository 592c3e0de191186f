//! Pre-write verifier (§4.B): runs on the anonymized instance before it
//! is allowed anywhere near the archive or a destination. A single
//! failing check discards the output entirely — de-identified transport
//! must never silently emit identifying data.

use chrono::NaiveDate;
use dicom_core::Tag;
use dicom_object::{FileDicomObject, InMemDicomObject};

use crate::error::CheckFailure;

const STUDY_INSTANCE_UID: Tag = Tag(0x0020, 0x000D);
const SERIES_INSTANCE_UID: Tag = Tag(0x0020, 0x000E);
const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);
const PATIENT_NAME: Tag = Tag(0x0010, 0x0010);
const PATIENT_ID: Tag = Tag(0x0010, 0x0020);

const STANDARD_DATE_TAGS: &[(Tag, &str)] = &[
    (Tag(0x0008, 0x0020), "StudyDate"),
    (Tag(0x0008, 0x0021), "SeriesDate"),
    (Tag(0x0008, 0x0022), "AcquisitionDate"),
    (Tag(0x0008, 0x0023), "ContentDate"),
    (Tag(0x0010, 0x0030), "PatientBirthDate"),
];

#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    pub check_uids_differ: bool,
    pub check_patient_identity_differs: bool,
    /// When set, every standard date field present in both the original
    /// and the anonymized instance must differ by exactly this many
    /// days (day granularity); unset originals are ignored (§4.B).
    pub expected_shift_days: Option<i64>,
}

impl VerifierConfig {
    pub fn standard() -> Self {
        Self {
            check_uids_differ: true,
            check_patient_identity_differs: true,
            expected_shift_days: None,
        }
    }
}

pub struct Verifier;

impl Verifier {
    /// Returns `Ok(())` if every configured check passes, otherwise the
    /// full list of failures (never just the first one — operators need
    /// the complete picture to fix a leaking script).
    pub fn verify(
        config: &VerifierConfig,
        original: &FileDicomObject<InMemDicomObject>,
        anonymized: &FileDicomObject<InMemDicomObject>,
    ) -> Result<(), Vec<CheckFailure>> {
        let mut failures = Vec::new();

        if config.check_uids_differ {
            check_differs(original, anonymized, STUDY_INSTANCE_UID, "StudyInstanceUID", &mut failures);
            check_differs(original, anonymized, SERIES_INSTANCE_UID, "SeriesInstanceUID", &mut failures);
            check_differs(original, anonymized, SOP_INSTANCE_UID, "SOPInstanceUID", &mut failures);
        }

        if config.check_patient_identity_differs {
            check_differs(original, anonymized, PATIENT_NAME, "PatientName", &mut failures);
            check_differs(original, anonymized, PATIENT_ID, "PatientID", &mut failures);
        }

        if let Some(expected_days) = config.expected_shift_days {
            for (tag, label) in STANDARD_DATE_TAGS {
                let Some(before) = read_string(original, *tag) else { continue };
                if before.is_empty() {
                    continue;
                }
                let Some(after) = read_string(anonymized, *tag) else {
                    failures.push(CheckFailure {
                        check: label.to_string(),
                        detail: "date field missing after anonymization".to_string(),
                    });
                    continue;
                };

                match date_shift_days(&before, &after) {
                    Some(actual) if actual == expected_days => {}
                    Some(actual) => failures.push(CheckFailure {
                        check: label.to_string(),
                        detail: format!("expected shift of {expected_days} days, got {actual}"),
                    }),
                    None => failures.push(CheckFailure {
                        check: label.to_string(),
                        detail: format!("could not parse date pair ({before} -> {after})"),
                    }),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

fn check_differs(
    original: &FileDicomObject<InMemDicomObject>,
    anonymized: &FileDicomObject<InMemDicomObject>,
    tag: Tag,
    label: &str,
    failures: &mut Vec<CheckFailure>,
) {
    let before = read_string(original, tag).unwrap_or_default();
    let after = read_string(anonymized, tag).unwrap_or_default();

    if before == after {
        failures.push(CheckFailure {
            check: label.to_string(),
            detail: format!("value unchanged ({before})"),
        });
    }
}

fn read_string(obj: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<String> {
    obj.element(tag).ok().and_then(|e| e.string().ok()).map(|s| s.trim().to_string())
}

fn date_shift_days(before: &str, after: &str) -> Option<i64> {
    if before.len() < 8 || after.len() < 8 {
        return None;
    }
    let a = NaiveDate::parse_from_str(&before[..8], "%Y%m%d").ok()?;
    let b = NaiveDate::parse_from_str(&after[..8], "%Y%m%d").ok()?;
    Some((b - a).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_shift_days_computes_exact_delta() {
        assert_eq!(date_shift_days("20240115", "20240214").unwrap(), 30);
    }
}
