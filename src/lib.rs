//! Core engine for the DICOM routing appliance: ingest, study assembly,
//! de-identification, honest-broker identity mapping, fan-out to
//! destinations, durable archival and retry.
//!
//! The admin HTTP API, web UI, YAML config loading, OCR/PHI text
//! detection and the secondary search index are external collaborators
//! and are not implemented here — only the contracts this engine invokes
//! on them (see `destinations` for the transport contracts).

pub mod error;
pub mod config;
pub mod sop_classes;
pub mod model;
pub mod crosswalk;
pub mod anonymizer;
pub mod broker;
pub mod destinations;
pub mod archive;
pub mod receiver;
pub mod assembler;
pub mod processor;
pub mod retry;

pub use error::{CoreError, Result};
