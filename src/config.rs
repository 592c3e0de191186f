//! Typed configuration the core engine is constructed from.
//!
//! Loading this from a YAML admin surface is out of scope (§1); we read
//! a `config.toml` instead, following the same `toml` + `serde` pairing
//! the DICOM download CLI in the retrieval pack uses for its own config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub receiver: ReceiverConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub honest_broker: Vec<HonestBrokerConfig>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&text).map_err(|e| CoreError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn route(&self, ae_title: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|r| r.ae_title == ae_title)
    }

    pub fn destination(&self, name: &str) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.name == name)
    }

    /// Durable archive root (§6 filesystem layout: `archive/<route_ae>/...`,
    /// a sibling of `receiver.base_dir`'s per-route `incoming/completed/failed`
    /// trees). Defaults to `<base_dir>/../archive` when not set explicitly.
    pub fn archive_dir(&self) -> PathBuf {
        self.receiver
            .archive_dir
            .clone()
            .unwrap_or_else(|| self.receiver.base_dir.join("..").join("archive"))
    }

    /// Anonymization script directory (§4.B `load_script`). Defaults to
    /// `<base_dir>/scripts`.
    pub fn scripts_dir(&self) -> PathBuf {
        self.receiver.scripts_dir.clone().unwrap_or_else(|| self.receiver.base_dir.join("scripts"))
    }

    /// Crosswalk Store file (§4.A). Defaults to `<base_dir>/crosswalk.db`.
    pub fn crosswalk_path(&self) -> PathBuf {
        self.receiver.crosswalk_path.clone().unwrap_or_else(|| self.receiver.base_dir.join("crosswalk.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub base_dir: PathBuf,
    #[serde(default = "default_study_timeout")]
    pub study_timeout_seconds: u64,
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
    #[serde(default)]
    pub scripts_dir: Option<PathBuf>,
    #[serde(default)]
    pub crosswalk_path: Option<PathBuf>,
}

fn default_study_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub ae_title: String,
    pub port: u16,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
    #[serde(default = "default_study_timeout")]
    pub study_timeout_seconds: u64,
    /// Optional hard cap on study age, regardless of quiescence (see
    /// Open Questions §9 — quiescence alone admits false positives on
    /// bursty, slow senders).
    #[serde(default)]
    pub max_study_age_seconds: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub destinations: Vec<DestinationBindingConfig>,
}

fn default_worker_threads() -> usize {
    4
}

fn default_max_concurrent() -> usize {
    8
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationBindingConfig {
    pub destination: String,
    #[serde(default)]
    pub anonymize: bool,
    #[serde(default)]
    pub anon_script: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub subject_prefix: Option<String>,
    #[serde(default)]
    pub session_prefix: Option<String>,
    #[serde(default)]
    pub use_honest_broker: bool,
    #[serde(default)]
    pub honest_broker: Option<String>,
    #[serde(default)]
    pub auto_archive: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_retry_count() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    300
}

/// Resolve the anonymization script this binding should run, per the
/// invariant in §3: `anonymize=true` + no override resolves to the
/// built-in `hipaa_standard`; `anonymize=false` resolves to `passthrough`.
impl DestinationBindingConfig {
    pub fn resolved_script_name(&self) -> &str {
        if !self.anonymize {
            return "passthrough";
        }
        self.anon_script.as_deref().unwrap_or("hipaa_standard")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    Xnat {
        name: String,
        url: String,
        username: String,
        password: String,
        #[serde(default = "default_pool_size")]
        pool_size: usize,
        #[serde(default = "default_xnat_timeout")]
        timeout_seconds: u64,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    DicomPeer {
        name: String,
        ae_title: String,
        host: String,
        port: u16,
        #[serde(default)]
        tls: bool,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    FileSink {
        name: String,
        path: PathBuf,
        /// e.g. `{CallingAE}/{PatientID}/{StudyInstanceUID}`
        directory_pattern: String,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

fn default_pool_size() -> usize {
    4
}

fn default_xnat_timeout() -> u64 {
    60
}

impl DestinationConfig {
    pub fn name(&self) -> &str {
        match self {
            DestinationConfig::Xnat { name, .. } => name,
            DestinationConfig::DicomPeer { name, .. } => name,
            DestinationConfig::FileSink { name, .. } => name,
        }
    }

    pub fn enabled(&self) -> bool {
        match self {
            DestinationConfig::Xnat { enabled, .. } => *enabled,
            DestinationConfig::DicomPeer { enabled, .. } => *enabled,
            DestinationConfig::FileSink { enabled, .. } => *enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BackoffPolicy {
    Linear,
    Exponential { cap_seconds: u64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Linear
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_retry_count")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub backoff: BackoffPolicy,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_retry_scan_interval")]
    pub retry_scan_interval_seconds: u64,
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_retention_days() -> u32 {
    90
}

fn default_retry_scan_interval() -> u64 {
    300
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check_interval(),
            max_retries: default_retry_count(),
            retry_delay_seconds: default_retry_delay(),
            backoff: BackoffPolicy::default(),
            retention_days: default_retention_days(),
            retry_scan_interval_seconds: default_retry_scan_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HonestBrokerConfig {
    pub name: String,
    #[serde(default)]
    pub broker_type: BrokerType,
    #[serde(default)]
    pub naming_scheme: NamingScheme,
    #[serde(default)]
    pub patient_id_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    #[serde(default)]
    pub date_shift_enabled: bool,
    #[serde(default = "default_date_shift_min")]
    pub date_shift_min_days: i64,
    #[serde(default = "default_date_shift_max")]
    pub date_shift_max_days: i64,
    #[serde(default)]
    pub hash_uids_enabled: bool,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub remote_username: Option<String>,
    #[serde(default)]
    pub remote_password: Option<String>,
}

fn default_cache_ttl() -> u64 {
    3000
}

fn default_cache_max_size() -> usize {
    10_000
}

fn default_date_shift_min() -> i64 {
    1
}

fn default_date_shift_max() -> i64 {
    365
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    Local,
    Remote,
}

impl Default for BrokerType {
    fn default() -> Self {
        BrokerType::Local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    Hash,
    AdjectiveAnimal,
    Sequential,
}

impl Default for NamingScheme {
    fn default() -> Self {
        NamingScheme::AdjectiveAnimal
    }
}
