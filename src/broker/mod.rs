//! Honest Broker (§4.C): a policy layer over the Crosswalk Store with
//! two backends behind one interface — a local naming-scheme allocator,
//! and a remote HTTPS identity service with bearer-token caching.

pub(crate) mod cache;
pub mod local;
pub mod remote;

pub use local::LocalBroker;
pub use remote::RemoteBroker;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{BrokerType, HonestBrokerConfig};
use crate::crosswalk::CrosswalkStore;
use crate::error::{CoreError, Result};

/// Contract invoked by the Route Processor (§4.C). Failure policy: if
/// any required lookup fails, the processor refuses to forward to that
/// destination — there is no fallback to raw identifiers.
#[async_trait]
pub trait HonestBroker: Send + Sync {
    async fn lookup(&self, id_type: &str, id_in: &str) -> Result<String>;
    async fn reverse_lookup(&self, id_type: &str, id_out: &str) -> Result<Option<String>>;
    async fn date_shift_for(&self, patient_id: &str) -> Result<i64>;
    async fn put_uid_mapping(&self, uid_in: &str, uid_out: &str, uid_type: &str) -> Result<()>;
}

/// Build the configured backend for one `[[honest_broker]]` entry.
pub fn build(cfg: &HonestBrokerConfig, store: Arc<CrosswalkStore>) -> Result<Arc<dyn HonestBroker>> {
    match cfg.broker_type {
        BrokerType::Local => Ok(Arc::new(LocalBroker::new(
            cfg.name.clone(),
            store,
            cfg.naming_scheme,
            cfg.patient_id_prefix.clone(),
            cfg.date_shift_min_days,
            cfg.date_shift_max_days,
            cfg.hash_uids_enabled,
            cfg.cache_enabled,
            cfg.cache_ttl_seconds,
            cfg.cache_max_size,
        ))),
        BrokerType::Remote => {
            let url = cfg
                .remote_url
                .clone()
                .ok_or_else(|| CoreError::Config(format!("honest broker {:?} is remote but has no remote_url", cfg.name)))?;
            let username = cfg.remote_username.clone().unwrap_or_default();
            let password = cfg.remote_password.clone().unwrap_or_default();
            Ok(Arc::new(RemoteBroker::new(
                cfg.name.clone(),
                url,
                username,
                password,
                cfg.cache_enabled,
                cfg.cache_ttl_seconds,
                cfg.cache_max_size,
            )))
        }
    }
}
