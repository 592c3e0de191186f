//! Local Honest Broker backend (§4.C): allocates pseudonyms via a
//! naming scheme applied to the input identifier, persisted through the
//! Crosswalk Store so lookups are stable across restarts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::anonymizer::hash_uid;
use crate::config::NamingScheme;
use crate::crosswalk::CrosswalkStore;
use crate::error::Result;

use super::cache::LookupCache;
use super::HonestBroker;

const ADJECTIVES: &[&str] = &[
    "amber", "brisk", "calm", "drifting", "eager", "faint", "gentle", "hollow", "idle", "jagged",
    "keen", "lively", "mellow", "nimble", "opal", "patient", "quiet", "rustic", "steady", "tidy",
    "umber", "vivid", "wary", "young", "zesty",
];

const ANIMALS: &[&str] = &[
    "badger", "crane", "dolphin", "egret", "falcon", "gazelle", "heron", "ibis", "jackal", "koala",
    "lemur", "marten", "newt", "otter", "panther", "quail", "raven", "sparrow", "tapir", "urchin",
    "vole", "walrus", "xerus", "yak", "zebra",
];

#[derive(Clone)]
pub struct LocalBroker {
    name: String,
    store: Arc<CrosswalkStore>,
    scheme: NamingScheme,
    prefix: Option<String>,
    date_shift_min: i64,
    date_shift_max: i64,
    hash_uids_enabled: bool,
    cache: Option<Arc<LookupCache<(String, String), String>>>,
}

impl LocalBroker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        store: Arc<CrosswalkStore>,
        scheme: NamingScheme,
        prefix: Option<String>,
        date_shift_min: i64,
        date_shift_max: i64,
        hash_uids_enabled: bool,
        cache_enabled: bool,
        cache_ttl_seconds: u64,
        cache_max_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            scheme,
            prefix,
            date_shift_min,
            date_shift_max,
            hash_uids_enabled,
            cache: cache_enabled.then(|| Arc::new(LookupCache::new(cache_max_size, Duration::from_secs(cache_ttl_seconds)))),
        }
    }

    /// Constructor for call sites that don't care about the lookup
    /// cache (tests, and callers happy with the default of "on").
    pub fn with_defaults(name: impl Into<String>, store: Arc<CrosswalkStore>, scheme: NamingScheme, prefix: Option<String>, date_shift_min: i64, date_shift_max: i64, hash_uids_enabled: bool) -> Self {
        Self::new(name, store, scheme, prefix, date_shift_min, date_shift_max, hash_uids_enabled, true, 3000, 10_000)
    }

    fn generate(&self, id_type: &str, id_in: &str, attempt: u32) -> String {
        let base = match self.scheme {
            NamingScheme::Hash => hash_scheme(&self.name, id_type, id_in, attempt),
            NamingScheme::AdjectiveAnimal => adjective_animal_scheme(&self.name, id_in, attempt),
            NamingScheme::Sequential => {
                let seq = self.store.next_sequence(&self.name, id_type).unwrap_or(0);
                format!("{seq:08}")
            }
        };

        match &self.prefix {
            Some(prefix) => format!("{prefix}{base}"),
            None => base,
        }
    }
}

fn hash_scheme(broker: &str, id_type: &str, id_in: &str, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(broker.as_bytes());
    hasher.update(id_type.as_bytes());
    hasher.update(id_in.as_bytes());
    hasher.update(attempt.to_le_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest)[..16].to_string()
}

fn adjective_animal_scheme(broker: &str, id_in: &str, attempt: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(broker.as_bytes());
    hasher.update(id_in.as_bytes());
    hasher.update(attempt.to_le_bytes());
    let digest = hasher.finalize();

    let a = digest[0] as usize % ADJECTIVES.len();
    let b = digest[1] as usize % ANIMALS.len();

    if attempt == 0 {
        format!("{}-{}", ADJECTIVES[a], ANIMALS[b])
    } else {
        format!("{}-{}-{attempt}", ADJECTIVES[a], ANIMALS[b])
    }
}

#[async_trait]
impl HonestBroker for LocalBroker {
    async fn lookup(&self, id_type: &str, id_in: &str) -> Result<String> {
        let cache_key = (id_type.to_string(), id_in.to_string());
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit);
            }
        }

        let broker = self.clone();
        let id_type_owned = id_type.to_string();
        let id_in_owned = id_in.to_string();

        let id_out = tokio::task::spawn_blocking(move || {
            broker
                .store
                .lookup_or_create(&broker.name, &id_type_owned, &id_in_owned, |attempt| broker.generate(&id_type_owned, &id_in_owned, attempt))
        })
        .await
        .expect("blocking task panicked")?;

        if let Some(cache) = &self.cache {
            cache.put(cache_key, id_out.clone());
        }

        Ok(id_out)
    }

    async fn reverse_lookup(&self, id_type: &str, id_out: &str) -> Result<Option<String>> {
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let id_type = id_type.to_string();
        let id_out = id_out.to_string();
        tokio::task::spawn_blocking(move || store.reverse_lookup(&name, &id_type, &id_out))
            .await
            .expect("blocking task panicked")
    }

    async fn date_shift_for(&self, patient_id: &str) -> Result<i64> {
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let patient_id = patient_id.to_string();
        let (min, max) = (self.date_shift_min, self.date_shift_max);
        tokio::task::spawn_blocking(move || store.get_or_allocate_date_shift(&name, &patient_id, min, max))
            .await
            .expect("blocking task panicked")
    }

    async fn put_uid_mapping(&self, uid_in: &str, uid_out: &str, uid_type: &str) -> Result<()> {
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let uid_in = uid_in.to_string();
        let uid_out = uid_out.to_string();
        let uid_type = uid_type.to_string();
        tokio::task::spawn_blocking(move || store.put_uid_mapping(&name, &uid_in, &uid_out, &uid_type))
            .await
            .expect("blocking task panicked")
    }
}

impl LocalBroker {
    /// Convenience used by the Route Processor's UID-hashing path: hash
    /// a UID the way the anonymizer does, then record the mapping for
    /// audit through [`HonestBroker::put_uid_mapping`].
    pub fn hash_and_record_uid(&self, uid_in: &str, uid_type: &str) -> String {
        let uid_out = hash_uid(&self.name, uid_in);
        let _ = self.store.put_uid_mapping(&self.name, uid_in, &uid_out, uid_type);
        uid_out
    }

    pub fn hash_uids_enabled(&self) -> bool {
        self.hash_uids_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(scheme: NamingScheme) -> LocalBroker {
        LocalBroker::with_defaults("b1", Arc::new(CrosswalkStore::open_in_memory().unwrap()), scheme, None, 1, 30, false)
    }

    #[tokio::test]
    async fn adjective_animal_lookup_is_stable() {
        let broker = broker(NamingScheme::AdjectiveAnimal);
        let a = broker.lookup("patient", "12345").await.unwrap();
        let b = broker.lookup("patient", "12345").await.unwrap();
        assert_eq!(a, b);
        assert!(a.contains('-'));
    }

    #[tokio::test]
    async fn lookup_is_injective_across_distinct_inputs() {
        let broker = broker(NamingScheme::Hash);
        let a = broker.lookup("patient", "12345").await.unwrap();
        let b = broker.lookup("patient", "67890").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn reverse_lookup_round_trips() {
        let broker = broker(NamingScheme::Hash);
        let out = broker.lookup("patient", "12345").await.unwrap();
        let back = broker.reverse_lookup("patient", &out).await.unwrap();
        assert_eq!(back.as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn sequential_scheme_increments() {
        let broker = broker(NamingScheme::Sequential);
        let a = broker.lookup("patient", "p1").await.unwrap();
        let b = broker.lookup("patient", "p2").await.unwrap();
        assert_ne!(a, b);
    }
}
