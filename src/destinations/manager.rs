//! Destination Manager (§4.D): owns every configured destination's
//! client and health state, runs a background prober, and is the
//! single point the Route Processor and Retry Manager go through to
//! send or check availability.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::DestinationConfig;
use crate::model::DestinationHealth;

use super::dicom_peer::{DicomPeerClient, DicomPeerConfig};
use super::file_sink::FileSinkClient;
use super::xnat::XnatClient;
use super::{DestinationClient, FileToSend, SendOutcome, SendParams};

struct Entry {
    client: Arc<dyn DestinationClient>,
    health: Mutex<DestinationHealth>,
}

pub struct DestinationManager {
    entries: RwLock<HashMap<String, Entry>>,
    shutdown: watch::Receiver<bool>,
}

impl DestinationManager {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    pub async fn add(&self, config: &DestinationConfig, calling_ae: &str) {
        let client: Arc<dyn DestinationClient> = match config {
            DestinationConfig::Xnat {
                name,
                url,
                username,
                password,
                timeout_seconds,
                ..
            } => Arc::new(XnatClient::new(name.clone(), url.clone(), username, password, Duration::from_secs(*timeout_seconds))),
            DestinationConfig::DicomPeer { name, ae_title, host, port, .. } => Arc::new(DicomPeerClient::new(DicomPeerConfig {
                name: name.clone(),
                calling_ae: calling_ae.to_string(),
                called_ae: ae_title.clone(),
                host: host.clone(),
                port: *port,
                timeout: Duration::from_secs(30),
            })),
            DestinationConfig::FileSink { name, path, directory_pattern, .. } => Arc::new(FileSinkClient::new(name.clone(), path.clone(), directory_pattern.clone())),
        };

        let mut entries = self.entries.write().await;
        entries.insert(
            config.name().to_string(),
            Entry {
                client,
                health: Mutex::new(DestinationHealth::default()),
            },
        );
    }

    pub async fn remove(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    pub async fn names(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn is_available(&self, name: &str) -> bool {
        match self.entries.read().await.get(name) {
            Some(entry) => entry.health.lock().await.available,
            None => false,
        }
    }

    pub async fn health(&self, name: &str) -> Option<DestinationHealth> {
        let entries = self.entries.read().await;
        match entries.get(name) {
            Some(entry) => Some(entry.health.lock().await.clone()),
            None => None,
        }
    }

    pub async fn check(&self, name: &str) -> bool {
        let client = {
            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(entry) => Arc::clone(&entry.client),
                None => return false,
            }
        };

        let available = client.probe().await;

        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(name) {
            entry.health.lock().await.record(available, Utc::now());
        }

        available
    }

    pub async fn check_all(&self) {
        for name in self.names().await {
            self.check(&name).await;
        }
    }

    pub async fn send(&self, name: &str, files: &[FileToSend], params: &SendParams) -> SendOutcome {
        let client = {
            let entries = self.entries.read().await;
            match entries.get(name) {
                Some(entry) => Arc::clone(&entry.client),
                None => return SendOutcome::failure(format!("unknown destination {name}"), false),
            }
        };

        client.send(files, params).await
    }

    /// Background prober loop (§4.E "Health probing"). Runs until the
    /// shutdown signal flips to `true`.
    pub async fn run_prober(self: Arc<Self>, interval: Duration) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("running scheduled destination health check");
                    self.check_all().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("destination prober shutting down");
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
    use tokio::sync::watch;

    fn manager() -> Arc<DestinationManager> {
        let (_tx, rx) = watch::channel(false);
        Arc::new(DestinationManager::new(rx))
    }

    #[tokio::test]
    async fn add_and_check_file_sink_reports_available() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager();
        let config = DestinationConfig::FileSink {
            name: "fs1".to_string(),
            path: dir.path().to_path_buf(),
            directory_pattern: "{StudyInstanceUID}".to_string(),
            enabled: true,
        };
        manager.add(&config, "ROUTER").await;

        assert!(manager.check("fs1").await);
        assert!(manager.is_available("fs1").await);
    }

    #[tokio::test]
    async fn unknown_destination_send_fails_without_panicking() {
        let manager = manager();
        let outcome = manager.send("nope", &[], &SendParams::default()).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn remove_forgets_destination() {
        let manager = manager();
        let config = DestinationConfig::FileSink {
            name: "fs1".to_string(),
            path: PathBuf::from("/tmp/does-not-matter"),
            directory_pattern: "{StudyInstanceUID}".to_string(),
            enabled: true,
        };
        manager.add(&config, "ROUTER").await;
        manager.remove("fs1").await;
        assert!(manager.names().await.is_empty());
    }
}
