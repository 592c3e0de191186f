//! XNAT destination (§4.D): uploads processed instances through XNAT's
//! REST import service, choosing the archive or prearchive endpoint
//! per `auto_archive`. Grounded in the retrieval pack's Orthanc REST
//! client for the basic-auth-header + reqwest::Client::builder idiom;
//! the DICOM import endpoint itself is XNAT's documented contract, not
//! something this engine reimplements.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart;
use reqwest::Client;
use tracing::{debug, warn};

use super::{DestinationClient, FileToSend, SendOutcome, SendParams};

pub struct XnatClient {
    name: String,
    base_url: String,
    client: Client,
}

impl XnatClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, username: &str, password: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        let credentials = format!("{username}:{password}");
        let token = general_purpose::STANDARD.encode(credentials);
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Basic {token}")).expect("credentials are not valid header bytes"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is valid");

        Self {
            name: name.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn import_url(&self, params: &SendParams) -> String {
        let dest = if params.auto_archive { "/archive" } else { "/prearchive" };
        let mut url = format!("{}/data/services/import?dest={dest}&inbody=false&overwrite=delete", self.base_url);

        if let Some(project) = &params.project_id {
            url.push_str(&format!("&PROJECT_ID={project}"));
        }
        if let Some(subject) = &params.subject_label {
            url.push_str(&format!("&SUBJECT_ID={subject}"));
        }
        if let Some(session) = &params.session_label {
            url.push_str(&format!("&EXPT_LABEL={session}"));
        }

        url
    }
}

#[async_trait]
impl DestinationClient for XnatClient {
    async fn probe(&self) -> bool {
        match self.client.get(format!("{}/xapi/siteConfig", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(destination = %self.name, error = %e, "xnat probe failed");
                false
            }
        }
    }

    async fn send(&self, files: &[FileToSend], params: &SendParams) -> SendOutcome {
        let start = Instant::now();

        if files.is_empty() {
            return SendOutcome::success(0, 0);
        }

        let mut form = multipart::Form::new();
        for (idx, file) in files.iter().enumerate() {
            let bytes = match tokio::fs::read(&file.path).await {
                Ok(b) => b,
                Err(e) => return SendOutcome::failure(format!("reading {}: {e}", file.path.display()), false),
            };

            let filename = format!("{}.dcm", idx);
            let part = match multipart::Part::bytes(bytes).file_name(filename).mime_str("application/dicom") {
                Ok(p) => p,
                Err(e) => return SendOutcome::failure(format!("building multipart part: {e}"), false),
            };
            form = form.part("file", part);
        }

        let url = self.import_url(params);
        let resp = match self.client.post(&url).multipart(form).send().await {
            Ok(resp) => resp,
            Err(e) => return SendOutcome::failure(format!("xnat import request failed: {e}"), true),
        };

        let status = resp.status();
        if status.is_server_error() {
            let body = resp.text().await.unwrap_or_default();
            warn!(destination = %self.name, %status, "xnat import returned server error");
            return SendOutcome::failure(format!("xnat returned {status}: {body}"), true);
        }

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return SendOutcome::failure(format!("xnat returned {status}: {body}"), false);
        }

        SendOutcome::success(files.len(), start.elapsed().as_millis() as u64)
    }
}
