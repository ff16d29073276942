//! The remote object store that selected files are uploaded to.
//!
//! [`ObjectStore`] is the seam: the intake only ever calls `upload_files`
//! and `delete_file`. Two implementations ship with the crate:
//!
//! * [`HttpObjectStore`] posts a multipart form to a storage API and expects
//!   `{ "success": bool, "data": { "files": [ { "key": "…" } ] } }` back.
//! * [`MemoryObjectStore`] keeps objects in a map. Used by `--dry-run` and
//!   by tests.

use crate::config::StoreConfig;
use crate::error::{IntakeError, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One file in an upload request.
#[derive(Clone)]
pub struct UploadPart {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl std::fmt::Debug for UploadPart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPart")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Body returned by an upload call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<UploadData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadData {
    #[serde(default)]
    pub files: Vec<StoredFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub key: String,
}

impl UploadResponse {
    /// A successful response carrying `keys`, in order.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: true,
            data: Some(UploadData {
                files: keys.into_iter().map(|k| StoredFile { key: k.into() }).collect(),
            }),
        }
    }

    /// A response with `success: false` and no data.
    pub fn rejected() -> Self {
        Self {
            success: false,
            data: None,
        }
    }

    /// Key of the first stored file, if any.
    pub fn first_key(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.files.first())
            .map(|f| f.key.as_str())
            .filter(|k| !k.is_empty())
    }
}

/// Where selected files are uploaded to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload one or more files in a single request.
    async fn upload_files(&self, files: Vec<UploadPart>) -> Result<UploadResponse, StoreError>;

    /// Delete a previously uploaded object.
    async fn delete_file(&self, key: &str) -> Result<(), StoreError>;
}

// ── HTTP ─────────────────────────────────────────────────────────────────

/// Content type sent when a part's MIME type does not parse.
const FALLBACK_MIME: &str = "application/octet-stream";

/// [`ObjectStore`] backed by a storage HTTP API.
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    config: StoreConfig,
}

impl HttpObjectStore {
    pub fn new(config: StoreConfig) -> Result<Self, IntakeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IntakeError::StoreSetup(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload_files(&self, files: Vec<UploadPart>) -> Result<UploadResponse, StoreError> {
        let url = self.config.upload_url();
        let mut form = Form::new();
        for file in files {
            debug!("Adding {} ({} bytes) to upload form", file.name, file.bytes.len());
            form = form.part("files", form_part(file)?);
        }

        let response = self
            .authorize(self.client.post(&url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StoreError> {
        let url = self.config.delete_url(key)?;
        let response = self.authorize(self.client.delete(url)).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        info!("Deleted remote object {}", key);
        Ok(())
    }
}

/// One multipart part for `file`, sharing its buffer.
fn form_part(file: UploadPart) -> Result<Part, StoreError> {
    let len = file.bytes.len() as u64;
    let part = |bytes: Bytes, name: String| {
        Part::stream_with_length(Body::from(bytes), len).file_name(name)
    };
    match part(file.bytes.clone(), file.name.clone()).mime_str(&file.mime) {
        Ok(p) => Ok(p),
        Err(e) => {
            warn!(
                "{}: MIME type '{}' is not usable ({}); sending {}",
                file.name, file.mime, e, FALLBACK_MIME
            );
            Ok(part(file.bytes, file.name).mime_str(FALLBACK_MIME)?)
        }
    }
}

// ── In-memory ────────────────────────────────────────────────────────────

/// [`ObjectStore`] that keeps everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload_files(&self, files: Vec<UploadPart>) -> Result<UploadResponse, StoreError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<String> = files
            .into_iter()
            .map(|file| {
                let key = format!("uploads/{}-{}", Uuid::new_v4(), file.name);
                objects.insert(key.clone(), file.bytes);
                key
            })
            .collect();
        Ok(UploadResponse::with_keys(keys))
    }

    async fn delete_file(&self, key: &str) -> Result<(), StoreError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str) -> UploadPart {
        UploadPart {
            name: name.into(),
            mime: "image/png".into(),
            bytes: Bytes::from_static(b"png"),
        }
    }

    #[test]
    fn response_decodes_the_storage_api_shape() {
        let json = r#"{"success":true,"data":{"files":[{"key":"a/1.pdf"},{"key":"a/2.pdf"}]}}"#;
        let resp: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_key(), Some("a/1.pdf"));
    }

    #[test]
    fn response_without_data_has_no_key() {
        let resp: UploadResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.first_key(), None);
    }

    #[test]
    fn empty_key_is_no_key() {
        assert_eq!(UploadResponse::with_keys([""]).first_key(), None);
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        let resp = store.upload_files(vec![part("a.png")]).await.unwrap();
        let key = resp.first_key().unwrap().to_string();
        assert!(key.ends_with("-a.png"));
        assert!(store.contains(&key));

        store.delete_file(&key).await.unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.delete_file(&key).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn unparseable_mime_falls_back_to_octet_stream() {
        let mut p = part("a.pdf");
        p.mime = String::new();
        assert!(form_part(p).is_ok());
        assert!(form_part(part("b.png")).is_ok());
    }

    #[test]
    fn http_store_builds() {
        assert!(HttpObjectStore::new(StoreConfig::new("http://127.0.0.1:9")).is_ok());
    }
}
