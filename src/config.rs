//! Configuration types for document intake.
//!
//! All intake behaviour is controlled through [`IntakeConfig`], built via its
//! [`IntakeConfigBuilder`]. The remote store has its own [`StoreConfig`]
//! because it configures a collaborator, not the pipeline.

use crate::error::{IntakeError, StoreError};
use crate::observer::SharedObserver;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One mebibyte, the unit every size limit is expressed in.
pub const MIB: u64 = 1024 * 1024;

/// Configuration for a [`crate::DocumentIntake`].
///
/// # Example
/// ```rust
/// use edgequake_intake::{Accept, IntakeConfig};
///
/// let config = IntakeConfig::builder()
///     .accept(Accept::ImagesOnly)
///     .max_image_mb(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_image_bytes, 5 * 1024 * 1024);
/// ```
#[derive(Clone)]
pub struct IntakeConfig {
    /// Largest accepted image, in bytes. Default: 10 MiB.
    pub max_image_bytes: u64,

    /// Largest accepted PDF, in bytes. Default: 50 MiB.
    pub max_pdf_bytes: u64,

    /// Generic cap that overrides both per-kind limits when set.
    pub max_file_bytes: Option<u64>,

    /// Which kinds of file this intake accepts. Default: images and PDFs.
    pub accept: Accept,

    /// How much of a PDF the heuristic page counter looks at when the parser
    /// fails. Default: 100 KiB.
    pub heuristic_window_bytes: usize,

    /// Capacity of the broadcast queue behind [`crate::DocumentIntake::events`].
    /// Slow subscribers that fall further behind than this skip events.
    /// Default: 64.
    pub event_capacity: usize,

    /// Observer notified after every settled change of the selection.
    pub observer: Option<SharedObserver>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * MIB,
            max_pdf_bytes: 50 * MIB,
            max_file_bytes: None,
            accept: Accept::default(),
            heuristic_window_bytes: 100 * 1024,
            event_capacity: 64,
            observer: None,
        }
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("max_image_bytes", &self.max_image_bytes)
            .field("max_pdf_bytes", &self.max_pdf_bytes)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("accept", &self.accept)
            .field("heuristic_window_bytes", &self.heuristic_window_bytes)
            .field("event_capacity", &self.event_capacity)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn IntakeObserver>"))
            .finish()
    }
}

impl IntakeConfig {
    /// Create a new builder for `IntakeConfig`.
    pub fn builder() -> IntakeConfigBuilder {
        IntakeConfigBuilder {
            config: Self::default(),
        }
    }

    /// Effective size limit for an image.
    pub fn image_limit(&self) -> u64 {
        self.max_file_bytes.unwrap_or(self.max_image_bytes)
    }

    /// Effective size limit for a PDF.
    pub fn pdf_limit(&self) -> u64 {
        self.max_file_bytes.unwrap_or(self.max_pdf_bytes)
    }
}

/// Builder for [`IntakeConfig`].
#[derive(Debug)]
pub struct IntakeConfigBuilder {
    config: IntakeConfig,
}

impl IntakeConfigBuilder {
    pub fn max_image_bytes(mut self, bytes: u64) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn max_image_mb(self, mb: u64) -> Self {
        self.max_image_bytes(mb.saturating_mul(MIB))
    }

    pub fn max_pdf_bytes(mut self, bytes: u64) -> Self {
        self.config.max_pdf_bytes = bytes;
        self
    }

    pub fn max_pdf_mb(self, mb: u64) -> Self {
        self.max_pdf_bytes(mb.saturating_mul(MIB))
    }

    /// One cap for every kind, overriding the per-kind limits.
    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = Some(bytes);
        self
    }

    pub fn max_file_mb(self, mb: u64) -> Self {
        self.max_file_bytes(mb.saturating_mul(MIB))
    }

    pub fn accept(mut self, accept: Accept) -> Self {
        self.config.accept = accept;
        self
    }

    pub fn heuristic_window_bytes(mut self, bytes: usize) -> Self {
        self.config.heuristic_window_bytes = bytes.max(1024);
        self
    }

    pub fn event_capacity(mut self, n: usize) -> Self {
        self.config.event_capacity = n.max(1);
        self
    }

    pub fn observer(mut self, observer: SharedObserver) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IntakeConfig, IntakeError> {
        let c = &self.config;
        if c.max_image_bytes == 0 || c.max_pdf_bytes == 0 || c.max_file_bytes == Some(0) {
            return Err(IntakeError::InvalidConfig(
                "size limits must be greater than zero".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which file kinds an intake accepts.
///
/// Document services take both; the admin product-image form takes images
/// only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accept {
    /// JPEG, PNG, WebP, GIF and PDF. (default)
    #[default]
    ImagesAndPdf,
    /// JPEG, PNG, WebP and GIF.
    ImagesOnly,
    /// PDF only.
    PdfOnly,
}

impl Accept {
    pub fn images(self) -> bool {
        matches!(self, Accept::ImagesAndPdf | Accept::ImagesOnly)
    }

    pub fn pdfs(self) -> bool {
        matches!(self, Accept::ImagesAndPdf | Accept::PdfOnly)
    }

    /// Human-readable list used in rejection messages.
    pub fn describe(self) -> &'static str {
        match self {
            Accept::ImagesAndPdf => "JPEG, PNG, WebP, GIF, PDF",
            Accept::ImagesOnly => "JPEG, PNG, WebP, GIF",
            Accept::PdfOnly => "PDF",
        }
    }
}

// ── Remote store ─────────────────────────────────────────────────────────

/// Connection settings for [`crate::storage::HttpObjectStore`].
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the storage API, e.g. `https://api.example.com/storage`.
    pub base_url: String,

    /// Path appended to `base_url` for uploads. Default: `/upload`.
    pub upload_path: String,

    /// Path prefix for deletes; the key is appended. Default: `/files`.
    pub delete_path: String,

    /// Bearer token sent with every request.
    pub bearer_token: Option<String>,

    /// Per-request timeout in seconds. Default: 60.
    pub timeout_secs: u64,
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            upload_path: "/upload".into(),
            delete_path: "/files".into(),
            bearer_token: None,
            timeout_secs: 60,
        }
    }

    pub fn upload_url(&self) -> String {
        join_url(&self.base_url, &self.upload_path)
    }

    /// URL of the object stored under `key`.
    ///
    /// Each `/`-separated piece of the key becomes one percent-encoded path
    /// segment, so `#`, `?` and spaces in file names stay in the path.
    pub fn delete_url(&self, key: &str) -> Result<Url, StoreError> {
        let prefix = join_url(&self.base_url, &self.delete_path);
        let mut url =
            Url::parse(&prefix).map_err(|e| StoreError::InvalidUrl(format!("{prefix}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::InvalidUrl(format!("{prefix} cannot have a path")))?
            .pop_if_empty()
            .extend(key.split('/'));
        Ok(url)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("base_url", &self.base_url)
            .field("upload_path", &self.upload_path)
            .field("delete_path", &self.delete_path)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let c = IntakeConfig::default();
        assert_eq!(c.image_limit(), 10 * MIB);
        assert_eq!(c.pdf_limit(), 50 * MIB);
        assert_eq!(c.heuristic_window_bytes, 100 * 1024);
        assert_eq!(c.accept, Accept::ImagesAndPdf);
    }

    #[test]
    fn generic_limit_overrides_both_kinds() {
        let c = IntakeConfig::builder().max_file_mb(2).build().unwrap();
        assert_eq!(c.image_limit(), 2 * MIB);
        assert_eq!(c.pdf_limit(), 2 * MIB);
    }

    #[test]
    fn zero_limit_is_rejected() {
        let err = IntakeConfig::builder().max_pdf_bytes(0).build().unwrap_err();
        assert!(matches!(err, IntakeError::InvalidConfig(_)));
    }

    #[test]
    fn heuristic_window_has_a_floor() {
        let c = IntakeConfig::builder()
            .heuristic_window_bytes(10)
            .build()
            .unwrap();
        assert_eq!(c.heuristic_window_bytes, 1024);
    }

    #[test]
    fn accept_policy_flags() {
        assert!(Accept::ImagesAndPdf.images() && Accept::ImagesAndPdf.pdfs());
        assert!(Accept::ImagesOnly.images() && !Accept::ImagesOnly.pdfs());
        assert!(!Accept::PdfOnly.images() && Accept::PdfOnly.pdfs());
    }

    #[test]
    fn store_urls_are_joined_cleanly() {
        let s = StoreConfig::new("https://api.example.com/storage/");
        assert_eq!(s.upload_url(), "https://api.example.com/storage/upload");
        assert_eq!(
            s.delete_url("abc/123.pdf").unwrap().as_str(),
            "https://api.example.com/storage/files/abc/123.pdf"
        );
    }

    #[test]
    fn delete_url_keeps_awkward_keys_in_the_path() {
        let s = StoreConfig::new("https://api.example.com");
        let url = s.delete_url("uploads/x-my file#1?.pdf").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/files/uploads/x-my%20file%231%3F.pdf"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn delete_url_needs_a_valid_base() {
        let s = StoreConfig::new("not a url");
        assert!(matches!(s.delete_url("k"), Err(StoreError::InvalidUrl(_))));
    }

    #[test]
    fn event_capacity_has_a_floor() {
        let c = IntakeConfig::builder().event_capacity(0).build().unwrap();
        assert_eq!(c.event_capacity, 1);
    }

    #[test]
    fn store_debug_redacts_token() {
        let mut s = StoreConfig::new("http://localhost");
        s.bearer_token = Some("secret".into());
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("secret"));
    }
}
