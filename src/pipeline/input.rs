//! Input: raw file bytes plus the name and MIME type the validator needs.
//!
//! Callers that already hold the bytes (an HTTP handler, a UI layer) build a
//! [`SourceFile`] directly. Callers with paths use [`read_path`], which reads
//! the file asynchronously and works out a MIME type the same way a browser
//! file picker would: from the extension first, then from magic bytes.

use crate::error::IntakeError;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// MIME type reported when nothing better can be determined.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A file as selected by the user, before validation.
#[derive(Clone)]
pub struct SourceFile {
    /// Display name, usually the original file name.
    pub name: String,
    /// Declared MIME type. May be empty or wrong for PDFs; the validator
    /// falls back to the `.pdf` extension.
    pub mime: String,
    /// File content.
    pub bytes: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes: bytes.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Read a file from disk into a [`SourceFile`].
pub async fn read_path(path: &Path) -> Result<SourceFile, IntakeError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| IntakeError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let mime = detect_mime(&name, &bytes);
    debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), mime);

    Ok(SourceFile::new(name, mime, bytes))
}

/// Guess a MIME type from the file name, then from the content.
pub fn detect_mime(name: &str, bytes: &[u8]) -> String {
    if let Some(mime) = mime_from_extension(name) {
        return mime.to_string();
    }
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" | "jpe" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}
