//! Error types for the edgequake-intake library.
//!
//! Four error types map onto four distinct failure modes:
//!
//! * [`IntakeError`] is **fatal for one call**. The requested operation could
//!   not happen at all (batch rejected, unreadable path, unknown file id).
//!   Returned as `Err(IntakeError)` from [`crate::DocumentIntake`] methods.
//!
//! * [`ValidationError`] is the user-facing reason a selected batch was
//!   rejected. Carried inside [`IntakeError::Validation`] and also handed to
//!   [`crate::IntakeObserver::on_batch_rejected`].
//!
//! * [`UploadError`] is **non-fatal**. One file failed to upload while every
//!   other file carries on. Stored on the tracked entry and surfaced as a
//!   notification, never returned from a call.
//!
//! * [`StoreError`] is what an [`crate::storage::ObjectStore`] implementation
//!   reports. The orchestrator turns it into an [`UploadError`]; delete
//!   failures are only logged.

use crate::tracker::{FileId, FileStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by [`crate::DocumentIntake`] operations.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// The selected batch failed validation; nothing was added.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A path handed to `select_paths` could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Tracker errors ────────────────────────────────────────────────────
    /// No tracked file has this id (already removed, or never added).
    #[error("No selected file with id {id}")]
    UnknownFile { id: FileId },

    /// The file exists but the requested transition is not allowed from
    /// its current status (e.g. retrying a file that is not in `error`).
    #[error("File {id} is {status} and cannot be changed this way")]
    InvalidState { id: FileId, status: FileStatus },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The remote store client could not be constructed.
    #[error("Failed to set up object store: {0}")]
    StoreSetup(String),
}

/// Why a selected batch was rejected.
///
/// The `Display` output is written for end users and is shown verbatim as
/// the rejection message.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum ValidationError {
    /// The file's type is not on the allow-list for this intake.
    #[error("\"{name}\" is not a supported file type ({mime}). Allowed: {allowed}.")]
    UnsupportedType {
        name: String,
        mime: String,
        allowed: String,
    },

    /// The file exceeds the size cap for its kind.
    #[error("\"{name}\" is too large ({size_mb:.1} MB). Maximum size is {limit_mb} MB.")]
    TooLarge {
        name: String,
        size_mb: f64,
        limit_mb: u64,
    },

    /// The file has no content.
    #[error("\"{name}\" is empty.")]
    Empty { name: String },
}

/// A non-fatal upload failure for a single file.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum UploadError {
    /// The store answered but reported `success: false`.
    #[error("Upload of \"{name}\" was rejected by the server")]
    Rejected { name: String },

    /// The store reported success without returning an object key.
    #[error("Upload of \"{name}\" returned no file key")]
    MissingKey { name: String },

    /// The call itself failed (network, HTTP status, decode).
    #[error("Upload of \"{name}\" failed: {detail}")]
    Transport { name: String, detail: String },
}

impl UploadError {
    /// Name of the file the failure belongs to.
    pub fn file_name(&self) -> &str {
        match self {
            UploadError::Rejected { name }
            | UploadError::MissingKey { name }
            | UploadError::Transport { name, .. } => name,
        }
    }
}

/// Failures reported by an object store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Network-level failure talking to the store.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status code.
    #[error("Store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected shape.
    #[error("Could not decode store response: {0}")]
    Decode(String),

    /// The key does not exist in the store.
    #[error("No object stored under key '{key}'")]
    NotFound { key: String },

    /// A request URL could not be built from the store configuration.
    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),

    /// The store is unavailable for reasons specific to the implementation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_display_is_user_facing() {
        let e = ValidationError::TooLarge {
            name: "scan.png".into(),
            size_mb: 12.34,
            limit_mb: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.png"), "got: {msg}");
        assert!(msg.contains("12.3 MB"), "got: {msg}");
        assert!(msg.contains("10 MB"), "got: {msg}");
    }

    #[test]
    fn validation_error_is_transparent_inside_intake_error() {
        let inner = ValidationError::Empty {
            name: "blank.pdf".into(),
        };
        let outer = IntakeError::from(inner.clone());
        assert_eq!(outer.to_string(), inner.to_string());
    }

    #[test]
    fn upload_error_names_the_file() {
        let e = UploadError::Transport {
            name: "thesis.pdf".into(),
            detail: "connection reset".into(),
        };
        assert_eq!(e.file_name(), "thesis.pdf");
        assert!(e.to_string().contains("connection reset"));
    }

    #[test]
    fn status_display() {
        let e = StoreError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert!(e.to_string().contains("503"));
    }
}
