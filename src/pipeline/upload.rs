//! Upload stage: push one selected file to the object store.
//!
//! Each file gets its own task and its own cancellation token, so files in
//! a batch succeed or fail independently and a removal can stop exactly one
//! upload. Cancellation wins any race with the store call: once the token
//! fires, the result is never applied and the task leaves the entry to
//! the canceller.

use crate::error::{StoreError, UploadError};
use crate::storage::{ObjectStore, UploadPart, UploadResponse};
use crate::tracker::{FileId, Tracker};
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything an upload task needs, copied out of the tracker when the
/// attempt starts.
#[derive(Debug, Clone)]
pub(crate) struct UploadJob {
    pub id: FileId,
    pub attempt: u32,
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
    pub token: CancellationToken,
}

/// Run one upload attempt to completion, cancellation, or failure.
pub(crate) async fn run_upload(tracker: Arc<Tracker>, store: Arc<dyn ObjectStore>, job: UploadJob) {
    let part = UploadPart {
        name: job.name.clone(),
        mime: job.mime.clone(),
        bytes: job.bytes.clone(),
    };
    debug!("Uploading {} (attempt {})", job.name, job.attempt);

    let result = tokio::select! {
        biased;
        _ = job.token.cancelled() => {
            // Whoever cancelled owns the entry now.
            debug!("Upload of {} cancelled", job.name);
            return;
        }
        result = store.upload_files(vec![part]) => result,
    };

    match interpret(&job.name, result) {
        Ok(key) => {
            if tracker.complete_upload(job.id, job.attempt, key.clone()) {
                info!("Uploaded {} as {}", job.name, key);
            }
        }
        Err(error) => {
            warn!("{}", error);
            if tracker.fail_upload(job.id, job.attempt, error.clone()) {
                tracker.notifier().upload_failed(job.id, &error);
            }
        }
    }
}

fn interpret(name: &str, result: Result<UploadResponse, StoreError>) -> Result<String, UploadError> {
    let response = result.map_err(|e| UploadError::Transport {
        name: name.to_string(),
        detail: e.to_string(),
    })?;
    if !response.success {
        return Err(UploadError::Rejected {
            name: name.to_string(),
        });
    }
    response
        .first_key()
        .map(str::to_string)
        .ok_or_else(|| UploadError::MissingKey {
            name: name.to_string(),
        })
}
