//! The intake entry point: select, count, upload, remove.
//!
//! [`DocumentIntake`] ties the stages together. Selecting a batch runs
//! validation, then page counting, then adds the batch to the tracker and
//! starts one upload task per file. Everything after validation is
//! best-effort per file: a PDF that cannot be parsed still gets a count, and
//! a file that cannot be uploaded stays selected in `error`.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::observer::{NoopObserver, Notifier, SharedObserver};
use crate::output::{Inspection, SelectionSnapshot};
use crate::pipeline::input::{self, SourceFile};
use crate::pipeline::pagecount::count_pages;
use crate::pipeline::upload::run_upload;
use crate::pipeline::validate::{canonical_mime, validate_batch, validate_file};
use crate::quantity::total_page_count;
use crate::storage::ObjectStore;
use crate::stream::{event_stream, EventStream};
use crate::tracker::{FileId, FileStatus, SelectedFile, Tracker};
use futures::future::{join_all, try_join_all};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A live selection of files being uploaded to an [`ObjectStore`].
///
/// Cheap to clone; clones share the same selection.
///
/// # Example
///
/// ```rust,no_run
/// use edgequake_intake::{DocumentIntake, IntakeConfig, MemoryObjectStore};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), edgequake_intake::IntakeError> {
/// let intake = DocumentIntake::new(IntakeConfig::default(), Arc::new(MemoryObjectStore::new()));
/// intake.select_paths(["scan.png", "thesis.pdf"]).await?;
/// intake.settled().await;
/// println!("{} pages", intake.total_page_count());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DocumentIntake {
    inner: Arc<Inner>,
}

struct Inner {
    config: IntakeConfig,
    store: Arc<dyn ObjectStore>,
    tracker: Arc<Tracker>,
    tasks: Mutex<HashMap<FileId, JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for file in self.tracker.snapshot().iter() {
            if let Some(token) = &file.cancel {
                token.cancel();
            }
        }
    }
}

impl DocumentIntake {
    pub fn new(config: IntakeConfig, store: Arc<dyn ObjectStore>) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver) as SharedObserver);
        let notifier = Arc::new(Notifier::new(observer, config.event_capacity));
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                tracker: Arc::new(Tracker::new(notifier)),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.inner.config
    }

    /// Add a batch to the selection and start uploading it.
    ///
    /// The batch is all-or-nothing: if any file fails validation, nothing is
    /// added, the observer's `on_batch_rejected` fires, and the error is
    /// returned. An empty batch is a no-op.
    ///
    /// Returns the ids of the added files, in batch order. Uploads continue
    /// in the background; use [`settled`](Self::settled) to wait for them.
    pub async fn select_files(&self, files: Vec<SourceFile>) -> Result<Vec<FileId>, IntakeError> {
        if files.is_empty() {
            debug!("Empty selection; nothing to do");
            return Ok(Vec::new());
        }
        let inner = &self.inner;

        // ── Step 1: Validate the whole batch ─────────────────────────────
        let kinds = match validate_batch(&files, &inner.config) {
            Ok(kinds) => kinds,
            Err(e) => {
                warn!("Selection rejected: {}", e);
                inner.tracker.notifier().batch_rejected(&e);
                return Err(e.into());
            }
        };

        // ── Step 2: Count pages, concurrently ────────────────────────────
        let window = inner.config.heuristic_window_bytes;
        let counts = join_all(
            files
                .iter()
                .zip(&kinds)
                .map(|(f, &kind)| count_pages(kind, f.bytes.clone(), window)),
        )
        .await;

        let batch: Vec<SelectedFile> = files
            .into_iter()
            .zip(kinds)
            .zip(counts)
            .map(|((f, kind), count)| {
                debug!("{}: {} page(s) via {}", f.name, count.pages, count.method);
                let mime = canonical_mime(kind, &f.mime);
                SelectedFile::new(f.name, mime, kind, f.bytes, count)
            })
            .collect();

        // ── Step 3: Track, then upload each file ─────────────────────────
        let ids = inner.tracker.add_batch(batch);
        for &id in &ids {
            if let Err(e) = self.start_upload(id) {
                // Removed by a concurrent caller before its upload began.
                debug!("Not uploading {}: {}", id, e);
            }
        }

        info!(
            "Selected {} file(s); selection is now {} page(s)",
            ids.len(),
            self.total_page_count()
        );
        Ok(ids)
    }

    /// Read `paths` from disk and [`select_files`](Self::select_files) them.
    ///
    /// Any unreadable path fails the whole call before validation.
    pub async fn select_paths<I, P>(&self, paths: I) -> Result<Vec<FileId>, IntakeError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let reads = paths
            .into_iter()
            .map(|p| async move { input::read_path(p.as_ref()).await });
        let files = try_join_all(reads).await?;
        self.select_files(files).await
    }

    /// Remove a file from the selection.
    ///
    /// An in-flight upload is cancelled and its result discarded. A file that
    /// already reached `uploaded` is also deleted from the store; a failed
    /// delete is logged and does not fail the removal.
    pub async fn remove(&self, id: FileId) -> Result<(), IntakeError> {
        let inner = &self.inner;
        let removed = inner.tracker.remove(id)?;
        if let Some(token) = &removed.cancel {
            token.cancel();
        }
        if let Some(handle) = self.take_task(id) {
            let _ = handle.await;
        }
        info!("Removed {} ({})", removed.name, removed.status);

        if let Some(key) = removed.remote_key {
            match inner.store.delete_file(&key).await {
                Ok(()) => debug!("Deleted {} from the store", key),
                Err(e) => warn!("Could not delete {} from the store: {}", key, e),
            }
        }
        Ok(())
    }

    /// Start a new upload attempt for a file in `error`.
    pub fn retry(&self, id: FileId) -> Result<(), IntakeError> {
        let file = self
            .inner
            .tracker
            .get(id)
            .ok_or(IntakeError::UnknownFile { id })?;
        if file.status != FileStatus::Error {
            return Err(IntakeError::InvalidState {
                id,
                status: file.status,
            });
        }
        info!("Retrying upload of {}", file.name);
        self.start_upload(id)
    }

    /// Drop the whole selection, cancelling in-flight uploads.
    ///
    /// Uploaded objects stay in the store. Returns how many files were
    /// dropped.
    pub async fn clear(&self) -> usize {
        let removed = self.inner.tracker.clear();
        for token in removed.iter().filter_map(|f| f.cancel.as_ref()) {
            token.cancel();
        }
        // Uploads started after the tracker was cleared stay for `settled`.
        let handles: Vec<_> = {
            let mut tasks = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            removed.iter().filter_map(|f| tasks.remove(&f.id)).collect()
        };
        join_all(handles).await;
        info!("Cleared {} file(s)", removed.len());
        removed.len()
    }

    /// Wait until no upload is in flight.
    pub async fn settled(&self) {
        loop {
            let handles: Vec<_> = self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain()
                .map(|(_, h)| h)
                .collect();
            if handles.is_empty() {
                return;
            }
            join_all(handles).await;
        }
    }

    /// The selection as it is now.
    pub fn files(&self) -> Vec<SelectedFile> {
        self.inner.tracker.snapshot().to_vec()
    }

    /// The selection as it is now, without file bytes.
    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot::from_files(&self.inner.tracker.snapshot())
    }

    /// Current billable quantity.
    pub fn total_page_count(&self) -> u32 {
        total_page_count(&self.inner.tracker.snapshot())
    }

    /// Subscribe to intake events from this point on.
    pub fn events(&self) -> EventStream {
        event_stream(self.inner.tracker.notifier().subscribe())
    }

    fn start_upload(&self, id: FileId) -> Result<(), IntakeError> {
        let inner = &self.inner;
        let job = inner.tracker.begin_upload(id, CancellationToken::new())?;
        let handle = tokio::spawn(run_upload(
            Arc::clone(&inner.tracker),
            Arc::clone(&inner.store),
            job,
        ));

        let mut tasks = inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(id, handle);
        Ok(())
    }

    fn take_task(&self, id: FileId) -> Option<JoinHandle<()>> {
        self.inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}

/// Validate and count one file without selecting it.
pub async fn inspect(path: impl AsRef<Path>, config: &IntakeConfig) -> Result<Inspection, IntakeError> {
    let file = input::read_path(path.as_ref()).await?;
    let kind = validate_file(&file, config)?;
    let size = file.size();
    let page_count = count_pages(kind, file.bytes, config.heuristic_window_bytes).await;
    Ok(Inspection {
        name: file.name,
        mime: canonical_mime(kind, &file.mime),
        kind,
        size,
        page_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;

    #[tokio::test]
    async fn clear_leaves_uploads_it_did_not_drop() {
        let intake = DocumentIntake::new(IntakeConfig::default(), Arc::new(MemoryObjectStore::new()));
        intake
            .select_files(vec![SourceFile::new("a.png", "image/png", vec![1u8; 8])])
            .await
            .unwrap();

        // An upload registered by a selection that raced past the clear.
        let late = FileId::new();
        let handle = tokio::spawn(std::future::pending::<()>());
        intake.inner.tasks.lock().unwrap().insert(late, handle);

        assert_eq!(intake.clear().await, 1);

        let handle = intake.inner.tasks.lock().unwrap().remove(&late);
        let handle = handle.expect("late upload handle was drained by clear");
        handle.abort();
    }
}
