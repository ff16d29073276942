//! The selected-files collection and each entry's upload lifecycle.
//!
//! ```text
//!   add_batch        begin_upload           complete_upload
//!  ─────────▶ pending ───────────▶ uploading ───────────────▶ uploaded
//!                 ▲                    │
//!                 │   begin_upload     │ fail_upload
//!                 └──── error ◀────────┘
//!
//!  remove: any state ─▶ gone (terminal)
//! ```
//!
//! Every change is a copy-on-write swap: the closure edits a private copy of
//! the list and the copy replaces the shared one only if the closure
//! succeeds. Observers are notified with the new list before the lock is
//! released, so notifications arrive in the same order the changes were
//! made and always describe a list that actually existed.
//!
//! Observer callbacks therefore run while the tracker is locked. They must
//! not call back into the tracker (or the [`crate::DocumentIntake`] that owns
//! it) synchronously.
//!
//! ## Late upload results
//!
//! An upload result is applied only to the attempt that produced it. Each
//! `begin_upload` bumps the entry's attempt counter; a completion or failure
//! carrying an older attempt, arriving after the entry was removed, or after
//! its cancellation token fired, is dropped.

use crate::error::{IntakeError, UploadError};
use crate::observer::Notifier;
use crate::pipeline::pagecount::{PageCount, PageCountMethod};
use crate::pipeline::upload::UploadJob;
use crate::pipeline::validate::FileKind;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Stable identifier of a selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(Uuid);

impl FileId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload status of a selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Uploaded,
    Error,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::Uploading => "uploading",
            FileStatus::Uploaded => "uploaded",
            FileStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One tracked file.
#[derive(Clone)]
pub struct SelectedFile {
    pub id: FileId,
    pub name: String,
    pub mime: String,
    pub kind: FileKind,
    pub bytes: Bytes,
    /// Billable pages, ≥ 1.
    pub page_count: u32,
    pub page_count_method: PageCountMethod,
    pub status: FileStatus,
    /// Object key assigned by the store once uploaded.
    pub remote_key: Option<String>,
    /// Present while an upload is in flight.
    pub cancel: Option<CancellationToken>,
    /// Why the last upload attempt failed.
    pub error: Option<UploadError>,
    /// Number of upload attempts started.
    pub attempt: u32,
}

impl SelectedFile {
    pub(crate) fn new(
        name: String,
        mime: String,
        kind: FileKind,
        bytes: Bytes,
        count: PageCount,
    ) -> Self {
        Self {
            id: FileId::new(),
            name,
            mime,
            kind,
            bytes,
            page_count: count.pages,
            page_count_method: count.method,
            status: FileStatus::Pending,
            remote_key: None,
            cancel: None,
            error: None,
            attempt: 0,
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("kind", &self.kind)
            .field("size", &self.bytes.len())
            .field("page_count", &self.page_count)
            .field("status", &self.status)
            .field("remote_key", &self.remote_key)
            .field("error", &self.error)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Owns the selected-files list and publishes every change.
pub(crate) struct Tracker {
    files: Mutex<Arc<Vec<SelectedFile>>>,
    notifier: Arc<Notifier>,
}

impl Tracker {
    pub(crate) fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            files: Mutex::new(Arc::new(Vec::new())),
            notifier,
        }
    }

    pub(crate) fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// The current list. Cheap: shares the published snapshot.
    pub(crate) fn snapshot(&self) -> Arc<Vec<SelectedFile>> {
        Arc::clone(&self.files.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn get(&self, id: FileId) -> Option<SelectedFile> {
        self.snapshot().iter().find(|f| f.id == id).cloned()
    }

    /// Apply `change` to a copy of the list; swap and publish on success.
    fn update<R>(
        &self,
        change: impl FnOnce(&mut Vec<SelectedFile>) -> Result<R, IntakeError>,
    ) -> Result<R, IntakeError> {
        let mut guard = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::clone(&guard);
        let out = change(&mut next)?;
        *guard = Arc::new(next);
        self.notifier.selection_changed(&guard);
        Ok(out)
    }

    /// Append a validated, counted batch in one change.
    pub(crate) fn add_batch(&self, batch: Vec<SelectedFile>) -> Vec<FileId> {
        let ids: Vec<FileId> = batch.iter().map(|f| f.id).collect();
        // Appending cannot fail.
        let _ = self.update(|files| {
            files.extend(batch);
            Ok(())
        });
        debug!("Added {} file(s) to the selection", ids.len());
        ids
    }

    /// `pending | error → uploading`. Returns the job to run.
    pub(crate) fn begin_upload(
        &self,
        id: FileId,
        token: CancellationToken,
    ) -> Result<UploadJob, IntakeError> {
        self.update(|files| {
            let file = find_mut(files, id)?;
            if !matches!(file.status, FileStatus::Pending | FileStatus::Error) {
                return Err(IntakeError::InvalidState {
                    id,
                    status: file.status,
                });
            }
            file.status = FileStatus::Uploading;
            file.attempt += 1;
            file.error = None;
            file.cancel = Some(token.clone());
            Ok(UploadJob {
                id,
                attempt: file.attempt,
                name: file.name.clone(),
                mime: file.mime.clone(),
                bytes: file.bytes.clone(),
                token,
            })
        })
    }

    /// `uploading → uploaded`. Returns `false` if the result was stale.
    pub(crate) fn complete_upload(&self, id: FileId, attempt: u32, key: String) -> bool {
        self.update(|files| {
            let file = live_attempt(files, id, attempt)?;
            file.status = FileStatus::Uploaded;
            file.remote_key = Some(key);
            file.cancel = None;
            Ok(())
        })
        .is_ok()
    }

    /// `uploading → error`. Returns `false` if the result was stale.
    pub(crate) fn fail_upload(&self, id: FileId, attempt: u32, error: UploadError) -> bool {
        self.update(|files| {
            let file = live_attempt(files, id, attempt)?;
            file.status = FileStatus::Error;
            file.error = Some(error);
            file.cancel = None;
            Ok(())
        })
        .is_ok()
    }

    /// Drop an entry from the list.
    pub(crate) fn remove(&self, id: FileId) -> Result<SelectedFile, IntakeError> {
        self.update(|files| {
            let pos = files
                .iter()
                .position(|f| f.id == id)
                .ok_or(IntakeError::UnknownFile { id })?;
            Ok(files.remove(pos))
        })
    }

    /// Drop every entry.
    pub(crate) fn clear(&self) -> Vec<SelectedFile> {
        self.update(|files| Ok(std::mem::take(files)))
            .unwrap_or_default()
    }
}

fn find_mut(files: &mut [SelectedFile], id: FileId) -> Result<&mut SelectedFile, IntakeError> {
    files
        .iter_mut()
        .find(|f| f.id == id)
        .ok_or(IntakeError::UnknownFile { id })
}

/// The entry for `id` if `attempt` is still the live upload for it.
fn live_attempt(
    files: &mut [SelectedFile],
    id: FileId,
    attempt: u32,
) -> Result<&mut SelectedFile, IntakeError> {
    let file = find_mut(files, id)?;
    let cancelled = file.cancel.as_ref().is_some_and(|t| t.is_cancelled());
    if file.status != FileStatus::Uploading || file.attempt != attempt || cancelled {
        debug!("Discarding stale upload result for {} (attempt {})", id, attempt);
        return Err(IntakeError::InvalidState {
            id,
            status: file.status,
        });
    }
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{IntakeObserver, NoopObserver};
    use crate::output::FileDetail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker() -> Tracker {
        Tracker::new(Arc::new(Notifier::new(Arc::new(NoopObserver), 8)))
    }

    fn pdf(pages: u32) -> SelectedFile {
        SelectedFile::new(
            "doc.pdf".into(),
            "application/pdf".into(),
            FileKind::Pdf,
            Bytes::from_static(b"%PDF"),
            PageCount {
                pages,
                method: PageCountMethod::Parsed,
            },
        )
    }

    #[test]
    fn new_entries_are_pending() {
        let t = tracker();
        let ids = t.add_batch(vec![pdf(2), pdf(3)]);
        let snap = t.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|f| f.status == FileStatus::Pending));
        assert_eq!(snap[0].id, ids[0]);
    }

    #[test]
    fn upload_lifecycle_reaches_uploaded() {
        let t = tracker();
        let id = t.add_batch(vec![pdf(1)])[0];
        let job = t.begin_upload(id, CancellationToken::new()).unwrap();
        assert_eq!(t.get(id).unwrap().status, FileStatus::Uploading);
        assert!(t.complete_upload(id, job.attempt, "k/1".into()));
        let f = t.get(id).unwrap();
        assert_eq!(f.status, FileStatus::Uploaded);
        assert_eq!(f.remote_key.as_deref(), Some("k/1"));
        assert!(f.cancel.is_none());
    }

    #[test]
    fn uploaded_file_cannot_start_again() {
        let t = tracker();
        let id = t.add_batch(vec![pdf(1)])[0];
        let job = t.begin_upload(id, CancellationToken::new()).unwrap();
        t.complete_upload(id, job.attempt, "k".into());
        let err = t.begin_upload(id, CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err,
            IntakeError::InvalidState {
                status: FileStatus::Uploaded,
                ..
            }
        ));
    }

    #[test]
    fn stale_attempt_is_discarded() {
        let t = tracker();
        let id = t.add_batch(vec![pdf(1)])[0];
        let first = t.begin_upload(id, CancellationToken::new()).unwrap();
        t.fail_upload(
            id,
            first.attempt,
            UploadError::Rejected {
                name: "doc.pdf".into(),
            },
        );
        let second = t.begin_upload(id, CancellationToken::new()).unwrap();
        assert!(!t.complete_upload(id, first.attempt, "old".into()));
        assert!(t.complete_upload(id, second.attempt, "new".into()));
        assert_eq!(t.get(id).unwrap().remote_key.as_deref(), Some("new"));
    }

    #[test]
    fn cancelled_attempt_is_discarded() {
        let t = tracker();
        let id = t.add_batch(vec![pdf(1)])[0];
        let token = CancellationToken::new();
        let job = t.begin_upload(id, token.clone()).unwrap();
        token.cancel();
        assert!(!t.complete_upload(id, job.attempt, "k".into()));
        assert_eq!(t.get(id).unwrap().status, FileStatus::Uploading);
    }

    #[test]
    fn completion_after_removal_is_discarded() {
        let t = tracker();
        let id = t.add_batch(vec![pdf(1)])[0];
        let job = t.begin_upload(id, CancellationToken::new()).unwrap();
        t.remove(id).unwrap();
        assert!(!t.complete_upload(id, job.attempt, "k".into()));
        assert!(t.snapshot().is_empty());
    }

    #[test]
    fn removing_unknown_id_fails_without_publishing() {
        struct Count(AtomicUsize);
        impl IntakeObserver for Count {
            fn on_file_select(&self, _: &[SelectedFile], _: u32, _: &[FileDetail]) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let count = Arc::new(Count(AtomicUsize::new(0)));
        let t = Tracker::new(Arc::new(Notifier::new(count.clone(), 8)));
        let err = t.remove(FileId::new()).unwrap_err();
        assert!(matches!(err, IntakeError::UnknownFile { .. }));
        assert_eq!(count.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_returns_everything() {
        let t = tracker();
        t.add_batch(vec![pdf(1), pdf(2)]);
        assert_eq!(t.clear().len(), 2);
        assert!(t.snapshot().is_empty());
    }
}
