//! Observer trait for selection and upload events.
//!
//! Inject an [`Arc<dyn IntakeObserver>`] via
//! [`crate::config::IntakeConfigBuilder::observer`] to be told whenever the
//! selection settles into a new state, when an upload fails, and when a
//! batch is rejected. For an async consumer, [`crate::DocumentIntake::events`]
//! carries the same information as a stream.
//!
//! # Example
//!
//! ```rust
//! use edgequake_intake::{IntakeConfig, IntakeObserver};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct Quantity(AtomicU32);
//!
//! impl IntakeObserver for Quantity {
//!     fn on_quantity_change(&self, total_page_count: u32) {
//!         self.0.store(total_page_count, Ordering::SeqCst);
//!     }
//! }
//!
//! let quantity = Arc::new(Quantity(AtomicU32::new(0)));
//! let config = IntakeConfig::builder()
//!     .observer(quantity as Arc<dyn IntakeObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::{UploadError, ValidationError};
use crate::output::{FileDetail, SelectionSnapshot};
use crate::quantity::total_page_count;
use crate::stream::IntakeEvent;
use crate::tracker::{FileId, SelectedFile};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Called by the intake as the selection changes.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Upload tasks run concurrently, so callbacks can arrive from any runtime
/// thread. They are never called concurrently with each other for selection
/// changes: those are serialized by the tracker lock, and must not re-enter
/// the intake.
pub trait IntakeObserver: Send + Sync {
    /// Called after every settled change of the selection.
    ///
    /// # Arguments
    /// * `files`: the full selection, in selection order
    /// * `total_page_count`: sum of page counts over `files`
    /// * `details`: `files` without their bytes, same order
    fn on_file_select(&self, files: &[SelectedFile], total_page_count: u32, details: &[FileDetail]) {
        let _ = (files, total_page_count, details);
    }

    /// Called right after [`on_file_select`](Self::on_file_select) with the
    /// same total.
    fn on_quantity_change(&self, total_page_count: u32) {
        let _ = total_page_count;
    }

    /// Called when one file's upload fails. The file stays selected, in
    /// `error`.
    fn on_upload_failed(&self, error: &UploadError) {
        let _ = error;
    }

    /// Called when a selected batch is rejected. Nothing was added.
    fn on_batch_rejected(&self, error: &ValidationError) {
        let _ = error;
    }
}

/// A no-op implementation for callers that don't need notifications.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl IntakeObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::IntakeConfig`].
pub type SharedObserver = Arc<dyn IntakeObserver>;

/// Fans each notification out to the observer and the event channel.
pub(crate) struct Notifier {
    observer: SharedObserver,
    events: broadcast::Sender<IntakeEvent>,
}

impl Notifier {
    pub(crate) fn new(observer: SharedObserver, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { observer, events }
    }

    pub(crate) fn selection_changed(&self, files: &[SelectedFile]) {
        let total = total_page_count(files);
        let snapshot = SelectionSnapshot::from_files(files);
        self.observer.on_file_select(files, total, &snapshot.files);
        self.observer.on_quantity_change(total);
        // No subscribers is fine.
        let _ = self.events.send(IntakeEvent::SelectionChanged(snapshot));
    }

    pub(crate) fn upload_failed(&self, id: FileId, error: &UploadError) {
        self.observer.on_upload_failed(error);
        let _ = self.events.send(IntakeEvent::UploadFailed {
            id,
            error: error.clone(),
        });
    }

    pub(crate) fn batch_rejected(&self, error: &ValidationError) {
        self.observer.on_batch_rejected(error);
        let _ = self.events.send(IntakeEvent::BatchRejected(error.clone()));
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    #[derive(Default)]
    struct Tracking {
        selects: AtomicUsize,
        last_total: AtomicU32,
        failures: AtomicUsize,
        rejections: AtomicUsize,
    }

    impl IntakeObserver for Tracking {
        fn on_file_select(&self, _files: &[SelectedFile], _total: u32, _details: &[FileDetail]) {
            self.selects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_quantity_change(&self, total_page_count: u32) {
            self.last_total.store(total_page_count, Ordering::SeqCst);
        }

        fn on_upload_failed(&self, _error: &UploadError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_rejected(&self, _error: &ValidationError) {
            self.rejections.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_accepts_everything() {
        let n = Notifier::new(Arc::new(NoopObserver), 4);
        n.selection_changed(&[]);
        n.batch_rejected(&ValidationError::Empty { name: "x".into() });
    }

    #[test]
    fn selection_change_reaches_observer_and_channel() {
        let obs = Arc::new(Tracking::default());
        let n = Notifier::new(obs.clone(), 4);
        let mut rx = n.subscribe();

        n.selection_changed(&[]);

        assert_eq!(obs.selects.load(Ordering::SeqCst), 1);
        assert_eq!(obs.last_total.load(Ordering::SeqCst), 0);
        match rx.try_recv().unwrap() {
            IntakeEvent::SelectionChanged(s) => assert_eq!(s.total_page_count, 0),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn failures_and_rejections_are_forwarded() {
        let obs = Arc::new(Tracking::default());
        let n = Notifier::new(obs.clone(), 4);
        n.upload_failed(
            FileId::new(),
            &UploadError::Rejected {
                name: "a.png".into(),
            },
        );
        n.batch_rejected(&ValidationError::Empty { name: "b".into() });
        assert_eq!(obs.failures.load(Ordering::SeqCst), 1);
        assert_eq!(obs.rejections.load(Ordering::SeqCst), 1);
    }
}
