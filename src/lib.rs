//! # edgequake-intake
//!
//! Document intake for print-on-demand orders: turn the files a customer
//! selects into a billable page count, and keep each file's upload to the
//! object store on track.
//!
//! ## Pipeline Overview
//!
//! ```text
//! selected files
//!  │
//!  ├─ 1. Validate  allow-listed type, per-kind size cap (whole batch or nothing)
//!  ├─ 2. Count     images = 1 page; PDFs parsed with lopdf, regex fallback, else 1
//!  ├─ 3. Track     pending → uploading → uploaded | error, removable at any time
//!  ├─ 4. Upload    one cancellable task per file, results applied independently
//!  └─ 5. Publish   Σ page_count + file details to the observer and event stream
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_intake::{DocumentIntake, IntakeConfig, MemoryObjectStore, SourceFile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let intake = DocumentIntake::new(IntakeConfig::default(), Arc::new(MemoryObjectStore::new()));
//!
//!     let pdf = std::fs::read("thesis.pdf")?;
//!     intake
//!         .select_files(vec![SourceFile::new("thesis.pdf", "application/pdf", pdf)])
//!         .await?;
//!     intake.settled().await;
//!
//!     println!("{} pages to print", intake.total_page_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `intake` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-intake = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod intake;
pub mod observer;
pub mod output;
pub mod pipeline;
pub mod quantity;
pub mod storage;
pub mod stream;
pub mod tracker;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{Accept, IntakeConfig, IntakeConfigBuilder, StoreConfig};
pub use error::{IntakeError, StoreError, UploadError, ValidationError};
pub use intake::{inspect, DocumentIntake};
pub use observer::{IntakeObserver, NoopObserver, SharedObserver};
pub use output::{FileDetail, Inspection, SelectionSnapshot};
pub use pipeline::input::SourceFile;
pub use pipeline::pagecount::{count_pdf_pages, PageCount, PageCountMethod};
pub use pipeline::parser::{initialize_parser, ParserSetup};
pub use pipeline::validate::FileKind;
pub use quantity::total_page_count;
pub use storage::{HttpObjectStore, MemoryObjectStore, ObjectStore, UploadPart, UploadResponse};
pub use stream::{EventStream, IntakeEvent};
pub use tracker::{FileId, FileStatus, SelectedFile};
