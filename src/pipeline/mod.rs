//! Pipeline stages for document intake.
//!
//! Each submodule implements one step a selected file goes through.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ validate ──▶ pagecount ──▶ (tracker) ──▶ upload
//! (bytes)   (allow-list)  (parser/regex)              (object store)
//! ```
//!
//! 1. [`input`]: read a file from disk and work out its MIME type
//! 2. [`validate`]: allow-list and size caps; one bad file rejects the batch
//! 3. [`pagecount`]: page count per file; never fails, degrades to 1
//! 4. [`parser`]: the lopdf boundary and its one-time runtime setup
//! 5. [`upload`]: one cancellable store call per file

pub mod input;
pub mod pagecount;
pub mod parser;
pub mod upload;
pub mod validate;
