//! The lopdf boundary: authoritative page counts from a parsed document.
//!
//! ## Worker vs. inline
//!
//! Parsing a large PDF is CPU-bound, so by default it runs on tokio's
//! blocking pool (the "worker") and the calling task only awaits the result.
//! When the worker is disabled or unavailable (no runtime on this thread, or
//! the blocking task could not complete) the same parse runs inline. Either
//! way a panic inside the parser is caught and reported as a parse failure.
//!
//! ## One-time setup
//!
//! Whether the worker is used is process-wide state. It is set once, at
//! start-up, through [`initialize_parser`]; later calls are ignored. Code that
//! never calls it gets [`ParserSetup::default`].

use bytes::Bytes;
use lopdf::Document;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, warn};

static SETUP: OnceLock<ParserSetup> = OnceLock::new();

/// Process-wide parser settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserSetup {
    /// Parse on the blocking pool instead of the calling thread. Default: true.
    pub use_worker: bool,
}

impl Default for ParserSetup {
    fn default() -> Self {
        Self { use_worker: true }
    }
}

/// Install the parser settings for this process.
///
/// Returns `true` if this call's settings took effect, `false` if the parser
/// had already been initialised (the earlier settings stay in place).
pub fn initialize_parser(setup: ParserSetup) -> bool {
    let mut applied = false;
    SETUP.get_or_init(|| {
        applied = true;
        setup
    });
    if applied {
        debug!("PDF parser initialised: {:?}", setup);
    } else {
        debug!("PDF parser already initialised; ignoring {:?}", setup);
    }
    applied
}

/// The settings in effect.
pub fn parser_setup() -> ParserSetup {
    SETUP.get().copied().unwrap_or_default()
}

/// Why the parser could not produce a count.
#[derive(Debug, Error)]
pub enum ParseFailure {
    #[error("lopdf could not load the document: {0}")]
    Malformed(String),

    #[error("document has an empty page tree")]
    NoPages,

    #[error("parser panicked")]
    Panicked,
}

/// Parse `bytes` and return the number of pages in the page tree.
pub async fn parse_page_count(bytes: Bytes) -> Result<u32, ParseFailure> {
    parse_page_count_with(bytes, parser_setup()).await
}

/// [`parse_page_count`] with explicit settings instead of the global ones.
pub async fn parse_page_count_with(bytes: Bytes, setup: ParserSetup) -> Result<u32, ParseFailure> {
    if setup.use_worker {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let job = bytes.clone();
                match handle.spawn_blocking(move || parse_guarded(&job)).await {
                    Ok(result) => return result,
                    Err(e) => warn!("PDF parse worker failed ({}); parsing inline", e),
                }
            }
            Err(_) => debug!("No runtime for the PDF parse worker; parsing inline"),
        }
    }
    parse_guarded(&bytes)
}

fn parse_guarded(bytes: &[u8]) -> Result<u32, ParseFailure> {
    panic::catch_unwind(AssertUnwindSafe(|| parse_blocking(bytes)))
        .unwrap_or(Err(ParseFailure::Panicked))
}

fn parse_blocking(bytes: &[u8]) -> Result<u32, ParseFailure> {
    let document = Document::load_mem(bytes).map_err(|e| ParseFailure::Malformed(e.to_string()))?;
    let pages = document.get_pages().len();
    if pages == 0 {
        return Err(ParseFailure::NoPages);
    }
    debug!("lopdf parsed {} pages", pages);
    Ok(u32::try_from(pages).unwrap_or(u32::MAX))
}
