//! Gemini API client: streaming generation and file uploads.
//!
//! Speaks the `generativelanguage.googleapis.com` REST API directly:
//! `streamGenerateContent` with SSE for answers, the Files API for
//! image ingestion. Stream consumption surfaces every per-chunk outcome
//! as a tagged [`StreamStep`] so callers dispatch faults with one
//! exhaustive match instead of catching exceptions.

pub mod client;
pub mod error;
pub mod files;
mod wire;

pub use {
    client::{GeminiClient, StreamStep},
    error::{Error, Result},
    files::FileHandle,
};
