//! Error taxonomy for the store client contract.
//!
//! Transient transport failures, non-200/201 statuses, and search timeouts
//! are all represented distinctly so callers can log and move on rather than
//! treat any of them as fatal.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The underlying HTTP transport failed (DNS, connect, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The store responded with a status other than 200/201.
    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// A search request reported `timed_out: true`.
    #[error("search timed out after {0:?}")]
    SearchTimedOut(Duration),

    /// The response body could not be decoded into the expected envelope.
    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
