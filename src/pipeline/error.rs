//! Pipeline error types.
//!
//! Per-attempt network failures live in `client::ClientError` and never
//! escape their retry loops (the per-id path classifies, the batch path
//! collects); this enum covers what does reach the boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
