//! Batch rule/risk suggestion across the document corpus.

pub mod runner;
pub mod types;

pub use runner::run_batch;
pub use types::*;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Cannot enumerate documents: {0}")]
    Enumeration(#[from] DatabaseError),
}
