//! Crate-level error rollup (spec.md §7), following the teacher's habit of
//! a narrow top-level error next to many precise leaf errors
//! (`inputlayer-inputlayer/src/storage/error.rs`).

use crate::graph::{GraphError, RegistryError};
use crate::index::IndexError;
use crate::matrix::MatrixError;
use crate::operator::RuntimeError;
use crate::serialize::SnapshotError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphCoreError {
    #[error(transparent)]
    Matrix(#[from] MatrixError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type GraphCoreResult<T> = Result<T, GraphCoreError>;

/// Logs a fatal invariant violation at `error` level via `tracing` before
/// panicking, standing in for the source's crash-dump hook (spec.md §7
/// "Fatal assertions").
#[macro_export]
macro_rules! assert_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            tracing::error!($($arg)+);
            panic!($($arg)+);
        }
    };
}
