//! Graph-facade error taxonomy (spec.md §7).

use crate::matrix::MatrixError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("no node with id {0}")]
    NoSuchNode(u64),
    #[error("no edge with id {0}")]
    NoSuchEdge(u64),
    #[error("matrix error: {0}")]
    Matrix(#[from] MatrixError),
}

pub type GraphResult<T> = Result<T, GraphError>;
