//! Thread-safe numeric containers shared between the engine and its workers.
//!
//! A [`SharedVector`] is the unit of locking: every vector carries its own
//! reader/writer lock and a stable identity assigned once at construction.
//! A [`SharedMatrix`] has no lock of its own; any coherent view of a matrix is
//! built by holding the locks of its vectors.
//!
//! # Lock Ordering
//!
//! Operations that touch two vectors (`add`, `dot`) and matrix snapshots
//! acquire locks in ascending [`VectorId`] order and release them in reverse.
//! Ids come from a process-wide counter, so the order is the same on every
//! platform and for every pair of call directions.

mod matrix;
mod vector;

pub use matrix::SharedMatrix;
pub use vector::{SharedVector, VectorId};

use thiserror::Error;

/// Result of operations on shared vectors and matrices.
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Whether a vector stores a row or a column of a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Row,
    Column,
}

impl Orientation {
    /// The opposite orientation.
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Row => Orientation::Column,
            Orientation::Column => Orientation::Row,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Orientation::Row => write!(f, "row"),
            Orientation::Column => write!(f, "column"),
        }
    }
}

/// Errors raised by vector and matrix operations.
///
/// Every variant except [`MemoryError::EmptyMatrix`] is an argument error and
/// is detected before any state is mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    #[error("vector has no values")]
    EmptyVector,

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("orientation mismatch: expected {expected}, found {found}")]
    OrientationMismatch {
        expected: Orientation,
        found: Orientation,
    },

    #[error("length mismatch: {left} != {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("row {row} has length {found}, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row} is empty")]
    EmptyRow { row: usize },

    #[error("matrix has no vectors")]
    EmptyMatrix,
}
