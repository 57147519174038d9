//! Tree-resolution orchestrator.
//!
//! [`LinearAlgebraEngine::run`] collapses an expression tree one node at a
//! time. Each step loads the node's operands into two scratch matrices, fans
//! the operation out as one task per output row, and waits on the executor's
//! batch barrier before writing the result back into the tree.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::EngineConfig;
use crate::memory::{MemoryError, MemoryResult, SharedMatrix, SharedVector};
use crate::scheduling::{ExecutorReport, SchedulerError, TiredExecutor};
use crate::tree::{ArityError, ComputationNode, Operator};

/// Result of engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    MalformedNode(#[from] ArityError),

    #[error(
        "dimension mismatch for '{op}': left operand is {}x{}, right operand is {}x{}",
        left.0, left.1, right.0, right.1
    )]
    Dimension {
        op: Operator,
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("invalid engine state: {0}")]
    State(&'static str),
}

// ============================================================================
// Row Tasks
// ============================================================================

/// The work for one output row of a resolution step.
#[derive(Debug)]
enum RowTask {
    Add {
        row: Arc<SharedVector>,
        other: Arc<SharedVector>,
    },
    Multiply {
        row: Arc<SharedVector>,
        right: SharedMatrix,
    },
    Negate(Arc<SharedVector>),
    Transpose(Arc<SharedVector>),
}

impl RowTask {
    fn run(self) -> MemoryResult<()> {
        match self {
            RowTask::Add { row, other } => row.add(&other),
            RowTask::Multiply { row, right } => row.vec_mat_mul(&right),
            RowTask::Negate(row) => {
                row.negate();
                Ok(())
            }
            RowTask::Transpose(column) => {
                column.transpose();
                Ok(())
            }
        }
    }
}

fn shape(rows: &[Vec<f64>]) -> (usize, usize) {
    (rows.len(), rows.first().map_or(0, Vec::len))
}

// ============================================================================
// Engine
// ============================================================================

/// Evaluates expression trees on a [`TiredExecutor`].
///
/// An engine evaluates one tree: the executor is shut down when
/// [`run`](Self::run) returns, successful or not.
pub struct LinearAlgebraEngine {
    left: SharedMatrix,
    right: SharedMatrix,
    executor: TiredExecutor,
}

impl LinearAlgebraEngine {
    /// Create an engine with `num_threads` workers and default fatigue factors.
    pub fn new(num_threads: usize) -> EngineResult<Self> {
        Ok(Self::with_executor(TiredExecutor::new(num_threads)?))
    }

    pub fn with_config(config: &EngineConfig) -> EngineResult<Self> {
        let executor = TiredExecutor::with_factor_range(
            config.threads,
            config.min_fatigue_factor,
            config.max_fatigue_factor,
            config.seed,
        )?;
        Ok(Self::with_executor(executor))
    }

    pub fn with_executor(executor: TiredExecutor) -> Self {
        LinearAlgebraEngine {
            left: SharedMatrix::new(),
            right: SharedMatrix::new(),
            executor,
        }
    }

    /// Resolve `root` down to a single literal matrix and return it.
    ///
    /// Shuts the executor down before returning, including on error.
    pub fn run(&mut self, mut root: ComputationNode) -> EngineResult<Vec<Vec<f64>>> {
        let result = self.resolve_tree(&mut root);
        self.executor.shutdown();
        result
    }

    /// Per-worker fatigue and timing.
    pub fn worker_report(&self) -> ExecutorReport {
        self.executor.report()
    }

    fn resolve_tree(&mut self, root: &mut ComputationNode) -> EngineResult<Vec<Vec<f64>>> {
        root.validate()?;
        let mut step = 0usize;
        loop {
            if let ComputationNode::Matrix(rows) = root {
                debug!(steps = step, "tree resolved");
                return Ok(std::mem::take(rows));
            }
            root.associative_nesting();
            let node = root
                .find_resolvable()
                .ok_or(EngineError::State("operation node without literal operands"))?;
            let rows = self.compute(node)?;
            node.resolve(rows);
            step += 1;
        }
    }

    /// Compute one resolvable node and return its value row-major.
    fn compute(&mut self, node: &ComputationNode) -> EngineResult<Vec<Vec<f64>>> {
        let ComputationNode::Operation { op, children } = node else {
            return Err(EngineError::State("literal node cannot be computed"));
        };
        let operands = children
            .iter()
            .map(|child| {
                child
                    .matrix()
                    .ok_or(EngineError::State("operand is not a literal matrix"))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        // The scratch matrices may only be reloaded between batches.
        if self.executor.in_flight() != 0 {
            return Err(EngineError::State("scratch matrices reloaded while tasks are in flight"));
        }

        let tasks = self.load(*op, &operands)?;
        debug!(op = %op, rows = tasks.len(), "submitting row batch");
        self.executor
            .submit_all(tasks.into_iter().map(|task| move || task.run()))?;

        Ok(self.left.read_row_major())
    }

    /// Load the operands and build one task per output row.
    fn load(&mut self, op: Operator, operands: &[&[Vec<f64>]]) -> EngineResult<Vec<RowTask>> {
        match (op, operands) {
            (Operator::Add, [left, right]) => {
                if shape(left) != shape(right) {
                    return Err(EngineError::Dimension {
                        op,
                        left: shape(left),
                        right: shape(right),
                    });
                }
                self.left.load_row_major(left)?;
                self.right.load_row_major(right)?;
                Ok(self
                    .left
                    .iter()
                    .zip(self.right.iter())
                    .map(|(row, other)| RowTask::Add {
                        row: Arc::clone(row),
                        other: Arc::clone(other),
                    })
                    .collect())
            }
            (Operator::Multiply, [left, right]) => {
                if shape(left).1 != shape(right).0 {
                    return Err(EngineError::Dimension {
                        op,
                        left: shape(left),
                        right: shape(right),
                    });
                }
                self.left.load_row_major(left)?;
                self.right.load_row_major(right)?;
                Ok(self
                    .left
                    .iter()
                    .map(|row| RowTask::Multiply {
                        row: Arc::clone(row),
                        right: self.right.clone(),
                    })
                    .collect())
            }
            (Operator::Negate, [operand]) => {
                self.left.load_row_major(operand)?;
                Ok(self.left.iter().cloned().map(RowTask::Negate).collect())
            }
            (Operator::Transpose, [operand]) => {
                // Column-major storage read back row-major is the transpose.
                self.left.load_column_major(operand)?;
                Ok(self.left.iter().cloned().map(RowTask::Transpose).collect())
            }
            _ => Err(EngineError::MalformedNode(ArityError {
                op,
                expected: if op.is_associative() { "exactly 2" } else { "exactly 1" },
                found: operands.len(),
            })),
        }
    }
}

impl std::fmt::Debug for LinearAlgebraEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearAlgebraEngine")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
