//! LAE - Linear Algebra Engine
//!
//! Evaluates expression trees of matrix operations by splitting every
//! operation into row-level tasks and running them on a small, fixed pool
//! of worker threads.
//!
//! # Architecture
//!
//! 1. **Shared memory** (`memory` module)
//!    - `SharedVector`: values plus orientation behind a reader/writer lock
//!    - `SharedMatrix`: an ordered set of vectors with no lock of its own
//!    - Cross-vector locks are always taken in ascending vector id order
//!
//! 2. **Scheduling** (`scheduling` module)
//!    - `TiredWorker`: one thread, one-slot inbox, accumulated busy time
//!    - `TiredExecutor`: hands each task to the least fatigued idle worker
//!      and offers a batch barrier (`submit_all`)
//!
//! 3. **Orchestration** (`engine` module)
//!    - Finds a resolvable node, loads its operands, runs one task per
//!      output row, and resolves the node in place until the root is literal
//!
//! # Example
//!
//! ```rust
//! use lae::{ComputationNode, LinearAlgebraEngine};
//!
//! let tree = ComputationNode::add(
//!     ComputationNode::Matrix(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
//!     ComputationNode::Matrix(vec![vec![10.0, 20.0], vec![30.0, 40.0]]),
//! );
//!
//! let mut engine = LinearAlgebraEngine::new(2).unwrap();
//! let result = engine.run(tree).unwrap();
//! assert_eq!(result, vec![vec![11.0, 22.0], vec![33.0, 44.0]]);
//! ```
//!
//! # Fatigue
//!
//! Every worker draws a fatigue factor at construction. Its fatigue is that
//! factor times its cumulative busy time, so fast-draining workers with low
//! factors are preferred and long-running ones are rested.

pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod memory;
pub mod scheduling;
pub mod tree;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, EngineResult, LinearAlgebraEngine};
pub use error::{LaeError, LaeResult};
pub use io::{parse_tree, read_tree, write_output, OutputDocument};
pub use memory::{MemoryError, Orientation, SharedMatrix, SharedVector};
pub use scheduling::{ExecutorReport, SchedulerError, TiredExecutor, TiredWorker, WorkerReport};
pub use tree::{ComputationNode, NodeKind, Operator};
