//! JSON input and output documents.
//!
//! ## Input
//!
//! A node is either a literal matrix, written as an array of rows, or an
//! operator applied to operands:
//!
//! ```json
//! {
//!   "operator": "+",
//!   "operands": [
//!     [[1, 2], [3, 4]],
//!     {"operator": "T", "operands": [[[5, 6], [7, 8]]]}
//!   ]
//! }
//! ```
//!
//! Operators are `+` (add), `*` (multiply), `-` (negate) and `T` (transpose).
//!
//! ## Output
//!
//! `{"result": [[...], ...]}` on success, `{"error": "..."}` otherwise.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{LaeError, LaeResult};
use crate::tree::{ComputationNode, Operator};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawNode {
    Matrix(Vec<Vec<f64>>),
    Operation {
        operator: String,
        operands: Vec<RawNode>,
    },
}

impl RawNode {
    fn into_node(self) -> LaeResult<ComputationNode> {
        match self {
            RawNode::Matrix(rows) => Ok(ComputationNode::Matrix(rows)),
            RawNode::Operation { operator, operands } => {
                let op = Operator::from_symbol(&operator).ok_or_else(|| {
                    LaeError::InvalidInput(format!("unknown operator '{}'", operator))
                })?;
                let children = operands
                    .into_iter()
                    .map(RawNode::into_node)
                    .collect::<LaeResult<Vec<_>>>()?;
                Ok(ComputationNode::operation(op, children))
            }
        }
    }
}

/// Parse an expression tree from JSON text.
pub fn parse_tree(json: &str) -> LaeResult<ComputationNode> {
    let raw: RawNode = serde_json::from_str(json)?;
    raw.into_node()
}

/// Read and parse an expression tree from a JSON file.
pub fn read_tree(path: &Path) -> LaeResult<ComputationNode> {
    let content = fs::read_to_string(path).map_err(|source| LaeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tree(&content)
}

/// What a run writes to its output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputDocument {
    Result(Vec<Vec<f64>>),
    Error(String),
}

impl<E: std::fmt::Display> From<Result<Vec<Vec<f64>>, E>> for OutputDocument {
    fn from(outcome: Result<Vec<Vec<f64>>, E>) -> Self {
        match outcome {
            Ok(rows) => OutputDocument::Result(rows),
            Err(err) => OutputDocument::Error(err.to_string()),
        }
    }
}

pub fn render_output(document: &OutputDocument) -> LaeResult<String> {
    Ok(serde_json::to_string_pretty(document)?)
}

pub fn write_output(path: &Path, document: &OutputDocument) -> LaeResult<()> {
    let mut content = render_output(document)?;
    content.push('\n');
    fs::write(path, content).map_err(|source| LaeError::Io {
        path: path.to_path_buf(),
        source,
    })
}
