//! Expression trees over literal matrices.
//!
//! A [`ComputationNode`] is either a literal matrix or an operator applied to
//! child nodes. The engine repeatedly picks a node whose children are all
//! literal, computes it, and [`resolve`](ComputationNode::resolve)s it in place
//! until the root itself is literal.

use std::fmt;
use thiserror::Error;

/// Matrix operators understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Multiply,
    Negate,
    Transpose,
}

impl Operator {
    /// Symbol used in input documents.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Multiply => "*",
            Operator::Negate => "-",
            Operator::Transpose => "T",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operator::Add),
            "*" => Some(Operator::Multiply),
            "-" => Some(Operator::Negate),
            "T" => Some(Operator::Transpose),
            _ => None,
        }
    }

    /// Binary operators that may be written with more than two operands.
    pub fn is_associative(self) -> bool {
        matches!(self, Operator::Add | Operator::Multiply)
    }

    fn accepts(self, operands: usize) -> bool {
        if self.is_associative() {
            operands >= 2
        } else {
            operands == 1
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Coarse node classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Matrix,
    Add,
    Multiply,
    Negate,
    Transpose,
}

impl From<Operator> for NodeKind {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Add => NodeKind::Add,
            Operator::Multiply => NodeKind::Multiply,
            Operator::Negate => NodeKind::Negate,
            Operator::Transpose => NodeKind::Transpose,
        }
    }
}

/// An operator node with the wrong number of operands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("operator '{op}' expects {expected}, found {found} operand(s)")]
pub struct ArityError {
    pub op: Operator,
    pub expected: &'static str,
    pub found: usize,
}

/// A node of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ComputationNode {
    Matrix(Vec<Vec<f64>>),
    Operation {
        op: Operator,
        children: Vec<ComputationNode>,
    },
}

impl ComputationNode {
    pub fn operation(op: Operator, children: Vec<ComputationNode>) -> Self {
        ComputationNode::Operation { op, children }
    }

    pub fn add(left: ComputationNode, right: ComputationNode) -> Self {
        Self::operation(Operator::Add, vec![left, right])
    }

    pub fn multiply(left: ComputationNode, right: ComputationNode) -> Self {
        Self::operation(Operator::Multiply, vec![left, right])
    }

    pub fn negate(operand: ComputationNode) -> Self {
        Self::operation(Operator::Negate, vec![operand])
    }

    pub fn transpose(operand: ComputationNode) -> Self {
        Self::operation(Operator::Transpose, vec![operand])
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            ComputationNode::Matrix(_) => NodeKind::Matrix,
            ComputationNode::Operation { op, .. } => NodeKind::from(*op),
        }
    }

    /// Operands of an operation; empty for a literal.
    pub fn children(&self) -> &[ComputationNode] {
        match self {
            ComputationNode::Matrix(_) => &[],
            ComputationNode::Operation { children, .. } => children,
        }
    }

    /// The literal value, if this node is a matrix.
    pub fn matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            ComputationNode::Matrix(rows) => Some(rows),
            ComputationNode::Operation { .. } => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, ComputationNode::Matrix(_))
    }

    /// An operation whose operands are all literal matrices.
    pub fn is_resolvable(&self) -> bool {
        match self {
            ComputationNode::Matrix(_) => false,
            ComputationNode::Operation { children, .. } => {
                !children.is_empty() && children.iter().all(ComputationNode::is_literal)
            }
        }
    }

    /// Leftmost resolvable node in depth-first order, or `None` once the
    /// tree has collapsed to a literal.
    pub fn find_resolvable(&mut self) -> Option<&mut ComputationNode> {
        if self.is_resolvable() {
            return Some(self);
        }
        match self {
            ComputationNode::Matrix(_) => None,
            ComputationNode::Operation { children, .. } => children
                .iter_mut()
                .find_map(|child| child.find_resolvable()),
        }
    }

    /// Replace this node with a literal matrix.
    pub fn resolve(&mut self, rows: Vec<Vec<f64>>) {
        *self = ComputationNode::Matrix(rows);
    }

    /// Rewrite associative operations with more than two operands into
    /// left-nested binary ones: `+(a, b, c)` becomes `+(+(a, b), c)`.
    pub fn associative_nesting(&mut self) {
        if let ComputationNode::Operation { op, children } = self {
            for child in children.iter_mut() {
                child.associative_nesting();
            }
            if op.is_associative() {
                while children.len() > 2 {
                    let pair: Vec<_> = children.drain(..2).collect();
                    children.insert(0, ComputationNode::operation(*op, pair));
                }
            }
        }
    }

    /// Check operand counts throughout the tree.
    pub fn validate(&self) -> Result<(), ArityError> {
        if let ComputationNode::Operation { op, children } = self {
            if !op.accepts(children.len()) {
                return Err(ArityError {
                    op: *op,
                    expected: if op.is_associative() {
                        "at least 2"
                    } else {
                        "exactly 1"
                    },
                    found: children.len(),
                });
            }
            for child in children {
                child.validate()?;
            }
        }
        Ok(())
    }
}

impl From<Vec<Vec<f64>>> for ComputationNode {
    fn from(rows: Vec<Vec<f64>>) -> Self {
        ComputationNode::Matrix(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(value: f64) -> ComputationNode {
        ComputationNode::Matrix(vec![vec![value]])
    }

    #[test]
    fn test_symbols() {
        for op in [
            Operator::Add,
            Operator::Multiply,
            Operator::Negate,
            Operator::Transpose,
        ] {
            assert_eq!(Operator::from_symbol(op.symbol()), Some(op));
        }
        assert_eq!(Operator::from_symbol("/"), None);
    }

    #[test]
    fn test_kind_and_children() {
        let node = ComputationNode::negate(lit(1.0));
        assert_eq!(node.kind(), NodeKind::Negate);
        assert_eq!(node.children().len(), 1);
        assert!(node.matrix().is_none());

        let literal = lit(2.0);
        assert_eq!(literal.kind(), NodeKind::Matrix);
        assert!(literal.children().is_empty());
        assert_eq!(literal.matrix(), Some(&[vec![2.0]][..]));
    }

    #[test]
    fn test_find_resolvable_is_leftmost_deepest() {
        let mut tree = ComputationNode::add(
            ComputationNode::negate(ComputationNode::transpose(lit(1.0))),
            ComputationNode::negate(lit(2.0)),
        );

        let node = tree.find_resolvable().unwrap();
        assert_eq!(node, &ComputationNode::transpose(lit(1.0)));
        node.resolve(vec![vec![1.0]]);

        let node = tree.find_resolvable().unwrap();
        assert_eq!(node, &ComputationNode::negate(lit(1.0)));
        node.resolve(vec![vec![-1.0]]);

        let node = tree.find_resolvable().unwrap();
        assert_eq!(node, &ComputationNode::negate(lit(2.0)));
        node.resolve(vec![vec![-2.0]]);

        assert_eq!(tree.find_resolvable().unwrap().kind(), NodeKind::Add);
        tree.resolve(vec![vec![-3.0]]);
        assert!(tree.find_resolvable().is_none());
        assert!(tree.is_literal());
    }

    #[test]
    fn test_associative_nesting() {
        let mut tree = ComputationNode::operation(
            Operator::Add,
            vec![
                lit(1.0),
                lit(2.0),
                ComputationNode::operation(Operator::Multiply, vec![lit(3.0), lit(4.0), lit(5.0)]),
                lit(6.0),
            ],
        );
        tree.associative_nesting();

        let expected = ComputationNode::add(
            ComputationNode::add(
                ComputationNode::add(lit(1.0), lit(2.0)),
                ComputationNode::multiply(ComputationNode::multiply(lit(3.0), lit(4.0)), lit(5.0)),
            ),
            lit(6.0),
        );
        assert_eq!(tree, expected);

        // Already binary trees are left alone.
        let mut binary = expected.clone();
        binary.associative_nesting();
        assert_eq!(binary, expected);
    }

    #[test]
    fn test_validate_arity() {
        assert!(ComputationNode::add(lit(1.0), lit(2.0)).validate().is_ok());

        let err = ComputationNode::operation(Operator::Add, vec![lit(1.0)])
            .validate()
            .unwrap_err();
        assert_eq!(err.found, 1);
        assert_eq!(
            err.to_string(),
            "operator '+' expects at least 2, found 1 operand(s)"
        );

        let nested = ComputationNode::negate(ComputationNode::operation(
            Operator::Transpose,
            vec![lit(1.0), lit(2.0)],
        ));
        assert_eq!(nested.validate().unwrap_err().op, Operator::Transpose);
    }
}
