use thiserror::Error;

use crate::{Dim, Shape};

/// A shape or domain rule was violated while building a node.
///
/// These are always caused by the caller's input shapes. The graph that
/// raised one is left untouched and remains usable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("cannot broadcast incompatible shapes {lhs:?} and {rhs:?}")]
    Broadcast { lhs: Shape, rhs: Shape },

    #[error("cannot reduce {requested} dims of a tensor with rank {rank}")]
    TooManyReduceDims { requested: usize, rank: usize },

    #[error("axis {axis} is invalid for a tensor with rank {rank}")]
    InvalidAxis { axis: Dim, rank: usize },

    #[error("cannot reshape {from:?} ({expected} elements) into {to:?}")]
    ElementCount {
        from: Shape,
        to: Shape,
        expected: Dim,
    },

    #[error("reshape into {shape:?} has more than one implicit (-1) dimension")]
    MultipleImplicitDims { shape: Shape },

    #[error("cannot infer the implicit dimension of {to:?}: {total} elements do not divide evenly by {known}")]
    NotDivisible { to: Shape, total: Dim, known: Dim },

    #[error("shape {shape:?} holds more elements than fit in an i64")]
    TooManyElements { shape: Shape },

    #[error("dimension {dim} in {shape:?} is not a valid size")]
    InvalidDim { dim: Dim, shape: Shape },

    #[error("permute of a rank {rank} tensor was given {given} axes")]
    PermuteRank { rank: usize, given: usize },

    #[error("axis {axis} is repeated in permutation {axes:?}")]
    RepeatedAxis { axis: usize, axes: Shape },

    #[error("matmul operands must have rank >= 1, got {lhs:?} and {rhs:?}")]
    MatmulRank { lhs: Shape, rhs: Shape },

    #[error("matmul inner dimensions do not match: {lhs:?} and {rhs:?}")]
    MatmulInner { lhs: Shape, rhs: Shape },
}

pub type Result<T> = std::result::Result<T, ShapeError>;
