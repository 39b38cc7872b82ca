//! Shape, stride and broadcast algebra for the lazygraph IR.
//!
//! Everything in here is a pure function over small integer sequences.
//! Dimensions are signed so that `-1` can stand for "infer this dimension"
//! in reshapes and for "count from the end" in axis arguments.

use smallvec::SmallVec;

/// Traits and functions for deriving shapes and strides
pub mod dims;

/// Errors raised when a shape rule is violated
pub mod error;

pub use dims::Dimension;
pub use error::{Result, ShapeError};

/// A single dimension size or axis index.
pub type Dim = i64;

/// Vec fits into 3 usizes, but 4 dimensions are fairly common in convolutions
/// so we're taking the hit. Most shapes never spill to the heap.
pub type Shape = SmallVec<[Dim; 4]>;

/// Element steps per dimension. Always the same length as its shape.
pub type Strides = SmallVec<[Dim; 4]>;

/// A list of axis indices, possibly negative until fixed with [`dims::fix_dim`].
pub type Axes = SmallVec<[Dim; 4]>;
