//! Lazily built tensor expression graphs.
//!
//! A [`Graph`] is an append-only arena of IR nodes. Building an expression
//! never computes anything: every call validates shapes, appends one or more
//! nodes and hands back a [`Tensor`] handle to the newest one.
//!
//! ```
//! use lazygraph::Graph;
//!
//! # fn main() -> lazygraph::Result<()> {
//! let g = Graph::new();
//! let x = g.input(&[5, 3]);
//! let w = g.input(&[3, 7]);
//! let b = g.input(&[7]);
//!
//! let y = (x.matmul(w)? + b)?.sigmoid();
//! assert_eq!(y.shape().as_slice(), [5, 7]);
//! # Ok(())
//! # }
//! ```
//!
//! Because nodes can only refer to nodes that already exist, the arena's
//! insertion order is always a valid topological order.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Arithmetic, comparison and derived elementwise operators
pub mod builder;

/// The node arena
pub mod graph;

/// Node operations and their records
pub mod ops;

/// Reductions, reshapes, permutes and matmul
pub mod views;

pub use builder::Operand;
pub use graph::{Dag, Graph, Node, NodeId};
pub use lazygraph_shape as shape;
pub use lazygraph_shape::{Axes, Dim, Result, Shape, ShapeError, Strides};
pub use ops::{
    BinaryKind, BinaryOp, DataPtr, InputArray, Op, ReduceKind, ReduceOp, TensorOp, UnaryKind,
    UnaryOp, ViewOp,
};

/// A handle to one node in one [`Graph`].
///
/// Handles are cheap to copy and compare equal only when they point at the
/// same node of the same graph.
#[derive(Clone, Copy)]
pub struct Tensor<'graph> {
    id: NodeId,
    graph: &'graph Graph,
}

impl<'graph> Tensor<'graph> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph(&self) -> &'graph Graph {
        self.graph
    }

    pub fn shape(&self) -> Shape {
        Shape::from_slice(self.graph.node(self.id).shape())
    }

    pub fn strides(&self) -> Strides {
        Strides::from_slice(self.graph.node(self.id).strides())
    }

    pub fn rank(&self) -> usize {
        self.graph.node(self.id).rank()
    }

    pub fn op(&self) -> Op {
        self.graph.node(self.id).op().clone()
    }

    /// The data bound to this input, if any.
    ///
    /// # Panics
    /// If this handle does not point at a tensor node.
    pub fn data(&self) -> Option<DataPtr> {
        self.graph.node(self.id).data()
    }

    /// Attaches the location of an allocated buffer to this input.
    ///
    /// # Panics
    /// If this handle does not point at a tensor node.
    pub fn bind_data(&self, data: DataPtr) {
        graph::bind(self.graph, self.id, data);
    }
}

impl PartialEq for Tensor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph) && self.id == other.id
    }
}

impl Eq for Tensor<'_> {}

impl Hash for Tensor<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.graph, state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Tensor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", &self.graph.node(self.id).shape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn handle_identity() {
        let g1 = Graph::new();
        let g2 = Graph::new();
        let a = g1.input(&[2]);
        let b = g2.input(&[2]);

        // same index, different graphs
        assert_eq!(a.id(), b.id());
        assert_ne!(a, b);

        let a2 = g1.get(a.id()).unwrap();
        assert_eq!(a, a2);

        let set: HashSet<_> = [a, a2, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn bind_then_read() {
        let g = Graph::new();
        let x = g.input(&[3]);
        let mut buf = vec![1.0_f32, 2.0, 3.0];
        let ptr = DataPtr::from(buf.as_mut_slice());

        x.bind_data(ptr);
        assert_eq!(x.data(), Some(ptr));
        assert!(matches!(x.op(), Op::Tensor(TensorOp { data: Some(_) })));
    }

    #[test]
    #[should_panic(expected = "cannot bind data to a exp node")]
    fn bind_on_non_tensor_panics() {
        let g = Graph::new();
        let x = g.input(&[3]).exp();
        let mut buf = [0.0_f32; 3];
        x.bind_data(DataPtr::from(&mut buf[..]));
    }
}
