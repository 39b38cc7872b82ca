use std::{
    cell::{Ref, RefCell},
    fmt,
};

use lazygraph_shape::{
    dims::{broadcast_shapes, checked_num_elements},
    Dim, Dimension, Result, Shape, Strides,
};
use log::{debug, trace};
use num_traits::AsPrimitive;

use crate::{
    ops::{BinaryKind, BinaryOp, DataPtr, Op, TensorOp, UnaryKind, UnaryOp},
    Tensor,
};

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A single IR node. The op, shape and strides are fixed at insertion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    op: Op,
    shape: Shape,
    strides: Strides,
}

impl Node {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn shape(&self) -> &[Dim] {
        &self.shape
    }

    pub fn strides(&self) -> &[Dim] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// The data bound to this tensor node, if any.
    ///
    /// # Panics
    /// If this is not a tensor node. Only tensor nodes carry data.
    pub fn data(&self) -> Option<DataPtr> {
        match &self.op {
            Op::Tensor(tensor) => tensor.data,
            op => panic!("cannot read data of a {} node. Only tensor nodes carry data", op.name()),
        }
    }

    fn bind(&mut self, data: DataPtr) {
        match &mut self.op {
            Op::Tensor(tensor) => tensor.data = Some(data),
            op => panic!("cannot bind data to a {} node. Only tensor nodes carry data", op.name()),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} : {:?} / {:?}",
            self.op,
            self.shape.as_slice(),
            self.strides.as_slice()
        )
    }
}

/// An append-only arena of nodes for one computation.
///
/// Builder calls only need `&Graph`, so nodes live behind a `RefCell`. That
/// makes a graph `!Sync`: all insertions into one graph happen on one thread.
/// Call [`Graph::finish`] to get an immutable [`Dag`] that can be shared.
#[derive(Default)]
pub struct Graph {
    nodes: RefCell<Vec<Node>>,
    inputs: RefCell<Vec<NodeId>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an external input of the given shape.
    ///
    /// Inputs are recorded in call order. The execution stage binds buffers to
    /// them positionally.
    ///
    /// # Panics
    /// If a dimension is negative, or the element count does not fit in a [`Dim`].
    pub fn input(&self, shape: &[Dim]) -> Tensor<'_> {
        assert!(
            shape.iter().all(|&dim| dim >= 0),
            "input shape {shape:?} has a negative dimension"
        );
        assert!(
            checked_num_elements(shape).is_some(),
            "input shape {shape:?} holds more elements than fit in an i64"
        );

        let tensor = self.push(
            Op::Tensor(TensorOp::default()),
            Shape::from_slice(shape),
            shape.canonical_strides(),
        );

        let mut inputs = self.inputs.borrow_mut();
        debug!("input #{} is {} with shape {:?}", inputs.len(), tensor.id, shape);
        inputs.push(tensor.id);

        tensor
    }

    /// Declares a compile time scalar constant.
    pub fn immediate(&self, value: impl AsPrimitive<f32>) -> Tensor<'_> {
        self.push(Op::Immediate(value.as_()), Shape::new(), Strides::new())
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    /// Ids of every declared input, in declaration order.
    pub fn inputs(&self) -> Vec<NodeId> {
        self.inputs.borrow().clone()
    }

    /// A handle to an existing node.
    pub fn get(&self, id: NodeId) -> Option<Tensor<'_>> {
        (id.0 < self.len()).then(|| Tensor { id, graph: self })
    }

    /// Borrows a node.
    ///
    /// # Panics
    /// If `id` was not produced by this graph, or if nodes are added while the
    /// returned borrow is alive.
    pub fn node(&self, id: NodeId) -> Ref<'_, Node> {
        Ref::map(self.nodes.borrow(), |nodes| &nodes[id.0])
    }

    /// Borrows every node in insertion (and so topological) order.
    ///
    /// # Panics
    /// If nodes are added while the returned borrow is alive.
    pub fn nodes(&self) -> Ref<'_, [Node]> {
        Ref::map(self.nodes.borrow(), Vec::as_slice)
    }

    /// Stops building and hands out the finished graph.
    pub fn finish(self) -> Dag {
        let dag = Dag {
            nodes: self.nodes.into_inner(),
            inputs: self.inputs.into_inner(),
        };
        debug!(
            "finished graph with {} nodes and {} inputs",
            dag.nodes.len(),
            dag.inputs.len()
        );
        dag
    }

    /// Appends a node whose shape and strides have already been derived.
    pub(crate) fn push(&self, op: Op, shape: Shape, strides: Strides) -> Tensor<'_> {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len());

        debug_assert_eq!(shape.len(), strides.len());
        debug_assert!(op.inputs().iter().all(|input| *input < id));

        let node = Node { op, shape, strides };
        trace!("{id} = {node}");
        nodes.push(node);

        Tensor { id, graph: self }
    }

    pub(crate) fn unary(&self, kind: UnaryKind, x: Tensor<'_>) -> Tensor<'_> {
        self.assert_owns(x);
        let (shape, strides) = {
            let node = self.node(x.id);
            (Shape::from_slice(node.shape()), Strides::from_slice(node.strides()))
        };
        self.push(Op::Unary(UnaryOp { kind, x: x.id }), shape, strides)
    }

    pub(crate) fn binary(&self, kind: BinaryKind, x: Tensor<'_>, y: Tensor<'_>) -> Result<Tensor<'_>> {
        self.assert_owns(x);
        self.assert_owns(y);
        let shape = broadcast_shapes(&x.shape(), &y.shape())?;
        let strides = shape.canonical_strides();
        Ok(self.push(
            Op::Binary(BinaryOp {
                kind,
                x: x.id,
                y: y.id,
            }),
            shape,
            strides,
        ))
    }

    pub(crate) fn assert_owns(&self, tensor: Tensor<'_>) {
        assert!(
            std::ptr::eq(self, tensor.graph),
            "{} belongs to a different graph. Tensors from two graphs cannot be combined",
            tensor.id
        );
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes.borrow())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.borrow())
            .field("inputs", &self.inputs.borrow())
            .finish()
    }
}

/// A finished graph. Nodes are in topological order and never change again,
/// apart from binding input data.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dag {
    nodes: Vec<Node>,
    inputs: Vec<NodeId>,
}

impl Dag {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Binds an allocated buffer to a tensor node.
    ///
    /// # Panics
    /// If `id` is out of range or is not a tensor node.
    pub fn bind(&mut self, id: NodeId, data: DataPtr) {
        self.nodes[id.0].bind(data);
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        writeln!(f, "{} = {}", NodeId(i), node)?;
    }
    Ok(())
}

/// Gives the tensor handle mutable access for binding data after the fact.
pub(crate) fn bind(graph: &Graph, id: NodeId, data: DataPtr) {
    graph.nodes.borrow_mut()[id.0].bind(data);
}
