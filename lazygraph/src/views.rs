use lazygraph_shape::{
    dims::{
        matmul_shapes, normalize_axes, permuted_shape, reduce_all_shape, reduced_shape,
        resolve_reshape,
    },
    Axes, Dim, Dimension, Result, Shape,
};

use crate::{
    ops::{BinaryKind, Op, ReduceKind, ReduceOp, ViewOp},
    Tensor,
};

impl<'graph> Tensor<'graph> {
    /// Every axis of this tensor, ascending.
    fn all_axes(self) -> Axes {
        #[allow(clippy::cast_possible_wrap)]
        (0..self.rank() as Dim).collect()
    }

    /// Canonical reduction axes. An empty list means every axis.
    fn reduce_axes(self, axes: &[Dim], keepdim: bool) -> Result<(Axes, Shape)> {
        let dims = if axes.is_empty() {
            self.all_axes()
        } else {
            normalize_axes(axes, self.rank())?
        };
        let shape = reduced_shape(&self.shape(), &dims, keepdim)?;
        Ok((dims, shape))
    }

    fn reduce(self, kind: ReduceKind, dims: Axes, shape: Shape, keepdim: bool) -> Self {
        let strides = shape.canonical_strides();
        let op = Op::Reduce(ReduceOp {
            kind,
            x: self.id,
            dims,
            keepdim,
        });
        self.graph.push(op, shape, strides)
    }

    fn view(self, shape: Shape) -> Self {
        let strides = shape.canonical_strides();
        self.graph.push(Op::View(ViewOp { x: self.id }), shape, strides)
    }

    /// Sums over every axis.
    pub fn sum_all(self, keepdim: bool) -> Self {
        let (dims, shape) = self.all_reduce(keepdim);
        self.reduce(ReduceKind::Sum, dims, shape, keepdim)
    }

    pub fn sum_axis(self, axis: Dim, keepdim: bool) -> Result<Self> {
        self.sum_axes(&[axis], keepdim)
    }

    /// Sums over `axes`. Negative axes count from the end and an empty
    /// list sums over everything.
    pub fn sum_axes(self, axes: &[Dim], keepdim: bool) -> Result<Self> {
        let (dims, shape) = self.reduce_axes(axes, keepdim)?;
        Ok(self.reduce(ReduceKind::Sum, dims, shape, keepdim))
    }

    /// Maximum over every axis.
    pub fn max_all(self, keepdim: bool) -> Self {
        let (dims, shape) = self.all_reduce(keepdim);
        self.reduce(ReduceKind::Max, dims, shape, keepdim)
    }

    pub fn max_axis(self, axis: Dim, keepdim: bool) -> Result<Self> {
        self.max_axes(&[axis], keepdim)
    }

    pub fn max_axes(self, axes: &[Dim], keepdim: bool) -> Result<Self> {
        let (dims, shape) = self.reduce_axes(axes, keepdim)?;
        Ok(self.reduce(ReduceKind::Max, dims, shape, keepdim))
    }

    /// Minimum over every axis, `-max(-x)`.
    pub fn min_all(self, keepdim: bool) -> Self {
        -(-self).max_all(keepdim)
    }

    pub fn min_axis(self, axis: Dim, keepdim: bool) -> Result<Self> {
        self.min_axes(&[axis], keepdim)
    }

    pub fn min_axes(self, axes: &[Dim], keepdim: bool) -> Result<Self> {
        let (dims, shape) = self.reduce_axes(axes, keepdim)?;
        let max = (-self).reduce(ReduceKind::Max, dims, shape, keepdim);
        Ok(-max)
    }

    fn all_reduce(self, keepdim: bool) -> (Axes, Shape) {
        let dims = self.all_axes();
        let shape = reduce_all_shape(&self.shape(), keepdim);
        (dims, shape)
    }

    /// Views the same elements under a new shape. One dimension may be `-1`,
    /// in which case it is inferred from the element count.
    ///
    /// ```
    /// # let g = lazygraph::Graph::new();
    /// let x = g.input(&[2, 3, 4]);
    /// assert_eq!(x.reshape(&[-1, 4])?.shape().as_slice(), [6, 4]);
    /// # Ok::<(), lazygraph::ShapeError>(())
    /// ```
    pub fn reshape(self, shape: &[Dim]) -> Result<Self> {
        let shape = resolve_reshape(&self.shape(), shape)?;
        Ok(self.view(shape))
    }

    /// Reorders the axes so that output axis `i` is input axis `axes[i]`.
    ///
    /// The view is given fresh canonical strides for its own shape, the
    /// input's strides are not carried over.
    pub fn permute(self, axes: &[Dim]) -> Result<Self> {
        let shape = permuted_shape(&self.shape(), axes)?;
        Ok(self.view(shape))
    }

    /// Reverses every axis, `permute(&[rank-1, .., 1, 0])`.
    ///
    /// A full reversal is always a valid permutation, so this only fails if
    /// [`Tensor::permute`] would.
    pub fn transpose(self) -> Result<Self> {
        let axes: Axes = self.all_axes().into_iter().rev().collect();
        self.permute(&axes)
    }

    /// Matrix product, lowered to a broadcast multiply followed by a sum.
    ///
    /// Always appends exactly four nodes: a view of each operand, the
    /// elementwise product and the reduction.
    pub fn matmul(self, rhs: Self) -> Result<Self> {
        self.graph.assert_owns(rhs);
        let plan = matmul_shapes(&self.shape(), &rhs.shape())?;

        let lhs = self.view(plan.lhs);
        let rhs = rhs.view(plan.rhs);
        let product = self.graph.binary(BinaryKind::Mul, lhs, rhs)?;
        debug_assert_eq!(product.shape(), plan.product);

        Ok(product.reduce(ReduceKind::Sum, plan.reduce, plan.output, false))
    }
}
