use std::{
    f32::consts::FRAC_PI_2,
    ops::{Add, BitXor, Div, Mul, Neg, Rem, Sub},
};

use lazygraph_shape::{dims::broadcast_shapes, Dimension, Result};
use num_traits::AsPrimitive;

use crate::{
    ops::{BinaryKind, BinaryOp, Op, UnaryKind},
    Tensor,
};

/// The right hand side of a binary builder call: another tensor, or a scalar
/// that is promoted to an immediate node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand<'graph> {
    Tensor(Tensor<'graph>),
    Scalar(f32),
}

impl<'graph> From<Tensor<'graph>> for Operand<'graph> {
    fn from(t: Tensor<'graph>) -> Self {
        Self::Tensor(t)
    }
}

macro_rules! scalar_operand {
    ($($t:ty),*) => {$(
        impl From<$t> for Operand<'_> {
            fn from(v: $t) -> Self {
                Self::Scalar(v.as_())
            }
        }
    )*};
}

scalar_operand!(f32, f64, i32, i64);

impl<'graph> Tensor<'graph> {
    fn unary(self, kind: UnaryKind) -> Self {
        self.graph.unary(kind, self)
    }

    fn binary(self, kind: BinaryKind, y: Self) -> Result<Self> {
        self.graph.binary(kind, self, y)
    }

    /// Builds `kind(imm, self)` and `kind(self, imm)`. Broadcasting against a
    /// scalar always succeeds and keeps this tensor's shape.
    fn with_scalar(self, kind: BinaryKind, scalar: f32, scalar_first: bool) -> Self {
        let imm = self.graph.immediate(scalar);
        let (x, y) = if scalar_first {
            (imm.id, self.id)
        } else {
            (self.id, imm.id)
        };
        let shape = self.shape();
        let strides = shape.canonical_strides();
        self.graph
            .push(Op::Binary(BinaryOp { kind, x, y }), shape, strides)
    }

    pub fn exp(self) -> Self {
        self.unary(UnaryKind::Exp)
    }

    pub fn log(self) -> Self {
        self.unary(UnaryKind::Log)
    }

    pub fn sin(self) -> Self {
        self.unary(UnaryKind::Sin)
    }

    /// `sin(x + pi/2)`
    pub fn cos(self) -> Self {
        (self + FRAC_PI_2).sin()
    }

    /// `1 / (1 + exp(-x))`
    pub fn sigmoid(self) -> Self {
        1.0 / (1.0 + (-self).exp())
    }

    /// `-1 * x`
    pub fn neg(self) -> Self {
        self.with_scalar(BinaryKind::Mul, -1.0, true)
    }

    pub fn add(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Add, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Add, s, true)),
        }
    }

    /// `x - s` is built as `x + (-s)`.
    pub fn sub(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Sub, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Add, -s, true)),
        }
    }

    pub fn mul(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Mul, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Mul, s, true)),
        }
    }

    pub fn div(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Div, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Div, s, false)),
        }
    }

    pub fn pow(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Pow, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Pow, s, false)),
        }
    }

    /// Elementwise maximum. See [`Tensor::max_all`] for the reduction.
    pub fn max(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Max, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Max, s, true)),
        }
    }

    /// Elementwise minimum, `-max(-x, -y)`.
    pub fn min(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => {
                self.graph.assert_owns(y);
                broadcast_shapes(&self.shape(), &y.shape())?;
                let m = (-self).binary(BinaryKind::Max, -y)?;
                Ok(-m)
            }
            Operand::Scalar(s) => Ok(self.min_scalar(s)),
        }
    }

    fn min_scalar(self, scalar: f32) -> Self {
        -(-self).with_scalar(BinaryKind::Max, -scalar, true)
    }

    /// `max(d, 0) == 0`
    fn non_positive(self) -> Self {
        self.with_scalar(BinaryKind::Max, 0.0, true)
            .with_scalar(BinaryKind::Cmp, 0.0, true)
    }

    /// `min(d, 0) == 0`
    fn non_negative(self) -> Self {
        self.min_scalar(0.0).with_scalar(BinaryKind::Cmp, 0.0, true)
    }

    /// Elementwise equality: 1 where equal, 0 elsewhere.
    pub fn equals(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => self.binary(BinaryKind::Cmp, y),
            Operand::Scalar(s) => Ok(self.with_scalar(BinaryKind::Cmp, s, true)),
        }
    }

    /// `x > y` is `max(x, y) == x`.
    pub fn gt(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        self.max(rhs)?.equals(self)
    }

    /// `x < y` is `y > x`. For a scalar `s`, `s > x` is `max(s, x) == s`.
    pub fn lt(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        match rhs.into() {
            Operand::Tensor(y) => y.gt(self),
            Operand::Scalar(s) => Ok(self
                .with_scalar(BinaryKind::Max, s, true)
                .with_scalar(BinaryKind::Cmp, s, true)),
        }
    }

    /// `x <= y` is `max(x - y, 0) == 0`.
    pub fn le(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        Ok(self.sub(rhs)?.non_positive())
    }

    /// `x >= y` is `min(x - y, 0) == 0`.
    pub fn ge(self, rhs: impl Into<Operand<'graph>>) -> Result<Self> {
        Ok(self.sub(rhs)?.non_negative())
    }

    /// `s <= x` is `max(s - x, 0) == 0`, with `s - x` built by [`Tensor::rsub`].
    pub fn rle(self, scalar: f32) -> Self {
        self.rsub(scalar).non_positive()
    }

    /// `s >= x` is `min(s - x, 0) == 0`.
    pub fn rge(self, scalar: f32) -> Self {
        self.rsub(scalar).non_negative()
    }

    /// `s - x`, built as `(-x) + s`.
    pub fn rsub(self, scalar: f32) -> Self {
        (-self).with_scalar(BinaryKind::Add, scalar, true)
    }

    /// `s / x`
    pub fn rdiv(self, scalar: f32) -> Self {
        self.with_scalar(BinaryKind::Div, scalar, true)
    }

    /// `s ^ x`
    pub fn rpow(self, scalar: f32) -> Self {
        self.with_scalar(BinaryKind::Pow, scalar, true)
    }
}

impl<'graph> Neg for Tensor<'graph> {
    type Output = Self;
    fn neg(self) -> Self {
        Tensor::neg(self)
    }
}

macro_rules! binary_ops {
    ($($trait:ident :: $method:ident => $tensor_scalar:expr, $scalar_tensor:expr;)*) => {$(
        impl<'graph> $trait for Tensor<'graph> {
            type Output = Result<Self>;
            fn $method(self, rhs: Self) -> Result<Self> {
                Tensor::$method(self, rhs)
            }
        }

        impl<'graph> $trait<f32> for Tensor<'graph> {
            type Output = Self;
            fn $method(self, rhs: f32) -> Self {
                let f: fn(Self, f32) -> Self = $tensor_scalar;
                f(self, rhs)
            }
        }

        impl<'graph> $trait<Tensor<'graph>> for f32 {
            type Output = Tensor<'graph>;
            fn $method(self, rhs: Tensor<'graph>) -> Tensor<'graph> {
                let f: fn(Tensor<'graph>, f32) -> Tensor<'graph> = $scalar_tensor;
                f(rhs, self)
            }
        }
    )*};
}

binary_ops! {
    Add::add => |x, s| x.with_scalar(BinaryKind::Add, s, true), |x, s| x.with_scalar(BinaryKind::Add, s, true);
    Sub::sub => |x, s| x.with_scalar(BinaryKind::Add, -s, true), |x, s| x.rsub(s);
    Mul::mul => |x, s| x.with_scalar(BinaryKind::Mul, s, true), |x, s| x.with_scalar(BinaryKind::Mul, s, true);
    Div::div => |x, s| x.with_scalar(BinaryKind::Div, s, false), |x, s| x.rdiv(s);
}

/// `x ^ s` raises to a scalar power.
impl<'graph> BitXor<f32> for Tensor<'graph> {
    type Output = Self;
    fn bitxor(self, rhs: f32) -> Self {
        self.with_scalar(BinaryKind::Pow, rhs, false)
    }
}

/// `x % y` is a matrix multiply.
impl<'graph> Rem for Tensor<'graph> {
    type Output = Result<Self>;
    fn rem(self, rhs: Self) -> Result<Self> {
        self.matmul(rhs)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use lazygraph_shape::ShapeError;

    use super::*;
    use crate::{graph::NodeId, ops::UnaryOp, Graph};

    fn binary(kind: BinaryKind, x: usize, y: usize) -> Op {
        Op::Binary(BinaryOp {
            kind,
            x: NodeId(x),
            y: NodeId(y),
        })
    }

    fn unary(kind: UnaryKind, x: usize) -> Op {
        Op::Unary(UnaryOp { kind, x: NodeId(x) })
    }

    fn ops(g: &Graph) -> Vec<Op> {
        g.nodes().iter().map(|n| n.op().clone()).collect()
    }

    #[test]
    fn tensor_primitives() {
        let g = Graph::new();
        let x = g.input(&[2, 3]);
        let y = g.input(&[3]);

        assert_eq!((x + y).unwrap().op(), binary(BinaryKind::Add, 0, 1));
        assert_eq!((x - y).unwrap().op(), binary(BinaryKind::Sub, 0, 1));
        assert_eq!((y * x).unwrap().op(), binary(BinaryKind::Mul, 1, 0));
        assert_eq!((x / y).unwrap().op(), binary(BinaryKind::Div, 0, 1));
        assert_eq!(x.pow(y).unwrap().op(), binary(BinaryKind::Pow, 0, 1));
        assert_eq!(x.max(y).unwrap().op(), binary(BinaryKind::Max, 0, 1));
        assert_eq!(x.equals(y).unwrap().op(), binary(BinaryKind::Cmp, 0, 1));
        assert_eq!(g.len(), 9);
    }

    #[test]
    fn scalars_are_promoted() {
        let g = Graph::new();
        let x = g.input(&[4]);

        let _ = x + 2.0; // %1 imm, %2 add %1, %0
        let _ = x - 3.0; // %3 imm -3, %4 add %3, %0
        let _ = x / 2.0; // %5 imm, %6 div %0, %5
        let _ = x ^ 2.0; // %7 imm, %8 pow %0, %7
        let _ = 2.0 / x; // %9 imm, %10 div %9, %0

        let ops = ops(&g);
        assert_eq!(ops[1], Op::Immediate(2.0));
        assert_eq!(ops[2], binary(BinaryKind::Add, 1, 0));
        assert_eq!(ops[3], Op::Immediate(-3.0));
        assert_eq!(ops[4], binary(BinaryKind::Add, 3, 0));
        assert_eq!(ops[6], binary(BinaryKind::Div, 0, 5));
        assert_eq!(ops[8], binary(BinaryKind::Pow, 0, 7));
        assert_eq!(ops[10], binary(BinaryKind::Div, 9, 0));

        for node in g.nodes().iter().skip(1) {
            if let Op::Binary(_) = node.op() {
                assert_eq!(node.shape(), [4]);
            }
        }
    }

    #[test]
    fn scalar_on_the_left() {
        let g = Graph::new();
        let x = g.input(&[4]);

        let sum = 2.0 + x;
        assert_eq!(sum.op(), binary(BinaryKind::Add, 1, 0));

        // 5 - x is (-x) + 5
        let diff = 5.0 - x;
        let ops = ops(&g);
        assert_eq!(ops[3], Op::Immediate(-1.0));
        assert_eq!(ops[4], binary(BinaryKind::Mul, 3, 0));
        assert_eq!(ops[5], Op::Immediate(5.0));
        assert_eq!(ops[6], binary(BinaryKind::Add, 5, 4));
        assert_eq!(diff.id(), NodeId(6));

        let p = x.rpow(2.0);
        assert_eq!(p.op(), binary(BinaryKind::Pow, 7, 0));
    }

    #[test]
    fn neg_is_scaled_by_minus_one() {
        let g = Graph::new();
        let x = g.input(&[2, 2]);
        let n = -x;
        assert_eq!(ops(&g)[1], Op::Immediate(-1.0));
        assert_eq!(n.op(), binary(BinaryKind::Mul, 1, 0));
        assert_eq!(n.shape(), x.shape());
    }

    #[test]
    fn cos_is_shifted_sin() {
        let g = Graph::new();
        let x = g.input(&[3]);
        let c = x.cos();

        let ops = ops(&g);
        assert_eq!(ops.len(), 4);
        match ops[1] {
            Op::Immediate(v) => assert_relative_eq!(v, std::f32::consts::PI / 2.0),
            ref op => panic!("expected an immediate, got {op}"),
        }
        assert_eq!(ops[2], binary(BinaryKind::Add, 1, 0));
        assert_eq!(c.op(), unary(UnaryKind::Sin, 2));
    }

    #[test]
    fn sigmoid_structure() {
        let g = Graph::new();
        let x = g.input(&[3]);
        let s = x.sigmoid();

        assert_eq!(
            ops(&g),
            vec![
                Op::Tensor(Default::default()),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 1, 0),
                unary(UnaryKind::Exp, 2),
                Op::Immediate(1.0),
                binary(BinaryKind::Add, 4, 3),
                Op::Immediate(1.0),
                binary(BinaryKind::Div, 6, 5),
            ]
        );
        assert_eq!(s.shape().as_slice(), [3]);
    }

    #[test]
    fn min_is_negated_max_of_negations() {
        let g = Graph::new();
        let x = g.input(&[2, 3]);
        let y = g.input(&[3]);
        let m = x.min(y).unwrap();

        assert_eq!(
            ops(&g)[2..],
            [
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 2, 0),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 4, 1),
                binary(BinaryKind::Max, 3, 5),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 7, 6),
            ]
        );
        assert_eq!(m.shape().as_slice(), [2, 3]);
    }

    #[test]
    fn min_rejects_before_building() {
        let g = Graph::new();
        let x = g.input(&[2, 3]);
        let y = g.input(&[4]);
        assert!(matches!(x.min(y), Err(ShapeError::Broadcast { .. })));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn comparisons() {
        let g = Graph::new();
        let x = g.input(&[3]);
        let y = g.input(&[3]);

        // x > y == (max(x, y) == x)
        let gt = x.gt(y).unwrap();
        assert_eq!(ops(&g)[2], binary(BinaryKind::Max, 0, 1));
        assert_eq!(gt.op(), binary(BinaryKind::Cmp, 2, 0));

        // x < y == y > x
        let lt = x.lt(y).unwrap();
        assert_eq!(ops(&g)[4], binary(BinaryKind::Max, 1, 0));
        assert_eq!(lt.op(), binary(BinaryKind::Cmp, 4, 1));

        // x <= y == (max(x - y, 0) == 0)
        let le = x.le(y).unwrap();
        let all = ops(&g);
        assert_eq!(
            all[6..],
            [
                binary(BinaryKind::Sub, 0, 1),
                Op::Immediate(0.0),
                binary(BinaryKind::Max, 7, 6),
                Op::Immediate(0.0),
                binary(BinaryKind::Cmp, 9, 8),
            ]
        );
        assert_eq!(le.id(), NodeId(10));

        // x >= y == (min(x - y, 0) == 0) == (-max(-(x - y), -0) == 0)
        let ge = x.ge(y).unwrap();
        let all = ops(&g);
        assert_eq!(
            all[11..],
            [
                binary(BinaryKind::Sub, 0, 1),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 12, 11),
                Op::Immediate(-0.0),
                binary(BinaryKind::Max, 14, 13),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 16, 15),
                Op::Immediate(0.0),
                binary(BinaryKind::Cmp, 18, 17),
            ]
        );
        assert_eq!(ge.id(), NodeId(19));
        assert_eq!(ge.shape().as_slice(), [3]);
    }

    #[test]
    fn scalar_first_le() {
        let g = Graph::new();
        let x = g.input(&[3]);

        // 2 <= x == (max(2 - x, 0) == 0), 2 - x == (-x) + 2
        let le = x.rle(2.0);
        assert_eq!(
            ops(&g)[1..],
            [
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 1, 0),
                Op::Immediate(2.0),
                binary(BinaryKind::Add, 3, 2),
                Op::Immediate(0.0),
                binary(BinaryKind::Max, 5, 4),
                Op::Immediate(0.0),
                binary(BinaryKind::Cmp, 7, 6),
            ]
        );
        assert_eq!(le.id(), NodeId(8));
        assert_eq!(le.shape().as_slice(), [3]);
    }

    #[test]
    fn scalar_first_ge() {
        let g = Graph::new();
        let x = g.input(&[3]);

        // 2 >= x == (min(2 - x, 0) == 0)
        let ge = x.rge(2.0);
        assert_eq!(
            ops(&g)[1..],
            [
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 1, 0),
                Op::Immediate(2.0),
                binary(BinaryKind::Add, 3, 2),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 5, 4),
                Op::Immediate(-0.0),
                binary(BinaryKind::Max, 7, 6),
                Op::Immediate(-1.0),
                binary(BinaryKind::Mul, 9, 8),
                Op::Immediate(0.0),
                binary(BinaryKind::Cmp, 11, 10),
            ]
        );
        assert_eq!(ge.id(), NodeId(12));
    }

    #[test]
    fn comparisons_against_scalars() {
        let g = Graph::new();
        let x = g.input(&[3]);

        // x > 2 == (max(2, x) == x)
        let gt = x.gt(2.0).unwrap();
        assert_eq!(ops(&g)[1..3], [Op::Immediate(2.0), binary(BinaryKind::Max, 1, 0)]);
        assert_eq!(gt.op(), binary(BinaryKind::Cmp, 2, 0));

        // x < 2 == (max(2, x) == 2)
        let lt = x.lt(2.0).unwrap();
        assert_eq!(
            ops(&g)[4..],
            [
                Op::Immediate(2.0),
                binary(BinaryKind::Max, 4, 0),
                Op::Immediate(2.0),
                binary(BinaryKind::Cmp, 6, 5),
            ]
        );
        assert_eq!(lt.id(), NodeId(7));
    }

    #[test]
    fn operand_conversions() {
        let g = Graph::new();
        let x = g.input(&[]);
        assert_eq!(Operand::from(x), Operand::Tensor(x));
        assert_eq!(Operand::from(2), Operand::Scalar(2.0));
        assert_eq!(Operand::from(0.5_f64), Operand::Scalar(0.5));
    }

    #[test]
    fn broadcast_errors_surface() {
        let g = Graph::new();
        let x = g.input(&[2, 3]);
        let y = g.input(&[4]);
        assert!((x + y).is_err());
        assert!(x.gt(y).is_err());
        assert!(x.le(y).is_err());
        assert_eq!(g.len(), 2);
    }
}
