use std::{fmt, ptr::NonNull};

use lazygraph_shape::Axes;
use smallvec::{smallvec, SmallVec};

use crate::graph::NodeId;

/// Most nodes have at most two inputs, so this never spills.
pub type InputArray<T> = SmallVec<[T; 2]>;

/// Location of an externally allocated buffer bound to a tensor node.
///
/// This crate only carries the pointer around for the execution stage.
/// It is never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataPtr(NonNull<f32>);

// Safety: a `DataPtr` is an opaque token. Whoever dereferences it owns the
// buffer and is responsible for synchronising access to it.
unsafe impl Send for DataPtr {}
unsafe impl Sync for DataPtr {}

impl DataPtr {
    /// Returns `None` for a null pointer.
    pub fn new(ptr: *mut f32) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut f32 {
        self.0.as_ptr()
    }
}

impl From<&mut [f32]> for DataPtr {
    fn from(buf: &mut [f32]) -> Self {
        Self(NonNull::from(buf).cast())
    }
}

/// Externally supplied data. Unbound until the execution stage allocates it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TensorOp {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Option<DataPtr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnaryKind {
    Exp,
    Log,
    Sin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinaryKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Max,
    /// Elementwise equality, 1 where equal and 0 elsewhere.
    Cmp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReduceKind {
    Sum,
    Max,
}

impl UnaryKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Log => "log",
            Self::Sin => "sin",
        }
    }
}

impl BinaryKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Pow => "pow",
            Self::Max => "max",
            Self::Cmp => "cmp",
        }
    }
}

impl ReduceKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "reduce_max",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnaryOp {
    pub kind: UnaryKind,
    pub x: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BinaryOp {
    pub kind: BinaryKind,
    pub x: NodeId,
    pub y: NodeId,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReduceOp {
    pub kind: ReduceKind,
    pub x: NodeId,
    /// Fixed, ascending and deduplicated.
    pub dims: Axes,
    pub keepdim: bool,
}

/// Reinterprets `x` under the node's own shape and strides. Never moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewOp {
    pub x: NodeId,
}

/// The operation held by a node. Exactly one variant, fixed at insertion.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    Tensor(TensorOp),
    Immediate(f32),
    Unary(UnaryOp),
    Binary(BinaryOp),
    Reduce(ReduceOp),
    View(ViewOp),
}

impl Op {
    /// The nodes this op reads from, in operand order.
    pub fn inputs(&self) -> InputArray<NodeId> {
        match self {
            Self::Tensor(_) | Self::Immediate(_) => InputArray::new(),
            Self::Unary(op) => smallvec![op.x],
            Self::Binary(op) => smallvec![op.x, op.y],
            Self::Reduce(op) => smallvec![op.x],
            Self::View(op) => smallvec![op.x],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "tensor",
            Self::Immediate(_) => "imm",
            Self::Unary(op) => op.kind.name(),
            Self::Binary(op) => op.kind.name(),
            Self::Reduce(op) => op.kind.name(),
            Self::View(_) => "view",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(op) => match op.data {
                Some(data) => write!(f, "tensor @{:p}", data.as_ptr()),
                None => f.write_str("tensor"),
            },
            Self::Immediate(value) => write!(f, "imm {value:?}"),
            Self::Unary(op) => write!(f, "{} {}", op.kind.name(), op.x),
            Self::Binary(op) => write!(f, "{} {}, {}", op.kind.name(), op.x, op.y),
            Self::Reduce(op) => {
                write!(f, "{} {} dims={:?}", op.kind.name(), op.x, op.dims.as_slice())?;
                if op.keepdim {
                    f.write_str(" keepdim")?;
                }
                Ok(())
            }
            Self::View(op) => write!(f, "view {}", op.x),
        }
    }
}
