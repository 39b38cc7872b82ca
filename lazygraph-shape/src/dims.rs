use smallvec::SmallVec;

use crate::{Axes, Dim, Result, Shape, ShapeError, Strides};

/// A dimension type for a tensor
pub trait Dimension: AsRef<[Dim]> {
    /// Number of elements held by a tensor of this shape.
    /// The empty (scalar) shape holds a single element.
    ///
    /// Shapes built by this crate are checked with [`checked_num_elements`],
    /// so this never overflows for them.
    fn num_elements(&self) -> Dim {
        self.as_ref().iter().product()
    }

    /// Row-major strides for this shape. See [`canonical_strides`].
    #[must_use]
    fn canonical_strides(&self) -> Strides {
        canonical_strides(self.as_ref())
    }
}

impl Dimension for [Dim] {}
impl<const N: usize> Dimension for [Dim; N] {}
impl Dimension for std::vec::Vec<Dim> {}
impl<const N: usize> Dimension for SmallVec<[Dim; N]> {}

/// Maps a possibly negative axis into `[0, rank)` using floored modulo,
/// so `-1` is the last axis.
pub fn fix_dim(dim: Dim, rank: usize) -> Result<usize> {
    if rank == 0 {
        return Err(ShapeError::InvalidAxis { axis: dim, rank });
    }

    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    let fixed = dim.rem_euclid(rank as Dim) as usize;
    Ok(fixed)
}

/// Number of elements of `shape`, or `None` if it overflows a [`Dim`].
pub fn checked_num_elements(shape: &[Dim]) -> Option<Dim> {
    shape.iter().try_fold(1, |acc: Dim, &dim| acc.checked_mul(dim))
}

/// Broadcasts two shapes against each other.
///
/// Shapes are right aligned. The longer shape provides the leading dimensions,
/// and each aligned pair must either match or have one side equal to 1.
pub fn broadcast_shapes(lhs: &[Dim], rhs: &[Dim]) -> Result<Shape> {
    let (larger, smaller) = if lhs.len() > rhs.len() {
        (lhs, rhs)
    } else {
        (rhs, lhs)
    };

    let mut shape = Shape::from_slice(larger);
    for (out, &dim) in shape.iter_mut().rev().zip(smaller.iter().rev()) {
        match (*out, dim) {
            (l, s) if l == s => {}
            (1, s) => *out = s,
            (_, 1) => {}
            _ => {
                return Err(ShapeError::Broadcast {
                    lhs: Shape::from_slice(lhs),
                    rhs: Shape::from_slice(rhs),
                })
            }
        }
    }

    if checked_num_elements(&shape).is_none() {
        return Err(ShapeError::TooManyElements { shape });
    }

    Ok(shape)
}

/// Row-major strides with every size 1 dimension given stride 0.
///
/// The running multiplier still advances by the true size of each dimension,
/// so `[2, 1, 3]` gives `[3, 0, 1]`. The multiplier past the outermost
/// dimension is never used, so it saturates instead of overflowing.
pub fn canonical_strides(shape: &[Dim]) -> Strides {
    let mut strides = Strides::from_elem(0, shape.len());
    let mut step: Dim = 1;
    for (stride, &dim) in strides.iter_mut().zip(shape).rev() {
        *stride = if dim == 1 { 0 } else { step };
        step = step.saturating_mul(dim);
    }
    strides
}

/// The shape left after reducing over every dimension.
pub fn reduce_all_shape(shape: &[Dim], keepdim: bool) -> Shape {
    if keepdim {
        Shape::from_elem(1, shape.len())
    } else {
        Shape::new()
    }
}

/// Fixes each axis against `rank`, then sorts and deduplicates them.
///
/// This is the canonical form stored on reduce nodes.
pub fn normalize_axes(axes: &[Dim], rank: usize) -> Result<Axes> {
    if axes.len() > rank {
        return Err(ShapeError::TooManyReduceDims {
            requested: axes.len(),
            rank,
        });
    }

    let mut fixed = axes
        .iter()
        .map(|&axis| fix_dim(axis, rank).map(|d| d as Dim))
        .collect::<Result<Axes>>()?;
    fixed.sort_unstable();
    fixed.dedup();
    Ok(fixed)
}

/// The shape of a reduction over `dims` (already fixed, in `[0, rank)`).
///
/// Empty `dims` means every dimension is reduced. Reduced dimensions are
/// either removed or, with `keepdim`, replaced by 1.
pub fn reduced_shape(shape: &[Dim], dims: &[Dim], keepdim: bool) -> Result<Shape> {
    if dims.is_empty() {
        return Ok(reduce_all_shape(shape, keepdim));
    }

    let rank = shape.len();
    if dims.len() > rank {
        return Err(ShapeError::TooManyReduceDims {
            requested: dims.len(),
            rank,
        });
    }

    let mut reduced: SmallVec<[bool; 4]> = SmallVec::from_elem(false, rank);
    for &dim in dims {
        match usize::try_from(dim) {
            Ok(d) if d < rank => reduced[d] = true,
            _ => return Err(ShapeError::InvalidAxis { axis: dim, rank }),
        }
    }

    let out = shape
        .iter()
        .zip(&reduced)
        .filter_map(|(&size, &r)| match (r, keepdim) {
            (false, _) => Some(size),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect();
    Ok(out)
}

/// Resolves a reshape target against the input shape.
///
/// At most one dimension may be `-1`, and it is solved from the element count.
/// The division must be exact.
pub fn resolve_reshape(from: &[Dim], to: &[Dim]) -> Result<Shape> {
    if let Some(&dim) = to.iter().find(|&&d| d < -1) {
        return Err(ShapeError::InvalidDim {
            dim,
            shape: Shape::from_slice(to),
        });
    }

    let total = from.num_elements();
    match to.iter().filter(|&&d| d == -1).count() {
        0 => {
            if checked_num_elements(to) != Some(total) {
                return Err(ShapeError::ElementCount {
                    from: Shape::from_slice(from),
                    to: Shape::from_slice(to),
                    expected: total,
                });
            }
            Ok(Shape::from_slice(to))
        }
        1 => {
            // an overflowing product can never divide `total`
            let known = to
                .iter()
                .filter(|&&d| d != -1)
                .try_fold(1, |acc: Dim, &d| acc.checked_mul(d));
            let inferred = match known {
                Some(known) if known != 0 && total % known == 0 => total / known,
                _ => {
                    return Err(ShapeError::NotDivisible {
                        to: Shape::from_slice(to),
                        total,
                        known: known.unwrap_or(Dim::MAX),
                    })
                }
            };
            Ok(to
                .iter()
                .map(|&d| if d == -1 { inferred } else { d })
                .collect())
        }
        _ => Err(ShapeError::MultipleImplicitDims {
            shape: Shape::from_slice(to),
        }),
    }
}

/// The shape produced by permuting `shape` so that output axis `i`
/// is input axis `axes[i]`.
pub fn permuted_shape(shape: &[Dim], axes: &[Dim]) -> Result<Shape> {
    let rank = shape.len();
    if axes.len() != rank {
        return Err(ShapeError::PermuteRank {
            rank,
            given: axes.len(),
        });
    }

    let mut used: SmallVec<[bool; 4]> = SmallVec::from_elem(false, rank);
    let mut out = Shape::with_capacity(rank);
    for &axis in axes {
        let fixed = fix_dim(axis, rank)?;
        if used[fixed] {
            return Err(ShapeError::RepeatedAxis {
                axis: fixed,
                axes: Shape::from_slice(axes),
            });
        }
        used[fixed] = true;
        out.push(shape[fixed]);
    }

    Ok(out)
}

/// Shapes used to lower a matrix multiply onto broadcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatmulShapes {
    /// `x` reshaped with a trailing unit axis.
    pub lhs: Shape,
    /// `y` reshaped with a unit axis before its last two.
    pub rhs: Shape,
    /// Broadcast of `lhs` and `rhs`.
    pub product: Shape,
    /// Ascending axes of `product` summed away.
    pub reduce: Axes,
    /// The final result shape.
    pub output: Shape,
}

/// Works out every intermediate shape of `x @ y` before anything is built.
///
/// A rank 1 `x` becomes a row vector and a rank 1 `y` a column vector. The unit
/// axis padded onto a vector operand is summed away together with the inner
/// axis, so vector operands do not leave a stray 1 in the output.
pub fn matmul_shapes(x: &[Dim], y: &[Dim]) -> Result<MatmulShapes> {
    if x.is_empty() || y.is_empty() {
        return Err(ShapeError::MatmulRank {
            lhs: Shape::from_slice(x),
            rhs: Shape::from_slice(y),
        });
    }

    let x_vector = x.len() == 1;
    let y_vector = y.len() == 1;

    let mut lhs = Shape::from_slice(x);
    let mut rhs = Shape::from_slice(y);
    if x_vector {
        lhs.insert(0, 1);
    }
    if y_vector {
        rhs.push(1);
    }

    lhs.push(1);
    rhs.insert(rhs.len() - 2, 1);

    if lhs[lhs.len() - 2] != rhs[rhs.len() - 2] {
        return Err(ShapeError::MatmulInner {
            lhs: Shape::from_slice(x),
            rhs: Shape::from_slice(y),
        });
    }

    let product = broadcast_shapes(&lhs, &rhs)?;

    #[allow(clippy::cast_possible_wrap)]
    let rank = product.len() as Dim;
    let mut reduce = Axes::new();
    if x_vector {
        reduce.push(rank - 3);
    }
    reduce.push(rank - 2);
    if y_vector {
        reduce.push(rank - 1);
    }

    let output = reduced_shape(&product, &reduce, false)?;

    Ok(MatmulShapes {
        lhs,
        rhs,
        product,
        reduce,
        output,
    })
}
