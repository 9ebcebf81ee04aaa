use std::fmt::Debug;

use crate::{Result, Scalar, Shape};

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum BinaryOpType {
    Add,
    Div,
    Sub,
    Mul,
}

impl BinaryOpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Div => "divide",
            Self::Sub => "subtract",
            Self::Mul => "multiply",
        }
    }
}

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum CompareDirection {
    Eq,
    Ne,
}

impl CompareDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
        }
    }
}

/// Window configuration of a native convolution. Operands are laid out as
/// `[N, C, *spatial]` (input) and `[O, I, *spatial]` (kernel).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvDimensions {
    pub window_strides: Vec<usize>,
    /// `(low, high)` padding per spatial dim. Negative values crop.
    pub padding: Vec<(i64, i64)>,
    pub lhs_dilation: Vec<usize>,
    pub rhs_dilation: Vec<usize>,
    pub feature_group_count: usize,
}

/// Operation construction API of a native target compiler.
///
/// Lowering only ever talks to the target through this trait. Every method
/// emits one operation and returns a handle to its result; shapes passed in are
/// the statically inferred output shapes.
pub trait BackendBuilder {
    type Handle: Clone + Debug;

    fn parameter(&mut self, index: usize, name: &str, shape: &Shape) -> Result<Self::Handle>;

    /// `value` broadcast to `shape`.
    fn constant(&mut self, value: Scalar, shape: &Shape) -> Result<Self::Handle>;

    fn binary(
        &mut self,
        op: BinaryOpType,
        lhs: &Self::Handle,
        rhs: &Self::Handle,
    ) -> Result<Self::Handle>;

    fn compare(
        &mut self,
        direction: CompareDirection,
        lhs: &Self::Handle,
        rhs: &Self::Handle,
    ) -> Result<Self::Handle>;

    fn select(
        &mut self,
        pred: &Self::Handle,
        on_true: &Self::Handle,
        on_false: &Self::Handle,
    ) -> Result<Self::Handle>;

    /// Dim `i` of the operand becomes dim `broadcast_dims[i]` of `shape`.
    fn broadcast_in_dim(
        &mut self,
        operand: &Self::Handle,
        shape: &Shape,
        broadcast_dims: &[usize],
    ) -> Result<Self::Handle>;

    fn reshape(&mut self, operand: &Self::Handle, shape: &Shape) -> Result<Self::Handle>;

    fn transpose(&mut self, operand: &Self::Handle, permutation: &[usize]) -> Result<Self::Handle>;

    fn reverse(&mut self, operand: &Self::Handle, dims: &[usize]) -> Result<Self::Handle>;

    fn convolution(
        &mut self,
        input: &Self::Handle,
        kernel: &Self::Handle,
        dims: &ConvDimensions,
    ) -> Result<Self::Handle>;

    /// Flat indices of the true elements of a rank 1 predicate. The result
    /// has a data-dependent length of at most `bound`.
    fn nonzero(&mut self, mask: &Self::Handle, bound: usize) -> Result<Self::Handle>;

    /// Elements of a rank 1 operand at the given indices.
    fn gather(&mut self, operand: &Self::Handle, indices: &Self::Handle)
        -> Result<Self::Handle>;

    /// Eigendecomposition of a self-adjoint matrix (or batch of matrices),
    /// reading only the `lower` (or upper) triangle. Returns
    /// `(eigenvectors, eigenvalues)`.
    fn self_adjoint_eig(
        &mut self,
        operand: &Self::Handle,
        lower: bool,
    ) -> Result<(Self::Handle, Self::Handle)>;
}
