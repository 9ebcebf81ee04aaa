//! Operation kinds.
//!
//! Every kind is a variant of [`OpKind`] carrying its immutable parameters and
//! provides two pure functions in its module: shape inference, run when a node
//! is built, and lowering, run once per compilation.

use std::fmt::{self, Display};

use smallvec::{smallvec, SmallVec};

use crate::{
    backend::{BackendBuilder, BinaryOpType},
    hash::StructuralHasher,
    node::Node,
    Result, Shape,
};

pub mod conv;
pub mod elementwise;
pub mod masked_select;
pub mod sgd;
pub mod symeig;

pub use conv::ConvParams;
pub use elementwise::{ConstantOp, ParameterOp};
pub use sgd::{SgdFlags, SgdOperands};
pub use symeig::SymEigParams;

pub type OutputShapes = SmallVec<[Shape; 3]>;
pub type Handles<H> = SmallVec<[H; 3]>;

/// Number of operands a kind accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Self::Exact(e) => n == e,
            Self::Range(lo, hi) => (lo..=hi).contains(&n),
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::Range(lo, hi) => write!(f, "{lo} to {hi}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Device data fed into the graph.
    Parameter(ParameterOp),
    /// A scalar broadcast to a shape.
    Constant(ConstantOp),
    Binary(BinaryOpType),
    /// N-d convolution, optionally transposed, grouped and biased.
    /// Operands: `input, weight[, bias]`.
    Convolution(ConvParams),
    /// Operands: `input, mask`.
    MaskedSelect,
    /// Operands: `found_inf, step, param, buf, d_p, weight_decay, momentum,
    /// lr, dampening`. Outputs: `step, param, buf`.
    SgdOptimizerStep(SgdFlags),
    /// Outputs: `eigenvalues, eigenvectors`.
    SymEig(SymEigParams),
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Parameter(_) => elementwise::PARAMETER,
            Self::Constant(_) => elementwise::CONSTANT,
            Self::Binary(op) => op.as_str(),
            Self::Convolution(_) => conv::OP,
            Self::MaskedSelect => masked_select::OP,
            Self::SgdOptimizerStep(_) => sgd::OP,
            Self::SymEig(_) => symeig::OP,
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Self::Parameter(_) => 0,
            Self::Constant(_) => 1,
            Self::Binary(_) => 2,
            Self::Convolution(_) => 3,
            Self::MaskedSelect => 4,
            Self::SgdOptimizerStep(_) => 5,
            Self::SymEig(_) => 6,
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Self::Parameter(_) | Self::Constant(_) => Arity::Exact(0),
            Self::Binary(_) | Self::MaskedSelect => Arity::Exact(2),
            Self::Convolution(_) => Arity::Range(2, 3),
            Self::SgdOptimizerStep(_) => Arity::Exact(sgd::NUM_OPERANDS),
            Self::SymEig(_) => Arity::Exact(1),
        }
    }

    pub fn num_outputs(&self) -> usize {
        match self {
            Self::SgdOptimizerStep(_) => 3,
            Self::SymEig(_) => 2,
            _ => 1,
        }
    }

    /// Hasher pre-seeded with this kind's salt.
    pub(crate) fn salted_hasher(&self) -> StructuralHasher {
        StructuralHasher::salted(self.name(), self.discriminant())
    }

    /// Output shapes for the given operand shapes. Arity is already checked.
    pub(crate) fn infer_shapes(&self, operands: &[&Shape]) -> Result<OutputShapes> {
        let shapes = match self {
            Self::Parameter(p) => smallvec![p.shape.clone()],
            Self::Constant(c) => smallvec![elementwise::infer_constant(c)?],
            Self::Binary(op) => {
                smallvec![elementwise::infer_binary(*op, operands[0], operands[1])?]
            }
            Self::Convolution(params) => smallvec![conv::infer_shape(params, operands)?],
            Self::MaskedSelect => {
                smallvec![masked_select::infer_shape(operands[0], operands[1])?]
            }
            Self::SgdOptimizerStep(flags) => sgd::infer_shapes(flags, operands)?,
            Self::SymEig(_) => symeig::infer_shapes(operands[0])?,
        };
        Ok(shapes)
    }

    /// Emit target operations for `node`, whose operands resolved to
    /// `operands`. Returns one handle per output.
    pub(crate) fn lower<B: BackendBuilder>(
        &self,
        node: &Node,
        operands: &[B::Handle],
        builder: &mut B,
    ) -> Result<Handles<B::Handle>> {
        let handles = match self {
            Self::Parameter(p) => {
                smallvec![builder.parameter(p.index, &p.name, &p.shape)?]
            }
            Self::Constant(c) => smallvec![builder.constant(c.value, &c.shape)?],
            Self::Binary(op) => {
                smallvec![elementwise::lower_binary(*op, node, operands, builder)?]
            }
            Self::Convolution(params) => {
                smallvec![conv::lower(params, node, operands, builder)?]
            }
            Self::MaskedSelect => {
                smallvec![masked_select::lower(node, operands, builder)?]
            }
            Self::SgdOptimizerStep(flags) => sgd::lower(flags, node, operands, builder)?,
            Self::SymEig(params) => symeig::lower(params, node, operands, builder)?,
        };
        Ok(handles)
    }
}

impl OpKind {
    /// Writes `, key=value` pairs for the kind's parameters, nothing for
    /// kinds without any.
    pub(crate) fn fmt_params(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(p) => write!(f, ", {p}"),
            Self::Constant(c) => write!(f, ", {c}"),
            Self::Convolution(params) => write!(f, ", {params}"),
            Self::SgdOptimizerStep(flags) => write!(f, ", {flags}"),
            Self::SymEig(params) => write!(f, ", {params}"),
            Self::Binary(_) | Self::MaskedSelect => Ok(()),
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        self.fmt_params(f)
    }
}

/// Broadcast `operand` of shape `from` up to the extents of `to`, keeping its
/// element type. A no-op when the extents already match.
pub(crate) fn broadcast_to<B: BackendBuilder>(
    builder: &mut B,
    operand: &B::Handle,
    from: &Shape,
    to: &Shape,
) -> Result<B::Handle> {
    if from.dims() == to.dims() {
        return Ok(operand.clone());
    }
    builder.broadcast_in_dim(
        operand,
        &to.with_element_type(from.element_type()),
        &from.broadcast_dimensions(to),
    )
}
