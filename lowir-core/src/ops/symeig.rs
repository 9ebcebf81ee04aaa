use std::fmt::{self, Display};

use smallvec::smallvec;

use crate::{
    backend::BackendBuilder,
    node::Node,
    ops::{Handles, OutputShapes},
    shape_err, Result, Scalar, Shape,
};

pub(crate) const OP: &str = "symeig";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymEigParams {
    /// Compute eigenvectors. When unset the vectors output is still produced,
    /// filled with zeros.
    pub eigenvectors: bool,
    /// Read the lower triangle of the input instead of the upper one.
    pub lower: bool,
}

impl Display for SymEigParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eigenvectors={}, lower={}", self.eigenvectors, self.lower)
    }
}

/// `[..., n, n]` -> (`[..., n]`, `[..., n, n]`).
pub(crate) fn infer_shapes(input: &Shape) -> Result<OutputShapes> {
    if !input.element_type().is_float() {
        shape_err!(OP, "input {input} must be floating point");
    }
    let dims = input.require_static(OP)?;
    let rank = dims.len();
    if rank < 2 || dims[rank - 1] != dims[rank - 2] {
        shape_err!(OP, "input {input} must be a square matrix or a batch of them");
    }
    let values = Shape::from_dims(input.element_type(), &dims[..rank - 1]);
    Ok(smallvec![values, input.clone()])
}

pub(crate) fn lower<B: BackendBuilder>(
    params: &SymEigParams,
    node: &Node,
    operands: &[B::Handle],
    builder: &mut B,
) -> Result<Handles<B::Handle>> {
    let (vectors, values) = builder.self_adjoint_eig(&operands[0], params.lower)?;
    let vectors = if params.eigenvectors {
        vectors
    } else {
        let input = node.operand(0).shape();
        builder.constant(Scalar::zero(input.element_type()), input)?
    };
    Ok(smallvec![values, vectors])
}
