use std::fmt::{self, Display};

use crate::{
    backend::{BackendBuilder, BinaryOpType},
    node::Node,
    ops::broadcast_to,
    shape_err, Result, Scalar, Shape,
};

pub(crate) const PARAMETER: &str = "parameter";
pub(crate) const CONSTANT: &str = "constant";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterOp {
    /// Position among the graph's parameters.
    pub index: usize,
    pub name: String,
    pub shape: Shape,
}

impl Display for ParameterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "index={}, name={:?}", self.index, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantOp {
    pub value: Scalar,
    pub shape: Shape,
}

impl Display for ConstantOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value={}", self.value)
    }
}

pub(crate) fn infer_constant(c: &ConstantOp) -> Result<Shape> {
    if c.value.element_type() != c.shape.element_type() {
        shape_err!(
            CONSTANT,
            "literal {} does not match shape {}",
            c.value,
            c.shape
        );
    }
    c.shape.require_static(CONSTANT)?;
    Ok(c.shape.clone())
}

pub(crate) fn infer_binary(op: BinaryOpType, lhs: &Shape, rhs: &Shape) -> Result<Shape> {
    if lhs.element_type() != rhs.element_type() {
        shape_err!(
            op.as_str(),
            "element types differ: {} vs {}",
            lhs.element_type(),
            rhs.element_type()
        );
    }
    match lhs.broadcast(rhs) {
        Some(dims) => Ok(Shape::new(lhs.element_type(), dims)),
        None => shape_err!(op.as_str(), "{lhs} and {rhs} do not broadcast"),
    }
}

pub(crate) fn lower_binary<B: BackendBuilder>(
    op: BinaryOpType,
    node: &Node,
    operands: &[B::Handle],
    builder: &mut B,
) -> Result<B::Handle> {
    let out = node.shape(0);
    let lhs = broadcast_to(builder, &operands[0], node.operand(0).shape(), out)?;
    let rhs = broadcast_to(builder, &operands[1], node.operand(1).shape(), out)?;
    builder.binary(op, &lhs, &rhs)
}
