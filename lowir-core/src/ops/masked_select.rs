use crate::{
    node::Node,
    ops::broadcast_to,
    shape::{Dim, Shape},
    shape_err, BackendBuilder, ElementType, Result,
};

pub(crate) const OP: &str = "masked_select";

/// Output is rank 1 with a data-dependent extent bounded by the element count
/// of the broadcast operands.
pub(crate) fn infer_shape(input: &Shape, mask: &Shape) -> Result<Shape> {
    if mask.element_type() != ElementType::Bool {
        shape_err!(OP, "mask {mask} must be of type pred");
    }
    let Some(dims) = input.broadcast(mask) else {
        shape_err!(OP, "input {input} and mask {mask} do not broadcast");
    };
    let Some(bound) = Shape::new(input.element_type(), dims).element_count_bound() else {
        shape_err!(OP, "element count of {input} and {mask} overflows");
    };
    Ok(Shape::new(input.element_type(), [Dim::Dynamic { bound }]))
}

pub(crate) fn lower<B: BackendBuilder>(
    node: &Node,
    operands: &[B::Handle],
    builder: &mut B,
) -> Result<B::Handle> {
    let input_shape = node.operand(0).shape();
    let mask_shape = node.operand(1).shape();
    let Some(dims) = input_shape.broadcast(mask_shape) else {
        shape_err!(OP, "input {input_shape} and mask {mask_shape} do not broadcast");
    };
    let common = Shape::new(input_shape.element_type(), dims);
    let input = broadcast_to(builder, &operands[0], input_shape, &common)?;
    let mask = broadcast_to(builder, &operands[1], mask_shape, &common)?;

    let Some(bound) = common.element_count_bound() else {
        shape_err!(OP, "element count of {common} overflows");
    };
    let flat = if common.is_static() {
        Dim::Static(bound)
    } else {
        Dim::Dynamic { bound }
    };
    let input = builder.reshape(&input, &Shape::new(input_shape.element_type(), [flat]))?;
    let mask = builder.reshape(&mask, &Shape::new(ElementType::Bool, [flat]))?;
    let indices = builder.nonzero(&mask, bound)?;
    builder.gather(&input, &indices)
}
