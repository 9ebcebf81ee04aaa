//! Fused SGD update.
//!
//! The step is "in place" only by contract: the node returns fresh values for
//! `step`, `param` and `buf` and callers rebind their references to them.

use std::fmt::{self, Display};

use smallvec::smallvec;

use crate::{
    backend::{BackendBuilder, BinaryOpType, CompareDirection},
    graph::Value,
    node::Node,
    ops::{broadcast_to, Handles, OutputShapes},
    shape_err, ElementType, Result, Scalar, Shape,
};

pub(crate) const OP: &str = "sgd_optimizer_step";
pub(crate) const NUM_OPERANDS: usize = 9;

const FOUND_INF: usize = 0;
const STEP: usize = 1;
const PARAM: usize = 2;
const BUF: usize = 3;
const D_P: usize = 4;
const WEIGHT_DECAY: usize = 5;
const MOMENTUM: usize = 6;
const LR: usize = 7;
const DAMPENING: usize = 8;

const SLOT_NAMES: [&str; NUM_OPERANDS] = [
    "found_inf",
    "step",
    "param",
    "buf",
    "d_p",
    "weight_decay",
    "momentum",
    "lr",
    "dampening",
];

/// Which optional parts of the update are active. Inactive operands stay in
/// the node but are never read by lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SgdFlags {
    pub use_weight_decay: bool,
    pub use_momentum: bool,
    pub use_nesterov: bool,
}

impl Display for SgdFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "use_weight_decay={}, use_momentum={}, use_nesterov={}",
            self.use_weight_decay, self.use_momentum, self.use_nesterov
        )
    }
}

/// The nine operands of an SGD step, in operand order.
#[derive(Debug, Clone, Copy)]
pub struct SgdOperands<'a> {
    pub found_inf: &'a Value,
    pub step: &'a Value,
    pub param: &'a Value,
    pub buf: &'a Value,
    pub d_p: &'a Value,
    pub weight_decay: &'a Value,
    pub momentum: &'a Value,
    pub lr: &'a Value,
    pub dampening: &'a Value,
}

impl SgdOperands<'_> {
    pub fn to_vec(&self) -> Vec<Value> {
        [
            self.found_inf,
            self.step,
            self.param,
            self.buf,
            self.d_p,
            self.weight_decay,
            self.momentum,
            self.lr,
            self.dampening,
        ]
        .into_iter()
        .cloned()
        .collect()
    }
}

pub(crate) fn infer_shapes(flags: &SgdFlags, operands: &[&Shape]) -> Result<OutputShapes> {
    if flags.use_nesterov && !flags.use_momentum {
        shape_err!(OP, "nesterov requires momentum");
    }
    let param = operands[PARAM];
    let step = operands[STEP];
    for slot in [BUF, D_P] {
        if operands[slot] != param {
            shape_err!(
                OP,
                "{} {} must match param {param}",
                SLOT_NAMES[slot],
                operands[slot]
            );
        }
    }
    for slot in [WEIGHT_DECAY, MOMENTUM, LR, DAMPENING] {
        let shape = operands[slot];
        if shape.element_type() != param.element_type() {
            shape_err!(
                OP,
                "{} {shape} must have the element type of param {param}",
                SLOT_NAMES[slot]
            );
        }
        if !shape.broadcasts_to(param) {
            shape_err!(OP, "{} {shape} does not broadcast to param {param}", SLOT_NAMES[slot]);
        }
    }
    if !step.broadcasts_to(param) {
        shape_err!(OP, "step {step} does not broadcast to param {param}");
    }
    let found_inf = operands[FOUND_INF];
    if !found_inf.broadcasts_to(param) || !found_inf.broadcasts_to(step) {
        shape_err!(OP, "found_inf {found_inf} does not broadcast to step and param");
    }
    Ok(smallvec![step.clone(), param.clone(), param.clone()])
}

pub(crate) fn lower<B: BackendBuilder>(
    flags: &SgdFlags,
    node: &Node,
    operands: &[B::Handle],
    builder: &mut B,
) -> Result<Handles<B::Handle>> {
    use BinaryOpType::{Add, Mul, Sub};

    let shapes = node.operand_shapes();
    let param_shape = shapes[PARAM];
    let step_shape = shapes[STEP];
    let (step, param, buf) = (&operands[STEP], &operands[PARAM], &operands[BUF]);

    let one = builder.constant(Scalar::one(step_shape.element_type()), step_shape)?;
    let new_step = builder.binary(Add, step, &one)?;

    let mut d_p = operands[D_P].clone();
    if flags.use_weight_decay {
        let weight_decay =
            broadcast_to(builder, &operands[WEIGHT_DECAY], shapes[WEIGHT_DECAY], param_shape)?;
        let decay = builder.binary(Mul, param, &weight_decay)?;
        d_p = builder.binary(Add, &d_p, &decay)?;
    }

    let mut new_buf = None;
    if flags.use_momentum {
        let momentum = broadcast_to(builder, &operands[MOMENTUM], shapes[MOMENTUM], param_shape)?;
        let dampening =
            broadcast_to(builder, &operands[DAMPENING], shapes[DAMPENING], param_shape)?;
        let one = builder.constant(Scalar::one(param_shape.element_type()), param_shape)?;
        let keep = builder.binary(Sub, &one, &dampening)?;
        let decayed = builder.binary(Mul, buf, &momentum)?;
        let fresh = builder.binary(Mul, &d_p, &keep)?;
        let blended = builder.binary(Add, &decayed, &fresh)?;

        // The buffer starts out as the first gradient.
        let zero = builder.constant(Scalar::zero(step_shape.element_type()), step_shape)?;
        let first = builder.compare(CompareDirection::Eq, step, &zero)?;
        let first = broadcast_to(
            builder,
            &first,
            &step_shape.with_element_type(ElementType::Bool),
            param_shape,
        )?;
        let buf_update = builder.select(&first, &d_p, &blended)?;

        d_p = if flags.use_nesterov {
            let lookahead = builder.binary(Mul, &buf_update, &momentum)?;
            builder.binary(Add, &d_p, &lookahead)?
        } else {
            buf_update.clone()
        };
        new_buf = Some(buf_update);
    }

    let lr = broadcast_to(builder, &operands[LR], shapes[LR], param_shape)?;
    let update = builder.binary(Mul, &d_p, &lr)?;
    let new_param = builder.binary(Sub, param, &update)?;

    // A step with non-finite gradients leaves all state untouched.
    let found_inf_shape = shapes[FOUND_INF];
    let zero = builder.constant(
        Scalar::zero(found_inf_shape.element_type()),
        found_inf_shape,
    )?;
    let skip = builder.compare(CompareDirection::Ne, &operands[FOUND_INF], &zero)?;
    let skip_shape = found_inf_shape.with_element_type(ElementType::Bool);
    let skip_step = broadcast_to(builder, &skip, &skip_shape, step_shape)?;
    let skip_param = broadcast_to(builder, &skip, &skip_shape, param_shape)?;

    let out_step = builder.select(&skip_step, step, &new_step)?;
    let out_param = builder.select(&skip_param, param, &new_param)?;
    let out_buf = match new_buf {
        Some(new_buf) => builder.select(&skip_param, buf, &new_buf)?,
        None => buf.clone(),
    };
    Ok(smallvec![out_step, out_param, out_buf])
}
