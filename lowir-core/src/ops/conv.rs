//! Convolution and transposed convolution over any number of spatial dims.
//!
//! Layouts follow the usual channels-first convention:
//! - input `[N, C_in, *spatial]`
//! - weight `[C_out, C_in / groups, *kernel]`, or `[C_in, C_out / groups, *kernel]`
//!   when transposed
//! - bias `[C_out]`

use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::{
    backend::{BackendBuilder, BinaryOpType, ConvDimensions},
    node::Node,
    shape_err, Result, Shape,
};

pub(crate) const OP: &str = "convolution_overrideable";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvParams {
    pub stride: Vec<usize>,
    pub padding: Vec<usize>,
    pub dilation: Vec<usize>,
    pub transposed: bool,
    /// Extra extent added to one side of a transposed convolution's output.
    /// Empty means zero for every spatial dim.
    pub output_padding: Vec<usize>,
    pub groups: usize,
}

impl ConvParams {
    /// Unit stride and dilation, no padding, one group.
    pub fn new(spatial: usize) -> Self {
        Self {
            stride: vec![1; spatial],
            padding: vec![0; spatial],
            dilation: vec![1; spatial],
            transposed: false,
            output_padding: Vec::new(),
            groups: 1,
        }
    }

    pub fn with_stride(mut self, stride: impl Into<Vec<usize>>) -> Self {
        self.stride = stride.into();
        self
    }

    pub fn with_padding(mut self, padding: impl Into<Vec<usize>>) -> Self {
        self.padding = padding.into();
        self
    }

    pub fn with_dilation(mut self, dilation: impl Into<Vec<usize>>) -> Self {
        self.dilation = dilation.into();
        self
    }

    pub fn with_groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    /// Make this a transposed convolution.
    pub fn transposed(mut self, output_padding: impl Into<Vec<usize>>) -> Self {
        self.transposed = true;
        self.output_padding = output_padding.into();
        self
    }

    fn output_padding_at(&self, i: usize) -> usize {
        self.output_padding.get(i).copied().unwrap_or(0)
    }

    fn validate(&self, spatial: usize) -> Result<()> {
        for (name, v) in [
            ("stride", &self.stride),
            ("padding", &self.padding),
            ("dilation", &self.dilation),
        ] {
            if v.len() != spatial {
                shape_err!(
                    OP,
                    "{name} has {} entries, expected one per spatial dim ({spatial})",
                    v.len()
                );
            }
        }
        if !self.output_padding.is_empty() && self.output_padding.len() != spatial {
            shape_err!(
                OP,
                "output_padding has {} entries, expected {spatial}",
                self.output_padding.len()
            );
        }
        if self.groups == 0 {
            shape_err!(OP, "groups must be positive");
        }
        if self.stride.contains(&0) || self.dilation.contains(&0) {
            shape_err!(
                OP,
                "stride {:?} and dilation {:?} must be positive",
                self.stride,
                self.dilation
            );
        }
        for i in 0..spatial {
            let op = self.output_padding_at(i);
            if !self.transposed && op != 0 {
                shape_err!(OP, "output_padding is only valid for transposed convolutions");
            }
            if self.transposed && op >= self.stride[i].max(self.dilation[i]) {
                shape_err!(
                    OP,
                    "output_padding {op} must be smaller than stride or dilation in dim {i}"
                );
            }
        }
        Ok(())
    }
}

// Written field by field: the derived impl feeds `Vec<usize>` to the hasher
// as raw native-endian bytes.
impl Hash for ConvParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for v in [&self.stride, &self.padding, &self.dilation, &self.output_padding] {
            state.write_u64(v.len() as u64);
            for &x in v.iter() {
                state.write_u64(x as u64);
            }
        }
        self.transposed.hash(state);
        state.write_u64(self.groups as u64);
    }
}

impl Display for ConvParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stride={:?}, padding={:?}, dilation={:?}, ",
            self.stride, self.padding, self.dilation
        )?;
        write!(
            f,
            "transposed={}, output_padding={:?}, groups={}",
            self.transposed, self.output_padding, self.groups
        )
    }
}

/// Output extent of spatial dim `i`, `None` when the arithmetic overflows.
fn spatial_extent(params: &ConvParams, i: usize, x: usize, k: usize) -> Option<i64> {
    let int = |v: usize| i64::try_from(v).ok();
    let (x, k) = (int(x)?, int(k)?);
    let s = int(params.stride[i])?;
    let two_p = int(params.padding[i])?.checked_mul(2)?;
    let reach = int(params.dilation[i])?.checked_mul(k - 1)?;
    if params.transposed {
        (x - 1)
            .checked_mul(s)?
            .checked_sub(two_p)?
            .checked_add(reach)?
            .checked_add(int(params.output_padding_at(i))?)?
            .checked_add(1)
    } else {
        let span = x.checked_add(two_p)?.checked_sub(reach)?.checked_sub(1)?;
        Some(if span < 0 { 0 } else { span / s + 1 })
    }
}

pub(crate) fn infer_shape(params: &ConvParams, operands: &[&Shape]) -> Result<Shape> {
    let (input, weight) = (operands[0], operands[1]);
    let ty = input.element_type();
    if weight.element_type() != ty {
        shape_err!(OP, "weight {weight} does not match input element type {ty}");
    }
    let in_dims = input.require_static(OP)?;
    let w_dims = weight.require_static(OP)?;
    if in_dims.len() < 3 {
        shape_err!(OP, "input {input} must be [N, C, *spatial] with at least one spatial dim");
    }
    if w_dims.len() != in_dims.len() {
        shape_err!(OP, "weight {weight} must have the same rank as input {input}");
    }
    let spatial = in_dims.len() - 2;
    params.validate(spatial)?;

    let groups = params.groups;
    let c_in = in_dims[1];
    let c_out = if params.transposed {
        if c_in % groups != 0 {
            shape_err!(OP, "input channels {c_in} are not divisible by groups {groups}");
        }
        if w_dims[0] != c_in {
            shape_err!(
                OP,
                "transposed weight {weight} expects {} input channels, input has {c_in}",
                w_dims[0]
            );
        }
        let Some(c_out) = w_dims[1].checked_mul(groups) else {
            shape_err!(OP, "transposed weight {weight} with {groups} groups overflows");
        };
        c_out
    } else {
        if w_dims[0] % groups != 0 {
            shape_err!(
                OP,
                "output channels {} are not divisible by groups {groups}",
                w_dims[0]
            );
        }
        if w_dims[1].checked_mul(groups) != Some(c_in) {
            shape_err!(
                OP,
                "weight {weight} with {groups} groups does not match {c_in} input channels"
            );
        }
        w_dims[0]
    };

    let mut out = vec![in_dims[0], c_out];
    for i in 0..spatial {
        if w_dims[i + 2] == 0 {
            shape_err!(OP, "kernel extent in spatial dim {i} is zero");
        }
        let Some(extent) = spatial_extent(params, i, in_dims[i + 2], w_dims[i + 2]) else {
            shape_err!(OP, "extent of spatial dim {i} of input {input} overflows");
        };
        if extent < 1 {
            shape_err!(
                OP,
                "spatial dim {i} of input {input} with kernel {weight} produces an empty output"
            );
        }
        let Ok(extent) = usize::try_from(extent) else {
            shape_err!(OP, "extent of spatial dim {i} of input {input} overflows");
        };
        out.push(extent);
    }

    if let Some(bias) = operands.get(2) {
        if bias.element_type() != ty {
            shape_err!(OP, "bias {bias} does not match input element type {ty}");
        }
        let b = bias.require_static(OP)?;
        if b.len() != 1 || (b[0] != c_out && b[0] != 1) {
            shape_err!(OP, "bias {bias} does not broadcast to {c_out} output channels");
        }
    }

    Ok(Shape::from_dims(ty, &out))
}

pub(crate) fn lower<B: BackendBuilder>(
    params: &ConvParams,
    node: &Node,
    operands: &[B::Handle],
    builder: &mut B,
) -> Result<B::Handle> {
    let weight_shape = node.operand(1).shape();
    let w_dims = weight_shape.require_static(OP)?;
    let spatial = w_dims.len() - 2;

    let (kernel, dims) = if params.transposed {
        // A transposed convolution is a regular one over the stride-dilated
        // input with a flipped kernel whose in/out channels are swapped.
        let kernel = swap_kernel_channels(builder, &operands[1], weight_shape, params.groups)?;
        let spatial_axes = (2..w_dims.len()).collect::<Vec<_>>();
        let kernel = builder.reverse(&kernel, &spatial_axes)?;
        let padding = (0..spatial)
            .map(|i| {
                let edge = (params.dilation[i] * (w_dims[i + 2] - 1)) as i64
                    - params.padding[i] as i64;
                (edge, edge + params.output_padding_at(i) as i64)
            })
            .collect();
        let dims = ConvDimensions {
            window_strides: vec![1; spatial],
            padding,
            lhs_dilation: params.stride.clone(),
            rhs_dilation: params.dilation.clone(),
            feature_group_count: params.groups,
        };
        (kernel, dims)
    } else {
        let dims = ConvDimensions {
            window_strides: params.stride.clone(),
            padding: params.padding.iter().map(|&p| (p as i64, p as i64)).collect(),
            lhs_dilation: vec![1; spatial],
            rhs_dilation: params.dilation.clone(),
            feature_group_count: params.groups,
        };
        (operands[1].clone(), dims)
    };

    let conv = builder.convolution(&operands[0], &kernel, &dims)?;
    match operands.get(2) {
        Some(bias) => {
            let bias = builder.broadcast_in_dim(bias, node.shape(0), &[1])?;
            builder.binary(BinaryOpType::Add, &conv, &bias)
        }
        None => Ok(conv),
    }
}

/// `[C_in, C_out/g, *k]` -> `[C_out, C_in/g, *k]`, keeping groups together.
fn swap_kernel_channels<B: BackendBuilder>(
    builder: &mut B,
    kernel: &B::Handle,
    shape: &Shape,
    groups: usize,
) -> Result<B::Handle> {
    let dims = shape.require_static(OP)?;
    let rank = dims.len();
    if groups == 1 {
        let mut perm = vec![1, 0];
        perm.extend(2..rank);
        return builder.transpose(kernel, &perm);
    }

    let (c_in, c_out_per_group) = (dims[0], dims[1]);
    let mut grouped = vec![groups, c_in / groups, c_out_per_group];
    grouped.extend_from_slice(&dims[2..]);
    let grouped = builder.reshape(kernel, &Shape::from_dims(shape.element_type(), &grouped))?;

    let mut perm = vec![0, 2, 1];
    perm.extend(3..rank + 1);
    let swapped = builder.transpose(&grouped, &perm)?;

    let mut merged = vec![groups * c_out_per_group, c_in / groups];
    merged.extend_from_slice(&dims[2..]);
    builder.reshape(&swapped, &Shape::from_dims(shape.element_type(), &merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records typed integer writes and counts raw byte writes.
    #[derive(Default)]
    struct TypedOnly {
        raw: usize,
        words: Vec<u64>,
    }

    impl Hasher for TypedOnly {
        fn finish(&self) -> u64 {
            0
        }

        fn write(&mut self, _: &[u8]) {
            self.raw += 1;
        }

        fn write_u8(&mut self, i: u8) {
            self.words.push(i.into());
        }

        fn write_u64(&mut self, i: u64) {
            self.words.push(i);
        }

        fn write_usize(&mut self, i: usize) {
            self.words.push(i as u64);
        }
    }

    #[test]
    fn params_hash_as_integers() {
        let params = ConvParams::new(2)
            .with_stride(vec![3, 5])
            .transposed(vec![1, 0])
            .with_groups(7);
        let mut state = TypedOnly::default();
        params.hash(&mut state);
        assert_eq!(state.raw, 0);
        assert_eq!(&state.words[..3], &[2, 3, 5]);
        assert_eq!(state.words.last(), Some(&7));
        assert_eq!(state.words.len(), 3 + 3 + 3 + 3 + 1 + 1);
    }
}
