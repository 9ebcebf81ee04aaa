use std::fmt::{self, Display};

use smallvec::SmallVec;

use crate::{
    backend::{BackendBuilder, BinaryOpType, CompareDirection, ConvDimensions},
    Result, Scalar, Shape,
};

/// Index of an instruction in a [`RecordingBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpHandle(pub usize);

impl Display for OpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetOp {
    Parameter { index: usize, name: String },
    Constant(Scalar),
    Binary(BinaryOpType),
    Compare(CompareDirection),
    Select,
    BroadcastInDim { dims: Vec<usize> },
    Reshape,
    Transpose { permutation: Vec<usize> },
    Reverse { dims: Vec<usize> },
    Convolution(ConvDimensions),
    Nonzero { bound: usize },
    Gather,
    SelfAdjointEig { lower: bool },
    GetTupleElement(usize),
}

impl TargetOp {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Parameter { .. } => "parameter",
            Self::Constant(_) => "constant",
            Self::Binary(op) => op.as_str(),
            Self::Compare(_) => "compare",
            Self::Select => "select",
            Self::BroadcastInDim { .. } => "broadcast_in_dim",
            Self::Reshape => "reshape",
            Self::Transpose { .. } => "transpose",
            Self::Reverse { .. } => "reverse",
            Self::Convolution(_) => "convolution",
            Self::Nonzero { .. } => "nonzero",
            Self::Gather => "gather",
            Self::SelfAdjointEig { .. } => "self_adjoint_eig",
            Self::GetTupleElement(_) => "get_tuple_element",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: TargetOp,
    pub operands: SmallVec<[OpHandle; 3]>,
    /// Result shape, when the builder call states it.
    pub shape: Option<Shape>,
}

/// A [`BackendBuilder`] that only records the operations it is asked to
/// emit. Used to inspect and test lowering without a native compiler.
#[derive(Debug, Clone, Default)]
pub struct RecordingBuilder {
    instructions: Vec<Instruction>,
}

impl RecordingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instruction(&self, handle: OpHandle) -> Option<&Instruction> {
        self.instructions.get(handle.0)
    }

    /// Instructions reading `handle`.
    pub fn users(&self, handle: OpHandle) -> Vec<OpHandle> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, inst)| inst.operands.contains(&handle))
            .map(|(i, _)| OpHandle(i))
            .collect()
    }

    /// Number of recorded instructions with the given op name.
    pub fn count(&self, name: &str) -> usize {
        self.instructions
            .iter()
            .filter(|inst| inst.op.name() == name)
            .count()
    }

    fn emit(
        &mut self,
        op: TargetOp,
        operands: &[&OpHandle],
        shape: Option<&Shape>,
    ) -> Result<OpHandle> {
        for operand in operands {
            if operand.0 >= self.instructions.len() {
                crate::bail!("{} refers to unknown handle {operand}", op.name());
            }
        }
        let handle = OpHandle(self.instructions.len());
        self.instructions.push(Instruction {
            op,
            operands: operands.iter().map(|h| **h).collect(),
            shape: shape.cloned(),
        });
        Ok(handle)
    }
}

impl BackendBuilder for RecordingBuilder {
    type Handle = OpHandle;

    fn parameter(&mut self, index: usize, name: &str, shape: &Shape) -> Result<OpHandle> {
        let op = TargetOp::Parameter {
            index,
            name: name.to_string(),
        };
        self.emit(op, &[], Some(shape))
    }

    fn constant(&mut self, value: Scalar, shape: &Shape) -> Result<OpHandle> {
        self.emit(TargetOp::Constant(value), &[], Some(shape))
    }

    fn binary(&mut self, op: BinaryOpType, lhs: &OpHandle, rhs: &OpHandle) -> Result<OpHandle> {
        self.emit(TargetOp::Binary(op), &[lhs, rhs], None)
    }

    fn compare(
        &mut self,
        direction: CompareDirection,
        lhs: &OpHandle,
        rhs: &OpHandle,
    ) -> Result<OpHandle> {
        self.emit(TargetOp::Compare(direction), &[lhs, rhs], None)
    }

    fn select(
        &mut self,
        pred: &OpHandle,
        on_true: &OpHandle,
        on_false: &OpHandle,
    ) -> Result<OpHandle> {
        self.emit(TargetOp::Select, &[pred, on_true, on_false], None)
    }

    fn broadcast_in_dim(
        &mut self,
        operand: &OpHandle,
        shape: &Shape,
        broadcast_dims: &[usize],
    ) -> Result<OpHandle> {
        let op = TargetOp::BroadcastInDim {
            dims: broadcast_dims.to_vec(),
        };
        self.emit(op, &[operand], Some(shape))
    }

    fn reshape(&mut self, operand: &OpHandle, shape: &Shape) -> Result<OpHandle> {
        self.emit(TargetOp::Reshape, &[operand], Some(shape))
    }

    fn transpose(&mut self, operand: &OpHandle, permutation: &[usize]) -> Result<OpHandle> {
        let op = TargetOp::Transpose {
            permutation: permutation.to_vec(),
        };
        self.emit(op, &[operand], None)
    }

    fn reverse(&mut self, operand: &OpHandle, dims: &[usize]) -> Result<OpHandle> {
        let op = TargetOp::Reverse {
            dims: dims.to_vec(),
        };
        self.emit(op, &[operand], None)
    }

    fn convolution(
        &mut self,
        input: &OpHandle,
        kernel: &OpHandle,
        dims: &ConvDimensions,
    ) -> Result<OpHandle> {
        self.emit(TargetOp::Convolution(dims.clone()), &[input, kernel], None)
    }

    fn nonzero(&mut self, mask: &OpHandle, bound: usize) -> Result<OpHandle> {
        self.emit(TargetOp::Nonzero { bound }, &[mask], None)
    }

    fn gather(&mut self, operand: &OpHandle, indices: &OpHandle) -> Result<OpHandle> {
        self.emit(TargetOp::Gather, &[operand, indices], None)
    }

    fn self_adjoint_eig(
        &mut self,
        operand: &OpHandle,
        lower: bool,
    ) -> Result<(OpHandle, OpHandle)> {
        let eig = self.emit(TargetOp::SelfAdjointEig { lower }, &[operand], None)?;
        let vectors = self.emit(TargetOp::GetTupleElement(0), &[&eig], None)?;
        let values = self.emit(TargetOp::GetTupleElement(1), &[&eig], None)?;
        Ok((vectors, values))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.op.name())?;
        for (i, h) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{h}")?;
        }
        write!(f, ")")?;
        match &self.op {
            TargetOp::Parameter { index, name } => write!(f, ", index={index}, name={name}")?,
            TargetOp::Constant(value) => write!(f, ", value={value}")?,
            TargetOp::Compare(dir) => write!(f, ", direction={}", dir.as_str())?,
            TargetOp::BroadcastInDim { dims } => write!(f, ", dims={dims:?}")?,
            TargetOp::Transpose { permutation } => write!(f, ", permutation={permutation:?}")?,
            TargetOp::Reverse { dims } => write!(f, ", dims={dims:?}")?,
            TargetOp::Convolution(dims) => write!(
                f,
                ", strides={:?}, padding={:?}, lhs_dilation={:?}, rhs_dilation={:?}, groups={}",
                dims.window_strides,
                dims.padding,
                dims.lhs_dilation,
                dims.rhs_dilation,
                dims.feature_group_count
            )?,
            TargetOp::Nonzero { bound } => write!(f, ", bound={bound}")?,
            TargetOp::SelfAdjointEig { lower } => write!(f, ", lower={lower}")?,
            TargetOp::GetTupleElement(i) => write!(f, ", index={i}")?,
            TargetOp::Binary(_) | TargetOp::Select | TargetOp::Reshape | TargetOp::Gather => {}
        }
        if let Some(shape) = &self.shape {
            write!(f, " -> {shape}")?;
        }
        Ok(())
    }
}

impl Display for RecordingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "{} = {inst}", OpHandle(i))?;
        }
        Ok(())
    }
}
