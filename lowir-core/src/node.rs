use std::fmt::{self, Display};
use std::hash::Hash;

use crate::{
    backend::BackendBuilder,
    graph::Value,
    hash::HashValue,
    lowering::LoweringContext,
    ops::{Handles, OpKind, OutputShapes},
    Error, Result, Shape,
};

/// An immutable IR vertex: one deferred tensor operation.
///
/// Output shapes and the structural hash are fixed when the node is built; a
/// node that fails validation is never created.
#[derive(Debug, Clone)]
pub struct Node {
    kind: OpKind,
    operands: Vec<Value>,
    shapes: OutputShapes,
    hash: HashValue,
}

impl Node {
    pub fn new(kind: OpKind, operands: Vec<Value>) -> Result<Self> {
        let arity = kind.arity();
        if !arity.accepts(operands.len()) {
            return Err(Error::Arity {
                op: kind.name(),
                expected: arity.to_string(),
                got: operands.len(),
            });
        }
        let operand_shapes = operands.iter().map(Value::shape).collect::<Vec<_>>();
        let shapes = kind.infer_shapes(&operand_shapes)?;
        if shapes.len() != kind.num_outputs() {
            crate::bail!(
                "{} inferred {} output shapes but declares {} outputs",
                kind.name(),
                shapes.len(),
                kind.num_outputs()
            );
        }
        let hash = structural_hash(&kind, &operands);
        Ok(Self {
            kind,
            operands,
            shapes,
            hash,
        })
    }

    /// Same kind and parameters over `operands`. Shape inference runs again
    /// so shapes follow the new operands.
    pub fn clone_with(&self, operands: Vec<Value>) -> Result<Self> {
        if operands.len() != self.operands.len() {
            return Err(Error::Arity {
                op: self.kind.name(),
                expected: self.operands.len().to_string(),
                got: operands.len(),
            });
        }
        Self::new(self.kind.clone(), operands)
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn operands(&self) -> &[Value] {
        &self.operands
    }

    pub fn operand(&self, i: usize) -> &Value {
        &self.operands[i]
    }

    pub fn operand_shapes(&self) -> Vec<&Shape> {
        self.operands.iter().map(Value::shape).collect()
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shape(&self, i: usize) -> &Shape {
        &self.shapes[i]
    }

    pub fn num_outputs(&self) -> usize {
        self.shapes.len()
    }

    pub fn hash(&self) -> HashValue {
        self.hash
    }

    /// Emit this node's target operations. Every operand must already be
    /// resolved in `ctx`; nothing is emitted otherwise.
    pub fn lower<B: BackendBuilder>(
        &self,
        ctx: &mut LoweringContext<'_, B>,
    ) -> Result<Handles<B::Handle>> {
        let operands = self
            .operands
            .iter()
            .map(|v| ctx.resolve(v))
            .collect::<Result<Vec<_>>>()?;
        self.kind.lower(self, &operands, ctx.builder_mut())
    }
}

/// Kind salt first, then operand identities in order, then parameters.
fn structural_hash(kind: &OpKind, operands: &[Value]) -> HashValue {
    let mut hasher = kind.salted_hasher();
    hasher.update(&operands.len());
    for operand in operands {
        operand.hash_identity(&mut hasher);
    }
    kind.hash(&mut hasher);
    hasher.finish_value()
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.kind == other.kind && self.operands == other.operands
    }
}

impl Eq for Node {}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shapes.as_slice() {
            [single] => write!(f, "{single} ")?,
            many => {
                write!(f, "(")?;
                for (i, s) in many.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, ") ")?;
            }
        }
        write!(f, "{}(", self.kind.name())?;
        for (i, v) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")?;
        self.kind.fmt_params(f)
    }
}
