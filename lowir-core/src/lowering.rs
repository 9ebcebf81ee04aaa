//! Per-compilation lowering of a [`Graph`] through a [`BackendBuilder`].
//!
//! Every node moves through `Unresolved -> Lowering -> Resolved` exactly once.
//! Operands are resolved to target handles before anything is emitted for a
//! node, so asking for an operand that is not yet resolved fails with
//! [`Error::Ordering`] and leaves the recorded handles untouched.

use log::{debug, trace};

use crate::{
    backend::BackendBuilder,
    graph::{Graph, NodeId, Value},
    ops::Handles,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowerState {
    Unresolved,
    Lowering,
    Resolved,
}

impl LowerState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Lowering => "lowering",
            Self::Resolved => "resolved",
        }
    }
}

/// Mapping from `(node, output index)` to target handles, filled in
/// dependency order by a single writer.
pub struct LoweringContext<'g, B: BackendBuilder> {
    graph: &'g Graph,
    builder: B,
    states: Vec<LowerState>,
    handles: Vec<Handles<B::Handle>>,
    resolved: usize,
}

/// Result of a compilation: the builder holding the emitted program and the
/// handles of the requested graph outputs.
#[derive(Debug)]
pub struct Lowered<B: BackendBuilder> {
    pub builder: B,
    pub outputs: Vec<B::Handle>,
}

impl<'g, B: BackendBuilder> LoweringContext<'g, B> {
    pub fn new(graph: &'g Graph, builder: B) -> Self {
        let n = graph.len();
        Self {
            graph,
            builder,
            states: vec![LowerState::Unresolved; n],
            handles: (0..n).map(|_| Handles::new()).collect(),
            resolved: 0,
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut B {
        &mut self.builder
    }

    pub fn state(&self, id: NodeId) -> Result<LowerState> {
        self.states
            .get(id.0)
            .copied()
            .ok_or(Error::UnknownNode { node: id })
    }

    /// Number of nodes in the `Resolved` state.
    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    /// Target handle of an already lowered value.
    pub fn resolve(&self, value: &Value) -> Result<B::Handle> {
        let id = value.node();
        match self.state(id)? {
            LowerState::Resolved => {}
            state => {
                return Err(Error::Ordering {
                    node: id,
                    state: state.as_str(),
                })
            }
        }
        let handles = &self.handles[id.0];
        let handle = handles
            .get(value.index())
            .cloned()
            .ok_or(Error::InvalidOutput {
                node: id,
                index: value.index(),
                num_outputs: handles.len(),
            })?;
        trace!("resolve {value} -> {handle:?}");
        Ok(handle)
    }

    /// Lower a single node whose operands are all resolved.
    pub fn lower_node(&mut self, id: NodeId) -> Result<&[B::Handle]> {
        let graph = self.graph;
        let node = graph.node(id)?;
        match self.state(id)? {
            LowerState::Unresolved => {}
            LowerState::Lowering => {
                return Err(Error::Ordering {
                    node: id,
                    state: LowerState::Lowering.as_str(),
                })
            }
            LowerState::Resolved => crate::bail!("{id} is already lowered"),
        }

        self.states[id.0] = LowerState::Lowering;
        debug!("lowering {id} = {node}");
        let lowered = node.lower(self).and_then(|handles| {
            if handles.len() != node.num_outputs() {
                crate::bail!(
                    "{} produced {} handles for {} outputs",
                    node.kind().name(),
                    handles.len(),
                    node.num_outputs()
                );
            }
            Ok(handles)
        });
        match lowered {
            Ok(handles) => {
                self.handles[id.0] = handles;
                self.states[id.0] = LowerState::Resolved;
                self.resolved += 1;
                Ok(&self.handles[id.0])
            }
            Err(err) => {
                self.states[id.0] = LowerState::Unresolved;
                Err(err)
            }
        }
    }

    /// Lower every node of the graph in topological order.
    pub fn lower_all(&mut self) -> Result<()> {
        for id in self.graph.topological_order()? {
            if self.state(id)? != LowerState::Resolved {
                self.lower_node(id)?;
            }
        }
        Ok(())
    }

    /// Lower the ancestors of `values` (and nothing else) and return the
    /// handles of the values themselves.
    pub fn lower_values(&mut self, values: &[Value]) -> Result<Vec<B::Handle>> {
        let graph = self.graph;
        let mut stack: Vec<(NodeId, bool)> =
            values.iter().rev().map(|v| (v.node(), false)).collect();
        while let Some((id, operands_done)) = stack.pop() {
            if self.state(id)? == LowerState::Resolved {
                continue;
            }
            if operands_done {
                self.lower_node(id)?;
                continue;
            }
            stack.push((id, true));
            for operand in graph.node(id)?.operands().iter().rev() {
                if self.state(operand.node())? != LowerState::Resolved {
                    stack.push((operand.node(), false));
                }
            }
        }
        values.iter().map(|v| self.resolve(v)).collect()
    }

    /// Lower whatever `outputs` still need and hand the builder over.
    pub fn finish(mut self, outputs: &[Value]) -> Result<Lowered<B>> {
        let outputs = self.lower_values(outputs)?;
        debug!(
            "lowered {} of {} nodes, {} outputs",
            self.resolved,
            self.graph.len(),
            outputs.len()
        );
        Ok(Lowered {
            builder: self.builder,
            outputs,
        })
    }
}

/// Lower the parts of `graph` needed for `outputs` into `builder`.
pub fn lower<B: BackendBuilder>(
    graph: &Graph,
    builder: B,
    outputs: &[Value],
) -> Result<Lowered<B>> {
    LoweringContext::new(graph, builder).finish(outputs)
}
