use std::{
    env,
    fmt::{self, Display},
    fs,
    hash::Hasher,
    path::Path,
    process::Command,
};

use log::debug;
use petgraph::{
    algo::toposort,
    dot::{Config, Dot},
    graph::NodeIndex,
    graphmap::DiGraphMap,
    Graph as PetGraph,
};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{
    backend::BinaryOpType,
    config::GraphConfig,
    hash::{HashValue, StructuralHasher},
    node::Node,
    ops::{ConstantOp, ConvParams, OpKind, ParameterOp, SgdFlags, SgdOperands, SymEigParams},
    Error, Result, Scalar, Shape,
};

/// Index of a node in its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// The `index`-th output of a node, together with its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    node: NodeId,
    index: usize,
    shape: Shape,
}

impl Value {
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn hash_identity(&self, hasher: &mut StructuralHasher) {
        hasher.write_usize(self.node.0);
        hasher.write_usize(self.index);
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}.{}", self.node, self.index)
        }
    }
}

/// The three results of an SGD step.
#[derive(Debug, Clone)]
pub struct SgdOutputs {
    pub step: Value,
    pub param: Value,
    pub buf: Value,
}

/// Arena of IR nodes.
///
/// Operands always refer to nodes inserted earlier, so the arena order is a
/// valid dependency order. With CSE enabled (the default), inserting a node
/// structurally equal to an existing one returns the existing id.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    dedup: FxHashMap<HashValue, SmallVec<[NodeId; 1]>>,
    num_parameters: usize,
    config: GraphConfig,
}

impl Graph {
    /// Create an empty Graph
    pub fn empty() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::new(),
            dedup: FxHashMap::default(),
            num_parameters: 0,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(Error::UnknownNode { node: id })
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// A reference to output `index` of node `id`.
    pub fn value(&self, id: NodeId, index: usize) -> Result<Value> {
        let node = self.node(id)?;
        if index >= node.num_outputs() {
            return Err(Error::InvalidOutput {
                node: id,
                index,
                num_outputs: node.num_outputs(),
            });
        }
        Ok(Value {
            node: id,
            index,
            shape: node.shape(index).clone(),
        })
    }

    /// References to every output of node `id`.
    pub fn outputs(&self, id: NodeId) -> Result<Vec<Value>> {
        let n = self.node(id)?.num_outputs();
        (0..n).map(|i| self.value(id, i)).collect()
    }

    /// Add a constructed node. Its operands must come from this graph.
    pub fn insert(&mut self, node: Node) -> Result<NodeId> {
        for operand in node.operands() {
            let expected = self.value(operand.node, operand.index)?;
            if expected.shape != operand.shape {
                crate::bail!(
                    "operand {operand} has shape {} but the graph records {}",
                    operand.shape,
                    expected.shape
                );
            }
        }

        if self.config.cse {
            if let Some(candidates) = self.dedup.get(&node.hash()) {
                for &id in candidates {
                    if self.nodes[id.0] == node {
                        debug!("cse: {} folded into {id}", node.kind().name());
                        return Ok(id);
                    }
                }
            }
        }

        let id = NodeId(self.nodes.len());
        debug!("insert {id} = {node}");
        self.dedup.entry(node.hash()).or_default().push(id);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn add(&mut self, kind: OpKind, operands: Vec<Value>) -> Result<NodeId> {
        let node = Node::new(kind, operands)?;
        self.insert(node)
    }

    /// Build a batch of nodes whose operands are all already in the graph.
    /// Shape inference and hashing run in parallel, insertion is sequential
    /// and keeps the batch order.
    pub fn insert_batch(&mut self, batch: Vec<(OpKind, Vec<Value>)>) -> Result<Vec<NodeId>> {
        let nodes = batch
            .into_par_iter()
            .map(|(kind, operands)| Node::new(kind, operands))
            .collect::<Result<Vec<_>>>()?;
        nodes.into_iter().map(|node| self.insert(node)).collect()
    }

    fn add_single(&mut self, kind: OpKind, operands: Vec<Value>) -> Result<Value> {
        let id = self.add(kind, operands)?;
        self.value(id, 0)
    }

    /// A new graph input. Parameters are numbered in creation order.
    pub fn parameter(&mut self, name: impl Into<String>, shape: Shape) -> Result<Value> {
        let index = self.num_parameters;
        let value = self.add_single(
            OpKind::Parameter(ParameterOp {
                index,
                name: name.into(),
                shape,
            }),
            vec![],
        )?;
        self.num_parameters += 1;
        Ok(value)
    }

    pub fn num_parameters(&self) -> usize {
        self.num_parameters
    }

    pub fn constant(&mut self, value: impl Into<Scalar>, shape: Shape) -> Result<Value> {
        self.add_single(
            OpKind::Constant(ConstantOp {
                value: value.into(),
                shape,
            }),
            vec![],
        )
    }

    pub fn binary(&mut self, op: BinaryOpType, lhs: &Value, rhs: &Value) -> Result<Value> {
        self.add_single(OpKind::Binary(op), vec![lhs.clone(), rhs.clone()])
    }

    pub fn convolution(
        &mut self,
        input: &Value,
        weight: &Value,
        bias: Option<&Value>,
        params: ConvParams,
    ) -> Result<Value> {
        let mut operands = vec![input.clone(), weight.clone()];
        operands.extend(bias.cloned());
        self.add_single(OpKind::Convolution(params), operands)
    }

    pub fn masked_select(&mut self, input: &Value, mask: &Value) -> Result<Value> {
        self.add_single(OpKind::MaskedSelect, vec![input.clone(), mask.clone()])
    }

    pub fn sgd_optimizer_step(
        &mut self,
        operands: SgdOperands<'_>,
        flags: SgdFlags,
    ) -> Result<SgdOutputs> {
        let id = self.add(OpKind::SgdOptimizerStep(flags), operands.to_vec())?;
        Ok(SgdOutputs {
            step: self.value(id, 0)?,
            param: self.value(id, 1)?,
            buf: self.value(id, 2)?,
        })
    }

    /// Returns `(eigenvalues, eigenvectors)`.
    pub fn symeig(
        &mut self,
        input: &Value,
        eigenvectors: bool,
        lower: bool,
    ) -> Result<(Value, Value)> {
        let id = self.add(
            OpKind::SymEig(SymEigParams {
                eigenvectors,
                lower,
            }),
            vec![input.clone()],
        )?;
        Ok((self.value(id, 0)?, self.value(id, 1)?))
    }

    /// Nodes ordered so that every node comes after its operands.
    pub fn topological_order(&self) -> Result<Vec<NodeId>> {
        let mut deps = DiGraphMap::<usize, ()>::new();
        for idx in 0..self.nodes.len() {
            deps.add_node(idx);
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            for operand in node.operands() {
                deps.add_edge(operand.node.0, idx, ());
            }
        }
        let order = toposort(&deps, None)
            .map_err(|cycle| Error::msg(format!("cycle through {}", NodeId(cycle.node_id()))))?;
        Ok(order.into_iter().map(NodeId).collect())
    }

    pub fn to_petgraph(&self) -> PetGraph<String, usize> {
        let mut g = PetGraph::<String, usize>::new();
        let idx_map: Vec<NodeIndex> = self
            .nodes()
            .map(|(id, node)| g.add_node(format!("{id} = {node}")))
            .collect();
        for (dst, node) in self.nodes.iter().enumerate() {
            for (slot, operand) in node.operands().iter().enumerate() {
                g.add_edge(idx_map[operand.node.0], idx_map[dst], slot);
            }
        }
        g
    }

    /// Produce a DOT format string of this graph.
    pub fn to_dot(&self) -> String {
        let g = self.to_petgraph();
        format!("{:?}", Dot::with_config(&g, &[Config::EdgeNoLabel]))
    }

    /// Visualize the graph by saving it to this file.
    ///
    /// Install graphvis:
    /// - brew install graphviz
    /// - apt install graphviz
    pub fn visualize<P: AsRef<Path>>(&self, filename: P) -> Result<()> {
        let path = filename.as_ref();
        let dot_path = env::temp_dir().join("lowir_graph.dot");

        fs::write(&dot_path, self.to_dot())?;
        let status = Command::new("dot")
            .args([
                "-Tpng",
                &dot_path.display().to_string(),
                "-o",
                &path.display().to_string(),
            ])
            .status()?;
        if !status.success() {
            crate::bail!("graphviz exited with {status}");
        }

        Ok(())
    }
}

impl Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, node) in self.nodes() {
            writeln!(f, "{id} = {node}")?;
        }
        Ok(())
    }
}
