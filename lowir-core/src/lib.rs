//! Lowir is a deferred tensor IR: operations are recorded as immutable nodes
//! with statically inferred shapes, deduplicated by a structural hash, and
//! later lowered into the operation graph of a native target compiler.
//!
//! Nothing is computed when a node is built. Building only checks that the
//! operands fit together and fixes the output shapes, so a malformed program
//! is rejected before any target code exists.
//!
//! ## A quick guide
//! - Create a [`Graph`]. It owns the nodes and folds repeated subexpressions.
//! - Add inputs with [`Graph::parameter`] and operations with the
//!   convenience constructors ([`Graph::convolution`],
//!   [`Graph::masked_select`], [`Graph::sgd_optimizer_step`],
//!   [`Graph::symeig`], ...). Each returns a [`Value`] carrying its shape.
//! - Lower the outputs through any [`BackendBuilder`] with [`lower`] or a
//!   [`LoweringContext`]. [`RecordingBuilder`] records the emitted target
//!   operations instead of compiling them.
//!
//! ## What can you do with it?
//! ```
//! use lowir_core::{ConvParams, ElementType, Graph, RecordingBuilder, Shape};
//!
//! let mut graph = Graph::empty();
//! let x = graph.parameter("x", Shape::from_dims(ElementType::F32, &[1, 3, 8, 8])).unwrap();
//! let w = graph.parameter("w", Shape::from_dims(ElementType::F32, &[4, 3, 3, 3])).unwrap();
//! let y = graph
//!     .convolution(&x, &w, None, ConvParams::new(2).with_padding(vec![1, 1]))
//!     .unwrap();
//! assert_eq!(y.shape().to_string(), "f32[1,4,8,8]");
//!
//! let lowered = lowir_core::lower(&graph, RecordingBuilder::new(), &[y]).unwrap();
//! assert_eq!(lowered.builder.count("convolution"), 1);
//! ```

mod backend;
mod config;
mod dtype;
mod error;
mod graph;
mod hash;
mod lowering;
mod node;
pub mod ops;
mod recording;
mod shape;

pub use backend::{BackendBuilder, BinaryOpType, CompareDirection, ConvDimensions};
pub use config::{GraphConfig, DISABLE_CSE_ENV};
pub use dtype::{ElementType, Scalar};
pub use error::{Context, Error, Result};
pub use graph::{Graph, NodeId, SgdOutputs, Value};
pub use hash::{HashValue, StructuralHasher};
pub use lowering::{lower, LowerState, Lowered, LoweringContext};
pub use node::Node;
pub use ops::{ConstantOp, ConvParams, OpKind, ParameterOp, SgdFlags, SgdOperands, SymEigParams};
pub use recording::{Instruction, OpHandle, RecordingBuilder, TargetOp};
pub use shape::{ConstShape, Dim, Dims, Shape, R1, R2, R3, R4, R5, R6};
