use lowir_core::{lower, ElementType, Graph, RecordingBuilder, Scalar, Shape, TargetOp};

#[test]
fn square_matrix() {
    let mut graph = Graph::empty();
    let a = graph
        .parameter("a", Shape::from_dims(ElementType::F32, &[5, 5]))
        .unwrap();
    let (values, vectors) = graph.symeig(&a, true, false).unwrap();
    assert_eq!(values.shape(), &Shape::from_dims(ElementType::F32, &[5]));
    assert_eq!(vectors.shape(), &Shape::from_dims(ElementType::F32, &[5, 5]));
    assert_eq!(values.node(), vectors.node());
}

#[test]
fn batched() {
    let mut graph = Graph::empty();
    let a = graph
        .parameter("a", Shape::from_dims(ElementType::F64, &[7, 3, 3]))
        .unwrap();
    let (values, _) = graph.symeig(&a, false, true).unwrap();
    assert_eq!(values.shape(), &Shape::from_dims(ElementType::F64, &[7, 3]));
}

#[test]
fn rejects_non_square_and_non_float() {
    let mut graph = Graph::empty();
    let rect = graph
        .parameter("rect", Shape::from_dims(ElementType::F32, &[3, 4]))
        .unwrap();
    assert!(graph.symeig(&rect, true, false).unwrap_err().is_shape());

    let vector = graph
        .parameter("v", Shape::from_dims(ElementType::F32, &[4]))
        .unwrap();
    assert!(graph.symeig(&vector, true, false).unwrap_err().is_shape());

    let ints = graph
        .parameter("i", Shape::from_dims(ElementType::I32, &[4, 4]))
        .unwrap();
    assert!(graph.symeig(&ints, true, false).unwrap_err().is_shape());
}

#[test]
fn lowers_to_self_adjoint_eig() {
    let mut graph = Graph::empty();
    let a = graph
        .parameter("a", Shape::from_dims(ElementType::F32, &[4, 4]))
        .unwrap();
    let (values, vectors) = graph.symeig(&a, true, true).unwrap();
    let lowered = lower(&graph, RecordingBuilder::new(), &[values, vectors]).unwrap();
    let builder = &lowered.builder;

    assert_eq!(builder.count("self_adjoint_eig"), 1);
    let eig = builder
        .instructions()
        .iter()
        .find(|inst| matches!(inst.op, TargetOp::SelfAdjointEig { .. }))
        .unwrap();
    assert_eq!(eig.op, TargetOp::SelfAdjointEig { lower: true });

    let values = builder.instruction(lowered.outputs[0]).unwrap();
    let vectors = builder.instruction(lowered.outputs[1]).unwrap();
    assert_eq!(values.op, TargetOp::GetTupleElement(1));
    assert_eq!(vectors.op, TargetOp::GetTupleElement(0));
}

#[test]
fn vectors_are_zero_when_not_requested() {
    let mut graph = Graph::empty();
    let a = graph
        .parameter("a", Shape::from_dims(ElementType::F32, &[4, 4]))
        .unwrap();
    let (_, vectors) = graph.symeig(&a, false, false).unwrap();
    let lowered = lower(&graph, RecordingBuilder::new(), &[vectors]).unwrap();
    let inst = lowered
        .builder
        .instruction(lowered.outputs[0])
        .unwrap();
    assert_eq!(inst.op, TargetOp::Constant(Scalar::zero(ElementType::F32)));
    assert_eq!(inst.shape, Some(Shape::from_dims(ElementType::F32, &[4, 4])));
}

#[test]
fn eigenvector_flag_changes_identity() {
    let mut graph = Graph::empty();
    let a = graph
        .parameter("a", Shape::from_dims(ElementType::F32, &[4, 4]))
        .unwrap();
    let (with, _) = graph.symeig(&a, true, false).unwrap();
    let (without, _) = graph.symeig(&a, false, false).unwrap();
    let (with_again, _) = graph.symeig(&a, true, false).unwrap();
    assert_ne!(with.node(), without.node());
    assert_eq!(with.node(), with_again.node());
    let hash = |v: &lowir_core::Value| graph.node(v.node()).unwrap().hash();
    assert_ne!(hash(&with), hash(&without));
}
