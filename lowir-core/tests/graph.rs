use lowir_core::{
    BinaryOpType, ConvParams, Dim, ElementType, Error, Graph, GraphConfig, Node, OpKind, Shape,
    SymEigParams, Value,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn f32s(dims: &[usize]) -> Shape {
    Shape::from_dims(ElementType::F32, dims)
}

fn conv_graph() -> (Graph, Value, Value) {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[1, 3, 8, 8])).unwrap();
    let w = graph.parameter("w", f32s(&[4, 3, 3, 3])).unwrap();
    (graph, x, w)
}

#[test]
fn equal_structure_equal_hash() {
    let (graph, x, w) = conv_graph();
    let params = ConvParams::new(2).with_padding(vec![1, 1]);
    let a = Node::new(OpKind::Convolution(params.clone()), vec![x.clone(), w.clone()]).unwrap();
    let b = Node::new(OpKind::Convolution(params), vec![x.clone(), w.clone()]).unwrap();
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a, b);

    let strided = ConvParams::new(2).with_padding(vec![1, 1]).with_stride(vec![2, 2]);
    let c = Node::new(OpKind::Convolution(strided), vec![x, w]).unwrap();
    assert_ne!(a.hash(), c.hash());
    assert_eq!(graph.len(), 2);
}

#[test]
fn operand_order_changes_hash() {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[4])).unwrap();
    let y = graph.parameter("y", f32s(&[4])).unwrap();
    let xy = Node::new(OpKind::Binary(BinaryOpType::Sub), vec![x.clone(), y.clone()]).unwrap();
    let yx = Node::new(OpKind::Binary(BinaryOpType::Sub), vec![y, x]).unwrap();
    assert_ne!(xy.hash(), yx.hash());
}

#[test]
fn kinds_with_same_operands_differ() {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[4])).unwrap();
    let y = graph.parameter("y", f32s(&[4])).unwrap();
    let kinds = [
        BinaryOpType::Add,
        BinaryOpType::Sub,
        BinaryOpType::Mul,
        BinaryOpType::Div,
    ];
    let hashes = kinds
        .iter()
        .map(|op| {
            Node::new(OpKind::Binary(*op), vec![x.clone(), y.clone()])
                .unwrap()
                .hash()
        })
        .collect::<Vec<_>>();
    for i in 0..hashes.len() {
        for j in i + 1..hashes.len() {
            assert_ne!(hashes[i], hashes[j]);
        }
    }

    let a = graph.parameter("a", f32s(&[3, 3])).unwrap();
    let eig = Node::new(
        OpKind::SymEig(SymEigParams {
            eigenvectors: true,
            lower: false,
        }),
        vec![a.clone()],
    )
    .unwrap();
    let mask = graph
        .parameter("m", Shape::from_dims(ElementType::Bool, &[3, 3]))
        .unwrap();
    let select = Node::new(OpKind::MaskedSelect, vec![a, mask]).unwrap();
    assert_ne!(eig.hash(), select.hash());
}

#[test]
fn clone_with_same_shapes_reproduces_shapes() {
    let (mut graph, x, w) = conv_graph();
    let params = ConvParams::new(2).with_stride(vec![2, 2]);
    let y = graph.convolution(&x, &w, None, params).unwrap();
    let original = graph.node(y.node()).unwrap().clone();

    let x2 = graph.parameter("x2", f32s(&[1, 3, 8, 8])).unwrap();
    let w2 = graph.parameter("w2", f32s(&[4, 3, 3, 3])).unwrap();
    let cloned = original.clone_with(vec![x2, w2]).unwrap();
    assert_eq!(cloned.shapes(), original.shapes());
    assert_eq!(cloned.kind(), original.kind());
    assert_ne!(cloned.hash(), original.hash());

    let same = original.clone_with(original.operands().to_vec()).unwrap();
    assert_eq!(same, original);
}

#[test]
fn clone_with_reinfers_and_checks_arity() {
    let (mut graph, x, w) = conv_graph();
    let y = graph
        .convolution(&x, &w, None, ConvParams::new(2))
        .unwrap();
    let node = graph.node(y.node()).unwrap().clone();

    let bigger = graph.parameter("big", f32s(&[2, 3, 10, 10])).unwrap();
    let cloned = node.clone_with(vec![bigger, w.clone()]).unwrap();
    assert_eq!(cloned.shape(0), &f32s(&[2, 4, 8, 8]));

    let err = node.clone_with(vec![x.clone()]).unwrap_err();
    assert!(err.is_arity());

    let wrong = graph.parameter("wrong", f32s(&[1, 5, 8, 8])).unwrap();
    assert!(node.clone_with(vec![wrong, w]).unwrap_err().is_shape());
}

#[test]
fn cse_folds_equal_nodes() {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[4])).unwrap();
    let a = graph.binary(BinaryOpType::Add, &x, &x).unwrap();
    let b = graph.binary(BinaryOpType::Add, &x, &x).unwrap();
    assert_eq!(a.node(), b.node());
    assert_eq!(graph.len(), 2);

    // Parameters are never folded, their index differs.
    let y = graph.parameter("x", f32s(&[4])).unwrap();
    assert_ne!(x.node(), y.node());

    let one = graph.constant(1.0f32, f32s(&[4])).unwrap();
    let one_again = graph.constant(1.0f32, f32s(&[4])).unwrap();
    let zero = graph.constant(0.0f32, f32s(&[4])).unwrap();
    assert_eq!(one.node(), one_again.node());
    assert_ne!(one.node(), zero.node());
}

#[test]
fn cse_can_be_disabled() {
    let mut graph = Graph::with_config(GraphConfig::default().with_cse(false));
    let x = graph.parameter("x", f32s(&[4])).unwrap();
    let a = graph.binary(BinaryOpType::Add, &x, &x).unwrap();
    let b = graph.binary(BinaryOpType::Add, &x, &x).unwrap();
    assert_ne!(a.node(), b.node());
    assert_eq!(
        graph.node(a.node()).unwrap().hash(),
        graph.node(b.node()).unwrap().hash()
    );
}

#[test]
fn config_from_env() {
    std::env::set_var(lowir_core::DISABLE_CSE_ENV, "1");
    assert!(!GraphConfig::from_env().cse);
    std::env::set_var(lowir_core::DISABLE_CSE_ENV, "0");
    assert!(GraphConfig::from_env().cse);
    std::env::remove_var(lowir_core::DISABLE_CSE_ENV);
    assert!(GraphConfig::from_env().cse);
}

#[test]
fn values_are_checked() {
    let (mut graph, x, _) = conv_graph();
    let err = graph.value(x.node(), 1).unwrap_err();
    assert!(matches!(err, Error::InvalidOutput { index: 1, num_outputs: 1, .. }));
    assert_eq!(graph.value(x.node(), 0).unwrap(), x);

    let a = graph.parameter("a", f32s(&[2, 2])).unwrap();
    let (values, _) = graph.symeig(&a, true, false).unwrap();
    let outputs = graph.outputs(values.node()).unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1].to_string(), format!("{}.1", values.node()));

    // A value from another graph does not fit this one.
    let mut other = Graph::empty();
    let foreign = other.parameter("z", f32s(&[7])).unwrap();
    let operands = vec![foreign.clone(), foreign];
    let node = Node::new(OpKind::Binary(BinaryOpType::Add), operands).unwrap();
    assert!(graph.insert(node).is_err());
}

#[test]
fn insert_batch_keeps_order() {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[4])).unwrap();
    let y = graph.parameter("y", f32s(&[4])).unwrap();
    let batch = vec![
        (OpKind::Binary(BinaryOpType::Add), vec![x.clone(), y.clone()]),
        (OpKind::Binary(BinaryOpType::Mul), vec![x.clone(), y.clone()]),
        (OpKind::Binary(BinaryOpType::Add), vec![x.clone(), y.clone()]),
    ];
    let ids = graph.insert_batch(batch).unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], ids[2]);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(graph.len(), 4);

    let bad = vec![
        (OpKind::Binary(BinaryOpType::Add), vec![x.clone(), y]),
        (OpKind::MaskedSelect, vec![x.clone(), x]),
    ];
    assert!(graph.insert_batch(bad).unwrap_err().is_shape());
    assert_eq!(graph.len(), 4);
}

#[test]
fn text_ir_and_dot() {
    let (mut graph, x, w) = conv_graph();
    let y = graph
        .convolution(&x, &w, None, ConvParams::new(2))
        .unwrap();
    let text = graph.to_string();
    assert!(text.contains("%0 = f32[1,3,8,8] parameter()"), "{text}");
    assert!(
        text.contains(&format!("{} = f32[1,4,6,6] convolution_overrideable(%0, %1)", y.node())),
        "{text}"
    );
    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("convolution_overrideable"));
    assert_eq!(graph.topological_order().unwrap().len(), 3);
}

#[test]
fn random_binary_chains_are_deterministic() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..32 {
        let rank = rng.gen_range(1..4);
        let dims = (0..rank)
            .map(|_| rng.gen_range(1..6))
            .collect::<Vec<usize>>();
        let ops = (0..rng.gen_range(1..12))
            .map(|_| match rng.gen_range(0..4) {
                0 => BinaryOpType::Add,
                1 => BinaryOpType::Sub,
                2 => BinaryOpType::Mul,
                _ => BinaryOpType::Div,
            })
            .collect::<Vec<_>>();

        let build = || {
            let mut graph = Graph::empty();
            let x = graph.parameter("x", f32s(&dims)).unwrap();
            let mut acc = graph.parameter("y", f32s(&dims)).unwrap();
            for op in &ops {
                acc = graph.binary(*op, &acc, &x).unwrap();
            }
            let hash = graph.node(acc.node()).unwrap().hash();
            (graph.len(), hash, acc.shape().clone())
        };
        let (len_a, hash_a, shape_a) = build();
        let (len_b, hash_b, shape_b) = build();
        assert_eq!(len_a, len_b);
        assert_eq!(hash_a, hash_b);
        assert_eq!(shape_a, f32s(&dims));
        assert_eq!(shape_a, shape_b);
    }
}

#[test]
fn random_broadcasts_match_numpy_rules() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..64 {
        let rank = rng.gen_range(1..5);
        let target = (0..rank)
            .map(|_| rng.gen_range(1..5))
            .collect::<Vec<usize>>();
        let drop = rng.gen_range(0..rank);
        let operand = target[drop..]
            .iter()
            .map(|&d| if rng.gen_bool(0.5) { 1 } else { d })
            .collect::<Vec<usize>>();

        let mut graph = Graph::empty();
        let a = graph.parameter("a", f32s(&target)).unwrap();
        let b = graph.parameter("b", f32s(&operand)).unwrap();
        let sum = graph.binary(BinaryOpType::Add, &a, &b).unwrap();
        assert_eq!(sum.shape(), &f32s(&target));
        let rev = graph.binary(BinaryOpType::Add, &b, &a).unwrap();
        assert_eq!(rev.shape(), sum.shape());
    }
}

#[test]
fn dynamic_extents_broadcast_against_static() {
    let mut graph = Graph::empty();
    let x = graph.parameter("x", f32s(&[12])).unwrap();
    let mask = graph
        .parameter("m", Shape::from_dims(ElementType::Bool, &[12]))
        .unwrap();
    let picked = graph.masked_select(&x, &mask).unwrap();
    let six = graph.parameter("six", f32s(&[6])).unwrap();
    let fits = graph.binary(BinaryOpType::Mul, &picked, &six).unwrap();
    assert_eq!(fits.shape().dim(0), Dim::Static(6));
    let twenty = graph.parameter("twenty", f32s(&[20])).unwrap();
    assert!(graph
        .binary(BinaryOpType::Mul, &picked, &twenty)
        .unwrap_err()
        .is_shape());
}
