use lowir_core::{lower, ConvParams, ElementType, Graph, RecordingBuilder, Shape};

fn main() {
    let mut graph = Graph::empty();
    let x = graph
        .parameter("x", Shape::from_dims(ElementType::F32, &[1, 3, 8, 8]))
        .unwrap();
    let w = graph
        .parameter("w", Shape::from_dims(ElementType::F32, &[4, 3, 3, 3]))
        .unwrap();
    let b = graph
        .parameter("b", Shape::from_dims(ElementType::F32, &[4]))
        .unwrap();
    let y = graph
        .convolution(&x, &w, Some(&b), ConvParams::new(2).with_padding(vec![1, 1]))
        .unwrap();
    let mask = graph
        .parameter("mask", Shape::from_dims(ElementType::Bool, &[1, 4, 8, 8]))
        .unwrap();
    let picked = graph.masked_select(&y, &mask).unwrap();

    println!("{graph}");

    graph.visualize("graph.png").unwrap();

    let lowered = lower(&graph, RecordingBuilder::new(), &[picked]).unwrap();
    println!("{}", lowered.builder);
}
