mod reference_graph;

pub use reference_graph::ReferenceGraph;
