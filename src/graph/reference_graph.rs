use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use crate::models::DatasetKey;

/// Corpus-wide "references" graph between datasets
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    /// Edges point from the referring dataset to the referenced one
    graph: DiGraph<DatasetKey, ()>,
    /// Map from dataset identity to graph node index
    node_map: HashMap<DatasetKey, NodeIndex>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, key: DatasetKey) -> NodeIndex {
        if let Some(&node) = self.node_map.get(&key) {
            return node;
        }
        let node = self.graph.add_node(key);
        self.node_map.insert(key, node);
        node
    }

    /// Record that `from` references each of `targets`
    pub fn add_document(&mut self, from: DatasetKey, targets: impl IntoIterator<Item = DatasetKey>) {
        let source = self.node(from);
        for target in targets {
            let target = self.node(target);
            self.graph.update_edge(source, target, ());
        }
    }

    /// Every cycle as the set of its participants, each listed once.
    ///
    /// Cycles are the strongly connected components found by a depth-first walk, so
    /// A -> B -> C -> A is one cycle rather than one per edge. Output is sorted.
    pub fn find_cycles(&self) -> Vec<Vec<DatasetKey>> {
        let mut cycles = Vec::new();

        for scc in tarjan_scc(&self.graph) {
            let is_cycle = scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]);
            if is_cycle {
                let mut members: Vec<DatasetKey> = scc.into_iter().map(|n| self.graph[n]).collect();
                members.sort();
                cycles.push(members);
            }
        }

        cycles.sort();
        cycles
    }
}
