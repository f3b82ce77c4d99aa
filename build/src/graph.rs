use std::{
    collections::{hash_map::Entry, HashMap},
    fmt::Display,
};

use petgraph::{
    dot::{Config, Dot},
    graph::NodeIndex,
    Direction,
};

use crate::dependency::Dependency;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Requires,
    /// The input's product named another dependency, which replaced it.
    Redirects,
}

impl Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Requires => write!(f, "requires"),
            Edge::Redirects => write!(f, "redirects"),
        }
    }
}

/// Every edge the scheduler has seen during a run, for diagnosis. Scheduling itself never reads
/// this.
#[derive(Debug, Default)]
pub struct BuildGraph {
    graph: petgraph::Graph<Dependency, Edge>,
    nodes: HashMap<Dependency, NodeIndex>,
}

impl BuildGraph {
    fn add_or_get_node(&mut self, dependency: &Dependency) -> NodeIndex {
        match self.nodes.entry(dependency.clone()) {
            Entry::Vacant(e) => {
                let node = self.graph.add_node(dependency.clone());
                e.insert(node);
                node
            }
            Entry::Occupied(e) => *e.get(),
        }
    }

    pub(crate) fn add_edge(&mut self, from: &Dependency, to: &Dependency, edge: Edge) {
        let source = self.add_or_get_node(from);
        let target = self.add_or_get_node(to);
        if self.graph.find_edge(source, target).is_none() {
            self.graph.add_edge(source, target, edge);
        }
    }

    pub fn contains(&self, dependency: &Dependency) -> bool {
        self.nodes.contains_key(dependency)
    }

    /// Direct inputs recorded for `dependency`.
    pub fn inputs(&self, dependency: &Dependency) -> Vec<&Dependency> {
        match self.nodes.get(dependency) {
            Some(node) => {
                let mut inputs: Vec<&Dependency> = self
                    .graph
                    .neighbors_directed(*node, Direction::Outgoing)
                    .map(|n| &self.graph[n])
                    .collect();
                // neighbors are visited newest edge first.
                inputs.reverse();
                inputs
            }
            None => vec![],
        }
    }

    /// Graphviz rendering.
    pub fn to_dot(&self) -> String {
        format!("{}", Dot::with_config(&self.graph, &[Config::EdgeNoLabel]))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn records_edges_once() {
        let mut graph = BuildGraph::default();
        let main = Dependency::file("main");
        graph.add_edge(&main, &"a.o".into(), Edge::Requires);
        graph.add_edge(&main, &"b.o".into(), Edge::Requires);
        graph.add_edge(&main, &"a.o".into(), Edge::Requires);
        assert_eq!(
            graph.inputs(&main),
            vec![&Dependency::file("a.o"), &Dependency::file("b.o")]
        );
        assert!(graph.contains(&"b.o".into()));
        assert!(graph.inputs(&"b.o".into()).is_empty());
        let dot = graph.to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"main\""));
    }
}
