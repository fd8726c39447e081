//! Transition graph used to validate a definition.
//!
//! Nodes are states, edges run `source -> target` once per (source,
//! transition) pair. A sound workflow has exactly one attracting component
//! (a strongly connected component with no edge leaving it) and it is the
//! final state on its own.

use crate::definition::WorkflowDefinition;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// Directed state graph of a workflow definition.
#[derive(Debug, Clone)]
pub struct TransitionGraph {
    graph: DiGraph<String, String>,
    /// Map from state name to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<String, NodeIndex>,
}

impl TransitionGraph {
    /// Builds the graph over the definition's state set.
    ///
    /// States named by transitions but missing from an explicit state list
    /// are added as well, so the graph always covers every edge.
    #[must_use]
    pub fn from_definition(definition: &WorkflowDefinition) -> Self {
        let mut graph = Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        };

        for state in definition.states() {
            graph.add_state(state.name());
        }

        for transition in definition.transitions() {
            let target = graph.add_state(transition.target().name());
            for source in transition.sources() {
                let source = graph.add_state(source.name());
                graph
                    .graph
                    .add_edge(source, target, transition.name().to_string());
            }
        }

        graph
    }

    fn add_state(&mut self, name: &str) -> NodeIndex {
        if let Some(index) = self.node_index_map.get(name) {
            return *index;
        }
        let index = self.graph.add_node(name.to_string());
        self.node_index_map.insert(name.to_string(), index);
        index
    }

    /// Returns true if the graph has a node for `state`.
    #[must_use]
    pub fn contains(&self, state: &str) -> bool {
        self.node_index_map.contains_key(state)
    }

    #[must_use]
    pub fn state_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the attracting components, each sorted by state name, the
    /// list itself sorted.
    #[must_use]
    pub fn attracting_components(&self) -> Vec<Vec<String>> {
        let mut components: Vec<Vec<String>> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                let members: HashSet<NodeIndex> = component.iter().copied().collect();
                component.iter().all(|&node| {
                    self.graph
                        .neighbors(node)
                        .all(|neighbor| members.contains(&neighbor))
                })
            })
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|index| self.graph[index].clone())
                    .collect();
                names.sort();
                names
            })
            .collect();

        components.sort();
        components
    }
}
