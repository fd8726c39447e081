//! JSON Graph rendering of a workflow.
//!
//! Follows the JSON Graph format: one node per state, one edge per
//! (source, transition) pair, laid out left to right.

use crate::compiled::CompiledWorkflow;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonGraph {
    pub graph: GraphBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphBody {
    pub directed: bool,
    pub rankdir: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub initial: bool,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// The transition name; shared by every edge of a multi-source transition.
    pub id: String,
    pub label: String,
    pub source: String,
    pub target: String,
}

impl JsonGraph {
    /// Renders `workflow`, flagging `current` as the current state.
    #[must_use]
    pub fn build(workflow: &CompiledWorkflow, current: Option<&str>) -> Self {
        let nodes = workflow
            .states()
            .iter()
            .map(|state| GraphNode {
                id: state.name().to_string(),
                label: state.title().to_string(),
                metadata: NodeMetadata {
                    initial: state.name() == workflow.initial_state().name(),
                    is_final: workflow.is_final(state.name()),
                    current: current == Some(state.name()),
                },
            })
            .collect();

        let edges = workflow
            .transitions()
            .iter()
            .flat_map(|transition| {
                transition.sources().iter().map(move |source| GraphEdge {
                    id: transition.name().to_string(),
                    label: transition.name().to_string(),
                    source: source.name().to_string(),
                    target: transition.target().name().to_string(),
                })
            })
            .collect();

        Self {
            graph: GraphBody {
                directed: true,
                rankdir: "LR".to_string(),
                nodes,
                edges,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WorkflowDefinition;
    use crate::state::WorkflowState;
    use crate::transition::{WorkflowTransition, noop};

    #[test]
    fn renders_nodes_and_edges() {
        let draft = WorkflowState::new("draft", "Draft");
        let review = WorkflowState::new("review", "Review");
        let end = WorkflowState::new("end", "End");
        let def = WorkflowDefinition::builder("graph", draft.clone())
            .transition(WorkflowTransition::new(
                "submit",
                [draft.clone()],
                review.clone(),
                noop(),
            ))
            .transition(WorkflowTransition::new(
                "close",
                [draft, review],
                end,
                noop(),
            ))
            .build();
        let workflow = CompiledWorkflow::compile(def).expect("valid");

        let graph = JsonGraph::build(&workflow, Some("review"));
        assert!(graph.graph.directed);
        assert_eq!(graph.graph.nodes.len(), 3);
        assert_eq!(graph.graph.edges.len(), 3);

        let draft_node = &graph.graph.nodes[0];
        assert_eq!(draft_node.label, "Draft");
        assert!(draft_node.metadata.initial);
        assert!(!draft_node.metadata.current);
        assert!(graph.graph.nodes[1].metadata.current);
        assert!(graph.graph.nodes[2].metadata.is_final);

        let json = serde_json::to_value(&graph).expect("serialize");
        assert_eq!(json["graph"]["rankdir"], "LR");
        assert_eq!(json["graph"]["nodes"][2]["metadata"]["final"], true);
        assert_eq!(json["graph"]["edges"][2]["id"], "close");
        assert_eq!(json["graph"]["edges"][2]["source"], "review");
    }
}
