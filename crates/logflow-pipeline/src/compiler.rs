//! Flow graph to pipeline compilation.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::flow::{FlowGraph, FlowNode};
use crate::node::{Node, NodeId, Pipeline};
use crate::traits::FilterCompiler;

/// Compiles `graph` into an executable pipeline named `name`.
///
/// Switch conditions are compiled eagerly. Transformer and sub-pipeline
/// names are kept as names and resolved when the pipeline runs. Nodes not
/// reachable from the source are compiled but never executed.
///
/// # Errors
///
/// - [`PipelineError::InvalidFlowNodeType`] for an unknown node type
/// - [`PipelineError::MissingFlowNodeData`] for a missing data key
/// - [`PipelineError::InvalidFlowEdge`] for an edge to an unknown node, out
///   of a terminal node or into the source
/// - [`PipelineError::MissingFlowRootNode`] without a connected source
/// - [`PipelineError::DuplicateFlowRootNode`] with several sources
/// - [`PipelineError::CyclicFlowGraph`] when edges loop
/// - [`PipelineError::Compilation`] when a condition does not compile
pub fn build(name: &str, graph: &FlowGraph, compiler: &dyn FilterCompiler) -> Result<Pipeline> {
    let mut nodes = Vec::with_capacity(graph.nodes.len());
    let mut flow_ids = Vec::with_capacity(graph.nodes.len());
    let mut ids: HashMap<&str, NodeId> = HashMap::with_capacity(graph.nodes.len());
    let mut root: Option<(NodeId, &str)> = None;

    for flow_node in &graph.nodes {
        let id = NodeId(nodes.len());
        let node = match flow_node.node_type.as_str() {
            "source" => {
                if let Some((_, first)) = root {
                    return Err(PipelineError::DuplicateFlowRootNode {
                        first: first.to_string(),
                        second: flow_node.id.clone(),
                    });
                }
                root = Some((id, flow_node.id.as_str()));
                Node::Source { next: Vec::new() }
            }
            "transform" => Node::Transform {
                transformer: required(flow_node, "transformer")?.to_string(),
                next: Vec::new(),
            },
            "switch" => Node::Switch {
                condition: compiler.compile(required(flow_node, "condition")?)?,
                next: Vec::new(),
            },
            "pipeline" => Node::Pipeline {
                pipeline: required(flow_node, "pipeline")?.to_string(),
            },
            "router" => Node::Router {
                stream: required(flow_node, "stream")?.to_string(),
            },
            "alert" => Node::Alert {
                alert: required(flow_node, "alert")?.to_string(),
            },
            other => {
                return Err(PipelineError::InvalidFlowNodeType {
                    node_id: flow_node.id.clone(),
                    node_type: other.to_string(),
                });
            }
        };

        if ids.insert(flow_node.id.as_str(), id).is_some() {
            return Err(PipelineError::DuplicateFlowNode(flow_node.id.clone()));
        }
        nodes.push(node);
        flow_ids.push(flow_node.id.clone());
    }

    for edge in &graph.edges {
        let invalid = || PipelineError::InvalidFlowEdge {
            from: edge.source.clone(),
            to: edge.target.clone(),
        };
        let (Some(&from), Some(&to)) = (ids.get(edge.source.as_str()), ids.get(edge.target.as_str()))
        else {
            return Err(invalid());
        };
        if matches!(nodes[to.0], Node::Source { .. }) {
            return Err(invalid());
        }
        let Some(next) = nodes[from.0].next_mut() else {
            return Err(invalid());
        };
        if !next.contains(&to) {
            next.push(to);
        }
    }

    let Some((root, _)) = root else {
        return Err(PipelineError::MissingFlowRootNode);
    };
    if nodes[root.0].next().is_empty() {
        return Err(PipelineError::MissingFlowRootNode);
    }

    let mut marks = vec![Mark::Unvisited; nodes.len()];
    if let Some(looped) = find_cycle(&nodes, root, &mut marks) {
        return Err(PipelineError::CyclicFlowGraph(flow_ids[looped.0].clone()));
    }

    let unreachable = marks.iter().filter(|m| **m == Mark::Unvisited).count();
    debug!(pipeline = name, nodes = nodes.len(), unreachable, "pipeline compiled");

    Ok(Pipeline {
        name: name.to_string(),
        nodes,
        flow_ids,
        root,
    })
}

fn required<'a>(node: &'a FlowNode, key: &'static str) -> Result<&'a str> {
    node.data
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| PipelineError::MissingFlowNodeData {
            node_id: node.id.clone(),
            key,
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search returning the first node reached twice on one path.
fn find_cycle(nodes: &[Node], id: NodeId, marks: &mut [Mark]) -> Option<NodeId> {
    marks[id.0] = Mark::InProgress;
    for &next in nodes[id.0].next() {
        match marks[next.0] {
            Mark::InProgress => return Some(next),
            Mark::Unvisited => {
                if let Some(looped) = find_cycle(nodes, next, marks) {
                    return Some(looped);
                }
            }
            Mark::Done => {}
        }
    }
    marks[id.0] = Mark::Done;
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompilationError;
    use logflow_store::Filter;
    use test_case::test_case;

    /// Accepts `field == "value"` conditions.
    struct EqCompiler;

    impl FilterCompiler for EqCompiler {
        fn compile(&self, source: &str) -> std::result::Result<Filter, CompilationError> {
            let (field, value) = source
                .split_once("==")
                .ok_or_else(|| CompilationError::new(format!("cannot parse '{source}'")))?;
            Ok(Filter::field_exact(field.trim(), value.trim().trim_matches('"')))
        }
    }

    fn compile(graph: &FlowGraph) -> Result<Pipeline> {
        build("test", graph, &EqCompiler)
    }

    #[test]
    fn compiles_branching_graph() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("sw", "switch", [("condition", r#"level == "error""#)])
            .with_node("errors", "router", [("stream", "errors")])
            .with_node("all", "router", [("stream", "all")])
            .with_edge("src", "sw")
            .with_edge("sw", "errors")
            .with_edge("src", "all");

        let pipeline = compile(&graph).expect("compile graph");

        assert_eq!(pipeline.name(), "test");
        let root = pipeline.node(pipeline.root());
        assert!(matches!(root, Some(Node::Source { next }) if next.len() == 2));

        let switch = pipeline.find("sw").and_then(|id| pipeline.node(id));
        assert!(matches!(
            switch,
            Some(Node::Switch { condition, next }) if *condition == Filter::field_exact("level", "error") && next.len() == 1
        ));
    }

    #[test]
    fn unknown_node_type() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("f", "forwarder", [("forwarder", "x")]);
        assert!(matches!(
            compile(&graph),
            Err(PipelineError::InvalidFlowNodeType { ref node_id, ref node_type }) if node_id == "f" && node_type == "forwarder"
        ));
    }

    #[test_case("transform", "transformer" ; "transform needs transformer")]
    #[test_case("switch", "condition" ; "switch needs condition")]
    #[test_case("pipeline", "pipeline" ; "pipeline needs pipeline")]
    #[test_case("router", "stream" ; "router needs stream")]
    #[test_case("alert", "alert" ; "alert needs alert")]
    fn missing_node_data(node_type: &str, key: &str) {
        let graph = FlowGraph::new().with_node("n", node_type, []);
        assert!(
            matches!(compile(&graph), Err(PipelineError::MissingFlowNodeData { key: k, .. }) if k == key),
            "{node_type} should require {key}"
        );
    }

    #[test]
    fn edge_to_unknown_node() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_edge("src", "ghost");
        assert!(matches!(
            compile(&graph),
            Err(PipelineError::InvalidFlowEdge { ref from, ref to }) if from == "src" && to == "ghost"
        ));
    }

    #[test]
    fn edge_out_of_terminal_node() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("r", "router", [("stream", "a")])
            .with_node("a", "alert", [("alert", "x")])
            .with_edge("src", "r")
            .with_edge("r", "a");
        assert!(matches!(compile(&graph), Err(PipelineError::InvalidFlowEdge { .. })));
    }

    #[test]
    fn edge_into_source() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("t", "transform", [("transformer", "x")])
            .with_edge("src", "t")
            .with_edge("t", "src");
        assert!(matches!(compile(&graph), Err(PipelineError::InvalidFlowEdge { .. })));
    }

    #[test]
    fn missing_or_disconnected_root() {
        let no_source = FlowGraph::new().with_node("r", "router", [("stream", "a")]);
        assert!(matches!(compile(&no_source), Err(PipelineError::MissingFlowRootNode)));

        let disconnected = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("r", "router", [("stream", "a")]);
        assert!(matches!(compile(&disconnected), Err(PipelineError::MissingFlowRootNode)));
    }

    #[test]
    fn duplicate_source() {
        let graph = FlowGraph::new()
            .with_node("s1", "source", [])
            .with_node("s2", "source", []);
        assert!(matches!(
            compile(&graph),
            Err(PipelineError::DuplicateFlowRootNode { ref first, ref second }) if first == "s1" && second == "s2"
        ));
    }

    #[test]
    fn duplicate_node_id() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("x", "router", [("stream", "a")])
            .with_node("x", "router", [("stream", "b")]);
        assert!(matches!(compile(&graph), Err(PipelineError::DuplicateFlowNode(ref id)) if id == "x"));
    }

    #[test]
    fn cyclic_graph() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("t1", "transform", [("transformer", "a")])
            .with_node("t2", "transform", [("transformer", "b")])
            .with_edge("src", "t1")
            .with_edge("t1", "t2")
            .with_edge("t2", "t1");
        assert!(matches!(compile(&graph), Err(PipelineError::CyclicFlowGraph(ref id)) if id == "t1"));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("a", "transform", [("transformer", "a")])
            .with_node("b", "transform", [("transformer", "b")])
            .with_node("r", "router", [("stream", "s")])
            .with_edge("src", "a")
            .with_edge("src", "b")
            .with_edge("a", "r")
            .with_edge("b", "r");
        compile(&graph).expect("compile diamond");
    }

    #[test]
    fn duplicate_edges_collapse() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("r", "router", [("stream", "s")])
            .with_edge("src", "r")
            .with_edge("src", "r");
        let pipeline = compile(&graph).expect("compile graph");
        let root = pipeline.node(pipeline.root()).expect("root node");
        assert_eq!(root.next().len(), 1);
    }

    #[test]
    fn condition_compile_error_surfaces() {
        let graph = FlowGraph::new()
            .with_node("src", "source", [])
            .with_node("sw", "switch", [("condition", "not a condition")]);
        assert!(matches!(compile(&graph), Err(PipelineError::Compilation(_))));
    }
}
