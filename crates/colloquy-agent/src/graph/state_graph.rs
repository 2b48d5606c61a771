//! State graph builder.

use std::collections::HashMap;
use std::sync::Arc;

use crate::checkpoint::Checkpointer;
use crate::state::GraphState;

use super::compile_error::CompilationError;
use super::compiled::{CompiledGraph, GraphInner};
use super::node::Node;

/// Virtual entry node
pub const START: &str = "__start__";
/// Virtual exit node
pub const END: &str = "__end__";

/// Picks the next node from the state after a node finishes
pub type Router = Arc<dyn Fn(&GraphState) -> String + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Edge {
    Static(String),
    Conditional { router: Router, targets: Vec<String> },
}

impl Edge {
    pub(crate) fn targets(&self) -> Vec<&str> {
        match self {
            Edge::Static(to) => vec![to.as_str()],
            Edge::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        }
    }
}

/// Graph under construction.
///
/// Builder errors (duplicate ids, reserved names, a second outgoing edge) are
/// collected and reported by `compile`, so calls can be chained freely.
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    /// Insertion order, used for diagrams
    node_order: Vec<String>,
    edges: HashMap<String, Edge>,
    errors: Vec<CompilationError>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node; the id must be unique and not START or END.
    pub fn add_node(&mut self, id: impl Into<String>, node: impl Node + 'static) -> &mut Self {
        let id = id.into();
        if id.is_empty() || id == START || id == END {
            self.errors.push(CompilationError::ReservedName(id));
        } else if self.nodes.contains_key(&id) {
            self.errors.push(CompilationError::DuplicateNode(id));
        } else {
            self.node_order.push(id.clone());
            self.nodes.insert(id, Arc::new(node));
        }
        self
    }

    /// Always go from `from` to `to`. An edge from START sets the entry point.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        let (from, to) = (from.into(), to.into());
        if from == END || to == START {
            self.errors.push(CompilationError::InvalidEdge { from, to });
            return self;
        }
        self.insert_edge(from, Edge::Static(to));
        self
    }

    /// After `from`, run whichever of `targets` the router names.
    pub fn add_conditional_edges<R>(
        &mut self,
        from: impl Into<String>,
        router: R,
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self
    where
        R: Fn(&GraphState) -> String + Send + Sync + 'static,
    {
        let from = from.into();
        let targets: Vec<String> = targets.into_iter().map(Into::into).collect();
        if from == END {
            self.errors.push(CompilationError::InvalidEdge {
                from,
                to: targets.join("|"),
            });
            return self;
        }
        if targets.is_empty() {
            self.errors.push(CompilationError::NoTargets(from));
            return self;
        }
        self.insert_edge(
            from,
            Edge::Conditional {
                router: Arc::new(router),
                targets,
            },
        );
        self
    }

    fn insert_edge(&mut self, from: String, edge: Edge) {
        if self.edges.contains_key(&from) {
            self.errors.push(CompilationError::DuplicateEdge(from));
        } else {
            self.edges.insert(from, edge);
        }
    }

    /// Validate and freeze the graph.
    pub fn compile(self) -> Result<CompiledGraph, CompilationError> {
        self.compile_with_checkpointer_opt(None)
    }

    /// Like `compile`, saving state per thread through `checkpointer`.
    pub fn compile_with_checkpointer(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledGraph, CompilationError> {
        self.compile_with_checkpointer_opt(Some(checkpointer))
    }

    fn compile_with_checkpointer_opt(
        self,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Result<CompiledGraph, CompilationError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        if self.nodes.is_empty() {
            return Err(CompilationError::EmptyGraph);
        }
        if !self.edges.contains_key(START) {
            return Err(CompilationError::MissingEntry);
        }

        for (from, edge) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            for to in edge.targets() {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(CompilationError::NodeNotFound(to.to_string()));
                }
            }
        }

        for id in &self.node_order {
            let reachable = self.edges.values().any(|e| e.targets().contains(&id.as_str()));
            if !reachable {
                tracing::warn!("node '{}' is unreachable", id);
            }
        }

        Ok(CompiledGraph::from_inner(GraphInner {
            nodes: self.nodes,
            node_order: self.node_order,
            edges: self.edges,
            checkpointer,
        }))
    }
}
