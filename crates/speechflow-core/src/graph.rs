//! Graph builder (spec §4.5): consumes the three DSL driver callbacks,
//! instantiates and registers nodes, and runs the three validation passes
//! before handing a [`Graph`] to the executor.

use crate::error::ConfigError;
use crate::node::{Node, PortType};
use crate::params::ParamValue;
use std::collections::{HashMap, HashSet};

/// A node identifier, suffixed by the builder at creation time:
/// `<kind>:<n>`, where `n` is a per-kind counter starting at 0. Node
/// authors never choose their own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    fn new(kind: &str, ordinal: usize) -> Self {
        Self(format!("{kind}:{ordinal}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Entry {
    node: Box<dyn Node>,
    input: PortType,
    output: PortType,
}

/// A constructed, validated graph: nodes plus the edges between them.
/// Produced only by [`GraphBuilder::finish`], so a `Graph` that exists at
/// all has already passed the required-port, prune, and type passes.
pub struct Graph {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, Entry>,
    edges: Vec<(NodeId, NodeId)>,
}

impl Graph {
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.order.iter()
    }

    pub fn edges(&self) -> &[(NodeId, NodeId)] {
        &self.edges
    }

    pub fn take_node(&mut self, id: &NodeId) -> Option<Box<dyn Node>> {
        self.nodes.remove(id).map(|e| e.node)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Resolves dotted variable paths (`argv.0`, `env.HOME`, ...) for the DSL
/// driver's `resolve_variable` callback.
pub trait VariableResolver {
    fn resolve(&self, path: &str) -> Option<ParamValue>;
}

/// Consumes `resolve_variable` / `create_node` / `connect_node` calls from
/// a DSL driver, then validates the result in one pass at [`finish`].
pub struct GraphBuilder {
    nodes: HashMap<NodeId, Entry>,
    order: Vec<NodeId>,
    edges: Vec<(NodeId, NodeId)>,
    kind_counters: HashMap<String, usize>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
            kind_counters: HashMap::new(),
        }
    }

    /// `resolve_variable(path)`: looks up a value by dotted path via the
    /// supplied resolver.
    pub fn resolve_variable(&self, resolver: &dyn VariableResolver, path: &str) -> Option<ParamValue> {
        resolver.resolve(path)
    }

    /// `create_node(kind, named_opts, positional_args)`: constructs the
    /// node via `construct` (which has already run §4.2 binding internally)
    /// and registers it under a freshly suffixed id.
    pub fn create_node(
        &mut self,
        kind: &str,
        construct: impl FnOnce(&NodeId) -> Box<dyn Node>,
    ) -> NodeId {
        let ordinal = self.kind_counters.entry(kind.to_string()).or_insert(0);
        let id = NodeId::new(kind, *ordinal);
        *ordinal += 1;

        let node = construct(&id);
        let input = node.input_port();
        let output = node.output_port();
        self.order.push(id.clone());
        self.nodes.insert(id.clone(), Entry { node, input, output });
        id
    }

    /// `connect_node(a, b)`: adds edge `a -> b`.
    pub fn connect_node(&mut self, a: NodeId, b: NodeId) {
        self.edges.push((a, b));
    }

    /// Run the three validation passes and produce a [`Graph`], or report
    /// the first violation found.
    pub fn finish(mut self) -> Result<Graph, ConfigError> {
        // Pass 2 runs textually before pass 1 in spec order but both read
        // from the same edge list; pruning first means the required-port
        // pass only ever sees edges that could legally exist.
        self.prune_pass();
        self.required_port_pass()?;
        self.type_pass()?;

        Ok(Graph {
            order: self.order,
            nodes: self.nodes,
            edges: self.edges,
        })
    }

    /// Prune pass: drop edges touching a port declared `none`.
    fn prune_pass(&mut self) {
        self.edges.retain(|(a, b)| {
            let a_ok = self.nodes.get(a).map(|e| e.output != PortType::None).unwrap_or(false);
            let b_ok = self.nodes.get(b).map(|e| e.input != PortType::None).unwrap_or(false);
            a_ok && b_ok
        });
    }

    /// Required-port pass: every node declaring a non-`none` input must
    /// have an incoming edge; every node declaring a non-`none` output
    /// must have an outgoing edge.
    fn required_port_pass(&self) -> Result<(), ConfigError> {
        let has_incoming: HashSet<&NodeId> = self.edges.iter().map(|(_, b)| b).collect();
        let has_outgoing: HashSet<&NodeId> = self.edges.iter().map(|(a, _)| a).collect();

        for id in &self.order {
            let entry = &self.nodes[id];
            if entry.input != PortType::None && !has_incoming.contains(id) {
                return Err(ConfigError::MissingInputEdge { node: id.to_string() });
            }
            if entry.output != PortType::None && !has_outgoing.contains(id) {
                return Err(ConfigError::MissingOutputEdge { node: id.to_string() });
            }
        }
        Ok(())
    }

    /// Type pass: for every surviving edge `a -> b`, `a.output` must match
    /// `b.input` (both audio or both text).
    fn type_pass(&self) -> Result<(), ConfigError> {
        for (a, b) in &self.edges {
            let from = &self.nodes[a];
            let to = &self.nodes[b];
            if !from.output.compatible_with(to.input) {
                return Err(ConfigError::PortMismatch {
                    from: a.to_string(),
                    to: b.to_string(),
                    from_port: from.output.tag(),
                    to_port: to.input.tag(),
                });
            }
        }
        Ok(())
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as SfResult;
    use crate::node::{NodeContext, NodeIo};
    use async_trait::async_trait;

    struct Stub {
        input: PortType,
        output: PortType,
    }

    #[async_trait]
    impl Node for Stub {
        fn input_port(&self) -> PortType {
            self.input
        }
        fn output_port(&self) -> PortType {
            self.output
        }
        async fn open(&mut self, _ctx: &NodeContext) -> SfResult<()> {
            Ok(())
        }
        async fn run(&mut self, _ctx: &NodeContext, _io: NodeIo) -> SfResult<()> {
            Ok(())
        }
        async fn close(&mut self) -> SfResult<()> {
            Ok(())
        }
    }

    #[test]
    fn node_ids_are_suffixed_per_kind() {
        let mut builder = GraphBuilder::new();
        let a = builder.create_node("source", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::Text })
        });
        let b = builder.create_node("source", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::Text })
        });
        assert_eq!(a.as_str(), "source:0");
        assert_eq!(b.as_str(), "source:1");
    }

    #[test]
    fn missing_required_input_edge_fails() {
        let mut builder = GraphBuilder::new();
        builder.create_node("sink", |_| {
            Box::new(Stub { input: PortType::Text, output: PortType::None })
        });
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, ConfigError::MissingInputEdge { .. }));
    }

    #[test]
    fn prune_drops_edges_touching_none_ports() {
        let mut builder = GraphBuilder::new();
        let a = builder.create_node("source", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::None })
        });
        let b = builder.create_node("sink", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::None })
        });
        builder.connect_node(a, b);
        let graph = builder.finish().unwrap();
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn type_mismatch_aborts_construction() {
        let mut builder = GraphBuilder::new();
        let a = builder.create_node("source", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::Audio })
        });
        let b = builder.create_node("sink", |_| {
            Box::new(Stub { input: PortType::Text, output: PortType::None })
        });
        builder.connect_node(a, b);
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, ConfigError::PortMismatch { .. }));
    }

    #[test]
    fn matching_types_build_successfully() {
        let mut builder = GraphBuilder::new();
        let a = builder.create_node("source", |_| {
            Box::new(Stub { input: PortType::None, output: PortType::Text })
        });
        let b = builder.create_node("sink", |_| {
            Box::new(Stub { input: PortType::Text, output: PortType::None })
        });
        builder.connect_node(a, b);
        let graph = builder.finish().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
    }
}
