//! Minimal graph-description reader (spec §1, §4.5): a `serde_yaml`
//! document that exercises the three DSL driver callbacks
//! (`resolve_variable`, `create_node`, `connect_node`) so the engine can be
//! run end-to-end without a FlowLink parser, which spec.md explicitly
//! leaves to an external collaborator. This is deliberately the simplest
//! possible driver, not a language: nodes are named so edges can refer to
//! them, and node args/params carry plain YAML scalars.

use anyhow::{bail, Context, Result};
use speechflow_core::graph::{Graph, GraphBuilder, VariableResolver};
use speechflow_core::params::ParamValue;
use speechflow_core::sidechain::SidechainBus;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct GraphDescription {
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

impl GraphDescription {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading graph description {}", path.display()))?;
        let description: GraphDescription = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing graph description {}", path.display()))?;
        Ok(description)
    }
}

/// Resolves `env.<VAR>` and `argv.<index>` paths, the two kinds of
/// variable reference a graph description can lean on without a real DSL
/// behind it (spec §4.5 "resolve_variable(path)").
pub struct EnvArgvResolver {
    argv: Vec<String>,
}

impl EnvArgvResolver {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

impl VariableResolver for EnvArgvResolver {
    fn resolve(&self, path: &str) -> Option<ParamValue> {
        if let Some(var) = path.strip_prefix("env.") {
            return std::env::var(var).ok().map(ParamValue::String);
        }
        if let Some(index) = path.strip_prefix("argv.") {
            let index: usize = index.parse().ok()?;
            return self.argv.get(index).cloned().map(ParamValue::String);
        }
        None
    }
}

/// Resolve a single scalar value, routing `$`-prefixed dotted paths
/// (`$argv.0`, `$env.HOME`) through `GraphBuilder::resolve_variable` (spec
/// §4.5's `resolve_variable(path)` callback) and taking anything else
/// literally.
fn json_to_param_value(value: &serde_json::Value, builder: &GraphBuilder, resolver: &dyn VariableResolver) -> Result<ParamValue> {
    match value {
        serde_json::Value::String(s) => match s.strip_prefix('$') {
            Some(path) => builder
                .resolve_variable(resolver, path)
                .with_context(|| format!("unresolved variable reference '{s}'")),
            None => Ok(ParamValue::String(s.clone())),
        },
        serde_json::Value::Number(n) => {
            n.as_f64().map(ParamValue::Number).context("number argument is not representable as f64")
        }
        serde_json::Value::Bool(b) => Ok(ParamValue::Boolean(*b)),
        other => bail!("unsupported parameter value {other}: expected string, number, or boolean"),
    }
}

/// Build a [`Graph`] from a parsed description, dispatching each node
/// through `speechflow_nodes::build_node` (spec §4.5's `create_node`
/// callback) and wiring edges by the names the description assigned.
/// `resolver` backs `$`-prefixed param values (spec §4.5's
/// `resolve_variable` callback); a description with none simply never
/// triggers a lookup.
pub fn build_graph(
    description: &GraphDescription,
    resolver: &dyn VariableResolver,
    sidechain: Option<Arc<SidechainBus>>,
) -> Result<Graph> {
    let mut builder = GraphBuilder::new();
    let mut ids = HashMap::new();

    for node in &description.nodes {
        let mut named = HashMap::with_capacity(node.params.len());
        for (key, value) in &node.params {
            named.insert(key.clone(), json_to_param_value(value, &builder, resolver)?);
        }
        let positional: Vec<ParamValue> =
            node.args.iter().map(|v| json_to_param_value(v, &builder, resolver)).collect::<Result<_>>()?;

        // `GraphBuilder::create_node`'s constructor closure only learns the
        // real `kind:N` id once it runs, but `build_node` needs bound
        // params up front to report a useful error; the description's own
        // `name` stands in for that id in any such message, since the two
        // rarely coincide until after construction.
        let built = speechflow_nodes::build_node(&node.name, &node.kind, &named, &positional, sidechain.clone())
            .with_context(|| format!("constructing node '{}'", node.name))?;
        let id = builder.create_node(&node.kind, move |_node_id| built);
        ids.insert(node.name.clone(), id);
    }

    for (from, to) in &description.edges {
        let from_id = ids.get(from).with_context(|| format!("edge references unknown node '{from}'"))?;
        let to_id = ids.get(to).with_context(|| format!("edge references unknown node '{to}'"))?;
        builder.connect_node(from_id.clone(), to_id.clone());
    }

    builder.finish().map_err(Into::into)
}
