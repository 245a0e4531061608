//! Node-kind registry: maps the DSL driver's `kind` string plus its bound
//! parameters to a concrete node constructor, so `GraphBuilder::create_node`
//! (spec §4.5) has something to call. Grounded on the teacher's
//! `orchestrator::pattern::factory::PatternFactory` — a small
//! `kind -> boxed constructor` lookup table, generalized from LLM patterns
//! to stream nodes.
//!
//! The classifier queue node is deliberately absent here: its constructor
//! takes a Rust closure (the classification function itself), which has no
//! representation as a bound [`ParamValue`]. Callers that need one build a
//! [`crate::classifier_queue::ClassifierQueueNode`] directly and insert it
//! with [`speechflow_core::graph::GraphBuilder::create_node`] themselves.

use crate::compressor::{CompressorConfig, CompressorNode, DynamicsMode, SidechainRole};
use crate::io::{FileSinkNode, FileSourceNode, PassthroughNode};
use crate::mute::MuteNode;
use crate::sentence_splitter::SentenceSplitterNode;
use speechflow_core::error::ConfigError;
use speechflow_core::params::{bind, BoundParams, ParamSchema, ParamSpec, ParamValue};
use speechflow_core::sidechain::SidechainBus;
use speechflow_core::{MediaType, Node};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// The parameter schema for every node kind this crate ships, keyed by the
/// same `kind` string a DSL driver's `create_node` callback supplies.
pub fn schema_for(kind: &str) -> Option<ParamSchema> {
    let mut schema = ParamSchema::new();
    match kind {
        "mute" => {}
        "passthrough" => {
            schema.insert(
                "media".to_string(),
                ParamSpec::string().with_pos(0).with_default(ParamValue::String("audio".into())),
            );
        }
        "file-source" => {
            schema.insert("path".to_string(), ParamSpec::string().with_pos(0));
            schema.insert(
                "media".to_string(),
                ParamSpec::string().with_pos(1).with_default(ParamValue::String("audio".into())),
            );
            schema.insert(
                "chunk-bytes".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(3200.0)),
            );
            schema.insert(
                "bytes-per-second".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(96_000.0)),
            );
        }
        "file-sink" => {
            schema.insert("path".to_string(), ParamSpec::string().with_pos(0));
        }
        "sentence-splitter" => {
            schema.insert(
                "interim".to_string(),
                ParamSpec::boolean().with_default(ParamValue::Boolean(false)),
            );
            schema.insert(
                "timeout-ms".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(2_000.0)),
            );
        }
        "compressor" | "expander" => {
            schema.insert(
                "threshold-dbfs".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(-18.0)),
            );
            schema.insert("ratio".to_string(), ParamSpec::number().with_default(ParamValue::Number(4.0)));
            schema.insert("knee-db".to_string(), ParamSpec::number().with_default(ParamValue::Number(6.0)));
            schema.insert(
                "attack-ms".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(10.0)),
            );
            schema.insert(
                "release-ms".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(150.0)),
            );
            schema.insert("makeup-db".to_string(), ParamSpec::number().with_default(ParamValue::Number(0.0)));
            schema.insert(
                "floor-dbfs".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(-90.0)),
            );
            schema.insert(
                "stereo-link".to_string(),
                ParamSpec::boolean().with_default(ParamValue::Boolean(true)),
            );
            schema.insert("channels".to_string(), ParamSpec::number().with_default(ParamValue::Number(1.0)));
            schema.insert(
                "sample-rate".to_string(),
                ParamSpec::number().with_default(ParamValue::Number(48_000.0)),
            );
            schema.insert(
                "sidechain-role".to_string(),
                ParamSpec::string().with_default(ParamValue::String("none".into())),
            );
        }
        _ => return None,
    }
    Some(schema)
}

/// Bind `named`/`positional` against `kind`'s schema, then construct the
/// node. `sidechain_bus` is only consulted for `compressor`/`expander`
/// nodes whose `sidechain-role` binds to something other than `none`
/// (spec §4.7, §8 S6).
pub fn build_node(
    node_id: &str,
    kind: &str,
    named: &HashMap<String, ParamValue>,
    positional: &[ParamValue],
    sidechain_bus: Option<Arc<SidechainBus>>,
) -> Result<Box<dyn Node>, ConfigError> {
    let schema = schema_for(kind).ok_or_else(|| ConfigError::UnknownNodeKind(kind.to_string()))?;
    let bound = bind(node_id, &schema, named, positional)?;

    let node: Box<dyn Node> = match kind {
        "mute" => Box::new(MuteNode::new()),
        "passthrough" => Box::new(PassthroughNode::new(parse_media(node_id, &bound)?)),
        "file-source" => Box::new(FileSourceNode::new(
            PathBuf::from(required_str(node_id, &bound, "path")?),
            parse_media(node_id, &bound)?,
            bound.number("chunk-bytes").unwrap_or(3200.0) as usize,
            bound.number("bytes-per-second").unwrap_or(96_000.0) as u64,
        )),
        "file-sink" => Box::new(FileSinkNode::new(PathBuf::from(required_str(node_id, &bound, "path")?))),
        "sentence-splitter" => Box::new(
            SentenceSplitterNode::new(
                bound.boolean("interim").unwrap_or(false),
                Duration::from_millis(bound.number("timeout-ms").unwrap_or(2_000.0) as u64),
            )
            .map_err(|_| ConfigError::InvalidEngineConfig(format!("node '{node_id}': failed to compile sentence boundary regex")))?,
        ),
        "compressor" | "expander" => {
            let mode = if kind == "compressor" { DynamicsMode::Compressor } else { DynamicsMode::Expander };
            let sidechain_role = match bound.string("sidechain-role").unwrap_or("none") {
                "measure" => SidechainRole::Measure,
                "adjust" => SidechainRole::Adjust,
                _ => SidechainRole::None,
            };
            let config = CompressorConfig {
                mode,
                threshold_dbfs: bound.number("threshold-dbfs").unwrap_or(-18.0),
                ratio: bound.number("ratio").unwrap_or(4.0),
                knee_db: bound.number("knee-db").unwrap_or(6.0),
                attack_ms: bound.number("attack-ms").unwrap_or(10.0),
                release_ms: bound.number("release-ms").unwrap_or(150.0),
                makeup_db: bound.number("makeup-db").unwrap_or(0.0),
                floor_dbfs: bound.number("floor-dbfs").unwrap_or(-90.0),
                stereo_link: bound.boolean("stereo-link").unwrap_or(true),
                channels: bound.number("channels").unwrap_or(1.0) as usize,
                sample_rate: bound.number("sample-rate").unwrap_or(48_000.0) as u32,
                sidechain_role,
                sidechain_channel: "sidechain-decibel",
            };
            Box::new(CompressorNode::new(config, sidechain_bus))
        }
        _ => unreachable!("schema_for would have returned None"),
    };
    Ok(node)
}

fn required_str<'a>(node_id: &str, bound: &'a BoundParams, name: &str) -> Result<&'a str, ConfigError> {
    bound.string(name).ok_or_else(|| ConfigError::MissingParam {
        node: node_id.to_string(),
        param: name.to_string(),
    })
}

fn parse_media(node_id: &str, bound: &BoundParams) -> Result<MediaType, ConfigError> {
    match bound.string("media").unwrap_or("audio") {
        "audio" => Ok(MediaType::Audio),
        "text" => Ok(MediaType::Text),
        other => Err(ConfigError::InvalidEngineConfig(format!(
            "node '{node_id}': unknown media type '{other}', expected 'audio' or 'text'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_builds_with_no_params() {
        let node = build_node("mute:0", "mute", &HashMap::new(), &[], None).unwrap();
        assert_eq!(node.status(), Some(serde_json::json!({ "muted": false })));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = build_node("bogus:0", "bogus", &HashMap::new(), &[], None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNodeKind(_)));
    }

    #[test]
    fn file_source_requires_path() {
        let err = build_node("file-source:0", "file-source", &HashMap::new(), &[], None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingParam { .. }));
    }

    #[test]
    fn compressor_builds_with_defaults() {
        let node = build_node("compressor:0", "compressor", &HashMap::new(), &[], None).unwrap();
        assert_eq!(node.input_port(), speechflow_core::PortType::Audio);
    }
}
