//! Mute node (spec §8 S5): passes audio through unchanged until an
//! external `COMMAND` request silences it, at which point every outgoing
//! chunk's payload is replaced with zeros and tagged `meta["muted"] =
//! true`. Demonstrates the `receive_request` / `send-response` half of
//! the node contract end to end, including while the node is already
//! streaming: `muted` lives behind an `Arc<AtomicBool>` shared with a
//! [`MuteControlHandle`] so the control surface can flip it without
//! needing `&mut` access to the node `run()` already owns.

use async_trait::async_trait;
use speechflow_core::error::{ExternalRequestError, Result, StreamError};
use speechflow_core::node::{ControlHandle, EventSink};
use speechflow_core::{Node, NodeContext, NodeIo, ParamValue, Payload, PortType, SpeechFlowError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn parse_mode_request(args: &[ParamValue], node_id: &str) -> std::result::Result<bool, ExternalRequestError> {
    let [key, value] = args else {
        return Err(ExternalRequestError::Malformed("mute expects exactly [\"mode\", <value>]".to_string()));
    };
    if key.as_str() != Some("mode") {
        return Err(ExternalRequestError::Rejected {
            node: node_id.to_string(),
            reason: format!("unknown parameter '{key:?}'"),
        });
    }
    let Some(mode) = value.as_str() else {
        return Err(ExternalRequestError::Malformed("mode value must be a string".to_string()));
    };
    match mode {
        "silenced" => Ok(true),
        "unsilenced" | "active" => Ok(false),
        other => Err(ExternalRequestError::Rejected {
            node: node_id.to_string(),
            reason: format!("unrecognized mode '{other}'"),
        }),
    }
}

/// The control-surface-facing half of a mute node: shares `muted` with the
/// [`MuteNode`] that owns the streaming loop, and raises the `NOTIFY` event
/// spec §8 S5 expects on every successful mode change.
struct MuteControlHandle {
    node_id: String,
    muted: Arc<AtomicBool>,
    events: EventSink,
}

#[async_trait]
impl ControlHandle for MuteControlHandle {
    async fn receive_request(&self, args: Vec<ParamValue>) -> std::result::Result<(), ExternalRequestError> {
        let silenced = parse_mode_request(&args, &self.node_id)?;
        self.muted.store(silenced, Ordering::SeqCst);
        let mode = if silenced { "silenced" } else { "unsilenced" };
        self.events.notify(serde_json::json!(["mute", "mode", mode]));
        Ok(())
    }

    fn status(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "muted": self.muted.load(Ordering::SeqCst) }))
    }
}

pub struct MuteNode {
    id: String,
    muted: Arc<AtomicBool>,
    events: Option<EventSink>,
}

impl MuteNode {
    pub fn new() -> Self {
        Self { id: String::new(), muted: Arc::new(AtomicBool::new(false)), events: None }
    }
}

impl Default for MuteNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for MuteNode {
    fn input_port(&self) -> PortType {
        PortType::Audio
    }

    fn output_port(&self) -> PortType {
        PortType::Audio
    }

    async fn open(&mut self, ctx: &NodeContext) -> Result<()> {
        self.id = ctx.node_id.clone();
        self.events = Some(ctx.events.clone());
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let mut rx = io.input.ok_or_else(|| {
            SpeechFlowError::stream("mute", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("mute", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;

        while let Some(mut chunk) = rx.recv().await {
            if self.muted.load(Ordering::SeqCst) {
                if let Payload::Audio(bytes) = &mut chunk.payload {
                    bytes.iter_mut().for_each(|b| *b = 0);
                }
                chunk.meta.insert("muted", true);
            }
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "muted": self.muted.load(Ordering::SeqCst) }))
    }

    async fn receive_request(&mut self, args: Vec<ParamValue>) -> std::result::Result<(), ExternalRequestError> {
        let silenced = parse_mode_request(&args, &self.id)?;
        self.muted.store(silenced, Ordering::SeqCst);
        if let Some(events) = &self.events {
            let mode = if silenced { "silenced" } else { "unsilenced" };
            events.notify(serde_json::json!(["mute", "mode", mode]));
        }
        Ok(())
    }

    fn control_handle(&self) -> Option<Arc<dyn ControlHandle>> {
        self.events.as_ref().map(|events| {
            Arc::new(MuteControlHandle {
                node_id: self.id.clone(),
                muted: Arc::clone(&self.muted),
                events: events.clone(),
            }) as Arc<dyn ControlHandle>
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechflow_core::chunk::{Chunk, ChunkKind};
    use speechflow_core::streaming::edge_channel;
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;

    fn test_ctx(id: &str) -> NodeContext {
        let (tx, _rx) = mpsc::unbounded_channel();
        NodeContext { node_id: id.to_string(), time_zero: Instant::now(), events: EventSink::new(id, tx) }
    }

    #[tokio::test]
    async fn silenced_mode_zeros_payload_and_tags_meta() {
        let mut node = MuteNode::new();
        let ctx = test_ctx("mute:0");
        node.open(&ctx).await.unwrap();
        node.receive_request(vec![ParamValue::String("mode".into()), ParamValue::String("silenced".into())])
            .await
            .unwrap();

        let (in_tx, in_rx) = edge_channel();
        let (out_tx, mut out_rx) = edge_channel();
        let run_handle = tokio::spawn(async move {
            node.run(&ctx, NodeIo { input: Some(in_rx), output: Some(out_tx) }).await
        });

        let chunk = Chunk::new(
            Duration::from_millis(0),
            Duration::from_millis(20),
            ChunkKind::Final,
            Payload::Audio(vec![1, 2, 3, 4]),
        );
        in_tx.send(chunk).await.unwrap();
        let muted_chunk = out_rx.recv().await.unwrap();
        assert_eq!(muted_chunk.payload.as_audio(), Some(&[0u8, 0, 0, 0][..]));
        assert_eq!(muted_chunk.meta.get("muted"), Some(&serde_json::json!(true)));

        drop(in_tx);
        run_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_mode_value_is_rejected() {
        let mut node = MuteNode::new();
        let ctx = test_ctx("mute:0");
        node.open(&ctx).await.unwrap();
        let err = node
            .receive_request(vec![ParamValue::String("mode".into()), ParamValue::String("bogus".into())])
            .await
            .unwrap_err();
        assert!(matches!(err, ExternalRequestError::Rejected { .. }));
    }

    #[tokio::test]
    async fn control_handle_mutes_a_node_already_streaming() {
        let mut node = MuteNode::new();
        let ctx = test_ctx("mute:0");
        node.open(&ctx).await.unwrap();
        let handle = node.control_handle().expect("mute node exposes a control handle");

        let (in_tx, in_rx) = edge_channel();
        let (out_tx, mut out_rx) = edge_channel();
        let run_handle = tokio::spawn(async move {
            node.run(&ctx, NodeIo { input: Some(in_rx), output: Some(out_tx) }).await
        });

        handle
            .receive_request(vec![ParamValue::String("mode".into()), ParamValue::String("silenced".into())])
            .await
            .unwrap();

        let chunk = Chunk::new(
            Duration::from_millis(0),
            Duration::from_millis(20),
            ChunkKind::Final,
            Payload::Audio(vec![9, 9, 9, 9]),
        );
        in_tx.send(chunk).await.unwrap();
        let muted_chunk = out_rx.recv().await.unwrap();
        assert_eq!(muted_chunk.payload.as_audio(), Some(&[0u8, 0, 0, 0][..]));

        drop(in_tx);
        run_handle.await.unwrap().unwrap();
    }
}
