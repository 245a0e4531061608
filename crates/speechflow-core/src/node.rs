//! Node runtime (spec §4.3): the lifecycle every node passes through, its
//! typed ports, and the handles a node uses to talk back to the engine.
//!
//! Ported from the teacher's emitter-based node hooks (`on('log', ...)`,
//! `on('notify', ...)`) onto explicit tagged channels: a node emits
//! [`NodeEvent`]s through an [`EventSink`] instead of firing callbacks,
//! which is the asynchronous-channel idiom `orca::shutdown` and
//! `orchestrator::api::ws` already use for the same kind of fan-out.

use crate::error::{ExternalRequestError, Result};
use crate::params::ParamValue;
use crate::streaming::{ChunkReceiver, ChunkSender};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// The port type a node declares for its single input or output, matching
/// `MediaType` plus a `None` option for nodes that are pure sources or pure
/// sinks (spec §4.3, §5 type-validation pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    None,
    Audio,
    Text,
}

impl PortType {
    pub fn tag(self) -> &'static str {
        match self {
            PortType::None => "none",
            PortType::Audio => "audio",
            PortType::Text => "text",
        }
    }

    /// Whether a producer declaring this output port type may feed a
    /// consumer declaring `input` as its input port type.
    pub fn compatible_with(self, input: PortType) -> bool {
        matches!(
            (self, input),
            (PortType::Audio, PortType::Audio) | (PortType::Text, PortType::Text)
        )
    }
}

/// A lifecycle-tagged event a node raises for the engine to route: a log
/// line, or a notification destined for the control surface's WebSocket
/// broadcast (spec §8, `NOTIFY` messages).
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Log { level: tracing::Level, message: String },
    Notify { args: serde_json::Value },
}

/// Sink a node uses to raise [`NodeEvent`]s without knowing who's listening.
#[derive(Clone)]
pub struct EventSink {
    node_id: String,
    tx: mpsc::UnboundedSender<(String, NodeEvent)>,
}

impl EventSink {
    pub fn new(node_id: impl Into<String>, tx: mpsc::UnboundedSender<(String, NodeEvent)>) -> Self {
        Self { node_id: node_id.into(), tx }
    }

    pub fn log(&self, level: tracing::Level, message: impl Into<String>) {
        let _ = self.tx.send((
            self.node_id.clone(),
            NodeEvent::Log { level, message: message.into() },
        ));
    }

    pub fn notify(&self, args: serde_json::Value) {
        let _ = self.tx.send((self.node_id.clone(), NodeEvent::Notify { args }));
    }
}

/// Engine-provided context handed to a node at `open()` time: shared
/// knowledge of graph time-zero plus a way to raise events. Node
/// implementations should not otherwise reach for global state.
#[derive(Clone)]
pub struct NodeContext {
    pub node_id: String,
    pub time_zero: Instant,
    pub events: EventSink,
}

impl NodeContext {
    /// Elapsed graph time as of the moment this is called.
    pub fn now_offset(&self) -> std::time::Duration {
        self.time_zero.elapsed()
    }
}

/// The streaming handles a node's `run()` consumes: its single inbound and
/// outbound edge, if declared. A pure source has `input: None`; a pure sink
/// has `output: None`.
pub struct NodeIo {
    pub input: Option<ChunkReceiver>,
    pub output: Option<ChunkSender>,
}

/// A live, externally-addressable handle to a node's control surface,
/// decoupled from the `&mut Node` that `run()` holds exclusively for the
/// whole streaming lifetime (spec §9: "cyclic references between a node and
/// its background worker → arena + id"). A node that wants to accept
/// requests while it is actively streaming exposes one of these — backed by
/// whatever interior mutability it needs (an `Arc<AtomicBool>`, a
/// `watch::Sender`, ...) — instead of requiring the control surface to
/// somehow borrow the node itself.
#[async_trait]
pub trait ControlHandle: Send + Sync {
    async fn receive_request(&self, args: Vec<ParamValue>) -> std::result::Result<(), ExternalRequestError>;

    fn status(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Lifecycle every node passes through, strictly serially: created (by the
/// registry in `speechflow-nodes`), configured (bound params handed to the
/// constructor), opened, streaming (`run`), closed, destroyed (dropped).
#[async_trait]
pub trait Node: Send {
    fn input_port(&self) -> PortType;
    fn output_port(&self) -> PortType;

    /// Allocate whatever resource this node needs (file handle, socket,
    /// model weights). Called once, before `run`.
    async fn open(&mut self, ctx: &NodeContext) -> Result<()>;

    /// Stream to completion: pull from `io.input` (if any), push to
    /// `io.output` (if any), and return once the input side is exhausted
    /// or the node has nothing further to produce.
    async fn run(&mut self, ctx: &NodeContext, io: NodeIo) -> Result<()>;

    /// Release the node's resource. Idempotent: the engine may call this
    /// more than once during shutdown and a second call must be a no-op
    /// rather than an error.
    async fn close(&mut self) -> Result<()>;

    /// A JSON snapshot of whatever this node considers its current status,
    /// returned to an external `STATUS` request.
    fn status(&self) -> Option<serde_json::Value> {
        None
    }

    /// Handle a control-surface request addressed to this node. The
    /// default rejects every request; nodes that accept external commands
    /// (e.g. a mute node, spec §8 S5) override this.
    async fn receive_request(&mut self, _args: Vec<ParamValue>) -> std::result::Result<(), ExternalRequestError> {
        Err(ExternalRequestError::Rejected {
            node: "<unbound>".to_string(),
            reason: "this node does not accept requests".to_string(),
        })
    }

    /// Receive a scalar value pushed from the sidechain bus (spec §4.7).
    /// The default ignores it; only nodes that subscribe to a sidechain
    /// channel (e.g. the compressor reading its own gain reduction back)
    /// override this.
    fn receive_sidechain(&mut self, _channel: &str, _value: f64) {}

    /// Return a cloneable handle the control surface can call into for the
    /// rest of this node's life, obtained once, before the node is handed
    /// to `run()`. The default is `None`: most nodes are not externally
    /// controllable. Nodes that are (e.g. a mute node) back this with
    /// shared state they also read from `run()`.
    fn control_handle(&self) -> Option<Arc<dyn ControlHandle>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_output_is_compatible_with_audio_input_only() {
        assert!(PortType::Audio.compatible_with(PortType::Audio));
        assert!(!PortType::Audio.compatible_with(PortType::Text));
        assert!(!PortType::None.compatible_with(PortType::Audio));
    }
}
