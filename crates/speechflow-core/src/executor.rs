//! Graph executor (spec §4.6): opens every node, captures time-zero,
//! pipes streams across current edges, and resolves once every node's
//! `run()` has returned.

use crate::error::{Result, SpeechFlowError};
use crate::graph::{Graph, NodeId};
use crate::node::{EventSink, Node, NodeContext, NodeEvent, NodeIo};
use crate::registry::NodeRegistry;
use crate::shutdown::{run_shutdown_sequence, ShutdownCoordinator, ShutdownReason, Stoppable};
use crate::streaming::edge_channel;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};

/// A node notification (spec §4.8: "every node's `send-response` event is
/// serialized as `{response:"NOTIFY", node, args}`"), fanned out to every
/// subscriber — normally just the control surface's WebSocket broadcaster.
pub type NotifyBroadcast = broadcast::Sender<(String, serde_json::Value)>;

/// Everything the executor produced while running the graph to
/// completion, handed back to the caller for a final shutdown/report step.
pub struct ExecutionOutcome {
    pub time_zero: Instant,
    pub node_errors: Vec<(NodeId, SpeechFlowError)>,
}

/// Run a graph to completion: open (rolling back on failure), capture
/// time-zero, pipe streams, and wait for every node to finish.
///
/// On success or on a node-level stream error, control returns once all
/// nodes' `run()` calls have resolved; node-level errors are collected
/// rather than aborting the whole graph (spec §7: a StreamError is local
/// to the owning node, the graph still converges to shutdown).
pub async fn run_to_completion(
    mut graph: Graph,
    control_registry: &NodeRegistry,
    notify: Option<NotifyBroadcast>,
) -> Result<(ExecutionOutcome, Vec<(String, Box<dyn Node>)>)> {
    let ids: Vec<NodeId> = graph.node_ids().cloned().collect();
    let mut nodes: HashMap<NodeId, Box<dyn Node>> = HashMap::with_capacity(ids.len());
    for id in &ids {
        nodes.insert(id.clone(), graph.take_node(id).expect("node present for its own id"));
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel::<(String, NodeEvent)>();
    spawn_event_logger(events_rx, notify);

    // Step 1: open every node in construction order; an open failure
    // rolls back everything opened so far, in reverse order. While we
    // still hold exclusive access to each node, register its control
    // handle (if any) so the control surface can reach it once `run()`
    // takes over (spec §9 "arena + id").
    let mut opened: Vec<NodeId> = Vec::with_capacity(ids.len());
    let open_time_zero = Instant::now();
    for id in &ids {
        let node = nodes.get_mut(id).expect("node registered");
        let ctx = NodeContext {
            node_id: id.to_string(),
            time_zero: open_time_zero,
            events: EventSink::new(id.to_string(), events_tx.clone()),
        };
        if let Err(err) = node.open(&ctx).await {
            for rollback_id in opened.into_iter().rev() {
                if let Some(n) = nodes.get_mut(&rollback_id) {
                    let _ = n.close().await;
                }
            }
            return Err(err);
        }
        if let Some(handle) = node.control_handle() {
            control_registry.register(id.to_string(), handle);
        }
        opened.push(id.clone());
    }

    // Step 2: capture time-zero after every open has happened-before it.
    let time_zero = Instant::now();

    // Step 3/4: pipe current edges and spawn each node's run loop, with a
    // per-node finish watcher realized as its JoinHandle.
    let mut outputs: HashMap<NodeId, crate::streaming::ChunkSender> = HashMap::new();
    let mut inputs: HashMap<NodeId, crate::streaming::ChunkReceiver> = HashMap::new();
    for (a, b) in graph.edges() {
        let (tx, rx) = edge_channel();
        outputs.insert(a.clone(), tx);
        inputs.insert(b.clone(), rx);
    }

    let mut handles = Vec::with_capacity(ids.len());
    for id in &ids {
        let mut node = nodes.remove(id).expect("node registered");
        let io = NodeIo {
            input: inputs.remove(id),
            output: outputs.remove(id),
        };
        let ctx = NodeContext {
            node_id: id.to_string(),
            time_zero,
            events: EventSink::new(id.to_string(), events_tx.clone()),
        };
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            let result = node.run(&ctx, io).await;
            (id, node, result)
        }));
    }

    let mut finished = Vec::with_capacity(handles.len());
    let mut node_errors = Vec::new();
    for handle in handles {
        match handle.await {
            Ok((id, node, Ok(()))) => finished.push((id.to_string(), node)),
            Ok((id, node, Err(err))) => {
                tracing::warn!(node = %id, error = %err, "node stream error");
                node_errors.push((id.clone(), err));
                finished.push((id.to_string(), node));
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "node task panicked");
            }
        }
    }

    Ok((ExecutionOutcome { time_zero, node_errors }, finished))
}

/// Drive a graph through the full open -> run -> shutdown lifecycle,
/// triggering [`ShutdownReason::Finished`] once every node's `run()` has
/// returned, and deferring to whichever reason won the race if a signal
/// or user stop arrived first.
pub async fn execute(
    graph: Graph,
    shutdown: Arc<ShutdownCoordinator>,
    control_surfaces: Vec<Arc<dyn Stoppable>>,
    control_registry: Arc<NodeRegistry>,
    notify: Option<NotifyBroadcast>,
) -> Result<i32> {
    let (outcome, nodes) = run_to_completion(graph, &control_registry, notify).await?;
    let _ = outcome.time_zero;
    shutdown.trigger(ShutdownReason::Finished);
    let reason = shutdown.wait().await;
    run_shutdown_sequence(&control_surfaces, nodes).await;
    control_registry.clear();
    Ok(reason.exit_code())
}

fn spawn_event_logger(mut events_rx: mpsc::UnboundedReceiver<(String, NodeEvent)>, notify: Option<NotifyBroadcast>) {
    tokio::spawn(async move {
        while let Some((node_id, event)) = events_rx.recv().await {
            match event {
                NodeEvent::Log { level, message } => match level {
                    tracing::Level::ERROR => tracing::error!(node = %node_id, "{message}"),
                    tracing::Level::WARN => tracing::warn!(node = %node_id, "{message}"),
                    tracing::Level::INFO => tracing::info!(node = %node_id, "{message}"),
                    tracing::Level::DEBUG => tracing::debug!(node = %node_id, "{message}"),
                    tracing::Level::TRACE => tracing::trace!(node = %node_id, "{message}"),
                },
                NodeEvent::Notify { args } => {
                    if let Some(tx) = &notify {
                        let _ = tx.send((node_id, args));
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as SfResult;
    use crate::graph::GraphBuilder;
    use crate::node::PortType;
    use crate::chunk::{Chunk, ChunkKind, Payload};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Source {
        remaining: u32,
    }

    #[async_trait]
    impl Node for Source {
        fn input_port(&self) -> PortType {
            PortType::None
        }
        fn output_port(&self) -> PortType {
            PortType::Text
        }
        async fn open(&mut self, _ctx: &NodeContext) -> SfResult<()> {
            Ok(())
        }
        async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> SfResult<()> {
            let tx = io.output.expect("source has an output");
            for i in 0..self.remaining {
                let chunk = Chunk::new(
                    Duration::from_millis(i as u64 * 10),
                    Duration::from_millis(i as u64 * 10 + 10),
                    ChunkKind::Final,
                    Payload::Text(format!("chunk-{i}")),
                );
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            Ok(())
        }
        async fn close(&mut self) -> SfResult<()> {
            Ok(())
        }
    }

    struct Sink {
        received: Arc<std::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Node for Sink {
        fn input_port(&self) -> PortType {
            PortType::Text
        }
        fn output_port(&self) -> PortType {
            PortType::None
        }
        async fn open(&mut self, _ctx: &NodeContext) -> SfResult<()> {
            Ok(())
        }
        async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> SfResult<()> {
            let mut rx = io.input.expect("sink has an input");
            while let Some(chunk) = rx.recv().await {
                if let Some(text) = chunk.payload.as_text() {
                    self.received.lock().unwrap().push(text.to_string());
                }
            }
            Ok(())
        }
        async fn close(&mut self) -> SfResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pipes_chunks_from_source_to_sink_in_order() {
        let received = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut builder = GraphBuilder::new();
        let source = builder.create_node("source", |_| Box::new(Source { remaining: 3 }));
        let sink = builder.create_node("sink", {
            let received = Arc::clone(&received);
            move |_| Box::new(Sink { received })
        });
        builder.connect_node(source, sink);
        let graph = builder.finish().unwrap();

        let registry = crate::registry::NodeRegistry::new();
        let (outcome, _nodes) = run_to_completion(graph, &registry, None).await.unwrap();
        assert!(outcome.node_errors.is_empty());
        assert_eq!(*received.lock().unwrap(), vec!["chunk-0", "chunk-1", "chunk-2"]);
    }
}
