//! Sentence splitter (spec §4.10a): text in, text out, splitting on
//! sentence boundaries with an optional interim preview of trailing
//! unterminated text.

use async_trait::async_trait;
use regex::Regex;
use speechflow_core::cursor_queue::CursorQueue;
use speechflow_core::error::{ConfigError, Result, StreamError};
use speechflow_core::{Chunk, ChunkKind, Node, NodeContext, NodeIo, Payload, PortType, SpeechFlowError};
use std::time::{Duration, Instant};

const SENTENCE_BOUNDARY: &str = r"^(.+?[.;?!])(?:\s+(.*))?$";

#[derive(Debug, Clone)]
enum Elem {
    Frame(TextFrame),
    Eof,
}

#[derive(Debug, Clone)]
struct TextFrame {
    chunk: Chunk,
    complete: bool,
    previewed: bool,
    pending_since: Option<Instant>,
}

/// Splits incoming final text chunks on sentence boundaries, merging
/// fragments across chunk boundaries as needed and optionally surfacing
/// an `intermediate` preview of text that hasn't reached a boundary yet.
pub struct SentenceSplitterNode {
    boundary: Regex,
    interim: bool,
    timeout: Duration,
    queue: CursorQueue<Elem>,
}

impl SentenceSplitterNode {
    pub fn new(interim: bool, timeout: Duration) -> Result<Self> {
        let boundary = Regex::new(SENTENCE_BOUNDARY).map_err(|e| {
            SpeechFlowError::Config(ConfigError::InvalidEngineConfig(format!(
                "invalid sentence boundary regex: {e}"
            )))
        })?;
        Ok(Self {
            boundary,
            interim,
            timeout,
            queue: CursorQueue::new(["recv", "split", "send"]),
        })
    }

    /// Drain all processing possible at the `split` cursor right now,
    /// looping internally since a single merge can make the next element
    /// immediately splittable too.
    fn process_split(&mut self) {
        loop {
            let progressed = match self.queue.peek("split", 0).cloned() {
                None => false,
                Some(Elem::Eof) => {
                    self.queue.walk("split", 1);
                    false
                }
                Some(Elem::Frame(frame)) if frame.complete => {
                    self.queue.walk("split", 1);
                    true
                }
                Some(Elem::Frame(frame)) => self.process_frame(frame),
            };
            if !progressed {
                break;
            }
        }
    }

    fn process_frame(&mut self, frame: TextFrame) -> bool {
        let text = frame.chunk.payload.as_text().unwrap_or_default().to_string();
        if let Some(captures) = self.boundary.captures(&text) {
            let first = captures.get(1).map(|m| m.as_str()).unwrap_or_default().to_string();
            let remainder = captures.get(2).map(|m| m.as_str().trim().to_string()).filter(|s| !s.is_empty());

            let total_len = text.len().max(1);
            let first_ratio = first.len() as f64 / total_len as f64;
            let span = frame.chunk.timestamp_end.saturating_sub(frame.chunk.timestamp_start);
            let split_offset = Duration::from_secs_f64(span.as_secs_f64() * first_ratio);
            let split_at = frame.chunk.timestamp_start + split_offset;

            let mut first_chunk = Chunk::new(
                frame.chunk.timestamp_start,
                split_at,
                ChunkKind::Final,
                Payload::Text(first),
            );
            first_chunk.meta = frame.chunk.meta.clone();

            if let Some(tx) = self.queue.peek_mut("split", 0) {
                if let Elem::Frame(f) = tx {
                    f.chunk = first_chunk;
                    f.complete = true;
                    f.previewed = false;
                    f.pending_since = None;
                }
            }
            self.queue.walk("split", 1);

            if let Some(remainder_text) = remainder {
                let remainder_frame = TextFrame {
                    chunk: Chunk::new(split_at, frame.chunk.timestamp_end, ChunkKind::Final, Payload::Text(remainder_text)),
                    complete: false,
                    previewed: false,
                    pending_since: None,
                };
                self.queue.insert("split", Elem::Frame(remainder_frame));
                // `insert` shifts cursors at-or-after the insertion point
                // forward so they keep addressing what they addressed
                // before (spec §8 property 5); here we want `split` to
                // land on the freshly inserted remainder instead, so step
                // it back by one.
                self.queue.walk("split", -1);
            }
            true
        } else {
            self.try_merge_forward(frame)
        }
    }

    /// No boundary in this frame: merge it into the next frame if one
    /// exists, otherwise mark it pending for eventual timeout promotion.
    fn try_merge_forward(&mut self, frame: TextFrame) -> bool {
        match self.queue.peek("split", 1).cloned() {
            Some(Elem::Frame(next)) => {
                let a = frame.chunk.payload.as_text().unwrap_or_default();
                let b = next.chunk.payload.as_text().unwrap_or_default();
                let merged_text = if a.ends_with(char::is_whitespace) || b.starts_with(char::is_whitespace) || a.is_empty() {
                    format!("{a}{b}")
                } else {
                    format!("{a} {b}")
                };
                let merged = TextFrame {
                    chunk: Chunk::new(
                        frame.chunk.timestamp_start.min(next.chunk.timestamp_start),
                        next.chunk.timestamp_end,
                        ChunkKind::Final,
                        Payload::Text(merged_text),
                    ),
                    complete: false,
                    previewed: false,
                    pending_since: None,
                };
                // Replace the current element with the merge result, then
                // delete the element that used to follow it.
                if let Some(slot) = self.queue.peek_mut("split", 0) {
                    *slot = Elem::Frame(merged);
                }
                self.queue.walk("split", 1);
                self.queue.delete("split");
                self.queue.walk("split", -1);
                true
            }
            _ => {
                if let Some(slot) = self.queue.peek_mut("split", 0) {
                    if let Elem::Frame(f) = slot {
                        if f.pending_since.is_none() {
                            f.pending_since = Some(Instant::now());
                        }
                    }
                }
                false
            }
        }
    }

    /// Emit every consecutive `complete` frame at `send`, then at most one
    /// preview/promotion step for the frame blocking further progress.
    /// Returns `false` once nothing more can be emitted right now.
    async fn emit_ready(&mut self, tx: &speechflow_core::streaming::ChunkSender) -> Result<bool> {
        let mut emitted_any = false;
        loop {
            match self.queue.peek("send", 0).cloned() {
                Some(Elem::Frame(frame)) if frame.complete => {
                    let chunk = frame.chunk.clone();
                    self.queue.read("send");
                    if tx.send(chunk).await.is_err() {
                        return Err(SpeechFlowError::stream("sentence_splitter", StreamError::WriteAfterClose));
                    }
                    emitted_any = true;
                }
                Some(Elem::Frame(frame)) => {
                    if let Some(since) = frame.pending_since {
                        if since.elapsed() >= self.timeout {
                            if let Some(slot) = self.queue.peek_mut("send", 0) {
                                if let Elem::Frame(f) = slot {
                                    f.complete = true;
                                }
                            }
                            continue;
                        }
                    }
                    if self.interim && !frame.previewed && frame.pending_since.is_some() {
                        let mut preview = frame.chunk.clone();
                        preview.kind = ChunkKind::Intermediate;
                        if let Some(slot) = self.queue.peek_mut("send", 0) {
                            if let Elem::Frame(f) = slot {
                                f.previewed = true;
                            }
                        }
                        if tx.send(preview).await.is_err() {
                            return Err(SpeechFlowError::stream("sentence_splitter", StreamError::WriteAfterClose));
                        }
                        emitted_any = true;
                    }
                    break;
                }
                _ => break,
            }
        }
        Ok(emitted_any)
    }

    fn ingest_finished_and_drained(&self) -> bool {
        matches!(self.queue.peek("send", 0), Some(Elem::Eof) | None)
    }
}

#[async_trait]
impl Node for SentenceSplitterNode {
    fn input_port(&self) -> PortType {
        PortType::Text
    }

    fn output_port(&self) -> PortType {
        PortType::Text
    }

    async fn open(&mut self, _ctx: &NodeContext) -> Result<()> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let mut rx = io.input.ok_or_else(|| {
            SpeechFlowError::stream("sentence_splitter", StreamError::InvalidPayloadType { expected: "text", got: "none" })
        })?;
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("sentence_splitter", StreamError::InvalidPayloadType { expected: "text", got: "none" })
        })?;

        let notify = self.queue.notify_handle();
        let mut retry = tokio::time::interval(Duration::from_millis(100));
        let mut ingest_done = false;

        loop {
            tokio::select! {
                maybe_chunk = rx.recv(), if !ingest_done => {
                    match maybe_chunk {
                        Some(chunk) => self.queue.append(Elem::Frame(TextFrame {
                            chunk,
                            complete: false,
                            previewed: false,
                            pending_since: None,
                        })),
                        None => {
                            self.queue.append(Elem::Eof);
                            ingest_done = true;
                        }
                    }
                    // `recv` marks how far ingestion has advanced; it has to
                    // move past every appended element or `trim()` (which
                    // only drops up to the minimum cursor) never reclaims
                    // anything.
                    self.queue.walk("recv", 1);
                }
                _ = notify.notified() => {}
                _ = retry.tick() => {}
            }

            self.process_split();
            self.emit_ready(&tx).await?;
            self.queue.trim();

            if ingest_done && self.ingest_finished_and_drained() {
                break;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechflow_core::node::EventSink;
    use speechflow_core::streaming::edge_channel;
    use std::time::Duration as StdDuration;

    fn text_chunk(start_ms: u64, end_ms: u64, text: &str) -> Chunk {
        Chunk::new(
            StdDuration::from_millis(start_ms),
            StdDuration::from_millis(end_ms),
            ChunkKind::Final,
            Payload::Text(text.to_string()),
        )
    }

    fn test_ctx() -> NodeContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        NodeContext {
            node_id: "splitter:0".to_string(),
            time_zero: Instant::now(),
            events: EventSink::new("splitter:0", tx),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn splits_and_merges_across_chunk_boundaries_then_times_out() {
        let mut node = SentenceSplitterNode::new(false, StdDuration::from_millis(3000)).unwrap();
        let (in_tx, in_rx) = edge_channel();
        let (out_tx, mut out_rx) = edge_channel();
        let ctx = test_ctx();

        let run_handle = tokio::spawn(async move {
            node.run(&ctx, NodeIo { input: Some(in_rx), output: Some(out_tx) }).await
        });

        in_tx.send(text_chunk(0, 1000, "Hello world.")).await.unwrap();
        in_tx.send(text_chunk(1000, 2000, "This is a ")).await.unwrap();
        in_tx.send(text_chunk(2000, 3000, "test. And more")).await.unwrap();

        let first = out_rx.recv().await.unwrap();
        assert_eq!(first.payload.as_text(), Some("Hello world."));
        assert_eq!(first.kind, ChunkKind::Final);

        let second = out_rx.recv().await.unwrap();
        assert_eq!(second.payload.as_text(), Some("This is a test."));

        tokio::time::advance(StdDuration::from_millis(3100)).await;

        let third = out_rx.recv().await.unwrap();
        assert_eq!(third.payload.as_text(), Some("And more"));
        assert_eq!(third.kind, ChunkKind::Final);

        drop(in_tx);
        run_handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn interim_mode_previews_then_promotes() {
        let mut node = SentenceSplitterNode::new(true, StdDuration::from_millis(500)).unwrap();
        let (in_tx, in_rx) = edge_channel();
        let (out_tx, mut out_rx) = edge_channel();
        let ctx = test_ctx();

        let run_handle = tokio::spawn(async move {
            node.run(&ctx, NodeIo { input: Some(in_rx), output: Some(out_tx) }).await
        });

        in_tx.send(text_chunk(0, 500, "Partial text without")).await.unwrap();

        tokio::time::advance(StdDuration::from_millis(150)).await;
        let preview = out_rx.recv().await.unwrap();
        assert_eq!(preview.kind, ChunkKind::Intermediate);
        assert_eq!(preview.payload.as_text(), Some("Partial text without"));

        tokio::time::advance(StdDuration::from_millis(600)).await;
        let final_chunk = out_rx.recv().await.unwrap();
        assert_eq!(final_chunk.kind, ChunkKind::Final);
        assert_eq!(final_chunk.payload.as_text(), Some("Partial text without"));

        drop(in_tx);
        run_handle.await.unwrap().unwrap();
    }
}
