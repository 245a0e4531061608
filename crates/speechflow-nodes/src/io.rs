//! File and passthrough I/O nodes: the minimal source/sink/tee building
//! blocks used to wire up S1 (file -> passthrough -> file) and any graph
//! that needs plain standard-I/O duplex behavior (spec §4.4 "tee/passthrough").

use async_trait::async_trait;
use speechflow_core::error::{ResourceError, Result, StreamError};
use speechflow_core::{Chunk, ChunkKind, MediaType, Node, NodeContext, NodeIo, Payload, PortType, SpeechFlowError};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Reads a file once on `open()` and streams it out as fixed-size chunks,
/// one `ChunkKind::Final` chunk per slice, with synthetic timestamps
/// derived from byte offset and `bytes_per_second`.
pub struct FileSourceNode {
    path: PathBuf,
    media: MediaType,
    chunk_bytes: usize,
    bytes_per_second: u64,
    data: Option<Vec<u8>>,
}

impl FileSourceNode {
    pub fn new(path: PathBuf, media: MediaType, chunk_bytes: usize, bytes_per_second: u64) -> Self {
        Self { path, media, chunk_bytes, bytes_per_second, data: None }
    }
}

#[async_trait]
impl Node for FileSourceNode {
    fn input_port(&self) -> PortType {
        PortType::None
    }

    fn output_port(&self) -> PortType {
        match self.media {
            MediaType::Audio => PortType::Audio,
            MediaType::Text => PortType::Text,
        }
    }

    async fn open(&mut self, _ctx: &NodeContext) -> Result<()> {
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|e| SpeechFlowError::resource(self.path.display().to_string(), ResourceError::Io(e)))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)
            .await
            .map_err(|e| SpeechFlowError::resource(self.path.display().to_string(), ResourceError::Io(e)))?;
        self.data = Some(buf);
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("file_source", StreamError::InvalidPayloadType { expected: "audio|text", got: "none" })
        })?;
        let data = self.data.take().unwrap_or_default();
        if data.is_empty() {
            // A zero-byte source produces no chunks at all.
            return Ok(());
        }

        let bytes_per_second = self.bytes_per_second.max(1);
        let mut offset = 0usize;
        while offset < data.len() {
            let end = (offset + self.chunk_bytes).min(data.len());
            let slice = &data[offset..end];
            if slice.is_empty() {
                break;
            }
            let start_ms = (offset as u64 * 1000) / bytes_per_second;
            let end_ms = (end as u64 * 1000) / bytes_per_second;
            let payload = match self.media {
                MediaType::Audio => Payload::Audio(slice.to_vec()),
                MediaType::Text => Payload::Text(String::from_utf8_lossy(slice).into_owned()),
            };
            let chunk = Chunk::new(
                Duration::from_millis(start_ms),
                Duration::from_millis(end_ms),
                ChunkKind::Final,
                payload,
            );
            if tx.send(chunk).await.is_err() {
                break;
            }
            offset = end;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.data = None;
        Ok(())
    }
}

/// Writes every received chunk's payload bytes to a file, in arrival
/// order, flushing on `close()`.
pub struct FileSinkNode {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileSinkNode {
    pub fn new(path: PathBuf) -> Self {
        Self { path, file: None }
    }
}

#[async_trait]
impl Node for FileSinkNode {
    fn input_port(&self) -> PortType {
        PortType::Audio
    }

    fn output_port(&self) -> PortType {
        PortType::None
    }

    async fn open(&mut self, _ctx: &NodeContext) -> Result<()> {
        let file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| SpeechFlowError::resource(self.path.display().to_string(), ResourceError::Io(e)))?;
        self.file = Some(file);
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let mut rx = io.input.ok_or_else(|| {
            SpeechFlowError::stream("file_sink", StreamError::InvalidPayloadType { expected: "audio|text", got: "none" })
        })?;
        while let Some(chunk) = rx.recv().await {
            if let Some(file) = &mut self.file {
                let bytes: &[u8] = match &chunk.payload {
                    Payload::Audio(b) => b,
                    Payload::Text(s) => s.as_bytes(),
                };
                file.write_all(bytes)
                    .await
                    .map_err(|e| SpeechFlowError::resource(self.path.display().to_string(), ResourceError::Io(e)))?;
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush().await;
        }
        Ok(())
    }
}

/// Identity transform: forwards every chunk unchanged. A zero-byte audio
/// payload is dropped rather than forwarded (spec §8 boundary behavior);
/// empty text passes through untouched, since there is no translation
/// step here to skip.
pub struct PassthroughNode {
    media: MediaType,
}

impl PassthroughNode {
    pub fn new(media: MediaType) -> Self {
        Self { media }
    }
}

#[async_trait]
impl Node for PassthroughNode {
    fn input_port(&self) -> PortType {
        match self.media {
            MediaType::Audio => PortType::Audio,
            MediaType::Text => PortType::Text,
        }
    }

    fn output_port(&self) -> PortType {
        self.input_port()
    }

    async fn open(&mut self, _ctx: &NodeContext) -> Result<()> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let mut rx = io.input.ok_or_else(|| {
            SpeechFlowError::stream("passthrough", StreamError::InvalidPayloadType { expected: "audio|text", got: "none" })
        })?;
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("passthrough", StreamError::InvalidPayloadType { expected: "audio|text", got: "none" })
        })?;
        while let Some(chunk) = rx.recv().await {
            if chunk.media_type() == MediaType::Audio && chunk.payload.is_empty() {
                continue;
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use speechflow_core::node::EventSink;
    use speechflow_core::streaming::edge_channel;
    use std::time::Instant;

    fn test_ctx() -> NodeContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        NodeContext { node_id: "test:0".to_string(), time_zero: Instant::now(), events: EventSink::new("test:0", tx) }
    }

    #[tokio::test]
    async fn file_source_and_sink_round_trip_identical_bytes() {
        let tmp = std::env::temp_dir().join(format!("speechflow-s1-{}.pcm", std::process::id()));
        let out = std::env::temp_dir().join(format!("speechflow-s1-out-{}.pcm", std::process::id()));

        let samples: Vec<u8> = (0..96_000u32).flat_map(|i| ((i % 32768) as i16).to_le_bytes()).collect();
        tokio::fs::write(&tmp, &samples).await.unwrap();

        let mut source = FileSourceNode::new(tmp.clone(), MediaType::Audio, 4096, 48_000 * 2);
        let mut passthrough = PassthroughNode::new(MediaType::Audio);
        let mut sink = FileSinkNode::new(out.clone());

        let ctx = test_ctx();
        source.open(&ctx).await.unwrap();
        passthrough.open(&ctx).await.unwrap();
        sink.open(&ctx).await.unwrap();

        let (mid_tx, mid_rx) = edge_channel();
        let (final_tx, final_rx) = edge_channel();

        let source_handle = tokio::spawn({
            let ctx = test_ctx();
            async move { source.run(&ctx, NodeIo { input: None, output: Some(mid_tx) }).await }
        });
        let pass_handle = tokio::spawn({
            let ctx = test_ctx();
            async move { passthrough.run(&ctx, NodeIo { input: Some(mid_rx), output: Some(final_tx) }).await }
        });
        let mut sink_for_run = sink;
        let sink_handle = tokio::spawn({
            let ctx = test_ctx();
            async move {
                sink_for_run.run(&ctx, NodeIo { input: Some(final_rx), output: None }).await.unwrap();
                sink_for_run.close().await.unwrap();
                sink_for_run
            }
        });

        source_handle.await.unwrap().unwrap();
        pass_handle.await.unwrap().unwrap();
        let _sink = sink_handle.await.unwrap();

        let written = tokio::fs::read(&out).await.unwrap();
        assert_eq!(written, samples);

        let _ = tokio::fs::remove_file(&tmp).await;
        let _ = tokio::fs::remove_file(&out).await;
    }
}
