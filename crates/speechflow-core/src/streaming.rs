//! Streaming primitives (spec §4.4): the back-pressured pipe every edge is
//! built from, a couple of general-purpose queue shapes nodes reach for
//! internally, an interval store for time-indexed lookups, fixed-size
//! segment processing, and the deterministic wire codec used when a chunk
//! crosses a process boundary.

use crate::chunk::{Chunk, MediaType, Payload};
use crate::error::{Result, SpeechFlowError, StreamError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// A single edge between two nodes: object-mode, high-water-mark 1. The
/// sender blocks (`.send(...).await`) once one chunk is buffered and the
/// receiver hasn't taken it yet, which is what gives the graph its
/// pull-through-backpressure behaviour without an explicit credit scheme.
pub type ChunkSender = mpsc::Sender<Chunk>;
pub type ChunkReceiver = mpsc::Receiver<Chunk>;

pub fn edge_channel() -> (ChunkSender, ChunkReceiver) {
    mpsc::channel(1)
}

/// Unbounded MPSC queue for fan-in from several producers into one
/// consumer, with a convenience drain for batch processing.
pub struct SingleQueue<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> SingleQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<T> {
        self.tx.clone()
    }

    pub async fn read(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Drain everything currently queued without waiting for more.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T> Default for SingleQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two independently-fed single-producer queues that only yield once a
/// matching pair is available from both sides, for transforms that must
/// line up two related streams (e.g. a text stream and its word-timing
/// side-channel) element by element.
pub struct DoubleQueue<A, B> {
    a: VecDeque<A>,
    b: VecDeque<B>,
}

impl<A, B> DoubleQueue<A, B> {
    pub fn new() -> Self {
        Self { a: VecDeque::new(), b: VecDeque::new() }
    }

    pub fn push_a(&mut self, item: A) {
        self.a.push_back(item);
    }

    pub fn push_b(&mut self, item: B) {
        self.b.push_back(item);
    }

    /// Pop the next `(A, B)` pair if both sides currently have an element
    /// waiting; otherwise leaves both queues untouched.
    pub fn read(&mut self) -> Option<(A, B)> {
        if self.a.is_empty() || self.b.is_empty() {
            return None;
        }
        Some((self.a.pop_front().unwrap(), self.b.pop_front().unwrap()))
    }
}

impl<A, B> Default for DoubleQueue<A, B> {
    fn default() -> Self {
        Self::new()
    }
}

/// An interval-indexed store: entries are kept sorted by start time so
/// `fetch` can stop scanning once it passes the query window.
pub struct TimeStore<T> {
    entries: Vec<(u64, u64, T)>,
}

impl<T> TimeStore<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Insert an entry covering `[start_ms, end_ms)`, keeping entries
    /// ordered by start time.
    pub fn insert(&mut self, start_ms: u64, end_ms: u64, value: T) {
        let idx = self.entries.partition_point(|(s, _, _)| *s <= start_ms);
        self.entries.insert(idx, (start_ms, end_ms, value));
    }

    /// All entries overlapping `[start_ms, end_ms)`.
    pub fn fetch(&self, start_ms: u64, end_ms: u64) -> Vec<&T> {
        self.entries
            .iter()
            .take_while(|(s, _, _)| *s < end_ms)
            .filter(|(s, e, _)| *e > start_ms && *s < end_ms)
            .map(|(_, _, v)| v)
            .collect()
    }

    /// Drop every entry that ends at or before `before_ms`.
    pub fn prune(&mut self, before_ms: u64) {
        self.entries.retain(|(_, e, _)| *e > before_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TimeStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `f` to `data` one fixed-size segment at a time. The final partial
/// segment is zero-padded for the call and the padding is discarded
/// afterwards, so `f` always sees exactly `segment_len` samples and
/// `data`'s length is unchanged on return.
pub fn process_in_segments<F>(data: &mut [i32], segment_len: usize, mut f: F)
where
    F: FnMut(&mut [i32]),
{
    assert!(segment_len > 0, "segment_len must be positive");
    let mut offset = 0;
    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining >= segment_len {
            f(&mut data[offset..offset + segment_len]);
            offset += segment_len;
        } else {
            let mut padded = vec![0i32; segment_len];
            padded[..remaining].copy_from_slice(&data[offset..]);
            f(&mut padded);
            data[offset..].copy_from_slice(&padded[..remaining]);
            offset += remaining;
        }
    }
}

/// Wire representation of a [`Chunk`] for cross-process transport: a fixed
/// field order and millisecond timestamps so two processes built from the
/// same definitions always produce byte-identical CBOR for the same chunk
/// (spec §6: `{timestamp_start_ms, timestamp_end_ms, kind, type, payload:bytes}`).
///
/// `type`/`payload` are carried as a plain media tag plus raw bytes rather
/// than `Payload` itself: `Payload` is internally tagged
/// (`#[serde(tag = "type")]`) over newtype variants, a representation serde
/// cannot serialize (`serialize_tagged_newtype` rejects both a string and a
/// sequence payload), so the envelope flattens it by hand instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkEnvelope {
    timestamp_start_ms: u64,
    timestamp_end_ms: u64,
    kind: crate::chunk::ChunkKind,
    r#type: MediaType,
    payload: Vec<u8>,
    meta: crate::chunk::Meta,
}

impl From<&Chunk> for ChunkEnvelope {
    fn from(c: &Chunk) -> Self {
        let (r#type, payload) = match &c.payload {
            Payload::Audio(bytes) => (MediaType::Audio, bytes.clone()),
            Payload::Text(s) => (MediaType::Text, s.clone().into_bytes()),
        };
        Self {
            timestamp_start_ms: c.timestamp_start.as_millis() as u64,
            timestamp_end_ms: c.timestamp_end.as_millis() as u64,
            kind: c.kind,
            r#type,
            payload,
            meta: c.meta.clone(),
        }
    }
}

impl TryFrom<ChunkEnvelope> for Chunk {
    type Error = SpeechFlowError;

    fn try_from(e: ChunkEnvelope) -> Result<Self> {
        let payload = match e.r#type {
            MediaType::Audio => Payload::Audio(e.payload),
            MediaType::Text => Payload::Text(
                String::from_utf8(e.payload)
                    .map_err(|err| SpeechFlowError::stream("codec", StreamError::External(err.to_string())))?,
            ),
        };
        Ok(Chunk {
            timestamp_start: std::time::Duration::from_millis(e.timestamp_start_ms),
            timestamp_end: std::time::Duration::from_millis(e.timestamp_end_ms),
            kind: e.kind,
            payload,
            meta: e.meta,
        })
    }
}

/// Encode a chunk to deterministic CBOR bytes.
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>> {
    let envelope = ChunkEnvelope::from(chunk);
    let mut buf = Vec::new();
    ciborium::into_writer(&envelope, &mut buf)
        .map_err(|e| SpeechFlowError::stream("codec", StreamError::External(e.to_string())))?;
    Ok(buf)
}

/// Decode a chunk from CBOR bytes produced by [`encode_chunk`].
pub fn decode_chunk(bytes: &[u8]) -> Result<Chunk> {
    let envelope: ChunkEnvelope = ciborium::from_reader(bytes)
        .map_err(|e| SpeechFlowError::stream("codec", StreamError::External(e.to_string())))?;
    envelope.try_into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, Payload};
    use std::time::Duration;

    #[test]
    fn cbor_round_trip_preserves_chunk() {
        let mut chunk = Chunk::new(
            Duration::from_millis(10),
            Duration::from_millis(30),
            ChunkKind::Final,
            Payload::Text("hello".into()),
        );
        chunk.meta.insert("lang", "en");
        let bytes = encode_chunk(&chunk).unwrap();
        let decoded = decode_chunk(&bytes).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn time_store_fetch_returns_overlapping_only() {
        let mut store = TimeStore::new();
        store.insert(0, 100, "a");
        store.insert(100, 200, "b");
        store.insert(500, 600, "c");
        let hits = store.fetch(90, 150);
        assert_eq!(hits, vec![&"a", &"b"]);
    }

    #[test]
    fn time_store_prune_drops_entries_ending_before_cutoff() {
        let mut store = TimeStore::new();
        store.insert(0, 100, "a");
        store.insert(200, 300, "b");
        store.prune(100);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn process_in_segments_pads_and_trims_tail() {
        let mut data = vec![1, 2, 3, 4, 5];
        let mut seen_lens = Vec::new();
        process_in_segments(&mut data, 4, |seg| {
            seen_lens.push(seg.len());
            for s in seg.iter_mut() {
                *s *= 10;
            }
        });
        assert_eq!(seen_lens, vec![4, 4]);
        assert_eq!(data, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn double_queue_only_yields_when_both_sides_ready() {
        let mut q: DoubleQueue<i32, &str> = DoubleQueue::new();
        q.push_a(1);
        assert!(q.read().is_none());
        q.push_b("x");
        assert_eq!(q.read(), Some((1, "x")));
    }
}
