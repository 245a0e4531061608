//! The chunk and time model (spec §3, §4.1).
//!
//! A [`Chunk`] is the unit of payload that travels along a single edge of
//! the graph. Chunks are immutable except for their metadata map and for
//! in-place timestamp adjustments performed by splitting transforms (see
//! `speechflow-nodes::sentence_splitter`).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a chunk is a committed result or a revisable hypothesis.
///
/// Intermediate chunks may be superseded by a later final chunk covering an
/// overlapping span; final chunks, once emitted, are never retracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Intermediate,
    Final,
}

impl ChunkKind {
    pub fn is_final(self) -> bool {
        matches!(self, ChunkKind::Final)
    }
}

/// The two payload families a node port can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Text,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Text => write!(f, "text"),
        }
    }
}

/// A chunk's payload, tagged by media family.
///
/// Representing payload and media type as one enum (rather than a
/// `MediaType` field alongside a raw byte buffer) makes "payload type and
/// `type` must agree" (spec §3) a structural invariant instead of a runtime
/// check: there is no way to construct an audio-tagged chunk carrying text
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Payload {
    /// Interleaved PCM-S16LE samples.
    Audio(Vec<u8>),
    /// UTF-8 text.
    Text(String),
}

impl Payload {
    pub fn media_type(&self) -> MediaType {
        match self {
            Payload::Audio(_) => MediaType::Audio,
            Payload::Text(_) => MediaType::Text,
        }
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Audio(bytes) => bytes.len(),
            Payload::Text(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    pub fn as_audio(&self) -> Option<&[u8]> {
        match self {
            Payload::Audio(bytes) => Some(bytes),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Audio(_) => None,
        }
    }
}

/// Ordered string-keyed metadata map with last-writer-wins merge semantics.
///
/// Values are `serde_json::Value` so a node can stash scalars (`"gender" ->
/// "female"`) as well as structured data (`"words" -> [{word,start,end}]`,
/// spec §3) without the engine needing to know the shape in advance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta(Vec<(String, serde_json::Value)>);

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Insert `key -> value`. If `key` is already present its value is
    /// replaced in place, preserving the key's original position; this
    /// realizes the "last writer wins per key" rule from spec §3 without
    /// reshuffling iteration order on overwrite.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.0.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        if let Some(pos) = self.0.iter().position(|(k, _)| k == key) {
            Some(self.0.remove(pos).1)
        } else {
            None
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, `other` winning on key collisions.
    pub fn merge_from(&mut self, other: &Meta) {
        for (k, v) in other.iter() {
            self.insert(k.to_string(), v.clone());
        }
    }
}

/// A timestamped unit of payload traveling on a single edge (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub timestamp_start: Duration,
    pub timestamp_end: Duration,
    pub kind: ChunkKind,
    pub payload: Payload,
    pub meta: Meta,
}

impl Chunk {
    pub fn new(timestamp_start: Duration, timestamp_end: Duration, kind: ChunkKind, payload: Payload) -> Self {
        debug_assert!(timestamp_start <= timestamp_end, "timestamp_start must be <= timestamp_end");
        Self {
            timestamp_start,
            timestamp_end,
            kind,
            payload,
            meta: Meta::new(),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.payload.media_type()
    }

    pub fn duration(&self) -> Duration {
        self.timestamp_end.saturating_sub(self.timestamp_start)
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    /// Deep copy: payload and metadata are duplicated, not shared.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_last_writer_wins_keeps_position() {
        let mut meta = Meta::new();
        meta.insert("a", 1);
        meta.insert("b", 2);
        meta.insert("a", 3);
        let collected: Vec<_> = meta.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        assert_eq!(collected[0].0, "a");
        assert_eq!(collected[0].1, serde_json::json!(3));
        assert_eq!(collected[1].0, "b");
    }

    #[test]
    fn payload_media_type_matches_variant() {
        let p = Payload::Audio(vec![1, 2, 3]);
        assert_eq!(p.media_type(), MediaType::Audio);
        let p = Payload::Text("hi".into());
        assert_eq!(p.media_type(), MediaType::Text);
    }

    #[test]
    fn chunk_duration_is_end_minus_start() {
        let c = Chunk::new(
            Duration::from_millis(100),
            Duration::from_millis(250),
            ChunkKind::Final,
            Payload::Text("x".into()),
        );
        assert_eq!(c.duration(), Duration::from_millis(150));
    }
}
