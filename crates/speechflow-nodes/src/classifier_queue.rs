//! Sliding-window classifier queue (spec §4.10b): audio in, audio out,
//! tagging each frame with a scalar classification (gender, VAD, ...)
//! computed over a trailing window, with position-based hysteresis so the
//! queue always makes progress and score-based hysteresis so the label
//! doesn't chatter between near-tied classes.

use async_trait::async_trait;
use speechflow_core::cursor_queue::CursorQueue;
use speechflow_core::error::{Result, StreamError};
use speechflow_core::{Chunk, Node, NodeContext, NodeIo, Payload, PortType, SpeechFlowError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Elem {
    Audio { chunk: Chunk, samples: Vec<f32>, label: Option<String> },
    Eof,
}

/// A classifier function: given a window of resampled F32@16kHz samples,
/// return `(label, score)` for each candidate class it considered, most
/// confident last (so `.last()` is the winner before hysteresis).
pub type Classifier = Box<dyn Fn(&[f32]) -> Vec<(String, f64)> + Send>;

/// Resamples incoming PCM-S16LE@48kHz audio to F32@16kHz, classifies it
/// over a sliding window, and tags each outgoing frame's metadata with the
/// winning label once hysteresis has settled on it.
pub struct ClassifierQueueNode {
    classify: Classifier,
    window_samples: usize,
    fill_threshold: f64,
    hysteresis_margin: f64,
    silence_floor_dbfs: f64,
    meta_key: &'static str,
    source_sample_rate: u32,
    target_sample_rate: u32,
    queue: CursorQueue<Elem>,
    current_label: Option<String>,
}

impl ClassifierQueueNode {
    pub fn new(
        classify: Classifier,
        window_ms: u64,
        fill_threshold: f64,
        hysteresis_margin: f64,
        silence_floor_dbfs: f64,
        meta_key: &'static str,
        source_sample_rate: u32,
    ) -> Self {
        let target_sample_rate = 16_000;
        let window_samples = (target_sample_rate as u64 * window_ms / 1000) as usize;
        Self {
            classify,
            window_samples,
            fill_threshold,
            hysteresis_margin,
            silence_floor_dbfs,
            meta_key,
            source_sample_rate,
            target_sample_rate,
            queue: CursorQueue::new(["recv", "ac", "send"]),
            current_label: None,
        }
    }

    /// Cubic resample from `source_sample_rate` PCM-S16LE to
    /// `target_sample_rate` F32 mono samples in `[-1.0, 1.0]`.
    fn resample_pcm16(&self, bytes: &[u8]) -> Vec<f32> {
        let input: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect();
        if input.is_empty() {
            return Vec::new();
        }
        let ratio = self.target_sample_rate as f64 / self.source_sample_rate as f64;
        let out_len = ((input.len() as f64) * ratio).round().max(1.0) as usize;
        let mut output = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let src_pos = i as f64 / ratio;
            output.push(cubic_interpolate(&input, src_pos));
        }
        output
    }

    fn rms_dbfs(samples: &[f32]) -> f64 {
        if samples.is_empty() {
            return f64::NEG_INFINITY;
        }
        let sum_sq: f64 = samples.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        let rms = (sum_sq / samples.len() as f64).sqrt();
        20.0 * rms.max(1e-12).log10()
    }

    /// Try to accumulate and classify one window starting at `ac`; returns
    /// true if it made progress (advanced `ac` past a labeled window).
    fn process_window(&mut self) -> bool {
        let mut window = Vec::with_capacity(self.window_samples);
        let mut frame_bounds = Vec::new(); // (frame_index_from_ac, samples_taken)
        let mut i = 0isize;
        loop {
            match self.queue.peek("ac", i) {
                Some(Elem::Audio { samples, .. }) => {
                    let take = samples.len().min(self.window_samples - window.len());
                    window.extend_from_slice(&samples[..take]);
                    frame_bounds.push(take);
                    i += 1;
                    if window.len() >= self.window_samples {
                        break;
                    }
                }
                Some(Elem::Eof) | None => break,
            }
        }

        if window.is_empty() {
            return false;
        }

        let fill_ratio = window.len() as f64 / self.window_samples as f64;
        if fill_ratio < self.fill_threshold && !matches!(self.queue.peek("ac", i), Some(Elem::Eof)) {
            return false;
        }

        let dbfs = Self::rms_dbfs(&window);
        let winner = if dbfs < self.silence_floor_dbfs {
            self.current_label.clone()
        } else {
            self.pick_with_hysteresis((self.classify)(&window))
        };

        // Assign the label to the first 25% of frames consumed by this
        // window (hysteresis-in-position), advance `ac` past exactly
        // those frames, and leave the rest for the next window.
        let consumed_frames = frame_bounds.len().max(1);
        let label_frame_count = ((consumed_frames as f64) * 0.25).ceil() as usize;
        let label_frame_count = label_frame_count.max(1).min(consumed_frames);

        for idx in 0..label_frame_count {
            if let Some(slot) = self.queue.peek_mut("ac", idx as isize) {
                if let Elem::Audio { label, .. } = slot {
                    *label = winner.clone();
                }
            }
        }
        self.current_label = winner;
        self.queue.walk("ac", label_frame_count as isize);
        true
    }

    fn pick_with_hysteresis(&self, mut scores: Vec<(String, f64)>) -> Option<String> {
        if scores.is_empty() {
            return self.current_label.clone();
        }
        scores.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        let (top_label, top_score) = scores.last().cloned().unwrap();
        let runner_up = scores.iter().rev().nth(1).map(|(_, s)| *s).unwrap_or(f64::NEG_INFINITY);

        match &self.current_label {
            Some(current) if *current == top_label => Some(top_label),
            _ => {
                if top_score - runner_up >= self.hysteresis_margin {
                    Some(top_label)
                } else {
                    self.current_label.clone()
                }
            }
        }
    }

    async fn emit_ready(&mut self, tx: &speechflow_core::streaming::ChunkSender) -> Result<()> {
        loop {
            match self.queue.peek("send", 0).cloned() {
                Some(Elem::Audio { label: Some(_), .. }) => {
                    if let Some(Elem::Audio { chunk, label, .. }) = self.queue.read("send") {
                        let mut chunk = chunk;
                        if let Some(label) = label {
                            chunk.meta.insert(self.meta_key, label);
                        }
                        if tx.send(chunk).await.is_err() {
                            return Err(SpeechFlowError::stream("classifier_queue", StreamError::WriteAfterClose));
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }
}

fn cubic_interpolate(data: &[f32], pos: f64) -> f32 {
    let i1 = pos.floor() as isize;
    let frac = (pos - i1 as f64) as f32;
    let at = |idx: isize| -> f32 {
        let clamped = idx.clamp(0, data.len() as isize - 1) as usize;
        data[clamped]
    };
    let p0 = at(i1 - 1);
    let p1 = at(i1);
    let p2 = at(i1 + 1);
    let p3 = at(i1 + 2);
    let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
    let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
    let c = -0.5 * p0 + 0.5 * p2;
    let d = p1;
    ((a * frac + b) * frac + c) * frac + d
}

#[async_trait]
impl Node for ClassifierQueueNode {
    fn input_port(&self) -> PortType {
        PortType::Audio
    }

    fn output_port(&self) -> PortType {
        PortType::Audio
    }

    async fn open(&mut self, _ctx: &NodeContext) -> Result<()> {
        Ok(())
    }

    async fn run(&mut self, _ctx: &NodeContext, io: NodeIo) -> Result<()> {
        let mut rx = io.input.ok_or_else(|| {
            SpeechFlowError::stream("classifier_queue", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("classifier_queue", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;

        let notify = self.queue.notify_handle();
        let mut retry = tokio::time::interval(Duration::from_millis(100));
        let mut ingest_done = false;

        loop {
            tokio::select! {
                maybe_chunk = rx.recv(), if !ingest_done => {
                    match maybe_chunk {
                        Some(chunk) => {
                            // Zero-byte audio payloads never become a chunk.
                            if !chunk.payload.is_empty() {
                                let bytes = chunk.payload.as_audio().unwrap_or_default();
                                let samples = self.resample_pcm16(bytes);
                                self.queue.append(Elem::Audio { chunk, samples, label: None });
                                // `recv` marks how far ingestion has advanced;
                                // without this, `trim()` (which only drops up
                                // to the minimum cursor) never reclaims
                                // anything the `ac`/`send` cursors pass over.
                                self.queue.walk("recv", 1);
                            }
                        }
                        None => {
                            self.queue.append(Elem::Eof);
                            self.queue.walk("recv", 1);
                            ingest_done = true;
                        }
                    }
                }
                _ = notify.notified() => {}
                _ = retry.tick() => {}
            }

            while self.process_window() {}
            self.emit_ready(&tx).await?;
            self.queue.trim();

            if ingest_done && matches!(self.queue.peek("send", 0), Some(Elem::Eof) | None) {
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

    #[test]
    fn rms_dbfs_of_silence_is_very_negative() {
        let samples = vec![0.0f32; 100];
        assert!(ClassifierQueueNode::rms_dbfs(&samples) < -100.0);
    }

    #[test]
    fn hysteresis_requires_margin_to_switch_label() {
        let node = ClassifierQueueNode::new(Box::new(|_| vec![]), 500, 0.75, 6.0, -45.0, "gender", 48_000);
        let mut node = node;
        node.current_label = Some("male".to_string());
        let tied = vec![("male".to_string(), 0.52), ("female".to_string(), 0.48)];
        assert_eq!(node.pick_with_hysteresis(tied), Some("male".to_string()));

        node.current_label = Some("female".to_string());
        let tied = vec![("male".to_string(), 0.52), ("female".to_string(), 0.48)];
        assert_eq!(node.pick_with_hysteresis(tied), Some("female".to_string()));
    }

    #[test]
    fn hysteresis_switches_once_margin_exceeded() {
        let mut node = ClassifierQueueNode::new(Box::new(|_| vec![]), 500, 0.75, 6.0, -45.0, "gender", 48_000);
        node.current_label = Some("female".to_string());
        let decisive = vec![("female".to_string(), 0.1), ("male".to_string(), 0.95)];
        assert_eq!(node.pick_with_hysteresis(decisive), Some("male".to_string()));
    }
}
