//! Soft-knee compressor/expander (spec §4.10c): per-sample RMS envelope
//! follower feeding a soft-knee gain curve, with an optional sidechain
//! link for ganging two instances together (spec §8 S6).

use async_trait::async_trait;
use speechflow_core::error::{Result, StreamError};
use speechflow_core::sidechain::SidechainBus;
use speechflow_core::{Node, NodeContext, NodeIo, Payload, PortType, SpeechFlowError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicsMode {
    Compressor,
    Expander,
}

/// Which side of the sidechain link this instance plays: `Measure` emits
/// `sidechain-decibel` events at chunk rate; `Adjust` consumes the most
/// recent one from the same bus instead of its own input level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidechainRole {
    None,
    Measure,
    Adjust,
}

pub struct CompressorConfig {
    pub mode: DynamicsMode,
    pub threshold_dbfs: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_db: f64,
    pub floor_dbfs: f64,
    pub stereo_link: bool,
    pub channels: usize,
    pub sample_rate: u32,
    pub sidechain_role: SidechainRole,
    pub sidechain_channel: &'static str,
}

pub struct CompressorNode {
    config: CompressorConfig,
    envelopes: Vec<f64>,
    bus: Option<Arc<SidechainBus>>,
    last_sidechain_db: f64,
}

impl CompressorNode {
    pub fn new(config: CompressorConfig, bus: Option<Arc<SidechainBus>>) -> Self {
        let envelopes = vec![0.0; config.channels.max(1)];
        Self { config, envelopes, bus, last_sidechain_db: f64::NEG_INFINITY }
    }

    fn alpha(time_constant_ms: f64, sample_rate: u32) -> f64 {
        let tau = (time_constant_ms / 1000.0).max(1e-6);
        (-1.0 / (tau * sample_rate as f64)).exp()
    }

    /// Process one interleaved PCM-S16LE buffer in place, returning the
    /// reduction-meter value (dB, <= 0) for channel 0.
    fn process_buffer(&mut self, bytes: &mut [u8]) -> f64 {
        let channels = self.config.channels.max(1);
        let attack_alpha = Self::alpha(self.config.attack_ms, self.config.sample_rate);
        let release_alpha = Self::alpha(self.config.release_ms, self.config.sample_rate);
        let mut reduction_db = 0.0;

        let frame_count = bytes.len() / 2 / channels;
        for frame in 0..frame_count {
            let mut squared = vec![0.0f64; channels];
            for ch in 0..channels {
                let idx = (frame * channels + ch) * 2;
                let sample = i16::from_le_bytes([bytes[idx], bytes[idx + 1]]) as f64 / i16::MAX as f64;
                squared[ch] = sample * sample;
            }

            for ch in 0..channels {
                let alpha = if squared[ch] > self.envelopes[ch] { attack_alpha } else { release_alpha };
                self.envelopes[ch] = alpha * self.envelopes[ch] + (1.0 - alpha) * squared[ch];
            }

            let envelope = if self.config.stereo_link {
                self.envelopes.iter().cloned().fold(0.0, f64::max)
            } else {
                self.envelopes[0]
            };
            let level_dbfs = match self.config.sidechain_role {
                SidechainRole::Adjust => self.last_sidechain_db,
                _ => 20.0 * envelope.sqrt().max(1e-12).log10(),
            };

            let gain_db = self.gain_for_level(level_dbfs);
            reduction_db = gain_db.min(0.0);

            if matches!(self.config.sidechain_role, SidechainRole::Measure) {
                if let Some(bus) = &self.bus {
                    bus.publish(self.config.sidechain_channel, level_dbfs);
                }
            }

            let linear_gain = 10f64.powf((gain_db + self.config.makeup_db) / 20.0);
            for ch in 0..channels {
                let idx = (frame * channels + ch) * 2;
                let sample = i16::from_le_bytes([bytes[idx], bytes[idx + 1]]) as f64 / i16::MAX as f64;
                let adjusted = (sample * linear_gain).clamp(-1.0, 1.0);
                let encoded = (adjusted * i16::MAX as f64).round() as i16;
                let out = encoded.to_le_bytes();
                bytes[idx] = out[0];
                bytes[idx + 1] = out[1];
            }
        }
        reduction_db
    }

    /// Target gain in dB for an input level, per the soft-knee curve.
    fn gain_for_level(&self, level_dbfs: f64) -> f64 {
        let t = self.config.threshold_dbfs;
        let knee = self.config.knee_db.max(0.0);
        let half_knee = knee / 2.0;
        let r = self.config.ratio.max(1.0);

        let slope = |level: f64| -> f64 {
            match self.config.mode {
                DynamicsMode::Compressor => (level - t) * (1.0 / r - 1.0),
                DynamicsMode::Expander => (level - t) * (r - 1.0),
            }
        };

        let mut gain_db = if level_dbfs < t - half_knee {
            match self.config.mode {
                DynamicsMode::Compressor => 0.0,
                DynamicsMode::Expander => slope(level_dbfs),
            }
        } else if level_dbfs > t + half_knee {
            match self.config.mode {
                DynamicsMode::Compressor => slope(level_dbfs),
                DynamicsMode::Expander => 0.0,
            }
        } else {
            // Quadratic soft-knee: blend smoothly across the knee width.
            let x = level_dbfs - (t - half_knee);
            let knee_fraction = if knee > 0.0 { (x * x) / (2.0 * knee * half_knee.max(1e-9) * 2.0) } else { 0.0 };
            let full_slope = slope(level_dbfs);
            match self.config.mode {
                DynamicsMode::Compressor => full_slope * knee_fraction.clamp(0.0, 1.0),
                DynamicsMode::Expander => full_slope * (1.0 - knee_fraction.clamp(0.0, 1.0)),
            }
        };

        if self.config.mode == DynamicsMode::Expander {
            let expected_output = level_dbfs + gain_db;
            if expected_output < self.config.floor_dbfs {
                gain_db = self.config.floor_dbfs - level_dbfs;
            }
        }

        gain_db
    }
}

#[async_trait]
impl Node for CompressorNode {
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
            SpeechFlowError::stream("compressor", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;
        let tx = io.output.ok_or_else(|| {
            SpeechFlowError::stream("compressor", StreamError::InvalidPayloadType { expected: "audio", got: "none" })
        })?;

        let mut sidechain_rx = if self.config.sidechain_role == SidechainRole::Adjust {
            self.bus.as_ref().map(|b| b.subscribe())
        } else {
            None
        };

        while let Some(mut chunk) = rx.recv().await {
            if chunk.payload.is_empty() {
                continue;
            }
            if let Some(rx) = &mut sidechain_rx {
                while let Ok((_, value)) = rx.try_recv() {
                    self.last_sidechain_db = value;
                }
            }
            let reduction = match &mut chunk.payload {
                Payload::Audio(bytes) => self.process_buffer(bytes),
                Payload::Text(_) => {
                    return Err(SpeechFlowError::stream(
                        "compressor",
                        StreamError::InvalidPayloadType { expected: "audio", got: "text" },
                    ))
                }
            };
            chunk.meta.insert("reduction_db", reduction);
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

    fn base_config(mode: DynamicsMode) -> CompressorConfig {
        CompressorConfig {
            mode,
            threshold_dbfs: -18.0,
            ratio: 4.0,
            knee_db: 6.0,
            attack_ms: 5.0,
            release_ms: 80.0,
            makeup_db: 0.0,
            floor_dbfs: -60.0,
            stereo_link: false,
            channels: 1,
            sample_rate: 48_000,
            sidechain_role: SidechainRole::None,
            sidechain_channel: "compressor",
        }
    }

    #[test]
    fn below_threshold_and_knee_gain_is_unity_for_compressor() {
        let node = CompressorNode::new(base_config(DynamicsMode::Compressor), None);
        let gain = node.gain_for_level(-40.0);
        assert_eq!(gain, 0.0);
    }

    #[test]
    fn well_above_threshold_compresses_by_configured_ratio_slope() {
        let node = CompressorNode::new(base_config(DynamicsMode::Compressor), None);
        let gain = node.gain_for_level(-6.0);
        let expected = (-6.0 - (-18.0)) * (1.0 / 4.0 - 1.0);
        assert!((gain - expected).abs() < 1e-9);
        assert!(gain < 0.0);
    }

    #[test]
    fn expander_enforces_floor() {
        let mut config = base_config(DynamicsMode::Expander);
        config.floor_dbfs = -50.0;
        config.ratio = 10.0;
        let node = CompressorNode::new(config, None);
        let gain = node.gain_for_level(-80.0);
        assert!((-80.0 + gain - (-50.0)).abs() < 1e-6);
    }

    #[test]
    fn step_input_produces_monotonic_gain_reduction_buildup() {
        let mut node = CompressorNode::new(base_config(DynamicsMode::Compressor), None);
        let loud_sample: i16 = (0.9 * i16::MAX as f64) as i16;
        let mut bytes = Vec::new();
        for _ in 0..200 {
            bytes.extend_from_slice(&loud_sample.to_le_bytes());
        }
        let reduction = node.process_buffer(&mut bytes);
        assert!(reduction <= 0.0);
        let reduction2 = node.process_buffer(&mut bytes);
        assert!(reduction2 <= reduction, "gain reduction should deepen as the envelope catches up to a sustained step");
    }
}
