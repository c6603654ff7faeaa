//! The Mixer: sums active sources under ducking, applies master
//! volume/balance/mute, clip-detects, and produces the per-sink routed
//! blocks.

use std::collections::HashSet;

use crate::capability::Category;
use crate::config::Frame;
use crate::ducking::{DuckingController, Envelope};
use crate::source_id::SourceId;

const CLIP_THRESHOLD: f32 = 0.999;

/// One source's contribution to the current block, already pulled from its
/// ring by the caller (zero-filled on under-run).
pub struct SourceContribution {
    pub id: SourceId,
    pub category: Category,
    pub volume: f32,
    pub muted: bool,
    pub samples: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerState {
    pub master_volume: f32,
    pub balance: f32,
    pub is_muted: bool,
    pub ducking_envelope: Envelope,
    pub peak: f32,
    pub rms: f32,
    pub is_clipping: bool,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            balance: 0.0,
            is_muted: false,
            ducking_envelope: Envelope {
                primary_gain: 1.0,
                event_gain: 1.0,
            },
            peak: 0.0,
            rms: 0.0,
            is_clipping: false,
        }
    }
}

/// Per-source contribution after volume/mute/ducking/master/balance are
/// applied, kept around so the caller can recombine per-sink routing
/// without re-walking the source list.
pub struct RoutedContribution {
    pub id: SourceId,
    pub samples: Vec<f32>,
}

pub struct MixBlock {
    pub master: Vec<f32>,
    pub routed: Vec<RoutedContribution>,
    pub state: MixerState,
}

pub struct Mixer {
    frame: Frame,
    ducking: DuckingController,
    master_volume: f32,
    balance: f32,
    is_muted: bool,
    peak: f32,
    rms: f32,
    meter_decay: f32,
}

impl Mixer {
    pub fn new(frame: Frame, meter_decay_ms: u32) -> Self {
        let block_period_ms = frame.block_period().as_secs_f32() * 1000.0;
        let meter_decay = (-block_period_ms / meter_decay_ms.max(1) as f32).exp();
        Self {
            frame,
            ducking: DuckingController::new(block_period_ms),
            master_volume: 1.0,
            balance: 0.0,
            is_muted: false,
            peak: 0.0,
            rms: 0.0,
            meter_decay,
        }
    }

    pub fn ducking_mut(&mut self) -> &mut DuckingController {
        &mut self.ducking
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_balance(&mut self, balance: f32) {
        self.balance = balance.clamp(-1.0, 1.0);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.is_muted = muted;
    }

    /// Constant-power pan gains for (left, right) given `channels == 2`,
    /// normalized so that center (`balance == 0.0`) is unity gain on both
    /// channels: a single source at balance 0 passes through
    /// sample-for-sample.
    fn pan_gains(&self) -> (f32, f32) {
        let angle = (self.balance + 1.0) * std::f32::consts::FRAC_PI_4;
        let norm = std::f32::consts::SQRT_2;
        (angle.cos() * norm, angle.sin() * norm)
    }

    /// Runs the eight-step pipeline over one block's worth of source
    /// contributions.
    pub fn process_block(&mut self, contributions: &[SourceContribution]) -> MixBlock {
        let envelope = self.ducking.advance_block();
        let block_len = self.frame.block_len();
        let channels = self.frame.channels as usize;
        let (left_gain, right_gain) = self.pan_gains();

        let mut master = vec![0.0f32; block_len];
        let mut routed = Vec::with_capacity(contributions.len());

        for contribution in contributions {
            debug_assert_eq!(contribution.samples.len(), block_len);
            let ducking_gain = match contribution.category {
                Category::Primary => envelope.primary_gain,
                Category::Event => envelope.event_gain,
            };
            let source_gain = if contribution.muted { 0.0 } else { contribution.volume };
            let gain = source_gain * ducking_gain;

            let mut scaled = vec![0.0f32; block_len];
            if self.is_muted {
                // Master mute zeroes everything post-ducking.
            } else if channels == 2 {
                for frame_idx in 0..self.frame.frames_per_block {
                    let l = contribution.samples[frame_idx * 2] * gain * self.master_volume;
                    let r = contribution.samples[frame_idx * 2 + 1] * gain * self.master_volume;
                    scaled[frame_idx * 2] = l * left_gain;
                    scaled[frame_idx * 2 + 1] = r * right_gain;
                }
            } else {
                for (dst, src) in scaled.iter_mut().zip(contribution.samples.iter()) {
                    *dst = src * gain * self.master_volume;
                }
            }

            for (m, s) in master.iter_mut().zip(scaled.iter()) {
                *m += *s;
            }
            routed.push(RoutedContribution {
                id: contribution.id.clone(),
                samples: scaled,
            });
        }

        let block_peak = master.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        let block_rms = if master.is_empty() {
            0.0
        } else {
            (master.iter().map(|&s| s * s).sum::<f32>() / master.len() as f32).sqrt()
        };
        let is_clipping = master.iter().any(|&s| s.abs() > CLIP_THRESHOLD);

        self.peak = block_peak.max(self.peak * self.meter_decay);
        self.rms = block_rms * (1.0 - self.meter_decay) + self.rms * self.meter_decay;

        let state = MixerState {
            master_volume: self.master_volume,
            balance: self.balance,
            is_muted: self.is_muted,
            ducking_envelope: envelope,
            peak: self.peak,
            rms: self.rms,
            is_clipping,
        };

        MixBlock { master, routed, state }
    }

    /// Recombines per-source routed contributions for a sink with an
    /// optional routing whitelist; `None` means "all sources".
    pub fn route_for_sink(&self, block: &MixBlock, whitelist: Option<&HashSet<SourceId>>) -> Vec<f32> {
        match whitelist {
            None => block.master.clone(),
            Some(ids) => {
                let mut out = vec![0.0f32; self.frame.block_len()];
                for contribution in &block.routed {
                    if ids.contains(&contribution.id) {
                        for (o, s) in out.iter_mut().zip(contribution.samples.iter()) {
                            *o += *s;
                        }
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SourceKind;
    use crate::source_id::SourceIdGenerator;

    fn sine_block(frame: Frame, amplitude: f32, freq_hz: f32) -> Vec<f32> {
        let mut out = vec![0.0; frame.block_len()];
        let step = std::f32::consts::TAU * freq_hz / frame.sample_rate as f32;
        for i in 0..frame.frames_per_block {
            let s = amplitude * (step * i as f32).sin();
            out[i * 2] = s;
            out[i * 2 + 1] = s;
        }
        out
    }

    #[test]
    fn silence_input_yields_exact_silence() {
        let frame = Frame::default();
        let mut mixer = Mixer::new(frame, 300);
        let gen = SourceIdGenerator::new();
        let contribution = SourceContribution {
            id: gen.next(SourceKind::Radio),
            category: Category::Primary,
            volume: 1.0,
            muted: false,
            samples: vec![0.0; frame.block_len()],
        };
        let block = mixer.process_block(&[contribution]);
        assert!(block.master.iter().all(|&s| s == 0.0));
        assert!(!block.state.is_clipping);
    }

    #[test]
    fn unity_gain_single_source_passes_through() {
        let frame = Frame::default();
        let mut mixer = Mixer::new(frame, 300);
        let gen = SourceIdGenerator::new();
        let input = sine_block(frame, 0.5, 440.0);
        let contribution = SourceContribution {
            id: gen.next(SourceKind::Radio),
            category: Category::Primary,
            volume: 1.0,
            muted: false,
            samples: input.clone(),
        };
        let block = mixer.process_block(&[contribution]);
        for (out, inp) in block.master.iter().zip(input.iter()) {
            assert!((out - inp).abs() < 1e-6);
        }
        assert!((block.state.peak - 0.5).abs() < 0.05);
    }

    #[test]
    fn full_scale_sine_clips() {
        let frame = Frame::default();
        let mut mixer = Mixer::new(frame, 300);
        let gen = SourceIdGenerator::new();
        let input = sine_block(frame, 1.0, 440.0);
        let contribution = SourceContribution {
            id: gen.next(SourceKind::Radio),
            category: Category::Primary,
            volume: 1.0,
            muted: false,
            samples: input,
        };
        let block = mixer.process_block(&[contribution]);
        assert!(block.state.is_clipping);
    }

    #[test]
    fn master_mute_zeroes_output() {
        let frame = Frame::default();
        let mut mixer = Mixer::new(frame, 300);
        mixer.set_muted(true);
        let gen = SourceIdGenerator::new();
        let contribution = SourceContribution {
            id: gen.next(SourceKind::Radio),
            category: Category::Primary,
            volume: 1.0,
            muted: false,
            samples: sine_block(frame, 0.8, 440.0),
        };
        let block = mixer.process_block(&[contribution]);
        assert!(block.master.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn routing_whitelist_excludes_non_listed_sources() {
        let frame = Frame::default();
        let mut mixer = Mixer::new(frame, 300);
        let gen = SourceIdGenerator::new();
        let a = gen.next(SourceKind::Radio);
        let b = gen.next(SourceKind::FilePlayer);
        let contributions = vec![
            SourceContribution {
                id: a.clone(),
                category: Category::Primary,
                volume: 1.0,
                muted: false,
                samples: sine_block(frame, 0.3, 200.0),
            },
            SourceContribution {
                id: b.clone(),
                category: Category::Primary,
                volume: 1.0,
                muted: false,
                samples: sine_block(frame, 0.3, 600.0),
            },
        ];
        let block = mixer.process_block(&contributions);
        let mut whitelist = HashSet::new();
        whitelist.insert(a);
        let routed = mixer.route_for_sink(&block, Some(&whitelist));
        let a_only = block
            .routed
            .iter()
            .find(|r| r.id.as_str().starts_with("radio"))
            .unwrap();
        assert_eq!(routed, a_only.samples);
    }
}
