//! Ducking envelope controller: lowers concurrent primary playback volume
//! while an event source (TTS, chime, notification) plays, with
//! block-granular linear attack/release ramps.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::DuckingDefaults;
use crate::source_id::SourceId;

/// How a ducking request affects the rest of the mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuckingPolicy {
    /// Only the primary is multiplied by `g`; events pass through at their
    /// own volume.
    AttenuatePrimary,
    /// Every source is multiplied by `g` (events by their own, possibly
    /// higher, floor).
    AttenuateAll,
    /// Primary gain is zero for the event's entire duration; events are
    /// unaffected.
    Mute,
}

/// One active request to duck the primary mix, issued alongside an event
/// source's playback.
#[derive(Debug, Clone, Copy)]
pub struct Policy {
    pub kind: DuckingPolicy,
    pub floor: f32,
    pub attack_ms: u32,
    pub release_ms: u32,
    /// Higher-numbered wins when multiple policies share a floor and
    /// duration; used only as the last tie-break, never to merge floors.
    pub priority: u8,
}

impl Policy {
    pub fn from_defaults(defaults: DuckingDefaults, kind: DuckingPolicy) -> Self {
        Self {
            kind,
            floor: defaults.floor,
            attack_ms: defaults.attack_ms,
            release_ms: defaults.release_ms,
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Attacking,
    Held,
    Releasing,
}

struct Active {
    policy: Policy,
    remaining_ms: f32,
}

/// The gain to apply to the primary and to events, computed for the
/// current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub primary_gain: f32,
    pub event_gain: f32,
}

/// Computes the current mix gain, block by block. Multiple concurrent
/// ducking requests minimize across floors: the deepest (lowest) floor
/// always wins regardless of arrival order, with remaining duration then
/// priority breaking ties between requests that share a floor.
pub struct DuckingController {
    active: HashMap<String, Active>,
    gain: f32,
    phase: Phase,
    release_ms: f32,
    block_period_ms: f32,
}

impl DuckingController {
    pub fn new(block_period_ms: f32) -> Self {
        Self {
            active: HashMap::new(),
            gain: 1.0,
            phase: Phase::Idle,
            release_ms: 300.0,
            block_period_ms,
        }
    }

    /// `duration_ms` is the event's total expected length, used only for
    /// the floor/duration/priority tie-break; `None` is treated as
    /// indefinite (always wins ties against a finite duration).
    pub fn engage(&mut self, owner: SourceId, policy: Policy, duration_ms: Option<f32>) {
        self.active.insert(
            owner.as_str().to_string(),
            Active {
                policy,
                remaining_ms: duration_ms.unwrap_or(f32::INFINITY),
            },
        );
        self.phase = Phase::Attacking;
    }

    pub fn release(&mut self, owner: &SourceId) {
        if let Some(active) = self.active.remove(owner.as_str()) {
            self.release_ms = active.policy.release_ms as f32;
        }
        if self.active.is_empty() {
            self.phase = Phase::Releasing;
        }
    }

    fn winning_policy(&self) -> Option<Policy> {
        self.active
            .values()
            .min_by(|a, b| {
                a.policy
                    .floor
                    .partial_cmp(&b.policy.floor)
                    .unwrap()
                    .then(b.remaining_ms.partial_cmp(&a.remaining_ms).unwrap())
                    .then(b.policy.priority.cmp(&a.policy.priority))
            })
            .map(|a| a.policy)
    }

    /// Advances the envelope by one block and returns the primary/event
    /// gains to apply this block.
    pub fn advance_block(&mut self) -> Envelope {
        for active in self.active.values_mut() {
            active.remaining_ms -= self.block_period_ms;
        }

        match self.winning_policy() {
            Some(policy) => {
                let step = self.block_period_ms / policy.attack_ms.max(1) as f32;
                self.gain = (self.gain - step).max(policy.floor);
                if (self.gain - policy.floor).abs() < f32::EPSILON {
                    self.phase = Phase::Held;
                }
                match policy.kind {
                    DuckingPolicy::AttenuatePrimary => Envelope {
                        primary_gain: self.gain,
                        event_gain: 1.0,
                    },
                    DuckingPolicy::AttenuateAll => Envelope {
                        primary_gain: self.gain,
                        event_gain: self.gain,
                    },
                    DuckingPolicy::Mute => Envelope {
                        primary_gain: 0.0,
                        event_gain: 1.0,
                    },
                }
            }
            None => {
                if self.phase == Phase::Releasing {
                    let step = self.block_period_ms / self.release_ms.max(1.0);
                    self.gain = (self.gain + step).min(1.0);
                    if self.gain >= 1.0 {
                        self.phase = Phase::Idle;
                    }
                } else {
                    self.gain = 1.0;
                }
                Envelope {
                    primary_gain: self.gain,
                    event_gain: self.gain,
                }
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle && self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::SourceKind;
    use crate::source_id::SourceIdGenerator;

    fn policy(floor: f32) -> Policy {
        Policy {
            kind: DuckingPolicy::AttenuatePrimary,
            floor,
            attack_ms: 80,
            release_ms: 300,
            priority: 0,
        }
    }

    #[test]
    fn gain_ramps_down_toward_floor() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let tts = gen.next(SourceKind::Tts);
        ducking.engage(tts, policy(0.2), Some(500.0));
        let mut last = 1.0;
        for _ in 0..10 {
            let gain = ducking.advance_block().primary_gain;
            assert!(gain <= last);
            last = gain;
        }
        assert!((last - 0.2).abs() < 0.01);
    }

    #[test]
    fn deepest_floor_wins_across_concurrent_policies() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let tts = gen.next(SourceKind::Tts);
        let chime = gen.next(SourceKind::Chime);
        ducking.engage(tts, policy(0.3), Some(1000.0));
        ducking.engage(chime, policy(0.1), Some(1000.0));
        for _ in 0..20 {
            ducking.advance_block();
        }
        assert!(ducking.advance_block().primary_gain <= 0.11);
    }

    #[test]
    fn releasing_restores_full_gain() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let tts = gen.next(SourceKind::Tts);
        ducking.engage(tts.clone(), policy(0.2), Some(500.0));
        for _ in 0..10 {
            ducking.advance_block();
        }
        ducking.release(&tts);
        let mut env = Envelope {
            primary_gain: 0.0,
            event_gain: 0.0,
        };
        for _ in 0..30 {
            env = ducking.advance_block();
        }
        assert!((env.primary_gain - 1.0).abs() < 0.01);
        assert!(ducking.is_idle());
    }

    #[test]
    fn higher_priority_wins_a_floor_and_duration_tie() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let tts = gen.next(SourceKind::Tts);
        let chime = gen.next(SourceKind::Chime);
        let mut low = policy(0.2);
        low.priority = 1;
        low.kind = DuckingPolicy::Mute;
        let mut high = policy(0.2);
        high.priority = 5;
        high.kind = DuckingPolicy::AttenuatePrimary;
        ducking.engage(tts, low, Some(500.0));
        ducking.engage(chime, high, Some(500.0));
        let env = ducking.advance_block();
        assert_ne!(env.primary_gain, 0.0);
    }

    #[test]
    fn attenuate_all_lowers_events_too() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let chime = gen.next(SourceKind::Chime);
        let mut p = policy(0.2);
        p.kind = DuckingPolicy::AttenuateAll;
        ducking.engage(chime, p, Some(500.0));
        let env = ducking.advance_block();
        assert!(env.event_gain < 1.0);
        assert_eq!(env.event_gain, env.primary_gain);
    }

    #[test]
    fn mute_zeroes_only_primary() {
        let mut ducking = DuckingController::new(21.3);
        let gen = SourceIdGenerator::new();
        let chime = gen.next(SourceKind::Chime);
        let mut p = policy(0.2);
        p.kind = DuckingPolicy::Mute;
        ducking.engage(chime, p, Some(500.0));
        let env = ducking.advance_block();
        assert_eq!(env.primary_gain, 0.0);
        assert_eq!(env.event_gain, 1.0);
    }
}
