//! The `Source` trait, its lifecycle, and the `SourceBackend` abstraction
//! that lets a single generic source type host wildly different producers
//! (a tuner, a file decoder, a TTS synthesizer) behind one state machine.

use std::any::Any;

use crate::capability::{
    Capabilities, Category, EqualizerMode, RadioBand, ScanDirection, SourceKind, SourceState,
};
use crate::config::Frame;
use crate::error::EngineError;
use crate::source_id::SourceId;

/// Legal transitions for the shared source lifecycle. Anything not listed
/// here is rejected by [`Source::apply_command`] implementations with
/// `EngineError::Unsupported`.
pub fn is_valid_transition(from: SourceState, to: SourceState) -> bool {
    use SourceState::*;
    matches!(
        (from, to),
        (Uninitialized, Initializing)
            | (Initializing, Ready)
            | (Initializing, Failed)
            | (Ready, Playing)
            | (Ready, Stopped)
            | (Playing, Paused)
            | (Playing, Stopped)
            | (Playing, Failed)
            | (Paused, Playing)
            | (Paused, Stopped)
            | (Stopped, Playing)
            | (_, Disposed)
            | (_, Failed)
    )
}

/// A producer of interleaved f32 PCM blocks, gated by a capability-checked
/// transport surface. One `Source` is owned by the engine per active
/// input; the mixer pulls from its ring on every block.
pub trait Source: Send {
    fn id(&self) -> &SourceId;
    fn kind(&self) -> SourceKind;
    fn category(&self) -> Category {
        self.kind().category()
    }
    fn capabilities(&self) -> Capabilities;
    fn state(&self) -> SourceState;

    fn play(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn seek(&mut self, position_ms: u64) -> Result<(), EngineError>;
    fn dispose(&mut self);

    /// `stop()`, but ramped out over a 5 ms cosine fade instead of cutting
    /// abruptly. Default implementation falls back to the plain abrupt
    /// `stop()` for backends that have no notion of a fade.
    fn stop_with_fade(&mut self) -> Result<(), EngineError> {
        self.stop()
    }

    /// Fills `out` (exactly one block, per `frame`) with the next samples.
    /// Sources in a terminal state must fill silence, never skip the call.
    fn produce(&mut self, frame: Frame, out: &mut [f32]);

    /// Downcasting escape hatch for kind-specific extensions (e.g. the
    /// radio tuner's band/frequency state) that don't belong on the shared
    /// trait. The default works for every `Self: 'static` implementor; no
    /// override needed outside this module.
    fn as_any(&self) -> &dyn Any
    where
        Self: 'static,
    {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any
    where
        Self: 'static,
    {
        self
    }
}

fn require(caps: Capabilities, bit: Capabilities, op: &str) -> Result<(), EngineError> {
    if caps.contains(bit) {
        Ok(())
    } else {
        Err(EngineError::Unsupported(op.to_string()))
    }
}

/// Supplies PCM for a [`GenericSource`]. Swapping implementations is how
/// the nine source kinds share one lifecycle/capability-gating
/// implementation without a trait-inheritance tree. Real radio tuner /
/// turntable / Spotify backends are external collaborators out of scope
/// here; test backends below exercise the state machine.
pub trait SourceBackend: Send {
    /// Fill `out` with the next block's worth of samples.
    fn fill(&mut self, frame: Frame, out: &mut [f32]);

    /// Called on transition into `Playing`/`Paused`/`Stopped`; backends
    /// with no notion of suspension can ignore it.
    fn on_state_change(&mut self, _state: SourceState) {}

    fn on_seek(&mut self, _position_ms: u64) {}

    /// Event-source completion signal: when the underlying clip ends, the
    /// source transitions Playing -> Stopped -> Disposed automatically.
    /// Primary backends never finish on their own.
    fn is_finished(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any
    where
        Self: 'static,
    {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any
    where
        Self: 'static,
    {
        self
    }
}

/// Duration of the click-avoidance fade applied on `pause()` and on
/// `stop_with_fade()`.
const FADE_MS: f32 = 5.0;

/// In-flight fade-out, tracked in frames rather than samples so it's
/// independent of channel count. `target` is the state `GenericSource`
/// adopts once the ramp reaches zero.
struct FadeOut {
    total_frames: u32,
    remaining_frames: u32,
    target: SourceState,
}

/// A `Source` whose PCM production is delegated to a [`SourceBackend`].
pub struct GenericSource {
    id: SourceId,
    kind: SourceKind,
    capabilities: Capabilities,
    state: SourceState,
    backend: Box<dyn SourceBackend>,
    fade: Option<FadeOut>,
}

impl GenericSource {
    pub fn new(id: SourceId, kind: SourceKind, backend: Box<dyn SourceBackend>) -> Self {
        Self {
            id,
            capabilities: kind.default_capabilities(),
            kind,
            state: SourceState::Uninitialized,
            backend,
            fade: None,
        }
    }

    /// Starts (or restarts) a fade-out toward `target`; `produce()` ramps
    /// the backend's output to silence over `FADE_MS` before the state
    /// actually flips. `total_frames` is computed lazily against whatever
    /// `Frame` the next `produce()` call carries, since `pause()`/`stop()`
    /// don't see the engine's sample rate directly.
    fn begin_fade(&mut self, target: SourceState) {
        self.fade = Some(FadeOut {
            total_frames: 0,
            remaining_frames: 0,
            target,
        });
    }

    /// Narrows the default capability set, e.g. a radio backend tuned to a
    /// stream with no seek support.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Escape hatch for kind-specific extensions: downcast the boxed
    /// backend to its concrete type (e.g. [`RadioBackend`]) to reach fields
    /// the shared `Source` trait doesn't expose.
    pub fn backend_mut(&mut self) -> &mut dyn SourceBackend {
        self.backend.as_mut()
    }

    pub fn backend(&self) -> &dyn SourceBackend {
        self.backend.as_ref()
    }

    pub fn mark_ready(&mut self) -> Result<(), EngineError> {
        self.transition(SourceState::Initializing)?;
        self.transition(SourceState::Ready)
    }

    fn transition(&mut self, to: SourceState) -> Result<(), EngineError> {
        if !is_valid_transition(self.state, to) {
            return Err(EngineError::Unsupported(format!(
                "illegal source transition {:?} -> {:?}",
                self.state, to
            )));
        }
        self.state = to;
        self.backend.on_state_change(to);
        Ok(())
    }
}

impl Source for GenericSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn state(&self) -> SourceState {
        self.state
    }

    fn play(&mut self) -> Result<(), EngineError> {
        require(self.capabilities, Capabilities::PLAY, "play")?;
        self.transition(SourceState::Playing)
    }

    /// Ramps to silence over `FADE_MS` rather than cutting abruptly, to
    /// avoid an audible click. `state()` keeps reporting `Playing` until
    /// the ramp completes, since the lifecycle has no separate "fading"
    /// state.
    fn pause(&mut self) -> Result<(), EngineError> {
        require(self.capabilities, Capabilities::PAUSE, "pause")?;
        if !is_valid_transition(self.state, SourceState::Paused) {
            return Err(EngineError::Unsupported(format!(
                "illegal source transition {:?} -> Paused",
                self.state
            )));
        }
        self.begin_fade(SourceState::Paused);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        require(self.capabilities, Capabilities::STOP, "stop")?;
        self.fade = None;
        self.transition(SourceState::Stopped)
    }

    /// The outgoing primary during `switch_primary` gets this 5 ms fade
    /// rather than the abrupt `stop()`.
    fn stop_with_fade(&mut self) -> Result<(), EngineError> {
        require(self.capabilities, Capabilities::STOP, "stop")?;
        if !is_valid_transition(self.state, SourceState::Stopped) {
            return Err(EngineError::Unsupported(format!(
                "illegal source transition {:?} -> Stopped",
                self.state
            )));
        }
        self.begin_fade(SourceState::Stopped);
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<(), EngineError> {
        require(self.capabilities, Capabilities::SEEK, "seek")?;
        self.backend.on_seek(position_ms);
        Ok(())
    }

    fn dispose(&mut self) {
        self.fade = None;
        self.state = SourceState::Disposed;
        self.backend.on_state_change(SourceState::Disposed);
    }

    fn produce(&mut self, frame: Frame, out: &mut [f32]) {
        if let Some(fade) = self.fade.as_ref() {
            // A prior call already ramped this source to silence; land on
            // the target state now rather than mid-ramp, so `state()`
            // reflects `Playing` for the whole block that still carries
            // audible (fading) output.
            if fade.total_frames != 0 && fade.remaining_frames == 0 {
                let target = self.fade.take().unwrap().target;
                self.state = target;
                self.backend.on_state_change(target);
                out.fill(0.0);
                return;
            }
        }
        if self.fade.is_some() {
            if self.fade.as_ref().unwrap().total_frames == 0 {
                let frames = ((FADE_MS / 1000.0) * frame.sample_rate as f32).round().max(1.0) as u32;
                let fade = self.fade.as_mut().unwrap();
                fade.total_frames = frames;
                fade.remaining_frames = frames;
            }
            self.backend.fill(frame, out);

            let channels = frame.channels as usize;
            let (total, mut remaining) = {
                let fade = self.fade.as_ref().unwrap();
                (fade.total_frames, fade.remaining_frames)
            };
            for fr in 0..frame.frames_per_block {
                let gain = if remaining == 0 {
                    0.0
                } else {
                    let elapsed = total - remaining;
                    let t = elapsed as f32 / total as f32;
                    remaining -= 1;
                    0.5 * (1.0 + (std::f32::consts::PI * t).cos())
                };
                for ch in 0..channels {
                    out[fr * channels + ch] *= gain;
                }
            }
            self.fade.as_mut().unwrap().remaining_frames = remaining;
        } else if self.state == SourceState::Playing {
            self.backend.fill(frame, out);
            if self.backend.is_finished() {
                self.state = SourceState::Stopped;
                self.backend.on_state_change(SourceState::Stopped);
                self.state = SourceState::Disposed;
                self.backend.on_state_change(SourceState::Disposed);
            }
        } else {
            out.fill(0.0);
        }
    }
}

/// Fixed-frequency sine generator, used by the boundary-scenario tests as
/// a stand-in for a live tuner.
pub struct SineSource {
    freq_hz: f32,
    phase: f32,
}

impl SineSource {
    pub fn new(freq_hz: f32) -> Self {
        Self { freq_hz, phase: 0.0 }
    }
}

impl SourceBackend for SineSource {
    fn fill(&mut self, frame: Frame, out: &mut [f32]) {
        let step = std::f32::consts::TAU * self.freq_hz / frame.sample_rate as f32;
        for frame_idx in 0..frame.frames_per_block {
            let sample = self.phase.sin();
            self.phase += step;
            if self.phase > std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
            for ch in 0..frame.channels as usize {
                out[frame_idx * frame.channels as usize + ch] = sample;
            }
        }
    }
}

/// Produces silence forever; used to model a stalled or not-yet-buffered
/// source without panicking the mixer.
#[derive(Default)]
pub struct SilenceSource;

impl SourceBackend for SilenceSource {
    fn fill(&mut self, _frame: Frame, out: &mut [f32]) {
        out.fill(0.0);
    }
}

/// The Radio-specific extension: tuner state that has no
/// equivalent on any other source kind. The actual RF demodulation and PCM
/// decode are an external hardware collaborator out of scope; this backend
/// models the tuner's control-surface state (frequency, band, signal
/// strength, scanning) and the up-to-500ms settling window a frequency
/// change incurs, while emitting silence scaled by the simulated signal
/// strength as a stand-in for the hardware's actual audio.
pub struct RadioBackend {
    frequency: f32,
    band: RadioBand,
    step: f32,
    signal_strength: f32,
    is_stereo: bool,
    equalizer_mode: EqualizerMode,
    scanning: Option<ScanDirection>,
    settle_blocks_remaining: u32,
    block_period_ms: f32,
}

/// Hardware settling budget for a frequency change: up to 500 ms before
/// signal strength stabilizes.
const RADIO_SETTLE_MS: f32 = 500.0;

impl RadioBackend {
    pub fn new(band: RadioBand, frequency: f32, block_period_ms: f32) -> Self {
        Self {
            frequency,
            step: band.default_step(),
            band,
            signal_strength: 1.0,
            is_stereo: true,
            equalizer_mode: EqualizerMode::Flat,
            scanning: None,
            settle_blocks_remaining: 0,
            block_period_ms: block_period_ms.max(1.0),
        }
    }

    /// Synchronous from the caller's point of view: the frequency field
    /// updates immediately, but `signal_strength` ramps back up over the
    /// settling window rather than snapping, modeling a real tuner's PLL
    /// lock time.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
        self.signal_strength = 0.0;
        self.settle_blocks_remaining = (RADIO_SETTLE_MS / self.block_period_ms).ceil() as u32;
    }

    pub fn set_band(&mut self, band: RadioBand) {
        self.band = band;
        self.step = band.default_step();
        self.set_frequency(self.frequency);
    }

    pub fn set_scanning(&mut self, direction: Option<ScanDirection>) {
        self.scanning = direction;
    }

    pub fn set_equalizer_mode(&mut self, mode: EqualizerMode) {
        self.equalizer_mode = mode;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn band(&self) -> RadioBand {
        self.band
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn signal_strength(&self) -> f32 {
        self.signal_strength
    }

    pub fn is_stereo(&self) -> bool {
        self.is_stereo
    }

    pub fn equalizer_mode(&self) -> EqualizerMode {
        self.equalizer_mode
    }

    pub fn scanning(&self) -> Option<ScanDirection> {
        self.scanning
    }

    pub fn is_settling(&self) -> bool {
        self.settle_blocks_remaining > 0
    }
}

impl SourceBackend for RadioBackend {
    fn fill(&mut self, _frame: Frame, out: &mut [f32]) {
        if self.settle_blocks_remaining > 0 {
            self.settle_blocks_remaining -= 1;
            let total = (RADIO_SETTLE_MS / self.block_period_ms).ceil().max(1.0);
            let elapsed = total - self.settle_blocks_remaining as f32;
            self.signal_strength = (elapsed / total).clamp(0.0, 1.0);
        }
        out.fill(0.0);
    }
}

/// Plays a fixed-duration synthetic clip, then reports `is_finished()` so
/// `GenericSource` can auto-dispose it. Stands in for a decoded
/// TTS/chime/notification/effect clip, whose actual decode pipeline is an
/// external collaborator out of scope.
pub struct ClipBackend {
    tone_hz: f32,
    phase: f32,
    blocks_remaining: u32,
}

impl ClipBackend {
    pub fn new(tone_hz: f32, duration_ms: u32, block_period_ms: f32) -> Self {
        let blocks = (duration_ms as f32 / block_period_ms.max(1.0)).ceil().max(1.0) as u32;
        Self {
            tone_hz,
            phase: 0.0,
            blocks_remaining: blocks,
        }
    }
}

impl SourceBackend for ClipBackend {
    fn fill(&mut self, frame: Frame, out: &mut [f32]) {
        if self.blocks_remaining == 0 {
            out.fill(0.0);
            return;
        }
        self.blocks_remaining -= 1;
        let step = std::f32::consts::TAU * self.tone_hz / frame.sample_rate as f32;
        for frame_idx in 0..frame.frames_per_block {
            let sample = self.phase.sin() * 0.3;
            self.phase += step;
            if self.phase > std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
            for ch in 0..frame.channels as usize {
                out[frame_idx * frame.channels as usize + ch] = sample;
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.blocks_remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_source(kind: SourceKind) -> GenericSource {
        GenericSource::new(SourceId::from("test-0".to_string()), kind, Box::new(SilenceSource))
    }

    #[test]
    fn radio_cannot_seek() {
        let mut source = make_source(SourceKind::Radio);
        source.mark_ready().unwrap();
        source.play().unwrap();
        assert!(matches!(source.seek(1000), Err(EngineError::Unsupported(_))));
    }

    #[test]
    fn file_player_can_seek_while_playing() {
        let mut source = make_source(SourceKind::FilePlayer);
        source.mark_ready().unwrap();
        source.play().unwrap();
        assert!(source.seek(5000).is_ok());
    }

    #[test]
    fn terminal_state_produces_silence() {
        let mut source = make_source(SourceKind::Tts);
        source.mark_ready().unwrap();
        source.play().unwrap();
        source.stop().unwrap();
        let frame = Frame::default();
        let mut out = vec![1.0; frame.block_len()];
        source.produce(frame, &mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn sine_source_is_periodic_and_bounded() {
        let mut backend = SineSource::new(440.0);
        let frame = Frame::default();
        let mut out = vec![0.0; frame.block_len()];
        backend.fill(frame, &mut out);
        assert!(out.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn radio_backend_settles_after_frequency_change() {
        let mut backend = RadioBackend::new(RadioBand::Fm, 99.5, 21.3);
        assert_eq!(backend.signal_strength(), 1.0);
        backend.set_frequency(101.1);
        assert!(backend.is_settling());
        assert_eq!(backend.signal_strength(), 0.0);

        let frame = Frame::default();
        let mut out = vec![1.0; frame.block_len()];
        for _ in 0..30 {
            backend.fill(frame, &mut out);
        }
        assert!(!backend.is_settling());
        assert_eq!(backend.signal_strength(), 1.0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn radio_backend_downcasts_through_source_backend_trait_object() {
        let mut boxed: Box<dyn SourceBackend> = Box::new(RadioBackend::new(RadioBand::Am, 900.0, 21.3));
        let radio = boxed.as_any_mut().downcast_mut::<RadioBackend>().unwrap();
        radio.set_band(RadioBand::Fm);
        assert_eq!(radio.band(), RadioBand::Fm);
        assert_eq!(radio.step(), RadioBand::Fm.default_step());
    }

    #[test]
    fn clip_backend_auto_disposes_after_its_duration() {
        let mut source = GenericSource::new(
            SourceId::from("chime-0".to_string()),
            SourceKind::Chime,
            Box::new(ClipBackend::new(880.0, 40.0, 21.3)),
        );
        source.mark_ready().unwrap();
        source.play().unwrap();
        let frame = Frame::default();
        let mut out = vec![0.0; frame.block_len()];
        for _ in 0..10 {
            if source.state() == SourceState::Disposed {
                break;
            }
            source.produce(frame, &mut out);
        }
        assert_eq!(source.state(), SourceState::Disposed);
    }

    #[test]
    fn dispose_is_reachable_from_any_state() {
        let mut source = make_source(SourceKind::Radio);
        source.dispose();
        assert_eq!(source.state(), SourceState::Disposed);
    }

    #[test]
    fn pause_fades_out_over_five_milliseconds_then_lands_on_paused() {
        let mut source = GenericSource::new(
            SourceId::from("vinyl-0".to_string()),
            SourceKind::Vinyl,
            Box::new(SineSource::new(440.0)),
        );
        source.mark_ready().unwrap();
        source.play().unwrap();
        source.pause().unwrap();

        let frame = Frame::default();
        let fade_frames = ((5.0 / 1000.0) * frame.sample_rate as f32).round() as usize;
        let mut out = vec![0.0; frame.block_len()];
        source.produce(frame, &mut out);

        // Still reports Playing while the ramp is in progress.
        assert_eq!(source.state(), SourceState::Playing);
        // A sample near the start of the ramp is near full gain (audible),
        // the sample right after the fade window has already reached
        // silence.
        assert!(out[5 * frame.channels as usize].abs() > 0.01);
        assert_eq!(out[fade_frames * frame.channels as usize], 0.0);

        source.produce(frame, &mut out);
        assert_eq!(source.state(), SourceState::Paused);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stop_with_fade_ramps_to_silence_before_landing_on_stopped() {
        let mut source = GenericSource::new(
            SourceId::from("radio-0".to_string()),
            SourceKind::Radio,
            Box::new(SineSource::new(440.0)),
        );
        source.mark_ready().unwrap();
        source.play().unwrap();
        source.stop_with_fade().unwrap();

        let frame = Frame::default();
        let mut out = vec![0.0; frame.block_len()];
        source.produce(frame, &mut out);
        assert_eq!(source.state(), SourceState::Playing);
        source.produce(frame, &mut out);
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn plain_stop_is_abrupt_with_no_fade() {
        let mut source = make_source(SourceKind::Radio);
        source.mark_ready().unwrap();
        source.play().unwrap();
        source.stop().unwrap();
        assert_eq!(source.state(), SourceState::Stopped);
    }
}
