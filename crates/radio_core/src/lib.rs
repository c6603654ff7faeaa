//! Radio Core - Home Radio Audio Engine
//!
//! This crate provides the core audio engine for the networked home-radio
//! appliance: the source lifecycle and category model, the real-time
//! mixing pipeline (ducking, master volume, balance, mute, clip detection),
//! the source-to-sink fan-out, and the USB arbiter that keeps two sources
//! from claiming the same exclusive hardware path.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Control Plane (radio_control)            │
//! │       (RPC shims) ──commands──▶ Engine ◀──events── (RPC)    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Mixer Thread                           │
//! │   Sources ──ring──▶ Mixer ──ring──▶ Sinks (radio_sinks)      │
//! │                        │                                      │
//! │                        └──▶ Visualizer tap (radio_dsp)       │
//! │              (Zero allocation in the steady-state path)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod arbiter;
mod capability;
mod config;
mod device;
mod ducking;
mod engine;
mod error;
mod message;
mod mixer;
mod ring;
mod sink;
mod source;
mod source_id;

pub use arbiter::{ArbiterError, UsbArbiter};
pub use capability::{
    Capabilities, Category, EqualizerMode, RadioBand, ScanDirection, SourceKind, SourceState,
    TransportAction,
};
pub use config::{ConfigError, DuckingDefaults, EngineConfig, Frame, VisualizerDefaults};
pub use device::{AudioDevice, DeviceType};
pub use ducking::{DuckingController, DuckingPolicy, Envelope, Policy};
pub use engine::{AudioEngine, EngineSnapshot, EngineState, SourceSummary};
pub use error::{EngineError, EngineResult, ErrorTaxonomy};
pub use message::{Command, Event, SinkRegistration, SourceRegistration};
pub use mixer::{MixBlock, Mixer, MixerState, RoutedContribution, SourceContribution};
pub use ring::{frame_ring, FrameConsumer, FrameProducer, PopOutcome, PushOutcome, PushPolicy};
pub use sink::{Sink, SinkKind, SinkState};
pub use source::{
    is_valid_transition, ClipBackend, GenericSource, RadioBackend, SilenceSource, SineSource,
    Source, SourceBackend,
};
pub use source_id::{SourceId, SourceIdGenerator};
