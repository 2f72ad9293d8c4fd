//! # pose_theremin
//!
//! A theremin played with the body.  Each video frame's pose keypoints are
//! mapped through two screen zones:
//!
//! | Hand  | Zone   | Drives                                   |
//! |-------|--------|------------------------------------------|
//! | left  | pitch  | note number, chord slot or tone frequency |
//! | right | volume | velocity, gain or instrument volume       |
//!
//! and the result goes to exactly one output at a time:
//!
//! * a hardware MIDI port ([`output::hardware`]), notes off after a fixed
//!   duration;
//! * a continuous tone ([`output::tone`]) when the device is `browser` and the
//!   preset is `default`;
//! * a named instrument preset ([`output::instrument`]) otherwise.
//!
//! With telemetry enabled, the nose position, distance, angle and upper-body
//! keypoints of every pose are published through [`pose_telemetry`].
//!
//! ## Running
//!
//! ```text
//! pose_estimator | pose_theremin run --device "IAC Driver Bus 1" --mqtt
//! pose_theremin run --input session.jsonl --headless --loopback --frame-interval-ms 33
//! ```
//!
//! Input is one JSON object per line, either `{"frame": {...}}` or
//! `{"update": {"set": "...", "value": ...}}`.

pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod schedule;
pub mod source;

pub use config::{OutputDevice, Settings, SettingsUpdate};
pub use error::{Result, ThereminError};
pub use orchestrator::{FrameOrchestrator, FrameReport};
pub use output::{BackendState, Output, OutputBackend, Readout, Selection};
pub use source::{spawn_frame_source, FrameSource, JsonLinesSource, SourceEvent};
