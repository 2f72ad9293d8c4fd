use gesture_midi::MidiError;
use pose_telemetry::TelemetryError;

/// Result alias for everything above the leaf crates.
pub type Result<T> = std::result::Result<T, ThereminError>;

#[derive(Debug, thiserror::Error)]
pub enum ThereminError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Midi(#[from] MidiError),
    #[error("telemetry: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A MIDI port could not be listed or opened.
    #[error("MIDI device: {0}")]
    Device(String),
    #[error("audio output: {0}")]
    Audio(String),
    #[error("invalid settings: {0}")]
    Config(String),
    #[error("unknown preset `{0}`")]
    UnknownPreset(String),
}

impl ThereminError {
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
