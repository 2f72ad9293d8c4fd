/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The topic template has no `{event}` placeholder.
    #[error("topic template `{0}` has no {{event}} placeholder")]
    InvalidTemplate(String),
    /// The transport's outgoing request queue is full or closed.
    #[error("broker request queue is full")]
    QueueFull,
    /// There is no broker session to act on.
    #[error("not connected to a broker")]
    NotConnected,
    #[error("broker transport: {0}")]
    Transport(String),
    #[error("payload encoding: {0}")]
    Encode(#[from] serde_json::Error),
}
