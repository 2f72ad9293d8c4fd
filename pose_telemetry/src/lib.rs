//! # pose_telemetry
//!
//! Mirror the spatial data of a pose-driven instrument onto an MQTT broker.
//!
//! * [`TopicTemplate`] for `{event}` substitution (`iot-2/evt/{event}/fmt/json`).
//! * [`payload`] encodes JSON with floats truncated to a fixed number of
//!   fractional digits.
//! * [`state`] holds the connection state machine as a pure transition table.
//! * [`TelemetryClient`] owns one [`BrokerTransport`] and drops anything
//!   published while it is not connected.
//! * [`MqttTransport`] is the real transport, backed by `rumqttc`;
//!   [`LoopbackTransport`] is an in-process stand-in.
//!
//! Loss while disconnected is the policy: there is no local queue.

pub mod client;
pub mod error;
pub mod loopback;
pub mod mqtt;
pub mod payload;
pub mod state;
pub mod topic;
pub mod transport;

pub use client::{DropReason, PublishOutcome, TelemetryClient, TelemetryConfig, TelemetryStats};
pub use error::{Result, TelemetryError};
pub use loopback::{LoopbackBroker, LoopbackTransport};
pub use mqtt::MqttTransport;
pub use state::{LinkState, Trigger};
pub use topic::{TopicTemplate, DEFAULT_TEMPLATE};
pub use transport::{BrokerEvent, BrokerOptions, BrokerTransport};
