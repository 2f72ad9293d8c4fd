//! The telemetry client: one owner for one broker session.

use std::fmt;
use std::time::Duration;

use pose_zones::Keypoint;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::payload;
use crate::state::{transition, Action, LinkState, Trigger};
use crate::topic::{TopicTemplate, DEFAULT_TEMPLATE};
use crate::transport::{BrokerEvent, BrokerOptions, BrokerTransport};
use crate::{Result, TelemetryError};

// ════════════════════════════════════════════════════════════════════════════
// TelemetryConfig
// ════════════════════════════════════════════════════════════════════════════

/// Broker and payload settings.  The password is never serialized.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    pub host:            String,
    pub port:            u16,
    /// Generated as `pose-theremin-xxxxxxxx` when unset.
    pub client_id:       Option<String>,
    pub username:        Option<String>,
    #[serde(skip_serializing)]
    pub password:        Option<String>,
    pub secure:          bool,
    /// Subscribe to our own topics and log what arrives.
    pub logging:         bool,
    pub topic_template:  String,
    /// Fractional digits kept in payload floats.
    pub precision:       u32,
    pub keep_alive_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            host:            "localhost".to_string(),
            port:            1883,
            client_id:       None,
            username:        None,
            password:        None,
            secure:          false,
            logging:         false,
            topic_template:  DEFAULT_TEMPLATE.to_string(),
            precision:       2,
            keep_alive_secs: 5,
        }
    }
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .field("logging", &self.logging)
            .field("topic_template", &self.topic_template)
            .field("precision", &self.precision)
            .finish()
    }
}

impl TelemetryConfig {
    fn broker_options(&self) -> BrokerOptions {
        let client_id = match &self.client_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => format!("pose-theremin-{:08x}", rand::random::<u32>()),
        };
        BrokerOptions {
            host:       self.host.clone(),
            port:       self.port,
            client_id,
            username:   self.username.clone(),
            password:   self.password.clone(),
            secure:     self.secure,
            keep_alive: Duration::from_secs(self.keep_alive_secs.max(5)),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Outcomes
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// `null`, `false`, `0` or `""`.
    Empty,
    /// Not connected (yet, or any more).
    NotReady,
    /// The transport's request queue was full.
    Backpressure,
    /// Encoding or transport failure.
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Dropped(DropReason),
}

/// Running counters, mostly for the status line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    pub sent:         u64,
    pub not_ready:    u64,
    pub empty:        u64,
    pub backpressure: u64,
    pub errors:       u64,
}

// ════════════════════════════════════════════════════════════════════════════
// TelemetryClient
// ════════════════════════════════════════════════════════════════════════════

pub struct TelemetryClient {
    transport: Box<dyn BrokerTransport>,
    options:   BrokerOptions,
    topics:    TopicTemplate,
    precision: u32,
    logging:   bool,
    state:     LinkState,
    stats:     TelemetryStats,
}

impl TelemetryClient {
    /// Build a disabled client.  The client id is fixed here, so reconnects
    /// reuse it.
    pub fn new(config: &TelemetryConfig, transport: Box<dyn BrokerTransport>) -> Result<Self> {
        Ok(TelemetryClient {
            transport,
            options:   config.broker_options(),
            topics:    TopicTemplate::new(&config.topic_template)?,
            precision: config.precision,
            logging:   config.logging,
            state:     LinkState::Disabled,
            stats:     TelemetryStats::default(),
        })
    }

    pub fn state(&self) -> LinkState { self.state }
    pub fn is_enabled(&self) -> bool { self.state.is_enabled() }
    pub fn is_ready(&self) -> bool { self.state.is_ready() }
    pub fn stats(&self) -> TelemetryStats { self.stats }
    pub fn topics(&self) -> &TopicTemplate { &self.topics }
    pub fn client_id(&self) -> &str { &self.options.client_id }

    /// Connect (from disabled) or disconnect.  Repeated calls with the same
    /// value do nothing.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.fire(if enabled { Trigger::Enable } else { Trigger::Disable })
    }

    /// Take new broker settings.  An enabled client reconnects with them;
    /// without a configured id the current one is kept.
    pub fn reconfigure(&mut self, config: &TelemetryConfig) -> Result<()> {
        let topics = TopicTemplate::new(&config.topic_template)?;
        let was_enabled = self.state.is_enabled();
        self.set_enabled(false)?;

        let mut options = config.broker_options();
        if config.client_id.as_deref().map_or(true, |id| id.trim().is_empty()) {
            options.client_id = self.options.client_id.clone();
        }
        self.options = options;
        self.topics = topics;
        self.precision = config.precision;
        self.logging = config.logging;

        if was_enabled {
            self.set_enabled(true)?;
        }
        Ok(())
    }

    pub fn set_logging(&mut self, logging: bool) {
        let was = self.logging;
        self.logging = logging;
        if logging && !was && self.is_ready() {
            self.subscribe_diagnostics();
        }
    }

    /// Apply everything the transport reported since the last call.
    pub fn pump(&mut self) {
        for event in self.transport.poll_events() {
            let result = match event {
                BrokerEvent::Connected => self.fire(Trigger::ConnAck),
                BrokerEvent::ConnectionLost(reason) => {
                    if self.state.is_enabled() {
                        warn!(%reason, "broker connection lost");
                    }
                    self.fire(Trigger::ConnectionLost)
                }
                BrokerEvent::Message { topic, payload } => {
                    if self.logging {
                        info!(%topic, payload = %String::from_utf8_lossy(&payload), "message arrived");
                    }
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(error = %e, "broker event handling failed");
            }
        }
    }

    /// Publish `data` under `event`.  Dropped silently when `data` is falsy
    /// or the link is not connected.
    pub fn publish<T: Serialize + ?Sized>(&mut self, event: &str, data: &T) -> PublishOutcome {
        if !self.state.is_ready() {
            return self.drop_message(DropReason::NotReady);
        }

        let value = match payload::to_payload(data, self.precision) {
            Ok(Some(v)) => v,
            Ok(None) => {
                debug!(event, "falsy telemetry payload, not sending");
                return self.drop_message(DropReason::Empty);
            }
            Err(e) => {
                warn!(event, error = %e, "could not encode telemetry payload");
                return self.drop_message(DropReason::Error);
            }
        };

        let topic = self.topics.topic(event);
        match self.transport.publish(&topic, value.to_string().into_bytes()) {
            Ok(()) => {
                self.stats.sent += 1;
                PublishOutcome::Sent
            }
            Err(TelemetryError::QueueFull) => self.drop_message(DropReason::Backpressure),
            Err(e) => {
                warn!(%topic, error = %e, "publish failed");
                self.drop_message(DropReason::Error)
            }
        }
    }

    /// Publish the upper-body keypoints only.
    pub fn publish_keypoints(&mut self, keypoints: &[Keypoint]) -> PublishOutcome {
        let filtered: Vec<&Keypoint> = keypoints.iter().filter(|k| k.part.is_upper_body()).collect();
        self.publish("keypoints", &filtered)
    }

    fn drop_message(&mut self, reason: DropReason) -> PublishOutcome {
        match reason {
            DropReason::Empty        => self.stats.empty += 1,
            DropReason::NotReady     => self.stats.not_ready += 1,
            DropReason::Backpressure => self.stats.backpressure += 1,
            DropReason::Error        => self.stats.errors += 1,
        }
        PublishOutcome::Dropped(reason)
    }

    /// The transport call runs before the state moves, so a failed connect
    /// or disconnect leaves the state as it was.
    fn fire(&mut self, trigger: Trigger) -> Result<()> {
        let (next, action) = transition(self.state, trigger);

        match action {
            Some(Action::Connect) => {
                info!(host = %self.options.host, port = self.options.port,
                      client_id = %self.options.client_id, "connecting to broker");
                self.transport.connect(&self.options)?;
            }
            Some(Action::Disconnect) => {
                info!("disconnecting from broker");
                self.transport.disconnect()?;
            }
            Some(Action::Ready) | None => {}
        }

        if next != self.state {
            debug!(from = ?self.state, to = ?next, ?trigger, "broker link");
        }
        self.state = next;

        if action == Some(Action::Ready) {
            info!(client_id = %self.options.client_id, "broker connected");
            if self.logging {
                self.subscribe_diagnostics();
            }
        }
        Ok(())
    }

    fn subscribe_diagnostics(&mut self) {
        let filter = self.topics.wildcard();
        match self.transport.subscribe(&filter) {
            Ok(()) => debug!(%filter, "subscribed for diagnostics"),
            Err(e) => warn!(%filter, error = %e, "diagnostic subscribe failed"),
        }
    }
}

impl Drop for TelemetryClient {
    fn drop(&mut self) {
        if self.state.is_enabled() {
            if let Err(e) = self.transport.disconnect() {
                warn!(error = %e, "broker disconnect on drop failed");
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
