//! The seam between [`TelemetryClient`](crate::TelemetryClient) and a broker.

use std::fmt;
use std::time::Duration;

use crate::Result;

/// Something the broker told us, drained by [`BrokerTransport::poll_events`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Connection acknowledged.
    Connected,
    /// The session dropped or the connect attempt failed.
    ConnectionLost(String),
    /// A message on a subscribed topic.
    Message { topic: String, payload: Vec<u8> },
}

/// Everything needed to open one broker session.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    pub host:       String,
    pub port:       u16,
    pub client_id:  String,
    pub username:   Option<String>,
    pub password:   Option<String>,
    pub secure:     bool,
    pub keep_alive: Duration,
}

impl fmt::Debug for BrokerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// A broker client.  Every call is non-blocking; results of `connect`
/// arrive later as [`BrokerEvent`]s.
pub trait BrokerTransport {
    fn connect(&mut self, options: &BrokerOptions) -> Result<()>;
    fn disconnect(&mut self) -> Result<()>;
    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;
    fn subscribe(&mut self, filter: &str) -> Result<()>;
    /// Drain events received since the last call.
    fn poll_events(&mut self) -> Vec<BrokerEvent>;
}
