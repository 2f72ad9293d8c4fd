//! An in-process broker.
//!
//! Publishes are kept in a bounded history and echoed back to matching
//! subscriptions, so `--loopback` runs exercise the full telemetry path
//! without a network.  Tests drive connection events by hand through
//! [`LoopbackBroker`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::transport::{BrokerEvent, BrokerOptions, BrokerTransport};
use crate::{Result, TelemetryError};

const HISTORY: usize = 1024;

#[derive(Default)]
struct Shared {
    auto_ack:      bool,
    connected:     bool,
    queue_full:    bool,
    options:       Option<BrokerOptions>,
    subscriptions: Vec<String>,
    published:     VecDeque<(String, Vec<u8>)>,
    events:        VecDeque<BrokerEvent>,
}

/// Inspection and control handle, cheap to clone.
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    shared: Arc<Mutex<Shared>>,
}

impl LoopbackBroker {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acknowledge the connection.
    pub fn ack(&self) {
        let mut s = self.lock();
        s.connected = true;
        s.events.push_back(BrokerEvent::Connected);
    }

    /// Drop the connection as if the socket closed.
    pub fn lose(&self, reason: &str) {
        let mut s = self.lock();
        s.connected = false;
        s.events.push_back(BrokerEvent::ConnectionLost(reason.to_string()));
    }

    pub fn set_queue_full(&self, full: bool) { self.lock().queue_full = full; }
    pub fn is_connected(&self) -> bool { self.lock().connected }
    pub fn subscriptions(&self) -> Vec<String> { self.lock().subscriptions.clone() }
    pub fn options(&self) -> Option<BrokerOptions> { self.lock().options.clone() }

    /// Most recent publishes, oldest first.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().published.iter().cloned().collect()
    }
}

pub struct LoopbackTransport {
    broker: LoopbackBroker,
}

impl LoopbackTransport {
    /// Connects as soon as asked.
    pub fn new() -> Self {
        let broker = LoopbackBroker::default();
        broker.lock().auto_ack = true;
        LoopbackTransport { broker }
    }

    /// Waits for [`LoopbackBroker::ack`].
    pub fn manual() -> Self {
        LoopbackTransport { broker: LoopbackBroker::default() }
    }

    pub fn broker(&self) -> LoopbackBroker { self.broker.clone() }
}

impl Default for LoopbackTransport {
    fn default() -> Self { Self::new() }
}

impl BrokerTransport for LoopbackTransport {
    fn connect(&mut self, options: &BrokerOptions) -> Result<()> {
        let mut s = self.broker.lock();
        s.options = Some(options.clone());
        if s.auto_ack {
            s.connected = true;
            s.events.push_back(BrokerEvent::Connected);
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let mut s = self.broker.lock();
        s.connected = false;
        s.subscriptions.clear();
        s.events.clear();
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut s = self.broker.lock();
        if !s.connected {
            return Err(TelemetryError::NotConnected);
        }
        if s.queue_full {
            return Err(TelemetryError::QueueFull);
        }
        if s.subscriptions.iter().any(|f| topic_matches(f, topic)) {
            s.events.push_back(BrokerEvent::Message { topic: topic.to_string(), payload: payload.clone() });
        }
        if s.published.len() == HISTORY {
            s.published.pop_front();
        }
        s.published.push_back((topic.to_string(), payload));
        Ok(())
    }

    fn subscribe(&mut self, filter: &str) -> Result<()> {
        let mut s = self.broker.lock();
        if !s.connected {
            return Err(TelemetryError::NotConnected);
        }
        if !s.subscriptions.iter().any(|f| f == filter) {
            s.subscriptions.push(filter.to_string());
        }
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<BrokerEvent> {
        self.broker.lock().events.drain(..).collect()
    }
}

/// MQTT filter matching with `+` (one level) and `#` (the rest).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut f = filter.split('/');
    let mut t = topic.split('/');
    loop {
        match (f.next(), t.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(a), Some(b)) if a == b => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
