//! [`BrokerTransport`] over MQTT, backed by `rumqttc`.
//!
//! Each `connect` starts a fresh session: a `rumqttc::Client` plus a thread
//! driving its `Connection`.  The thread forwards what it sees over a
//! channel owned by that session only, so events from a torn-down session
//! can never reach the next one.  `rumqttc` reconnects on its own after an
//! error; we just pace the retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rumqttc::{
    Client, ClientError, ConnectReturnCode, Connection, ConnectionError, Event, MqttOptions,
    Outgoing, Packet, QoS, Transport,
};
use tracing::{debug, trace, warn};

use crate::transport::{BrokerEvent, BrokerOptions, BrokerTransport};
use crate::{Result, TelemetryError};

/// Requests buffered between us and the event loop.
const REQUEST_CAPACITY: usize = 64;
const RETRY_DELAY: Duration = Duration::from_secs(2);

struct Session {
    client: Client,
    events: Receiver<BrokerEvent>,
    stop:   Arc<AtomicBool>,
}

#[derive(Default)]
pub struct MqttTransport {
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new() -> Self { Self::default() }

    fn client(&self) -> Result<&Client> {
        self.session.as_ref().map(|s| &s.client).ok_or(TelemetryError::NotConnected)
    }
}

fn mqtt_options(options: &BrokerOptions) -> MqttOptions {
    let mut mqtt = MqttOptions::new(options.client_id.clone(), options.host.clone(), options.port);
    mqtt.set_keep_alive(options.keep_alive.max(Duration::from_secs(5)));
    mqtt.set_clean_session(true);
    if let Some(user) = &options.username {
        mqtt.set_credentials(user.clone(), options.password.clone().unwrap_or_default());
    }
    if options.secure {
        mqtt.set_transport(Transport::tls_with_default_config());
    }
    mqtt
}

fn client_error(e: ClientError) -> TelemetryError {
    match e {
        ClientError::TryRequest(_) => TelemetryError::QueueFull,
        ClientError::Request(_) => TelemetryError::Transport("event loop has stopped".into()),
    }
}

fn drive(mut connection: Connection, tx: Sender<BrokerEvent>, stop: Arc<AtomicBool>) {
    for notification in connection.iter() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let event = match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    BrokerEvent::Connected
                } else {
                    BrokerEvent::ConnectionLost(format!("connection refused: {:?}", ack.code))
                }
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                BrokerEvent::Message { topic: p.topic.clone(), payload: p.payload.to_vec() }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(other) => {
                trace!(?other, "mqtt event");
                continue;
            }
            Err(ConnectionError::RequestsDone) => break,
            Err(e) => {
                if tx.send(BrokerEvent::ConnectionLost(e.to_string())).is_err() {
                    break;
                }
                thread::sleep(RETRY_DELAY);
                continue;
            }
        };
        if tx.send(event).is_err() {
            break;
        }
    }
    debug!("mqtt event loop finished");
}

impl BrokerTransport for MqttTransport {
    fn connect(&mut self, options: &BrokerOptions) -> Result<()> {
        self.disconnect()?;

        let (client, connection) = Client::new(mqtt_options(options), REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        thread::Builder::new()
            .name("mqtt-events".into())
            .spawn(move || drive(connection, tx, thread_stop))
            .map_err(|e| TelemetryError::Transport(format!("cannot spawn event thread: {}", e)))?;

        self.session = Some(Session { client, events: rx, stop });
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.stop.store(true, Ordering::Relaxed);
            // The thread also exits on `stop`, so a failed request only
            // delays the broker noticing.
            if let Err(e) = session.client.try_disconnect() {
                warn!(error = %e, "mqtt disconnect request not queued");
            }
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client()?
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(client_error)
    }

    fn subscribe(&mut self, filter: &str) -> Result<()> {
        self.client()?.try_subscribe(filter, QoS::AtMostOnce).map_err(client_error)
    }

    fn poll_events(&mut self) -> Vec<BrokerEvent> {
        match &self.session {
            Some(session) => session.events.try_iter().collect(),
            None => Vec::new(),
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BrokerOptions {
        BrokerOptions {
            host: "broker.example".into(),
            port: 8883,
            client_id: "pose-theremin-test".into(),
            username: Some("user".into()),
            password: Some("secret".into()),
            secure: true,
            keep_alive: Duration::from_secs(1),
        }
    }

    #[test]
    fn options_carry_identity_and_credentials() {
        let mqtt = mqtt_options(&options());
        assert_eq!(mqtt.client_id(), "pose-theremin-test");
        assert_eq!(mqtt.broker_address(), ("broker.example".to_string(), 8883));
        assert_eq!(mqtt.keep_alive(), Duration::from_secs(5));
        assert_eq!(mqtt.credentials(), Some(("user".to_string(), "secret".to_string())));
    }

    /// Nothing listens on port 1.
    fn closed_port() -> BrokerOptions {
        BrokerOptions {
            host: "127.0.0.1".into(),
            port: 1,
            client_id: "pose-theremin-closed".into(),
            username: None,
            password: None,
            secure: false,
            keep_alive: Duration::from_secs(5),
        }
    }

    fn wait_for_events(t: &mut MqttTransport, timeout: Duration) -> Vec<BrokerEvent> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let events = t.poll_events();
            if !events.is_empty() || std::time::Instant::now() >= deadline {
                return events;
            }
            thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn refused_connection_is_reported_as_lost() {
        let mut t = MqttTransport::new();
        t.connect(&closed_port()).unwrap();
        let events = wait_for_events(&mut t, Duration::from_secs(5));
        assert!(matches!(events.first(), Some(BrokerEvent::ConnectionLost(_))), "{:?}", events);

        t.disconnect().unwrap();
        assert!(t.poll_events().is_empty());
        assert!(matches!(t.publish("a/b", vec![1]), Err(TelemetryError::NotConnected)));
    }

    #[test]
    fn stopped_session_forwards_nothing() {
        let (_client, connection) = Client::new(mqtt_options(&closed_port()), REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(true));
        let handle = thread::spawn(move || drive(connection, tx, stop));

        // the thread exits without sending and drops its end
        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(10)),
            Err(mpsc::RecvTimeoutError::Disconnected)
        ));
        handle.join().unwrap();
    }

    #[test]
    fn reconnect_never_sees_the_old_session() {
        let mut t = MqttTransport::new();
        t.connect(&closed_port()).unwrap();
        assert!(!wait_for_events(&mut t, Duration::from_secs(5)).is_empty());
        // long enough for the first session to fail once more
        thread::sleep(RETRY_DELAY + Duration::from_millis(500));

        // accepts TCP but never answers CONNECT, so this session stays silent
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let silent = BrokerOptions {
            port: listener.local_addr().unwrap().port(),
            client_id: "pose-theremin-silent".into(),
            ..closed_port()
        };
        t.connect(&silent).unwrap();
        assert!(t.poll_events().is_empty());
        thread::sleep(Duration::from_millis(300));
        assert!(t.poll_events().is_empty());
        t.disconnect().unwrap();
    }

    #[test]
    fn full_request_queue_is_backpressure() {
        let (client, _connection) = Client::new(mqtt_options(&closed_port()), 1);
        assert!(client.try_publish("a/b", QoS::AtMostOnce, false, vec![1]).is_ok());
        let err = client.try_publish("a/b", QoS::AtMostOnce, false, vec![2]).map_err(client_error);
        assert!(matches!(err, Err(TelemetryError::QueueFull)));
    }

    #[test]
    fn idle_transport_rejects_publish() {
        let mut t = MqttTransport::new();
        assert!(matches!(t.publish("a", vec![1]), Err(TelemetryError::NotConnected)));
        assert!(t.poll_events().is_empty());
        assert!(t.disconnect().is_ok());
    }
}
