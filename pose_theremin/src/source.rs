//! Frame sources.
//!
//! The public interface is [`SourceEvent`] delivered over an `mpsc` channel.
//! The main loop does not care whether frames come from stdin, a recorded
//! file, or a live pose estimator writing JSON lines.

use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use pose_zones::Frame;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::SettingsUpdate;

// ════════════════════════════════════════════════════════════════════════════
// SourceEvent
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub enum SourceEvent {
    Frame(Frame),
    Update(SettingsUpdate),
    /// The source is exhausted.
    End,
}

/// One input line: `{"frame": {...}}` or `{"update": {...}}`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
enum Line {
    Frame(Frame),
    Update(SettingsUpdate),
}

/// Parse one line.  Blank lines give `Ok(None)`.
pub fn parse_line(line: &str) -> serde_json::Result<Option<SourceEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    Ok(Some(match serde_json::from_str(line)? {
        Line::Frame(f) => SourceEvent::Frame(f),
        Line::Update(u) => SourceEvent::Update(u),
    }))
}

// ════════════════════════════════════════════════════════════════════════════
// FrameSource trait
// ════════════════════════════════════════════════════════════════════════════

/// Anything that can deliver [`SourceEvent`]s over a channel.
pub trait FrameSource: Send + 'static {
    fn run(self: Box<Self>, tx: Sender<SourceEvent>);
}

/// Spawn a source on its own thread and return the receiving end.
pub fn spawn_frame_source<S: FrameSource>(source: S) -> Receiver<SourceEvent> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || Box::new(source).run(tx));
    rx
}

// ════════════════════════════════════════════════════════════════════════════
// JsonLinesSource
// ════════════════════════════════════════════════════════════════════════════

/// Reads JSON lines until EOF.  Malformed lines are logged and skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    label:  String,
    /// Pause after each frame, for replaying recordings in real time.
    pace:   Option<Duration>,
}

impl<R: BufRead + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R, label: &str) -> Self {
        JsonLinesSource { reader, label: label.to_string(), pace: None }
    }

    pub fn paced(mut self, interval: Duration) -> Self {
        self.pace = Some(interval);
        self
    }
}

impl<R: BufRead + Send + 'static> FrameSource for JsonLinesSource<R> {
    fn run(self: Box<Self>, tx: Sender<SourceEvent>) {
        let JsonLinesSource { reader, label, pace } = *self;

        for (index, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!(source = %label, error = %e, "read failed, closing source");
                    break;
                }
            };
            let event = match parse_line(&line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!(source = %label, line = index + 1, error = %e, "skipping malformed line");
                    continue;
                }
            };
            let is_frame = matches!(event, SourceEvent::Frame(_));
            if tx.send(event).is_err() {
                return;
            }
            if let (true, Some(interval)) = (is_frame, pace) {
                thread::sleep(interval);
            }
        }

        debug!(source = %label, "end of input");
        let _ = tx.send(SourceEvent::End);
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_frames_and_updates() {
        let f = parse_line(r#"{"frame": {"width": 640, "height": 480, "poses": []}}"#).unwrap();
        assert!(matches!(f, Some(SourceEvent::Frame(Frame { width: 640, .. }))));

        let u = parse_line(r#"{"update": {"set": "chordIntervals", "value": "blues"}}"#).unwrap();
        assert_eq!(u, Some(SourceEvent::Update(SettingsUpdate::ChordIntervals("blues".into()))));

        assert_eq!(parse_line("   ").unwrap(), None);
        assert!(parse_line("{\"nope\": 1}").is_err());
    }

    #[test]
    fn source_skips_bad_lines_and_ends() {
        let input = concat!(
            "{\"frame\": {\"width\": 1, \"height\": 1}}\n",
            "garbage\n",
            "\n",
            "{\"update\": {\"set\": \"mqttEnabled\", \"value\": true}}\n",
            "{\"frame\": {\"width\": 2, \"height\": 2}}\n",
        );
        let rx = spawn_frame_source(JsonLinesSource::new(Cursor::new(input.as_bytes().to_vec()), "test"));
        let events: Vec<SourceEvent> = rx.iter().collect();

        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], SourceEvent::Frame(Frame { width: 1, .. })));
        assert_eq!(events[1], SourceEvent::Update(SettingsUpdate::MqttEnabled(true)));
        assert!(matches!(events[2], SourceEvent::Frame(Frame { width: 2, .. })));
        assert_eq!(events[3], SourceEvent::End);
    }
}
