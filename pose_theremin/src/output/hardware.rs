//! Hardware MIDI output.
//!
//! Note-ons go out immediately; the matching note-offs wait in a
//! [`NoteOffQueue`] until the loop polls past their due time.

use std::time::{Duration, Instant};

use gesture_midi::{note_from_ratio, velocity_from_ratio, ChordTable, NoteEvent};
use tracing::{debug, info, warn};

use super::{BackendState, OutputBackend, Readout};
use crate::config::NoteOffPolicy;
use crate::schedule::NoteOffQueue;
use crate::{Result, ThereminError};

const CLIENT_NAME: &str = "pose_theremin";

// ════════════════════════════════════════════════════════════════════════════
// MidiPort: midir in production, recording ports in tests
// ════════════════════════════════════════════════════════════════════════════

pub trait MidiPort: Send {
    fn name(&self) -> &str;
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

// ── midir backend ─────────────────────────────────────────────────────────

pub struct MidirPort {
    name: String,
    conn: midir::MidiOutputConnection,
}

impl MidiPort for MidirPort {
    fn name(&self) -> &str { &self.name }

    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.conn.send(message).map_err(|e| ThereminError::Device(e.to_string()))
    }
}

impl Drop for MidirPort {
    fn drop(&mut self) {
        debug!(port = %self.name, "closing MIDI port");
    }
}

/// Names of every MIDI output port the system currently offers.
pub fn list_ports() -> Result<Vec<String>> {
    let midi_out = midir::MidiOutput::new(CLIENT_NAME).map_err(|e| ThereminError::Device(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect())
}

/// Open the port called `name`; an exact match wins over a
/// case-insensitive substring match.
pub fn open_port(name: &str) -> Result<MidirPort> {
    let midi_out = midir::MidiOutput::new(CLIENT_NAME).map_err(|e| ThereminError::Device(e.to_string()))?;
    let ports = midi_out.ports();
    let named: Vec<(String, &midir::MidiOutputPort)> = ports
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok().map(|n| (n, p)))
        .collect();

    let wanted = name.to_lowercase();
    let (port_name, port) = named
        .iter()
        .find(|(n, _)| n == name)
        .or_else(|| named.iter().find(|(n, _)| n.to_lowercase().contains(&wanted)))
        .map(|(n, p)| (n.clone(), (*p).clone()))
        .ok_or_else(|| {
            let available: Vec<&str> = named.iter().map(|(n, _)| n.as_str()).collect();
            ThereminError::Device(format!("no MIDI output named `{}` (available: {:?})", name, available))
        })?;

    info!(port = %port_name, "opening MIDI port");
    let conn = midi_out
        .connect(&port, "pose-theremin-out")
        .map_err(|e| ThereminError::Device(e.to_string()))?;
    Ok(MidirPort { name: port_name, conn })
}

// ════════════════════════════════════════════════════════════════════════════
// HardwareBackend
// ════════════════════════════════════════════════════════════════════════════

pub struct HardwareBackend {
    port:    Box<dyn MidiPort>,
    channel: u8,
    policy:  NoteOffPolicy,
    pending: NoteOffQueue,
}

impl HardwareBackend {
    pub fn new(port: Box<dyn MidiPort>, channel: u8, policy: NoteOffPolicy) -> Result<Self> {
        gesture_midi::message::status(gesture_midi::NOTE_ON, channel)?;
        Ok(HardwareBackend { port, channel, policy, pending: NoteOffQueue::new() })
    }

    pub fn port_name(&self) -> &str { self.port.name() }
    pub fn pending(&self) -> usize { self.pending.len() }

    /// Send failures are logged, never fatal.
    fn send(&mut self, message: &[u8]) {
        if let Err(e) = self.port.send(message) {
            warn!(port = %self.port.name(), ?message, error = %e, "MIDI send failed");
        }
    }

    fn flush(&mut self) {
        for off in self.pending.drain() {
            self.send(&off);
        }
    }
}

impl OutputBackend for HardwareBackend {
    fn name(&self) -> &str { "hardware" }

    fn play(
        &mut self,
        value: f32,
        gain: f32,
        duration_ms: u32,
        chords: Option<&ChordTable>,
        now: Instant,
    ) -> Result<Readout> {
        let notes = note_from_ratio(value, chords);
        let velocity = velocity_from_ratio(gain);
        let due = now + Duration::from_millis(u64::from(duration_ms));

        for &note in &notes {
            let event = NoteEvent::new(note, velocity, duration_ms)?;
            if self.policy == NoteOffPolicy::Retrigger {
                for stale in self.pending.cancel(note) {
                    self.send(&stale);
                }
            }
            self.send(&event.note_on(self.channel)?);
            self.pending.schedule(note, due, event.note_off(self.channel)?);
        }
        Ok(Readout { notes, velocity, hz: None })
    }

    fn stop(&mut self, _now: Instant) -> Result<()> {
        self.flush();
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<()> {
        for off in self.pending.due(now) {
            self.send(&off);
        }
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        self.flush();
        info!(port = %self.port_name(), "MIDI output released");
        Ok(())
    }

    fn state(&self) -> BackendState {
        if self.pending.is_empty() { BackendState::Idle } else { BackendState::PlayingHardware }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
