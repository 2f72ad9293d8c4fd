//! Channel voice messages sent to hardware ports.

use serde::Serialize;

use crate::{MidiError, Result};

/// Note-Off status nibble, before the channel is OR-ed in.
pub const NOTE_OFF: u8 = 0x80;
/// Note-On status nibble, before the channel is OR-ed in.
pub const NOTE_ON: u8 = 0x90;

/// A 3-byte channel message ready for the wire.
pub type ShortMessage = [u8; 3];

/// One note to sound for `duration_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NoteEvent {
    pub note:        u8,
    pub velocity:    u8,
    pub duration_ms: u32,
}

impl NoteEvent {
    /// Note and velocity are clamped to 0–127; a zero duration is an error.
    pub fn new(note: u8, velocity: u8, duration_ms: u32) -> Result<Self> {
        if duration_ms == 0 {
            return Err(MidiError::ZeroDuration);
        }
        Ok(NoteEvent { note: note.min(127), velocity: velocity.min(127), duration_ms })
    }

    /// Note-On for `channel` (1–16).
    pub fn note_on(&self, channel: u8) -> Result<ShortMessage> {
        Ok([status(NOTE_ON, channel)?, self.note, self.velocity])
    }

    /// Note-Off for `channel` (1–16).  The velocity is repeated as the
    /// release velocity.
    pub fn note_off(&self, channel: u8) -> Result<ShortMessage> {
        Ok([status(NOTE_OFF, channel)?, self.note, self.velocity])
    }
}

/// Status byte for a message kind on a 1-based channel.
pub fn status(kind: u8, channel: u8) -> Result<u8> {
    if !(1..=16).contains(&channel) {
        return Err(MidiError::InvalidChannel(channel));
    }
    Ok((kind & 0xF0) | (channel - 1))
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_one_status_bytes() {
        assert_eq!(status(NOTE_ON, 1), Ok(144));
        assert_eq!(status(NOTE_OFF, 1), Ok(128));
    }

    #[test]
    fn channel_sixteen_low_nibble() {
        assert_eq!(status(NOTE_ON, 16), Ok(0x9F));
    }

    #[test]
    fn channel_out_of_range() {
        assert_eq!(status(NOTE_ON, 0), Err(MidiError::InvalidChannel(0)));
        assert_eq!(status(NOTE_OFF, 17), Err(MidiError::InvalidChannel(17)));
    }

    #[test]
    fn note_event_messages() {
        let ev = NoteEvent::new(60, 100, 300).unwrap();
        assert_eq!(ev.note_on(1).unwrap(), [0x90, 60, 100]);
        assert_eq!(ev.note_off(1).unwrap(), [0x80, 60, 100]);
        assert_eq!(ev.note_on(10).unwrap(), [0x99, 60, 100]);
    }

    #[test]
    fn zero_duration_rejected() {
        assert_eq!(NoteEvent::new(60, 100, 0), Err(MidiError::ZeroDuration));
    }

    #[test]
    fn note_and_velocity_clamped() {
        let ev = NoteEvent::new(200, 255, 10).unwrap();
        assert_eq!((ev.note, ev.velocity), (127, 127));
    }
}
