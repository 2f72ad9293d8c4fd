//! # gesture_midi
//!
//! Turn normalized gesture ratios (0.0–1.0) into MIDI material:
//!
//! * **Ratio** → note number, either across the 8-octave range 24–120 or by
//!   picking a slot from a [`ChordTable`] (a slot may hold several notes).
//! * **Ratio** → velocity 0–127.
//! * [`NoteEvent`] → raw 3-byte Note-On / Note-Off messages for a channel.
//! * Note numbers ↔ frequencies and note names, for the audio backends.
//!
//! ## Quick start
//!
//! ```rust
//! use gesture_midi::{percentage, note_from_ratio, velocity_from_ratio, chords};
//!
//! let ratio = percentage(150.0, 100.0, 300.0);       // 0.25
//! assert_eq!(note_from_ratio(ratio, None), vec![48]);
//!
//! let triads = chords::lookup("major-triads").unwrap();
//! let slot = note_from_ratio(0.0, Some(&triads));
//! assert_eq!(slot, vec![48, 52, 55]);
//!
//! assert_eq!(velocity_from_ratio(1.0), 127);
//! ```

pub mod chords;
pub mod message;
pub mod pitch;
pub mod quantize;

pub use chords::ChordTable;
pub use message::{NoteEvent, ShortMessage, NOTE_OFF, NOTE_ON};
pub use pitch::{hz_to_midi, midi_to_hz, note_name, NoteTable};
pub use quantize::{note_from_ratio, percentage, velocity_from_ratio, MAX_NOTE, MIN_NOTE, OCTAVES};

/// Result alias for fallible MIDI constructors.
pub type Result<T> = std::result::Result<T, MidiError>;

/// Errors raised while building MIDI messages or chord tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MidiError {
    /// MIDI channels are numbered 1–16.
    #[error("MIDI channel {0} is outside 1–16")]
    InvalidChannel(u8),
    /// Notes must last at least one millisecond.
    #[error("note duration must be positive")]
    ZeroDuration,
    /// A chord table needs at least one slot, and every slot at least one note.
    #[error("chord table `{0}` has an empty slot or no slots")]
    EmptyChordTable(String),
}
