//! Equal-tempered pitch helpers (A4 = 440 Hz = note 69).

const A4_HZ: f32 = 440.0;
const A4_NOTE: f32 = 69.0;

const NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Frequency of a MIDI note.
pub fn midi_to_hz(note: u8) -> f32 {
    A4_HZ * 2f32.powf((f32::from(note) - A4_NOTE) / 12.0)
}

/// Nearest MIDI note to a frequency, clamped to 0–127.  Non-positive or
/// non-finite input gives 0.
pub fn hz_to_midi(hz: f32) -> u8 {
    if !(hz.is_finite() && hz > 0.0) {
        return 0;
    }
    (A4_NOTE + 12.0 * (hz / A4_HZ).log2()).round().clamp(0.0, 127.0) as u8
}

/// Scientific pitch name, middle C (60) = `C4`.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{}", NAMES[usize::from(note % 12)], octave)
}

/// Ordered table of playable notes with their frequencies.
///
/// The default table covers the 88 piano keys, A0 (21) to C8 (108).
#[derive(Clone, Debug)]
pub struct NoteTable {
    notes: Vec<u8>,
}

impl Default for NoteTable {
    fn default() -> Self { NoteTable::range(21, 108) }
}

impl NoteTable {
    /// Every note from `low` to `high` inclusive.
    pub fn range(low: u8, high: u8) -> Self {
        let (low, high) = (low.min(high), high.max(low).min(127));
        NoteTable { notes: (low..=high).collect() }
    }

    pub fn len(&self) -> usize { self.notes.len() }
    pub fn is_empty(&self) -> bool { self.notes.is_empty() }

    /// Pick the entry nearest `ratio` (0.0–1.0) and return `(note, hz)`.
    pub fn select(&self, ratio: f32) -> Option<(u8, f32)> {
        let last = self.notes.len().checked_sub(1)?;
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        let index = (ratio * last as f32).round() as usize;
        let note = self.notes[index.min(last)];
        Some((note, midi_to_hz(note)))
    }
}
