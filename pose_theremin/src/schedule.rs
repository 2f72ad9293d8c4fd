//! Cancellable note-off queue.
//!
//! Entries are keyed by note number so a retriggered note can pull its
//! stale note-off forward.  The owner fires due entries from its own loop;
//! nothing here sleeps or spawns.

use std::time::Instant;

use gesture_midi::ShortMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Pending {
    note:    u8,
    due:     Instant,
    message: ShortMessage,
}

#[derive(Debug, Default)]
pub struct NoteOffQueue {
    pending: Vec<Pending>,
}

impl NoteOffQueue {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.pending.len() }
    pub fn is_empty(&self) -> bool { self.pending.is_empty() }

    pub fn schedule(&mut self, note: u8, due: Instant, message: ShortMessage) {
        self.pending.push(Pending { note, due, message });
    }

    /// Remove every entry for `note`, earliest first.
    pub fn cancel(&mut self, note: u8) -> Vec<ShortMessage> {
        self.take_where(|p| p.note == note)
    }

    /// Remove and return everything due at `now`, earliest first.
    pub fn due(&mut self, now: Instant) -> Vec<ShortMessage> {
        self.take_where(|p| p.due <= now)
    }

    /// Remove and return everything, earliest first.
    pub fn drain(&mut self) -> Vec<ShortMessage> {
        self.take_where(|_| true)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    fn take_where(&mut self, pred: impl Fn(&Pending) -> bool) -> Vec<ShortMessage> {
        let (mut taken, kept): (Vec<Pending>, Vec<Pending>) =
            self.pending.drain(..).partition(|p| pred(p));
        self.pending = kept;
        taken.sort_by_key(|p| p.due);
        taken.into_iter().map(|p| p.message).collect()
    }
}
