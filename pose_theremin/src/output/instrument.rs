//! Instrument presets: a small subtractive/AM/FM voice with ADSR envelopes.
//!
//! Every `play` triggers attack and schedules release after the note
//! duration, all in sample time.  Volume is carried in decibels.

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use gesture_midi::{hz_to_midi, midi_to_hz, velocity_from_ratio, ChordTable, NoteTable};
use tracing::{debug, info};

use super::tone::frequency;
use super::{BackendState, OutputBackend, Readout};
use crate::audio::{lock, AudioSink, AudioSource, SharedSource};
use crate::config::InstrumentPitch;
use crate::{Result, ThereminError};

// ════════════════════════════════════════════════════════════════════════════
// Preset data
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// One cycle over `phase` in [0, 1).
    fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine     => (phase * TAU).sin(),
            Waveform::Square   => if phase < 0.5 { 1.0 } else { -1.0 },
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        }
    }
}

/// Attack, decay and release in seconds; sustain as a level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub attack:  f32,
    pub decay:   f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Envelope { attack, decay, sustain, release }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Synthesis {
    /// Detuned unison stack of one waveform.
    Subtractive,
    /// Carrier amplitude-modulated by a second oscillator.
    Am,
    /// Carrier frequency-modulated by a second oscillator.
    Fm,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preset {
    pub name:                &'static str,
    pub synthesis:           Synthesis,
    pub waveform:            Waveform,
    /// Unison voices; 1 for a plain oscillator.
    pub count:               u8,
    /// Total detune across the unison stack, in cents.
    pub spread:              f32,
    pub envelope:            Envelope,
    /// Modulator frequency as a multiple of the carrier.
    pub harmonicity:         f32,
    pub modulation_index:    f32,
    pub modulation:          Waveform,
    pub modulation_envelope: Envelope,
}

const FLAT: Envelope = Envelope::new(0.0, 0.0, 1.0, 0.0);

pub const PRESETS: [Preset; 4] = [
    Preset {
        name:                "Synth1",
        synthesis:           Synthesis::Subtractive,
        waveform:            Waveform::Sine,
        count:               10,
        spread:              60.0,
        envelope:            Envelope::new(0.4, 0.01, 1.0, 0.4),
        harmonicity:         1.0,
        modulation_index:    0.0,
        modulation:          Waveform::Sine,
        modulation_envelope: FLAT,
    },
    Preset {
        name:                "Synth2",
        synthesis:           Synthesis::Subtractive,
        waveform:            Waveform::Sawtooth,
        count:               3,
        spread:              30.0,
        envelope:            Envelope::new(0.01, 0.1, 0.5, 0.4),
        harmonicity:         1.0,
        modulation_index:    0.0,
        modulation:          Waveform::Sine,
        modulation_envelope: FLAT,
    },
    Preset {
        name:                "AMSynth1",
        synthesis:           Synthesis::Am,
        waveform:            Waveform::Square,
        count:               1,
        spread:              0.0,
        envelope:            Envelope::new(0.03, 0.3, 0.7, 0.8),
        harmonicity:         3.999,
        modulation_index:    1.0,
        modulation:          Waveform::Square,
        modulation_envelope: Envelope::new(2.0, 3.0, 0.8, 0.1),
    },
    Preset {
        name:                "FMSynth1",
        synthesis:           Synthesis::Fm,
        waveform:            Waveform::Triangle,
        count:               1,
        spread:              0.0,
        envelope:            Envelope::new(0.2, 0.3, 0.1, 1.2),
        harmonicity:         3.01,
        modulation_index:    14.0,
        modulation:          Waveform::Square,
        modulation_envelope: Envelope::new(0.01, 0.5, 0.2, 0.1),
    },
];

/// Preset name that selects the plain tone instead of an instrument.
pub const DEFAULT_PRESET: &str = "default";

/// Case-insensitive preset lookup.
pub fn preset(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name.trim()))
}

/// Linear gain to decibels; silence is `-inf`.
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(0.0).log10()
}

pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

// ════════════════════════════════════════════════════════════════════════════
// ADSR
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release { step: f32 },
}

#[derive(Clone, Copy, Debug)]
struct Adsr {
    shape: Envelope,
    stage: Stage,
    level: f32,
}

impl Adsr {
    fn new(shape: Envelope) -> Self {
        Adsr { shape, stage: Stage::Idle, level: 0.0 }
    }

    fn trigger(&mut self) {
        self.stage = Stage::Attack;
    }

    fn release(&mut self, rate: f32) {
        if self.stage == Stage::Idle {
            return;
        }
        let samples = (self.shape.release * rate).max(1.0);
        self.stage = Stage::Release { step: self.level / samples };
    }

    fn is_idle(&self) -> bool { self.stage == Stage::Idle }

    fn next(&mut self, rate: f32) -> f32 {
        let sustain = self.shape.sustain.clamp(0.0, 1.0);
        match self.stage {
            Stage::Idle => {}
            Stage::Attack => {
                self.level += 1.0 / (self.shape.attack * rate).max(1.0);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= (1.0 - sustain) / (self.shape.decay * rate).max(1.0);
                if self.level <= sustain {
                    self.level = sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.level = sustain,
            Stage::Release { step } => {
                self.level -= step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }
}

// ════════════════════════════════════════════════════════════════════════════
// InstrumentVoice
// ════════════════════════════════════════════════════════════════════════════

/// Output scale so a full-volume unison stack stays well inside [-1, 1].
const HEADROOM: f32 = 0.5;

pub struct InstrumentVoice {
    preset:      Preset,
    rate:        f32,
    freq:        f32,
    volume_db:   f32,
    phases:      Vec<f32>,
    detune:      Vec<f32>,
    mod_phase:   f32,
    env:         Adsr,
    mod_env:     Adsr,
    /// Samples left before the release starts.
    gate:        u64,
}

impl InstrumentVoice {
    pub fn new(preset: Preset, sample_rate: u32) -> Self {
        let count = usize::from(preset.count.max(1));
        let detune = (0..count)
            .map(|i| {
                let cents = if count == 1 {
                    0.0
                } else {
                    -preset.spread / 2.0 + preset.spread * i as f32 / (count - 1) as f32
                };
                2f32.powf(cents / 1200.0)
            })
            .collect();
        InstrumentVoice {
            preset,
            rate:      sample_rate.max(1) as f32,
            freq:      440.0,
            volume_db: 0.0,
            phases:    vec![0.0; count],
            detune,
            mod_phase: 0.0,
            env:       Adsr::new(preset.envelope),
            mod_env:   Adsr::new(preset.modulation_envelope),
            gate:      0,
        }
    }

    pub fn preset(&self) -> &Preset { &self.preset }
    pub fn volume_db(&self) -> f32 { self.volume_db }
    pub fn is_sounding(&self) -> bool { !self.env.is_idle() }

    pub fn set_volume_db(&mut self, db: f32) {
        self.volume_db = db;
    }

    pub fn trigger_attack_release(&mut self, freq: f32, seconds: f32) {
        self.freq = freq;
        self.gate = ((seconds.max(0.0) * self.rate) as u64).max(1);
        self.env.trigger();
        self.mod_env.trigger();
    }

    pub fn release(&mut self) {
        self.gate = 0;
        self.env.release(self.rate);
        self.mod_env.release(self.rate);
    }

    fn carrier(&mut self, freq: f32) -> f32 {
        let mut sum = 0.0;
        for (phase, ratio) in self.phases.iter_mut().zip(&self.detune) {
            sum += self.preset.waveform.sample(*phase);
            *phase = (*phase + freq * ratio / self.rate).rem_euclid(1.0);
        }
        sum / self.phases.len() as f32
    }
}

impl AudioSource for InstrumentVoice {
    fn next_sample(&mut self) -> f32 {
        if self.env.is_idle() {
            return 0.0;
        }
        if self.gate > 0 {
            self.gate -= 1;
            if self.gate == 0 {
                self.release();
            }
        }

        let amp = self.env.next(self.rate);
        let depth = self.mod_env.next(self.rate);
        let mod_freq = self.freq * self.preset.harmonicity;
        let m = self.preset.modulation.sample(self.mod_phase);
        self.mod_phase = (self.mod_phase + mod_freq / self.rate).fract();

        let out = match self.preset.synthesis {
            Synthesis::Subtractive => self.carrier(self.freq),
            Synthesis::Am => {
                let c = self.carrier(self.freq);
                c * (1.0 - 0.5 * depth * (1.0 - m))
            }
            Synthesis::Fm => {
                let deviation = m * self.preset.modulation_index * depth * mod_freq;
                self.carrier(self.freq + deviation)
            }
        };
        out * amp * db_to_gain(self.volume_db) * HEADROOM
    }
}

// ════════════════════════════════════════════════════════════════════════════
// InstrumentBackend
// ════════════════════════════════════════════════════════════════════════════

pub struct InstrumentBackend {
    voice:     Arc<Mutex<InstrumentVoice>>,
    sink:      Box<dyn AudioSink>,
    pitch:     InstrumentPitch,
    notes:     NoteTable,
    /// Set by the first `play` after a `stop`; the voice itself keeps
    /// running while the sink is attached.
    transport: bool,
}

impl InstrumentBackend {
    pub fn new(name: &str, pitch: InstrumentPitch, mut sink: Box<dyn AudioSink>) -> Result<Self> {
        let preset = *preset(name).ok_or_else(|| ThereminError::UnknownPreset(name.to_string()))?;
        let voice = Arc::new(Mutex::new(InstrumentVoice::new(preset, sink.sample_rate())));
        let source: SharedSource = voice.clone();
        sink.attach(source)?;
        info!(preset = preset.name, ?pitch, "instrument loaded");
        Ok(InstrumentBackend { voice, sink, pitch, notes: NoteTable::default(), transport: false })
    }

    pub fn voice(&self) -> Arc<Mutex<InstrumentVoice>> { Arc::clone(&self.voice) }

    /// `(note, hz)` for a ratio, per the configured pitch mode.
    pub fn pitch_for(&self, value: f32) -> (u8, f32) {
        match self.pitch {
            InstrumentPitch::NoteTable => self.notes.select(value).unwrap_or((69, 440.0)),
            InstrumentPitch::Continuous => {
                let note = hz_to_midi(frequency(value));
                (note, midi_to_hz(note))
            }
        }
    }
}

impl OutputBackend for InstrumentBackend {
    fn name(&self) -> &str { "instrument" }

    fn play(
        &mut self,
        value: f32,
        gain: f32,
        duration_ms: u32,
        _chords: Option<&ChordTable>,
        _now: Instant,
    ) -> Result<Readout> {
        if !self.transport {
            debug!("transport start");
            self.transport = true;
        }
        let (note, hz) = self.pitch_for(value);
        {
            let mut voice = lock(&self.voice);
            voice.set_volume_db(gain_to_db(gain));
            voice.trigger_attack_release(hz, duration_ms as f32 / 1000.0);
        }
        Ok(Readout { notes: vec![note], velocity: velocity_from_ratio(gain), hz: Some(hz) })
    }

    fn stop(&mut self, _now: Instant) -> Result<()> {
        if self.transport {
            debug!("transport stop");
            self.transport = false;
            lock(&self.voice).release();
        }
        Ok(())
    }

    /// Releases are scheduled inside the voice, so there is nothing to poll.
    fn poll(&mut self, _now: Instant) -> Result<()> { Ok(()) }

    fn dispose(&mut self) -> Result<()> {
        self.transport = false;
        lock(&self.voice).release();
        self.sink.detach();
        Ok(())
    }

    fn state(&self) -> BackendState {
        if self.transport { BackendState::PlayingInstrument } else { BackendState::Idle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSink;

    fn backend(name: &str, pitch: InstrumentPitch) -> (InstrumentBackend, NullSink) {
        let sink = NullSink::new();
        (InstrumentBackend::new(name, pitch, Box::new(sink.clone())).unwrap(), sink)
    }

    #[test]
    fn presets_by_name() {
        let names: Vec<&str> = PRESETS.iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Synth1", "Synth2", "AMSynth1", "FMSynth1"]);
        assert_eq!(preset("amsynth1").unwrap().harmonicity, 3.999);
        assert!(preset(DEFAULT_PRESET).is_none());
    }

    #[test]
    fn unknown_preset_is_an_error() {
        let r = InstrumentBackend::new("Theremin9", InstrumentPitch::NoteTable, Box::new(NullSink::new()));
        assert!(matches!(r, Err(ThereminError::UnknownPreset(_))));
    }

    #[test]
    fn decibels() {
        assert_eq!(gain_to_db(1.0), 0.0);
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
        assert!((db_to_gain(gain_to_db(0.25)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn note_table_pitch() {
        let (b, _) = backend("Synth1", InstrumentPitch::NoteTable);
        assert_eq!(b.pitch_for(0.0).0, 21);
        assert_eq!(b.pitch_for(1.0).0, 108);
        let (note, hz) = b.pitch_for(0.5);
        assert_eq!(note, 65);
        assert!((hz - midi_to_hz(65)).abs() < 1e-3);
    }

    #[test]
    fn continuous_pitch_snaps_to_semitone() {
        let (b, _) = backend("Synth1", InstrumentPitch::Continuous);
        // 0.21 * 2000 + 20 = 440 Hz
        assert_eq!(b.pitch_for(0.21), (69, 440.0));
    }

    #[test]
    fn play_sets_volume_and_sounds() {
        let (mut b, sink) = backend("Synth2", InstrumentPitch::NoteTable);
        assert_eq!(b.state(), BackendState::Idle);
        let r = b.play(0.5, 0.5, 300, None, Instant::now()).unwrap();
        assert_eq!(r.velocity, 64);
        assert_eq!(b.state(), BackendState::PlayingInstrument);
        assert!((lock(&b.voice).volume_db() + 6.0206).abs() < 1e-3);
        assert!(sink.render(4800).iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn note_releases_after_duration() {
        let (mut b, sink) = backend("Synth2", InstrumentPitch::NoteTable);
        b.play(0.5, 1.0, 100, None, Instant::now()).unwrap();
        // 100 ms gate + 400 ms release at 48 kHz
        sink.render(4800 + 19_300);
        assert!(!lock(&b.voice).is_sounding());
    }

    #[test]
    fn stop_releases_and_stops_transport() {
        let (mut b, sink) = backend("FMSynth1", InstrumentPitch::NoteTable);
        b.play(0.5, 1.0, 2000, None, Instant::now()).unwrap();
        b.stop(Instant::now()).unwrap();
        assert_eq!(b.state(), BackendState::Idle);
        // FMSynth1 release is 1.2 s
        sink.render(48_000 * 13 / 10);
        assert!(!lock(&b.voice).is_sounding());
    }

    #[test]
    fn dispose_detaches() {
        let (mut b, sink) = backend("AMSynth1", InstrumentPitch::NoteTable);
        b.play(0.5, 1.0, 300, None, Instant::now()).unwrap();
        b.dispose().unwrap();
        assert!(!sink.is_attached());
    }

    #[test]
    fn adsr_shape() {
        let mut env = Adsr::new(Envelope::new(0.01, 0.01, 0.5, 0.01));
        let rate = 1000.0;
        env.trigger();
        let peak = (0..15).map(|_| env.next(rate)).fold(0.0f32, f32::max);
        assert_eq!(peak, 1.0);
        for _ in 0..40 { env.next(rate); }
        assert_eq!(env.level, 0.5);
        env.release(rate);
        for _ in 0..12 { env.next(rate); }
        assert!(env.is_idle());
    }
}
