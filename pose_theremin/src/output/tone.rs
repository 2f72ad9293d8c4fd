//! Synthesized tone: one persistent sine oscillator with a gain stage.
//!
//! Parameter changes glide toward their target with a 1 ms time constant.
//! `stop` ramps the gain exponentially down to 0.001 over half a second and
//! then halts the oscillator.

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use gesture_midi::{hz_to_midi, velocity_from_ratio, ChordTable};
use tracing::debug;

use super::{BackendState, OutputBackend, Readout};
use crate::audio::{lock, AudioSink, AudioSource, SharedSource};
use crate::Result;

/// `value * SPAN + BASE` Hz.
pub const BASE_HZ: f32 = 20.0;
pub const SPAN_HZ: f32 = 2000.0;

const TIME_CONSTANT: f32 = 0.001;
const RELEASE: Duration = Duration::from_millis(500);
const RELEASE_FLOOR: f32 = 0.001;

pub fn frequency(value: f32) -> f32 {
    value * SPAN_HZ + BASE_HZ
}

// ════════════════════════════════════════════════════════════════════════════
// ToneVoice
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug)]
struct Ramp {
    factor:    f32,
    remaining: u32,
}

/// The oscillator, rendered in sample time.
#[derive(Debug)]
pub struct ToneVoice {
    sample_rate: f32,
    running:     bool,
    phase:       f32,
    freq:        f32,
    freq_target: f32,
    gain:        f32,
    gain_target: f32,
    /// Per-sample smoothing coefficient for the time-constant glide.
    smoothing:   f32,
    ramp:        Option<Ramp>,
}

impl ToneVoice {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1) as f32;
        ToneVoice {
            sample_rate,
            running:     false,
            phase:       0.0,
            freq:        BASE_HZ,
            freq_target: BASE_HZ,
            gain:        0.0,
            gain_target: 0.0,
            smoothing:   1.0 - (-1.0 / (TIME_CONSTANT * sample_rate)).exp(),
            ramp:        None,
        }
    }

    pub fn is_running(&self) -> bool { self.running }
    pub fn frequency(&self) -> f32 { self.freq }
    pub fn gain(&self) -> f32 { self.gain }

    /// Start (or restart after a release) at `freq`, gliding up from the
    /// current gain.
    pub fn start(&mut self, freq: f32, gain: f32) {
        if !self.running {
            self.freq = freq;
            self.phase = 0.0;
        }
        self.running = true;
        self.retarget(freq, gain);
    }

    pub fn retarget(&mut self, freq: f32, gain: f32) {
        self.ramp = None;
        self.freq_target = freq;
        self.gain_target = gain;
    }

    /// Exponential fade to the floor over `duration`, then halt.
    pub fn release(&mut self, duration: Duration) {
        if !self.running {
            return;
        }
        let samples = (duration.as_secs_f32() * self.sample_rate).max(1.0);
        let start = self.gain.max(RELEASE_FLOOR);
        self.ramp = Some(Ramp {
            factor:    (RELEASE_FLOOR / start).powf(1.0 / samples),
            remaining: samples as u32,
        });
    }

    pub fn halt(&mut self) {
        self.running = false;
        self.ramp = None;
        self.gain = 0.0;
        self.gain_target = 0.0;
    }
}

impl AudioSource for ToneVoice {
    fn next_sample(&mut self) -> f32 {
        if !self.running {
            return 0.0;
        }
        match &mut self.ramp {
            Some(ramp) => {
                self.gain *= ramp.factor;
                ramp.remaining = ramp.remaining.saturating_sub(1);
                if ramp.remaining == 0 {
                    self.halt();
                    return 0.0;
                }
            }
            None => {
                self.freq += (self.freq_target - self.freq) * self.smoothing;
                self.gain += (self.gain_target - self.gain) * self.smoothing;
            }
        }
        self.phase = (self.phase + self.freq / self.sample_rate).fract();
        (self.phase * TAU).sin() * self.gain
    }
}

// ════════════════════════════════════════════════════════════════════════════
// ToneBackend
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Silent,
    Sounding,
    Releasing { until: Instant },
}

pub struct ToneBackend {
    voice: Arc<Mutex<ToneVoice>>,
    sink:  Box<dyn AudioSink>,
    phase: Phase,
}

impl ToneBackend {
    pub fn new(mut sink: Box<dyn AudioSink>) -> Result<Self> {
        let voice = Arc::new(Mutex::new(ToneVoice::new(sink.sample_rate())));
        let source: SharedSource = voice.clone();
        sink.attach(source)?;
        Ok(ToneBackend { voice, sink, phase: Phase::Silent })
    }

    pub fn voice(&self) -> Arc<Mutex<ToneVoice>> { Arc::clone(&self.voice) }
}

impl OutputBackend for ToneBackend {
    fn name(&self) -> &str { "tone" }

    fn play(
        &mut self,
        value: f32,
        gain: f32,
        _duration_ms: u32,
        _chords: Option<&ChordTable>,
        _now: Instant,
    ) -> Result<Readout> {
        let freq = frequency(value);
        {
            let mut voice = lock(&self.voice);
            if self.phase == Phase::Sounding {
                voice.retarget(freq, gain);
            } else {
                debug!(freq, "oscillator start");
                voice.start(freq, gain);
            }
        }
        self.phase = Phase::Sounding;
        Ok(Readout { notes: vec![hz_to_midi(freq)], velocity: velocity_from_ratio(gain), hz: Some(freq) })
    }

    fn stop(&mut self, now: Instant) -> Result<()> {
        if self.phase == Phase::Sounding {
            lock(&self.voice).release(RELEASE);
            self.phase = Phase::Releasing { until: now + RELEASE };
        }
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<()> {
        if let Phase::Releasing { until } = self.phase {
            if now >= until {
                lock(&self.voice).halt();
                self.phase = Phase::Silent;
            }
        }
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        lock(&self.voice).halt();
        self.sink.detach();
        self.phase = Phase::Silent;
        Ok(())
    }

    fn state(&self) -> BackendState {
        match self.phase {
            Phase::Silent => BackendState::Idle,
            _ => BackendState::PlayingSynth,
        }
    }
}
