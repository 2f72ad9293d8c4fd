//! Sound output: one active backend at a time.
//!
//! [`Output`] owns the active [`OutputBackend`] and the [`DeviceHub`] that
//! opens new ones.  Re-selecting always disposes the old backend before the
//! new one is opened, so a port or audio stream is never held twice.

pub mod hardware;
pub mod instrument;
pub mod tone;

use std::time::Instant;

use gesture_midi::ChordTable;
use tracing::{debug, info, warn};

use crate::audio::{AudioSink, NullSink};
use crate::config::{InstrumentPitch, NoteOffPolicy, OutputDevice, Settings};
use crate::{Result, ThereminError};

use self::hardware::{HardwareBackend, MidiPort};
use self::instrument::{InstrumentBackend, DEFAULT_PRESET};
use self::tone::ToneBackend;

// ════════════════════════════════════════════════════════════════════════════
// Backend contract
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendState {
    Idle,
    PlayingHardware,
    PlayingSynth,
    PlayingInstrument,
}

/// What a `play` call turned into, for the status readout.
#[derive(Clone, Debug, PartialEq)]
pub struct Readout {
    pub notes:    Vec<u8>,
    pub velocity: u8,
    /// Oscillator frequency, for the synthesized backends.
    pub hz:       Option<f32>,
}

pub trait OutputBackend {
    fn name(&self) -> &str;

    /// `value` and `gain` arrive clamped into (0, 1].
    fn play(
        &mut self,
        value: f32,
        gain: f32,
        duration_ms: u32,
        chords: Option<&ChordTable>,
        now: Instant,
    ) -> Result<Readout>;

    fn stop(&mut self, now: Instant) -> Result<()>;

    /// Fire whatever is due: note-offs, release completion.
    fn poll(&mut self, now: Instant) -> Result<()>;

    /// Release every resource; the backend is not used afterwards.
    fn dispose(&mut self) -> Result<()>;

    fn state(&self) -> BackendState;
}

// ════════════════════════════════════════════════════════════════════════════
// Devices
// ════════════════════════════════════════════════════════════════════════════

/// Where backends get their ports and sinks.
pub trait DeviceHub {
    fn midi_outputs(&self) -> Result<Vec<String>>;
    fn open_midi(&mut self, name: &str) -> Result<Box<dyn MidiPort>>;
    fn open_audio(&mut self) -> Result<Box<dyn AudioSink>>;
}

/// midir ports and the default cpal output device.
#[derive(Default)]
pub struct SystemDevices;

impl DeviceHub for SystemDevices {
    fn midi_outputs(&self) -> Result<Vec<String>> {
        hardware::list_ports()
    }

    fn open_midi(&mut self, name: &str) -> Result<Box<dyn MidiPort>> {
        Ok(Box::new(hardware::open_port(name)?))
    }

    #[cfg(feature = "audio")]
    fn open_audio(&mut self) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(crate::audio::CpalSink::open_default()?))
    }

    #[cfg(not(feature = "audio"))]
    fn open_audio(&mut self) -> Result<Box<dyn AudioSink>> {
        Err(ThereminError::Audio("built without the `audio` feature; use --headless".into()))
    }
}

/// No MIDI ports, silent audio.  For running without hardware.
#[derive(Default)]
pub struct HeadlessDevices;

impl DeviceHub for HeadlessDevices {
    fn midi_outputs(&self) -> Result<Vec<String>> { Ok(Vec::new()) }

    fn open_midi(&mut self, name: &str) -> Result<Box<dyn MidiPort>> {
        Err(ThereminError::Device(format!("no MIDI output named `{}` (headless)", name)))
    }

    fn open_audio(&mut self) -> Result<Box<dyn AudioSink>> {
        Ok(Box::new(NullSink::new()))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Selection
// ════════════════════════════════════════════════════════════════════════════

/// Which backend a settings snapshot asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Hardware { device: String, channel: u8, policy: NoteOffPolicy },
    Instrument { preset: String, pitch: InstrumentPitch },
    Synth,
}

impl Selection {
    /// A named device wins; then a preset other than `default`; then the
    /// plain tone.
    pub fn from_settings(settings: &Settings) -> Selection {
        match &settings.output_device {
            OutputDevice::Midi(device) => Selection::Hardware {
                device:  device.clone(),
                channel: settings.midi.channel,
                policy:  settings.midi.note_off,
            },
            OutputDevice::Browser if !settings.preset.eq_ignore_ascii_case(DEFAULT_PRESET) => {
                Selection::Instrument { preset: settings.preset.clone(), pitch: settings.instrument_pitch }
            }
            OutputDevice::Browser => Selection::Synth,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Output
// ════════════════════════════════════════════════════════════════════════════

pub struct Output {
    hub:       Box<dyn DeviceHub>,
    backend:   Option<Box<dyn OutputBackend>>,
    selection: Option<Selection>,
}

impl Output {
    pub fn new(hub: Box<dyn DeviceHub>) -> Self {
        Output { hub, backend: None, selection: None }
    }

    pub fn selection(&self) -> Option<&Selection> { self.selection.as_ref() }

    pub fn state(&self) -> BackendState {
        self.backend.as_ref().map_or(BackendState::Idle, |b| b.state())
    }

    /// Tear down the current backend, then open the one `selection` names.
    /// On failure the output stays idle.
    pub fn select(&mut self, selection: Selection) -> Result<()> {
        self.teardown();

        let backend: Box<dyn OutputBackend> = match &selection {
            Selection::Hardware { device, channel, policy } => {
                let port = self.hub.open_midi(device)?;
                Box::new(HardwareBackend::new(port, *channel, *policy)?)
            }
            Selection::Instrument { preset, pitch } => {
                let sink = self.hub.open_audio()?;
                Box::new(InstrumentBackend::new(preset, *pitch, sink)?)
            }
            Selection::Synth => Box::new(ToneBackend::new(self.hub.open_audio()?)?),
        };
        info!(backend = backend.name(), ?selection, "output selected");
        self.backend = Some(backend);
        self.selection = Some(selection);
        Ok(())
    }

    /// Dispose the active backend, if any.  Errors are logged.
    pub fn teardown(&mut self) {
        if let Some(mut old) = self.backend.take() {
            debug!(backend = old.name(), "disposing output");
            if let Err(e) = old.dispose() {
                warn!(backend = old.name(), error = %e, "output disposal failed");
            }
        }
        self.selection = None;
    }

    /// Play, or stop on the zero sentinel.  Returns what was played.
    pub fn play_note(
        &mut self,
        value: f32,
        gain: f32,
        duration_ms: u32,
        chords: Option<&ChordTable>,
        now: Instant,
    ) -> Result<Option<Readout>> {
        let (value, gain) = (unit(value), unit(gain));
        if value == 0.0 || gain == 0.0 {
            self.stop(now);
            return Ok(None);
        }
        match self.backend.as_mut() {
            Some(b) => b.play(value, gain, duration_ms, chords, now).map(Some),
            None => Ok(None),
        }
    }

    pub fn stop(&mut self, now: Instant) {
        if let Some(b) = self.backend.as_mut() {
            if let Err(e) = b.stop(now) {
                warn!(backend = b.name(), error = %e, "output stop failed");
            }
        }
    }

    pub fn poll(&mut self, now: Instant) {
        if let Some(b) = self.backend.as_mut() {
            if let Err(e) = b.poll(now) {
                warn!(backend = b.name(), error = %e, "output poll failed");
            }
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Clamp into [0, 1]; non-finite becomes 0.
fn unit(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

// ════════════════════════════════════════════════════════════════════════════
// Test doubles
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::lock;

    /// Records every message; clones share the log.
    #[derive(Clone)]
    pub struct RecordingPort {
        name: String,
        log:  Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<Mutex<bool>>,
    }

    impl RecordingPort {
        pub fn new(name: &str) -> Self {
            RecordingPort { name: name.into(), log: Arc::default(), fail: Arc::default() }
        }
        pub fn sent(&self) -> Vec<Vec<u8>> { lock(&self.log).clone() }
        pub fn fail(&self, on: bool) { *lock(&self.fail) = on; }
    }

    impl MidiPort for RecordingPort {
        fn name(&self) -> &str { &self.name }
        fn send(&mut self, message: &[u8]) -> Result<()> {
            if *lock(&self.fail) {
                return Err(ThereminError::Device("port gone".into()));
            }
            lock(&self.log).push(message.to_vec());
            Ok(())
        }
    }

    /// Hands out one shared recording port per name and shared null sinks.
    #[derive(Clone, Default)]
    pub struct TestHub {
        pub ports: Arc<Mutex<Vec<RecordingPort>>>,
        pub sinks: Arc<Mutex<Vec<NullSink>>>,
        pub names: Vec<String>,
    }

    impl TestHub {
        pub fn with_ports(names: &[&str]) -> Self {
            TestHub { names: names.iter().map(|n| n.to_string()).collect(), ..Self::default() }
        }
        pub fn port(&self, name: &str) -> Option<RecordingPort> {
            lock(&self.ports).iter().find(|p| p.name == name).cloned()
        }
        pub fn last_sink(&self) -> Option<NullSink> { lock(&self.sinks).last().cloned() }
    }

    impl DeviceHub for TestHub {
        fn midi_outputs(&self) -> Result<Vec<String>> { Ok(self.names.clone()) }

        fn open_midi(&mut self, name: &str) -> Result<Box<dyn MidiPort>> {
            if !self.names.iter().any(|n| n == name) {
                return Err(ThereminError::Device(format!("no MIDI output named `{}`", name)));
            }
            let port = self.port(name).unwrap_or_else(|| {
                let p = RecordingPort::new(name);
                lock(&self.ports).push(p.clone());
                p
            });
            Ok(Box::new(port))
        }

        fn open_audio(&mut self) -> Result<Box<dyn AudioSink>> {
            let sink = NullSink::new();
            lock(&self.sinks).push(sink.clone());
            Ok(Box::new(sink))
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::TestHub;
    use super::*;

    fn settings(device: &str, preset: &str) -> Settings {
        Settings { output_device: device.into(), preset: preset.into(), ..Settings::default() }
    }

    #[test]
    fn selection_rule() {
        assert_eq!(Selection::from_settings(&settings("browser", "default")), Selection::Synth);
        assert_eq!(Selection::from_settings(&settings("browser", "Default")), Selection::Synth);
        assert_eq!(Selection::from_settings(&Settings::default()), Selection::Synth);
        assert!(matches!(
            Selection::from_settings(&settings("browser", "Synth2")),
            Selection::Instrument { .. }
        ));
        assert!(matches!(
            Selection::from_settings(&settings("Port A", "Synth2")),
            Selection::Hardware { .. }
        ));
    }

    #[test]
    fn zero_sentinel_stops() {
        let hub = TestHub::with_ports(&["Port A"]);
        let mut out = Output::new(Box::new(hub.clone()));
        out.select(Selection::from_settings(&settings("Port A", "default"))).unwrap();
        let t0 = Instant::now();

        assert!(out.play_note(0.5, 0.5, 1000, None, t0).unwrap().is_some());
        assert_eq!(out.state(), BackendState::PlayingHardware);

        assert!(out.play_note(0.0, 0.5, 1000, None, t0).unwrap().is_none());
        assert_eq!(out.state(), BackendState::Idle);
        assert_eq!(hub.port("Port A").unwrap().sent().last().unwrap()[0], 128);

        assert!(out.play_note(0.5, f32::NAN, 1000, None, t0).unwrap().is_none());
    }

    #[test]
    fn values_are_clamped() {
        let hub = TestHub::with_ports(&["Port A"]);
        let mut out = Output::new(Box::new(hub.clone()));
        out.select(Selection::from_settings(&settings("Port A", "default"))).unwrap();
        let r = out.play_note(7.0, 3.0, 300, None, Instant::now()).unwrap().unwrap();
        assert_eq!(r.notes, vec![120]);
        assert_eq!(r.velocity, 127);
    }

    #[test]
    fn switching_tears_down_first() {
        let hub = TestHub::with_ports(&["Port A"]);
        let mut out = Output::new(Box::new(hub.clone()));
        let t0 = Instant::now();

        out.select(Selection::Synth).unwrap();
        out.play_note(0.5, 0.5, 300, None, t0).unwrap();
        let synth_sink = hub.last_sink().unwrap();
        assert!(synth_sink.is_attached());

        out.select(Selection::from_settings(&settings("Port A", "default"))).unwrap();
        assert!(!synth_sink.is_attached());
        out.play_note(0.5, 0.5, 5000, None, t0).unwrap();
        let port = hub.port("Port A").unwrap();
        assert_eq!(port.sent().len(), 1);

        out.select(Selection::from_settings(&settings("browser", "FMSynth1"))).unwrap();
        // pending note-off flushed on the way out
        assert_eq!(port.sent().len(), 2);
        assert_eq!(port.sent()[1][0], 128);
        assert_eq!(out.state(), BackendState::Idle);
    }

    #[test]
    fn failed_open_leaves_output_idle() {
        let hub = TestHub::with_ports(&[]);
        let mut out = Output::new(Box::new(hub.clone()));
        out.select(Selection::Synth).unwrap();
        let sink = hub.last_sink().unwrap();

        let err = out.select(Selection::from_settings(&settings("Missing", "default")));
        assert!(matches!(err, Err(ThereminError::Device(_))));
        assert!(out.selection().is_none());
        assert!(!sink.is_attached());
        assert!(out.play_note(0.5, 0.5, 300, None, Instant::now()).unwrap().is_none());
    }

    #[test]
    fn poll_fires_note_offs() {
        let hub = TestHub::with_ports(&["Port A"]);
        let mut out = Output::new(Box::new(hub.clone()));
        out.select(Selection::from_settings(&settings("Port A", "default"))).unwrap();
        let t0 = Instant::now();
        out.play_note(0.5, 0.5, 300, None, t0).unwrap();
        out.poll(t0 + Duration::from_millis(300));
        assert_eq!(out.state(), BackendState::Idle);
    }

    #[test]
    fn headless_hub_has_no_ports() {
        let mut hub = HeadlessDevices;
        assert!(hub.midi_outputs().unwrap().is_empty());
        assert!(hub.open_midi("x").is_err());
        assert_eq!(hub.open_audio().unwrap().sample_rate(), crate::audio::DEFAULT_SAMPLE_RATE);
    }
}
