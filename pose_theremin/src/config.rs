//! Settings snapshot and the narrow update channel into it.
//!
//! Settings are plain data: the orchestrator holds one immutable
//! [`Settings`] and replaces it wholesale when a [`SettingsUpdate`] arrives.
//! Every field has a default, so `{}` is a valid settings file.

use std::fmt;
use std::path::Path;

use gesture_midi::chords;
use pose_telemetry::{TelemetryConfig, TopicTemplate};
use pose_zones::zone::{MAX_RANGE_SCALE, MIN_RANGE_SCALE};
use pose_zones::ZoneLayout;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::output::instrument::DEFAULT_PRESET;
use crate::{Result, ThereminError};

/// Environment variable consulted for the broker password.
pub const PASSWORD_ENV: &str = "POSE_THEREMIN_MQTT_PASSWORD";

pub const MIN_NOTE_DURATION_MS: u32 = 100;
pub const MAX_NOTE_DURATION_MS: u32 = 2000;

// ════════════════════════════════════════════════════════════════════════════
// OutputDevice
// ════════════════════════════════════════════════════════════════════════════

/// `"browser"` (synthesized sound) or the name of a MIDI output port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OutputDevice {
    #[default]
    Browser,
    Midi(String),
}

impl OutputDevice {
    pub const BROWSER: &'static str = "browser";
}

impl From<String> for OutputDevice {
    fn from(name: String) -> Self {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::BROWSER) {
            OutputDevice::Browser
        } else {
            OutputDevice::Midi(trimmed.to_string())
        }
    }
}

impl From<&str> for OutputDevice {
    fn from(name: &str) -> Self { OutputDevice::from(name.to_string()) }
}

impl From<OutputDevice> for String {
    fn from(device: OutputDevice) -> Self {
        match device {
            OutputDevice::Browser => OutputDevice::BROWSER.to_string(),
            OutputDevice::Midi(name) => name,
        }
    }
}

impl fmt::Display for OutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputDevice::Browser => f.write_str(Self::BROWSER),
            OutputDevice::Midi(name) => f.write_str(name),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Sections
// ════════════════════════════════════════════════════════════════════════════

/// Which slice of the pitch hand's zone spans the whole pitch range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteRange {
    /// 0.6–8; larger means a shorter window, so less travel per octave.
    pub scale:  f32,
    /// 0–1; where the window sits between the zone's top and bottom.
    pub offset: f32,
}

impl Default for NoteRange {
    fn default() -> Self { NoteRange { scale: 1.0, offset: 0.0 } }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Detection {
    pub min_pose_confidence: f32,
    pub min_part_confidence: f32,
}

impl Default for Detection {
    fn default() -> Self {
        Detection { min_pose_confidence: 0.1, min_part_confidence: 0.5 }
    }
}

/// What to do when a note is retriggered before its note-off fired.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteOffPolicy {
    /// Keep every scheduled note-off; an older one may end a newer note.
    #[default]
    Overlap,
    /// Send the stale note-off right before the new note-on.
    Retrigger,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MidiSettings {
    /// 1–16.
    pub channel:  u8,
    pub note_off: NoteOffPolicy,
}

impl Default for MidiSettings {
    fn default() -> Self { MidiSettings { channel: 1, note_off: NoteOffPolicy::Overlap } }
}

/// How the instrument backend turns a ratio into a frequency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InstrumentPitch {
    /// Nearest entry of the 88-key note table.
    #[default]
    NoteTable,
    /// `value * 2000 + 20` Hz, snapped to the nearest semitone.
    Continuous,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MqttSettings {
    pub enabled:             bool,
    #[serde(flatten)]
    pub client:              TelemetryConfig,
    /// Horizontal field of view of the camera, for distance and angle.
    pub fov_degrees:         f32,
    /// Real shoulder width in the distance unit you want back.
    pub distance_multiplier: f32,
}

impl Default for MqttSettings {
    fn default() -> Self {
        MqttSettings {
            enabled:             false,
            client:              TelemetryConfig::default(),
            fov_degrees:         60.0,
            distance_multiplier: 0.4,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Settings
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub output_device:    OutputDevice,
    /// Instrument preset name, or `default` for the plain tone.
    pub preset:           String,
    /// Chord table name, or `default` for single notes.
    pub chord_intervals:  String,
    pub note_duration_ms: u32,
    pub note_range:       NoteRange,
    pub detection:        Detection,
    pub zones:            ZoneLayout,
    pub midi:             MidiSettings,
    pub instrument_pitch: InstrumentPitch,
    pub mqtt:             MqttSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output_device:    OutputDevice::Browser,
            preset:           DEFAULT_PRESET.to_string(),
            chord_intervals:  chords::DEFAULT.to_string(),
            note_duration_ms: 300,
            note_range:       NoteRange::default(),
            detection:        Detection::default(),
            zones:            ZoneLayout::default(),
            midi:             MidiSettings::default(),
            instrument_pitch: InstrumentPitch::default(),
            mqtt:             MqttSettings::default(),
        }
    }
}

impl Settings {
    /// Parse a settings document and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validated()
    }

    /// Read a settings file.  The broker password comes from
    /// [`PASSWORD_ENV`] when set, overriding the file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut settings = Self::from_json(&text)?;
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            debug!("broker password taken from {}", PASSWORD_ENV);
            settings.mqtt.client.password = Some(password);
        }
        Ok(settings)
    }

    /// Clamp ranged values into bounds; reject what cannot be clamped.
    pub fn validated(mut self) -> Result<Self> {
        if !(1..=16).contains(&self.midi.channel) {
            return Err(ThereminError::Config(format!(
                "midi.channel must be 1–16, got {}",
                self.midi.channel
            )));
        }
        for (name, v) in [
            ("noteRange.scale", self.note_range.scale),
            ("noteRange.offset", self.note_range.offset),
            ("zones.split", self.zones.split),
            ("zones.heightFactor", self.zones.height_factor),
            ("mqtt.fovDegrees", self.mqtt.fov_degrees),
        ] {
            if !v.is_finite() {
                return Err(ThereminError::Config(format!("{} must be a number", name)));
            }
        }
        TopicTemplate::new(&self.mqtt.client.topic_template)?;

        self.note_duration_ms = self.note_duration_ms.clamp(MIN_NOTE_DURATION_MS, MAX_NOTE_DURATION_MS);
        self.note_range.scale = self.note_range.scale.clamp(MIN_RANGE_SCALE, MAX_RANGE_SCALE);
        self.note_range.offset = self.note_range.offset.clamp(0.0, 1.0);
        self.detection.min_pose_confidence = clamp_unit(self.detection.min_pose_confidence);
        self.detection.min_part_confidence = clamp_unit(self.detection.min_part_confidence);
        self.zones.split = self.zones.split.clamp(0.0, 1.0);
        self.zones.height_factor = self.zones.height_factor.clamp(0.0, 1.0);
        self.mqtt.fov_degrees = self.mqtt.fov_degrees.clamp(1.0, 179.0);

        if self.preset.trim().is_empty() {
            self.preset = DEFAULT_PRESET.to_string();
        }
        if self.chord_intervals.trim().is_empty() {
            self.chord_intervals = chords::DEFAULT.to_string();
        }
        Ok(self)
    }

    /// The snapshot that results from one update.
    pub fn with(&self, update: SettingsUpdate) -> Result<Settings> {
        let mut next = self.clone();
        match update {
            SettingsUpdate::OutputDevice(d)    => next.output_device = d,
            SettingsUpdate::Preset(p)          => next.preset = p,
            SettingsUpdate::ChordIntervals(c)  => next.chord_intervals = c,
            SettingsUpdate::NoteDurationMs(ms) => next.note_duration_ms = ms,
            SettingsUpdate::NoteRange(r)       => next.note_range = r,
            SettingsUpdate::Detection(d)       => next.detection = d,
            SettingsUpdate::Zones(z)           => next.zones = z,
            SettingsUpdate::Midi(m)            => next.midi = m,
            SettingsUpdate::InstrumentPitch(p) => next.instrument_pitch = p,
            SettingsUpdate::MqttEnabled(on)    => next.mqtt.enabled = on,
            SettingsUpdate::MqttLogging(on)    => next.mqtt.client.logging = on,
            SettingsUpdate::Mqtt(mut m) => {
                // Updates never carry the password; keep the one we have.
                if m.client.password.is_none() {
                    m.client.password = next.mqtt.client.password.take();
                }
                next.mqtt = m;
            }
        }
        next.validated()
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 }
}

// ════════════════════════════════════════════════════════════════════════════
// SettingsUpdate
// ════════════════════════════════════════════════════════════════════════════

/// One change from the control surface, e.g.
/// `{"set": "preset", "value": "AMSynth1"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "set", content = "value", rename_all = "camelCase")]
pub enum SettingsUpdate {
    OutputDevice(OutputDevice),
    Preset(String),
    ChordIntervals(String),
    NoteDurationMs(u32),
    NoteRange(NoteRange),
    Detection(Detection),
    Zones(ZoneLayout),
    Midi(MidiSettings),
    InstrumentPitch(InstrumentPitch),
    MqttEnabled(bool),
    MqttLogging(bool),
    Mqtt(MqttSettings),
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_defaults() {
        let s = Settings::from_json("{}").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.note_duration_ms, 300);
        assert_eq!(s.midi.channel, 1);
        assert_eq!(s.mqtt.client.topic_template, "iot-2/evt/{event}/fmt/json");
    }

    #[test]
    fn camel_case_surface() {
        let s = Settings::from_json(
            r#"{
                "outputDevice": "IAC Driver Bus 1",
                "chordIntervals": "minor-triads",
                "noteDurationMs": 5000,
                "noteRange": {"scale": 20, "offset": 0.5},
                "detection": {"minPartConfidence": 0.7},
                "midi": {"channel": 10, "noteOff": "retrigger"},
                "instrumentPitch": "continuous",
                "mqtt": {"enabled": true, "host": "broker", "clientId": "rig", "fovDegrees": 70}
            }"#,
        )
        .unwrap();
        assert_eq!(s.output_device, OutputDevice::Midi("IAC Driver Bus 1".into()));
        assert_eq!(s.chord_intervals, "minor-triads");
        assert_eq!(s.note_duration_ms, MAX_NOTE_DURATION_MS);
        assert_eq!(s.note_range.scale, MAX_RANGE_SCALE);
        assert_eq!(s.note_range.offset, 0.5);
        assert_eq!(s.detection.min_part_confidence, 0.7);
        assert_eq!(s.detection.min_pose_confidence, 0.1);
        assert_eq!(s.midi, MidiSettings { channel: 10, note_off: NoteOffPolicy::Retrigger });
        assert_eq!(s.instrument_pitch, InstrumentPitch::Continuous);
        assert!(s.mqtt.enabled);
        assert_eq!(s.mqtt.client.host, "broker");
        assert_eq!(s.mqtt.client.client_id.as_deref(), Some("rig"));
        assert_eq!(s.mqtt.fov_degrees, 70.0);
    }

    #[test]
    fn browser_device_aliases() {
        assert_eq!(OutputDevice::from(""), OutputDevice::Browser);
        assert_eq!(OutputDevice::from("Browser"), OutputDevice::Browser);
        assert_eq!(String::from(OutputDevice::Browser), "browser");
    }

    #[test]
    fn bad_channel_rejected() {
        let err = Settings::from_json(r#"{"midi": {"channel": 17}}"#).unwrap_err();
        assert!(matches!(err, ThereminError::Config(_)));
    }

    #[test]
    fn topic_template_without_placeholder_rejected() {
        let err = Settings::from_json(r#"{"mqtt": {"topicTemplate": "no-placeholder"}}"#).unwrap_err();
        assert!(matches!(err, ThereminError::Telemetry(_)));

        let mut m = MqttSettings::default();
        m.client.topic_template = "no-placeholder".into();
        assert!(Settings::default().with(SettingsUpdate::Mqtt(m)).is_err());
    }

    #[test]
    fn password_never_written() {
        let mut s = Settings::default();
        s.mqtt.client.password = Some("hunter2".into());
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"fovDegrees\""));
    }

    #[test]
    fn update_wire_format() {
        let u: SettingsUpdate = serde_json::from_str(r#"{"set":"preset","value":"AMSynth1"}"#).unwrap();
        assert_eq!(u, SettingsUpdate::Preset("AMSynth1".into()));
        let u: SettingsUpdate = serde_json::from_str(r#"{"set":"mqttEnabled","value":true}"#).unwrap();
        assert_eq!(u, SettingsUpdate::MqttEnabled(true));
    }

    #[test]
    fn update_produces_new_snapshot() {
        let s = Settings::default();
        let next = s.with(SettingsUpdate::NoteDurationMs(20)).unwrap();
        assert_eq!(next.note_duration_ms, MIN_NOTE_DURATION_MS);
        assert_eq!(s.note_duration_ms, 300);
    }

    #[test]
    fn mqtt_update_keeps_password() {
        let mut s = Settings::default();
        s.mqtt.client.password = Some("pw".into());
        let mut m = MqttSettings::default();
        m.client.host = "elsewhere".into();
        let next = s.with(SettingsUpdate::Mqtt(m)).unwrap();
        assert_eq!(next.mqtt.client.host, "elsewhere");
        assert_eq!(next.mqtt.client.password.as_deref(), Some("pw"));
    }

    #[test]
    fn load_reads_file() {
        let path = std::env::temp_dir().join(format!("pose-theremin-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"preset": "FMSynth1"}"#).unwrap();
        let s = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(s.preset, "FMSynth1");
    }
}
