//! Per-frame glue: keypoints in, notes and telemetry out.
//!
//! The orchestrator owns the zone mapper, the active output and the
//! telemetry client.  Frames are handled strictly in delivery order; settings
//! changes land between frames through [`FrameOrchestrator::apply`].

use std::time::Instant;

use gesture_midi::{chords, ChordTable};
use pose_telemetry::{BrokerTransport, LinkState, PublishOutcome, TelemetryClient, TelemetryStats};
use pose_zones::{BodyReading, CameraModel, Frame, Hand, Pose, ZoneMapper};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::config::{MqttSettings, Settings, SettingsUpdate};
use crate::output::{BackendState, DeviceHub, Output, Readout, Selection};
use crate::Result;

/// What one frame did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Poses above the confidence threshold.
    pub poses:     usize,
    pub readout:   Option<Readout>,
    /// A pose hit the zero sentinel and the output was stopped.
    pub stopped:   bool,
    /// Telemetry messages actually handed to the transport.
    pub published: usize,
}

pub struct FrameOrchestrator {
    settings:  Settings,
    chords:    Option<ChordTable>,
    zones:     ZoneMapper,
    output:    Output,
    telemetry: TelemetryClient,
    readout:   Option<Readout>,
    frames:    u64,
}

/// `default` means single notes; an unknown name is logged and treated the
/// same way.
fn resolve_chords(name: &str) -> Option<ChordTable> {
    if name.eq_ignore_ascii_case(chords::DEFAULT) {
        return None;
    }
    let table = chords::lookup(name);
    if table.is_none() {
        warn!(chords = name, known = ?chords::NAMES, "unknown chord table, playing single notes");
    }
    table
}

impl FrameOrchestrator {
    pub fn new(
        settings: Settings,
        hub: Box<dyn DeviceHub>,
        transport: Box<dyn BrokerTransport>,
    ) -> Result<Self> {
        let settings = settings.validated()?;

        let mut output = Output::new(hub);
        output.select(Selection::from_settings(&settings))?;

        let mut telemetry = TelemetryClient::new(&settings.mqtt.client, transport)?;
        if settings.mqtt.enabled {
            telemetry.set_enabled(true)?;
        }

        Ok(FrameOrchestrator {
            chords: resolve_chords(&settings.chord_intervals),
            zones: ZoneMapper::new(settings.zones, 0, 0),
            settings,
            output,
            telemetry,
            readout: None,
            frames: 0,
        })
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn settings(&self)        -> &Settings         { &self.settings }
    pub fn readout(&self)         -> Option<&Readout>  { self.readout.as_ref() }
    pub fn frames(&self)          -> u64               { self.frames }
    pub fn output_state(&self)    -> BackendState      { self.output.state() }
    pub fn telemetry_state(&self) -> LinkState         { self.telemetry.state() }
    pub fn telemetry_stats(&self) -> TelemetryStats    { self.telemetry.stats() }

    // ── Frames ────────────────────────────────────────────────────────────

    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> FrameReport {
        self.frames += 1;
        self.zones.resize(frame.width, frame.height);

        let mut report = FrameReport::default();
        let min_pose = self.settings.detection.min_pose_confidence;

        for pose in frame.poses.iter().filter(|p| p.score >= min_pose) {
            report.poses += 1;
            self.play_pose(pose, now, &mut report);
            if self.settings.mqtt.enabled {
                report.published += self.publish_pose(pose, frame);
            }
        }
        report
    }

    fn play_pose(&mut self, pose: &Pose, now: Instant, report: &mut FrameReport) {
        let min_part = self.settings.detection.min_part_confidence;
        let (Some(pitch), Some(volume)) = (
            pose.confident(Hand::Left.wrist(), min_part),
            pose.confident(Hand::Right.wrist(), min_part),
        ) else {
            return;
        };

        let range = self.settings.note_range;
        let pitch_window = self.zones.pitch_window(Hand::Left, range.scale, range.offset);
        let volume_window = self.zones.pitch_window(Hand::Right, 1.0, 0.0);
        let value = self.zones.position(Hand::Left, pitch.position, pitch_window).vertical;
        let gain = self.zones.position(Hand::Right, volume.position, volume_window).vertical;

        match self.output.play_note(value, gain, self.settings.note_duration_ms, self.chords.as_ref(), now) {
            Ok(Some(readout)) => {
                trace!(value, gain, notes = ?readout.notes, velocity = readout.velocity, "note");
                report.readout = Some(readout.clone());
                self.readout = Some(readout);
            }
            Ok(None) => report.stopped = true,
            Err(e) => warn!(error = %e, "could not play note"),
        }
    }

    /// Publish the body readings of one pose; returns how many were sent.
    fn publish_pose(&mut self, pose: &Pose, frame: &Frame) -> usize {
        let mqtt = &self.settings.mqtt;
        let camera = CameraModel::new(frame.width, mqtt.fov_degrees);
        let reading = BodyReading::from_pose(
            pose,
            (frame.width, frame.height),
            &camera,
            mqtt.distance_multiplier,
            self.settings.detection.min_part_confidence,
        );

        let nose = reading.nose.map(|(x, y)| json!({ "x": x, "y": y }));
        let distance = reading.distance.map(|d| json!({ "distance": d }));
        let angle = reading.angle.map(|a| json!({ "angle": a }));
        let robot: Option<Value> = (reading.distance.is_some() || reading.angle.is_some())
            .then(|| json!({ "distance": reading.distance, "angle": reading.angle }));

        let outcomes = [
            self.telemetry.publish("nose", &nose),
            self.telemetry.publish("distance", &distance),
            self.telemetry.publish("angle", &angle),
            self.telemetry.publish("robot", &robot),
            self.telemetry.publish_keypoints(&pose.keypoints),
        ];
        outcomes.iter().filter(|o| **o == PublishOutcome::Sent).count()
    }

    // ── Housekeeping ──────────────────────────────────────────────────────

    /// Fire due note-offs, advance releases, drain broker events.
    pub fn tick(&mut self, now: Instant) {
        self.output.poll(now);
        self.telemetry.pump();
    }

    /// Take one settings change.  Output re-selection tears the old backend
    /// down before anything else plays.  The new snapshot is stored only once
    /// telemetry and output have accepted it; on error `settings()` still
    /// reports the previous one.
    pub fn apply(&mut self, update: SettingsUpdate) -> Result<()> {
        let next = self.settings.with(update)?;

        self.apply_telemetry(&next.mqtt)?;
        let selection = Selection::from_settings(&next);
        if self.output.selection() != Some(&selection) {
            self.output.select(selection)?;
        }

        if next.zones != self.settings.zones {
            self.zones.set_layout(next.zones);
        }
        if next.chord_intervals != self.settings.chord_intervals {
            self.chords = resolve_chords(&next.chord_intervals);
        }

        let previous = std::mem::replace(&mut self.settings, next);
        debug!(?previous, current = ?self.settings, "settings updated");
        Ok(())
    }

    fn apply_telemetry(&mut self, new: &MqttSettings) -> Result<()> {
        let old = &self.settings.mqtt;
        if !new.enabled {
            self.telemetry.set_enabled(false)?;
        }
        if new.client != old.client {
            let mut logging_only = new.client.clone();
            logging_only.logging = old.client.logging;
            if logging_only == old.client {
                self.telemetry.set_logging(new.client.logging);
            } else {
                self.telemetry.reconfigure(&new.client)?;
            }
        }
        if new.enabled {
            self.telemetry.set_enabled(true)?;
        }
        Ok(())
    }

    /// Flush and release the output, close the broker session.
    pub fn shutdown(&mut self) {
        self.output.teardown();
        if let Err(e) = self.telemetry.set_enabled(false) {
            warn!(error = %e, "broker disconnect failed");
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
