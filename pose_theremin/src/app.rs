//! The main loop.
//!
//! Frames arrive from a [`FrameSource`](crate::source::FrameSource) thread;
//! everything else happens here, single-threaded: frames are processed in
//! order and the output and broker are polled every 10 ms even when no
//! frame arrives.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use pose_telemetry::{BrokerTransport, LoopbackTransport, MqttTransport};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::orchestrator::FrameOrchestrator;
use crate::output::{DeviceHub, HeadlessDevices, SystemDevices};
use crate::source::{spawn_frame_source, JsonLinesSource, SourceEvent};
use crate::{Result, ThereminError};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

// ════════════════════════════════════════════════════════════════════════════
// AppConfig
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub settings:       Settings,
    /// JSON-lines input; stdin when `None`.
    pub input:          Option<PathBuf>,
    /// Silent audio and no MIDI ports.
    pub headless:       bool,
    /// In-process broker instead of MQTT.
    pub loopback:       bool,
    /// Pause between frames when replaying a file.
    pub frame_interval: Option<Duration>,
}

fn open_input(cfg: &AppConfig) -> Result<Receiver<SourceEvent>> {
    match &cfg.input {
        None => {
            info!("reading frames from stdin");
            let source = JsonLinesSource::new(BufReader::new(io::stdin()), "stdin");
            Ok(match cfg.frame_interval {
                Some(i) => spawn_frame_source(source.paced(i)),
                None => spawn_frame_source(source),
            })
        }
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                ThereminError::msg(format!("cannot open input {}: {}", path.display(), e))
            })?;
            info!(path = %path.display(), "reading frames from file");
            let source = JsonLinesSource::new(BufReader::new(file), &path.display().to_string());
            Ok(match cfg.frame_interval {
                Some(i) => spawn_frame_source(source.paced(i)),
                None => spawn_frame_source(source),
            })
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// run(): the main application loop
// ════════════════════════════════════════════════════════════════════════════

pub fn run(cfg: AppConfig) -> Result<()> {
    let hub: Box<dyn DeviceHub> =
        if cfg.headless { Box::new(HeadlessDevices) } else { Box::new(SystemDevices) };
    let transport: Box<dyn BrokerTransport> =
        if cfg.loopback { Box::new(LoopbackTransport::new()) } else { Box::new(MqttTransport::new()) };

    let mut orchestrator = FrameOrchestrator::new(cfg.settings.clone(), hub, transport)?;
    let events = open_input(&cfg)?;

    drive(&mut orchestrator, &events);

    orchestrator.shutdown();
    info!(frames = orchestrator.frames(), "stopped");
    Ok(())
}

/// Pump `events` into the orchestrator until the source ends.
pub fn drive(orchestrator: &mut FrameOrchestrator, events: &Receiver<SourceEvent>) {
    let mut last_status = Instant::now();

    loop {
        match events.recv_timeout(POLL_INTERVAL) {
            Ok(SourceEvent::Frame(frame)) => {
                let report = orchestrator.process_frame(&frame, Instant::now());
                debug!(poses = report.poses, published = report.published, stopped = report.stopped, "frame");
            }
            Ok(SourceEvent::Update(update)) => {
                if let Err(e) = orchestrator.apply(update) {
                    warn!(error = %e, "settings update failed");
                }
            }
            Ok(SourceEvent::End) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let now = Instant::now();
        orchestrator.tick(now);

        if now.duration_since(last_status) >= STATUS_INTERVAL {
            last_status = now;
            let stats = orchestrator.telemetry_stats();
            info!(
                frames = orchestrator.frames(),
                output = ?orchestrator.output_state(),
                notes = ?orchestrator.readout().map(|r| &r.notes),
                broker = ?orchestrator.telemetry_state(),
                sent = stats.sent,
                dropped = stats.not_ready + stats.empty + stats.backpressure + stats.errors,
                "status"
            );
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
