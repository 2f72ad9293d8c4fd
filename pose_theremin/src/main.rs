//! Command-line front end.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gesture_midi::{chords, note_name};
use pose_theremin::app::{self, AppConfig};
use pose_theremin::config::{OutputDevice, Settings};
use pose_theremin::output::instrument::PRESETS;
use pose_theremin::output::{DeviceHub, SystemDevices};
use pose_theremin::Result;
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Run(args) => run(args),
        Commands::Devices => devices(),
        Commands::Presets => {
            presets();
            Ok(())
        }
        Commands::Chords => {
            chord_tables();
            Ok(())
        }
    };

    if let Err(e) = outcome {
        tracing::error!(error = %e, "pose_theremin failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Play notes and stream telemetry from body-pose keypoints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read frames as JSON lines and play them.
    Run(RunArgs),
    /// List output devices.
    Devices,
    /// List instrument presets.
    Presets,
    /// List chord tables.
    Chords,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Settings file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// JSON-lines frame file; stdin when omitted.
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Output device: `browser` or a MIDI port name.
    #[arg(short, long)]
    device: Option<String>,
    /// Instrument preset for the browser output.
    #[arg(short, long)]
    preset: Option<String>,
    /// Chord table name.
    #[arg(long)]
    chords: Option<String>,
    /// Enable broker telemetry.
    #[arg(long)]
    mqtt: bool,
    /// Publish to an in-process broker instead of the network.
    #[arg(long)]
    loopback: bool,
    /// No audio device and no MIDI ports.
    #[arg(long)]
    headless: bool,
    /// Pause between frames, for replaying recordings.
    #[arg(long)]
    frame_interval_ms: Option<u64>,
}

fn run(args: RunArgs) -> Result<()> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(device) = &args.device {
        settings.output_device = OutputDevice::from(device.as_str());
    }
    if let Some(preset) = args.preset {
        settings.preset = preset;
    }
    if let Some(chords) = args.chords {
        settings.chord_intervals = chords;
    }
    if args.mqtt || args.loopback {
        settings.mqtt.enabled = true;
    }

    tracing::info!(
        output = %settings.output_device,
        preset = %settings.preset,
        chords = %settings.chord_intervals,
        mqtt = settings.mqtt.enabled,
        "starting"
    );

    app::run(AppConfig {
        settings,
        input: args.input,
        headless: args.headless,
        loopback: args.loopback,
        frame_interval: args.frame_interval_ms.map(Duration::from_millis),
    })
}

fn devices() -> Result<()> {
    println!("{}", OutputDevice::Browser);
    for name in SystemDevices.midi_outputs()? {
        println!("{}", name);
    }
    Ok(())
}

fn presets() {
    for p in PRESETS.iter() {
        println!("{:<10} {:?} {:?} x{}", p.name, p.synthesis, p.waveform, p.count);
    }
}

fn chord_tables() {
    println!("{:<16} single notes", chords::DEFAULT);
    for table in chords::all() {
        let first: Vec<String> = table.slots().next().unwrap_or_default().iter().map(|&n| note_name(n)).collect();
        println!("{:<16} {:>3} slots, first [{}]", table.name(), table.len(), first.join(" "));
    }
}
