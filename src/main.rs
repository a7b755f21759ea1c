//! CLI Entry Point for caselights
//!
//! # Usage
//!
//! ```bash
//! caselights ports
//! caselights set red --port /dev/ttyUSB0 --save
//! caselights run --mode audio:spectrum --audio-stdin < pcm.raw
//! caselights run --mode stats:heat
//! caselights gamepad --port /dev/ttyACM0
//! ```

use anyhow::{anyhow, Context, Result};
use caselights::audio::{read_pcm_block, AudioFeed};
use caselights::config::Settings;
use caselights::dispatcher::{LightingDispatcher, SignalSources};
use caselights::hardware::{list_ports, SerialLink, SerialLinkBuilder};
use caselights::logging;
use caselights::mode::{parse_color, AudioVariant, Mode};
use caselights::reader::{ReaderEvent, SignalReader};
use caselights::signal::{spawn_stats_poller, CommandProbe};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "caselights")]
#[command(about = "Serial RGB case lighting driven by colors, animations, audio and system stats", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Show one static color and exit
    Set {
        /// Color name, #rrggbb or r,g,b
        color: String,

        /// Serial port (overrides the stored port)
        #[arg(long)]
        port: Option<String>,

        /// Remember the port in the configuration file
        #[arg(long)]
        save: bool,
    },

    /// Turn the lights off
    Off {
        /// Serial port (overrides the stored port)
        #[arg(long)]
        port: Option<String>,
    },

    /// Switch the UV light
    Uv {
        /// New state
        state: Switch,

        /// Serial port (overrides the stored port)
        #[arg(long)]
        port: Option<String>,
    },

    /// Drive the lights until interrupted
    Run {
        /// Mode, e.g. static:red, anim:fade, audio:spectrum, stats:heat
        #[arg(long)]
        mode: Option<String>,

        /// Serial port (overrides the stored port)
        #[arg(long)]
        port: Option<String>,

        /// Brightness scale 0.0-1.0
        #[arg(long)]
        brightness: Option<f64>,

        /// Read little-endian i16 mono PCM from stdin for the audio modes
        #[arg(long)]
        audio_stdin: bool,
    },

    /// Log controller input until interrupted or disconnected
    Gamepad {
        /// Serial port of the controller bridge
        #[arg(long)]
        port: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Settings::default_path);
    let settings = match &config_path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;
    settings.validate().context("Invalid configuration")?;
    logging::init_from_settings(&settings)?;

    match cli.command {
        Commands::Ports => print_ports(),
        Commands::Set { color, port, save } => {
            let color = parse_color(&color).map_err(|e| anyhow!(e))?;
            let dispatcher = open_dispatcher(&settings, port.as_deref())?;
            dispatcher.set_mode(Mode::Static(color));
            dispatcher.tick().await?;
            if save {
                save_port(settings, config_path, port)?;
            }
            Ok(())
        }
        Commands::Off { port } => {
            let dispatcher = open_dispatcher(&settings, port.as_deref())?;
            dispatcher.set_mode(Mode::Off);
            dispatcher.tick().await?;
            Ok(())
        }
        Commands::Uv { state, port } => {
            let dispatcher = open_dispatcher(&settings, port.as_deref())?;
            dispatcher.set_uv(matches!(state, Switch::On)).await?;
            Ok(())
        }
        Commands::Run {
            mode,
            port,
            brightness,
            audio_stdin,
        } => run_lights(settings, mode, port, brightness, audio_stdin).await,
        Commands::Gamepad { port } => run_gamepad(&settings, port).await,
    }
}

fn print_ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port);
    }
    Ok(())
}

/// Open `cli_port` if given, otherwise the port stored in the builder.
fn open_link(builder: SerialLinkBuilder, cli_port: Option<&str>) -> Result<SerialLink> {
    let mut link = builder.build();
    match cli_port {
        Some(port) => link
            .open_port(port)
            .with_context(|| format!("Failed to open {}", port))?,
        None => {
            let stored = link
                .port_name()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("No serial port selected. Pass --port or run `caselights ports`"))?;
            link.reopen()
                .with_context(|| format!("Failed to open {}", stored))?;
        }
    }
    Ok(link)
}

fn open_dispatcher(settings: &Settings, port: Option<&str>) -> Result<LightingDispatcher<SerialLink>> {
    let link = open_link(settings.serial.link_builder(), port)?;
    let dispatcher = LightingDispatcher::with_settings(
        link,
        SignalSources::default(),
        settings.serial.frame_format,
        settings.lighting.tick_interval(),
    );
    dispatcher.set_brightness(settings.lighting.brightness);
    Ok(dispatcher)
}

fn save_port(mut settings: Settings, path: Option<PathBuf>, port: Option<String>) -> Result<()> {
    let path = path.ok_or_else(|| anyhow!("No configuration path available; pass --config"))?;
    if port.is_some() {
        settings.serial.port = port;
    }
    settings
        .save_to(&path)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    info!(path = %path.display(), "Configuration saved");
    Ok(())
}

async fn run_lights(
    settings: Settings,
    mode: Option<String>,
    port: Option<String>,
    brightness: Option<f64>,
    audio_stdin: bool,
) -> Result<()> {
    let mode: Mode = mode
        .as_deref()
        .unwrap_or(settings.lighting.mode.as_str())
        .parse()
        .map_err(|e: String| anyhow!(e))?;

    let dispatcher = open_dispatcher(&settings, port.as_deref())?;
    if let Some(brightness) = brightness {
        dispatcher.set_brightness(brightness);
    }
    dispatcher.set_mode(mode);

    let sources = dispatcher.sources().clone();

    if audio_stdin {
        let mut feed = AudioFeed::new(sources.intensity.clone(), sources.spectrum.clone())
            .with_sensitivity(settings.audio.sensitivity);
        if let Some(decay) = settings.audio.smoothing {
            feed = feed.with_smoothing(decay);
        }
        if matches!(mode, Mode::Audio(AudioVariant::Spectrum)) {
            feed = feed.with_spectrum(settings.audio.spectrum_analyzer());
        }
        let block_len = settings.audio.block_len;
        std::thread::Builder::new()
            .name("caselights-audio".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut input = stdin.lock();
                loop {
                    match read_pcm_block(&mut input, block_len) {
                        Ok(Some(block)) => {
                            feed.deliver(&block);
                        }
                        Ok(None) => {
                            info!("Audio input ended");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Audio input failed");
                            break;
                        }
                    }
                }
            })
            .context("Failed to start audio thread")?;
    }

    let poller = settings.stats.command.as_ref().map(|command| {
        let probe = CommandProbe::new(command.clone(), settings.stats.domain_min, settings.stats.domain_max);
        spawn_stats_poller(
            Arc::new(probe),
            sources.stats.clone(),
            Duration::from_millis(settings.stats.poll_interval_ms),
        )
    });
    if poller.is_none() && matches!(mode, Mode::Stats(_)) {
        warn!("Stats mode selected but no stats.command is configured");
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let runner = dispatcher.clone();
    let handle = tokio::spawn(async move { runner.run(stop_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, shutting down");

    let _ = stop_tx.send(true);
    handle.await.context("Dispatcher task failed")?;
    if let Some(poller) = poller {
        poller.abort();
    }
    dispatcher.shutdown().await?;
    Ok(())
}

async fn run_gamepad(settings: &Settings, port: Option<String>) -> Result<()> {
    let mut builder = SerialLinkBuilder::new()
        .with_baud_rate(settings.gamepad.baud_rate)
        .with_timeout(Duration::from_millis(settings.serial.timeout_ms));
    if let Some(stored) = &settings.gamepad.port {
        builder = builder.with_port_name(stored.clone());
    }
    let link = open_link(builder, port.as_deref())?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let reader = SignalReader::spawn(
        link,
        Duration::from_millis(settings.gamepad.poll_interval_ms),
        move |event| {
            let _ = tx.send(event);
        },
    )?;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(ReaderEvent::Gamepad(event)) => info!(?event, "Gamepad"),
                Some(ReaderEvent::Disconnected(reason)) => {
                    warn!(?reason, "Controller disconnected");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                reader.stop();
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || reader.join())
        .await
        .context("Reader thread failed")?;
    Ok(())
}
