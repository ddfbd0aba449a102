//! Binary entrypoint for the RAW development preview.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use raw_preview::config::Configuration;
use raw_preview::events::ControlCommand;
use raw_preview::frame::{FrameBudget, FrameScheduler};
use raw_preview::params::ParamKind;
use raw_preview::render::offscreen::OffscreenPresenter;
use raw_preview::render::window::{WindowOptions, run_windowed};
use raw_preview::sources::open_sources;
use raw_preview::tasks::{controls, frame_loop};

#[derive(Debug, Parser)]
#[command(
    name = "raw-preview",
    version,
    about = "Live RAW development preview with paced frame presentation"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Source to activate instead of the configured initial source
    #[arg(long, value_name = "NAME")]
    source: Option<String>,
    /// Open a preview window instead of rendering offscreen
    #[arg(long)]
    window: bool,
    /// Stop after this many frames have been presented
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    frames: Option<u64>,
    /// Write the last offscreen frame to this PNG file on exit
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// Override the tick period (e.g. "33ms")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    #[arg(long, allow_hyphen_values = true)]
    exposure: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    boost: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    shadow_boost: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    shadow_bias: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    temperature: Option<f32>,
    #[arg(long, allow_hyphen_values = true)]
    tint: Option<f32>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Slider overrides from the command line, applied after source selection.
    fn overrides(&self) -> Vec<ControlCommand> {
        [
            (ParamKind::Exposure, self.exposure),
            (ParamKind::BoostAmount, self.boost),
            (ParamKind::BoostShadowAmount, self.shadow_boost),
            (ParamKind::ShadowBias, self.shadow_bias),
            (ParamKind::NeutralTemperature, self.temperature),
            (ParamKind::NeutralTint, self.tint),
        ]
        .into_iter()
        .filter_map(|(kind, value)| value.map(|v| ControlCommand::Set(kind, v)))
        .collect()
    }
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("raw_preview={level}")))
        .add_directive("wgpu=warn".parse()?)
        .add_directive("winit=warn".parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = Configuration::from_yaml_file(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?
        .validated()
        .context("invalid configuration values")?;
    tracing::debug!("Loaded configuration from {}:\n{:#?}", args.config.display(), cfg);

    let mut controls = open_sources(&cfg)?;
    if let Some(name) = args.source.as_deref() {
        controls.select_source(name)?;
    }
    for command in args.overrides() {
        controls::apply_command(&mut controls, &command)?;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let (command_tx, command_rx) = mpsc::channel::<ControlCommand>(32);
    controls::spawn_stdin_reader(command_tx, cancel.clone());

    let budget = FrameBudget::new(cfg.pacing.max_frames_in_flight);
    let period = args.interval.unwrap_or(cfg.pacing.frame_interval);

    if args.window {
        let options = WindowOptions {
            title: format!("RAW preview: {}", controls.active_name()),
            interval: period,
            rounding: cfg.fit.rounding,
            max_frames: args.frames,
        };
        let stats = run_windowed(controls, budget, options, command_rx, cancel.clone())?;
        info!(?stats, "preview window closed");
        cancel.cancel();
        return Ok(());
    }

    let presenter = OffscreenPresenter::new(
        cfg.surface.width,
        cfg.surface.height,
        cfg.surface.pixel_format,
    );
    let mut scheduler = FrameScheduler::new(controls, presenter, budget, cfg.fit.rounding);
    info!(
        width = cfg.surface.width,
        height = cfg.surface.height,
        interval = %humantime::format_duration(period),
        in_flight = cfg.pacing.max_frames_in_flight,
        "rendering offscreen",
    );
    let stats = frame_loop::run(&mut scheduler, period, command_rx, args.frames, cancel.clone())
        .await
        .context("frame loop failed")?;
    cancel.cancel();

    if let Some(path) = args.output.as_deref() {
        scheduler.presenter().save_last_frame(path)?;
        info!(path = %path.display(), presented = stats.presented, "last frame written");
    }
    Ok(())
}
