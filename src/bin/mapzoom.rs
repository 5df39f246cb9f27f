use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "mapzoom", version, about = "Render a zoom-in map video for a coordinate")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch frames and encode an MP4 (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Print the zoom schedule as JSON without fetching anything.
    Schedule(ScheduleArgs),
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Pipeline config JSON. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Start from a built-in preset instead of a config file.
    #[arg(long, value_enum, conflicts_with = "config")]
    preset: Option<PresetChoice>,

    /// Tile provider.
    #[arg(long, value_enum)]
    provider: Option<ProviderChoice>,

    /// Mapbox access token.
    #[arg(long, env = "MAPBOX_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long)]
    min_zoom: Option<f64>,

    #[arg(long)]
    max_zoom: Option<f64>,

    /// Frame count for continuous mode.
    #[arg(long)]
    frames: Option<u64>,

    /// Output frame rate (whole frames per second).
    #[arg(long)]
    fps: Option<u32>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[arg(long, allow_negative_numbers = true)]
    lat: f64,

    #[arg(long, allow_negative_numbers = true)]
    lng: f64,

    /// Display name carried into the report.
    #[arg(long)]
    name: Option<String>,

    /// Output MP4 path. Defaults to `<output-dir>/output-<millis>-<seq>.mp4`.
    #[arg(long)]
    out: Option<PathBuf>,

    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Background audio track to mux in.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Maximum in-flight tile requests.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Parent directory for the per-run scratch workspace.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Replace an existing output file.
    #[arg(long)]
    overwrite: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Parser, Debug)]
struct ScheduleArgs {
    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PresetChoice {
    Discrete,
    Continuous,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProviderChoice {
    StaticMap,
    Mapbox,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mapzoom=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Schedule(args) => cmd_schedule(args),
    }
}

fn load_config(args: &PipelineArgs) -> anyhow::Result<mapzoom::PipelineConfig> {
    let mut cfg = match (&args.config, args.preset) {
        (Some(path), _) => mapzoom::PipelineConfig::from_path(path)?,
        (None, Some(PresetChoice::Continuous)) => {
            mapzoom::PipelineConfig::preset(mapzoom::Preset::Continuous)
        }
        (None, _) => mapzoom::PipelineConfig::preset(mapzoom::Preset::Discrete),
    };

    match args.provider {
        Some(ProviderChoice::StaticMap) if cfg.tiles.provider_name() != "static-map" => {
            cfg.tiles = mapzoom::TileSourceConfig::default();
        }
        Some(ProviderChoice::Mapbox) if cfg.tiles.provider_name() != "mapbox" => {
            cfg.tiles = mapzoom::TileSourceConfig::mapbox("");
        }
        _ => {}
    }
    if let Some(token) = &args.access_token {
        cfg.tiles.set_access_token(token.clone());
    }

    if let Some(min) = args.min_zoom {
        cfg.zoom.min = min;
    }
    if let Some(max) = args.max_zoom {
        cfg.zoom.max = max;
    }
    if let Some(frames) = args.frames {
        cfg.mode = mapzoom::ZoomMode::Continuous { frames };
    }
    if let Some(fps) = args.fps {
        cfg.fps = mapzoom::Fps::whole(fps)?;
    }
    Ok(cfg)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.pipeline)?;
    if let Some(dir) = args.output_dir {
        cfg.output_dir = dir;
    }
    if let Some(audio) = args.audio {
        cfg.audio_track = Some(audio);
    }
    if let Some(n) = args.concurrency {
        cfg.max_concurrent_fetches = n;
    }
    if let Some(dir) = args.scratch_dir {
        cfg.scratch_root = Some(dir);
    }
    cfg.overwrite |= args.overwrite;

    if !mapzoom::is_ffmpeg_on_path(&cfg.ffmpeg) {
        anyhow::bail!(
            "'{}' not found or not runnable; install ffmpeg or set \"ffmpeg\" in the config",
            cfg.ffmpeg.display()
        );
    }

    let center = mapzoom::Coordinate::new(args.lat, args.lng)?;
    let orchestrator = mapzoom::Orchestrator::from_config(cfg)?;
    let req = mapzoom::RenderRequest {
        center,
        display_name: args.name,
        out_path: args.out,
    };

    let artifact = orchestrator
        .run(&req, &mapzoom::CancelToken::new())
        .with_context(|| format!("render {},{}", args.lat, args.lng))?;

    println!("{}", serde_json::to_string_pretty(&artifact)?);
    eprintln!("wrote {} ({})", artifact.video_path.display(), artifact.attribution);
    Ok(())
}

fn cmd_schedule(args: ScheduleArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.pipeline)?;
    cfg.validate()?;
    let schedule = mapzoom::build_schedule(cfg.zoom, cfg.mode)?;
    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}
