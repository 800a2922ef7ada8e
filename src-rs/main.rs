use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use screensplit::capture::{run_capture, CaptureOptions};
use screensplit::crop::{CropTool, ImageCrop, MagickCrop};
use screensplit::pipeline::{split_folder, TopologySource};
use screensplit::scheduler::{CropOptions, DEFAULT_WORKERS};
use screensplit::topology::DisplayQuery;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "screensplit",
    version,
    about = "Capture multi-monitor screenshots and split them into one image per screen"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the screen layout that cropping would use
    Screens(ScreensArgs),
    /// Crop every .png/.jpg in a directory into 1s/, 2s/, ... per screen
    Crop(CropArgs),
    /// Take a screenshot every interval until interrupted
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
struct TopologyArgs {
    /// Read the layout from a saved xrandr dump instead of querying the display
    #[arg(long)]
    config: Option<PathBuf>,
    /// Display query program
    #[arg(long, default_value = "xrandr")]
    xrandr_bin: String,
}

impl TopologyArgs {
    fn source(&self) -> TopologySource {
        match &self.config {
            Some(path) => TopologySource::Config(path.clone()),
            None => TopologySource::Live(DisplayQuery::with_program(&self.xrandr_bin)),
        }
    }
}

#[derive(Args, Debug)]
struct ScreensArgs {
    #[command(flatten)]
    topology: TopologyArgs,
    /// Print the layout as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// ImageMagick `convert`
    Magick,
    /// Built-in decoder, no external tool
    Image,
}

#[derive(Args, Debug)]
struct CropArgs {
    /// Directory of composite screenshots
    dir: PathBuf,
    #[command(flatten)]
    topology: TopologyArgs,
    /// Number of concurrent shard workers
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,
    #[arg(long, value_enum, default_value_t = Backend::Magick)]
    backend: Backend,
    /// ImageMagick program used by the magick backend
    #[arg(long, default_value = "convert")]
    convert_bin: String,
    /// Seconds before a single crop invocation is killed
    #[arg(long, default_value_t = 60)]
    timeout: u64,
    /// Parent of the per-screen directories (default: $SCREENSPLIT_OUT_DIR or .)
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Print the crop report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Directory receiving the screenshots
    dest: PathBuf,
    /// Seconds between screenshots
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,
    /// Compression quality passed to scrot
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,
    /// Screenshot program
    #[arg(long, default_value = "scrot")]
    scrot_bin: String,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Screens(args) => command_screens(args),
        Commands::Crop(args) => command_crop(args),
        Commands::Capture(args) => command_capture(args),
    }
}

fn command_screens(args: ScreensArgs) -> Result<()> {
    let screens = args.topology.source().resolve()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&screens)?);
    } else {
        print!("{screens}");
    }
    Ok(())
}

fn command_crop(args: CropArgs) -> Result<()> {
    if !args.dir.is_dir() {
        bail!("screenshot directory not found: {}", args.dir.display());
    }

    let tool: Box<dyn CropTool> = match args.backend {
        Backend::Magick => Box::new(MagickCrop {
            program: args.convert_bin.clone(),
            timeout: Duration::from_secs(args.timeout.max(1)),
        }),
        Backend::Image => Box::new(ImageCrop),
    };
    let options = CropOptions {
        workers: args.workers,
        out_root: args.out_dir.clone().unwrap_or_else(out_root),
    };

    let report = split_folder(&args.topology.source(), &args.dir, &options, tool.as_ref())
        .with_context(|| format!("failed to split {}", args.dir.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "processed {} files ({} crops, {} failed)",
            report.files,
            report.jobs,
            report.failures.len()
        );
    }
    Ok(())
}

fn command_capture(args: CaptureArgs) -> Result<()> {
    let options = CaptureOptions {
        dest: args.dest,
        interval: Duration::from_secs(args.interval),
        quality: args.quality,
        program: args.scrot_bin,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start capture runtime")?;

    let summary = runtime.block_on(run_capture(&options, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown signal received"),
            Err(err) => {
                warn!(%err, "cannot listen for ctrl-c, capturing until killed");
                std::future::pending::<()>().await;
            }
        }
    }))?;

    println!("{} pictures taken ({} failed)", summary.taken, summary.failed);
    Ok(())
}

fn out_root() -> PathBuf {
    env::var("SCREENSPLIT_OUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
