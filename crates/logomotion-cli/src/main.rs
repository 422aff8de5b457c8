use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use logomotion_core::export::{ExportState, TruncationNotice};
use logomotion_core::{ExportObserver, ExportVariant, Studio, StudioConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Studio config (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split an SVG into layers and print them as JSON
    Extract {
        #[arg(value_name = "SVG")]
        svg: PathBuf,
        /// Also write the id-annotated document here
        #[arg(long, value_name = "FILE")]
        annotated: Option<PathBuf>,
    },
    /// Run an animation script and write a preview frame
    Run {
        #[arg(value_name = "SVG")]
        svg: PathBuf,
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
        /// Timestamp of the preview frame in milliseconds
        #[arg(long, default_value_t = 0.0)]
        at: f64,
        /// Output PNG path
        #[arg(long, short, value_name = "PNG")]
        output: Option<PathBuf>,
    },
    /// Run an animation script and export it
    ///
    /// Exports are MP4 when built with the `video` feature (needs FFmpeg) and animated GIF
    /// otherwise.
    Export {
        #[arg(value_name = "SVG")]
        svg: PathBuf,
        /// Animation script; the built-in fade-in is used when omitted
        #[arg(value_name = "SCRIPT")]
        script: Option<PathBuf>,
        #[command(flatten)]
        output: ExportArgs,
    },
    /// Analyze the SVG, generate animation code, run it and export it
    ///
    /// Exports are MP4 when built with the `video` feature (needs FFmpeg) and animated GIF
    /// otherwise.
    Generate {
        #[arg(value_name = "SVG")]
        svg: PathBuf,
        /// Collaborator service base URL; the Anthropic API is used when omitted
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
        /// Replace the analysis concept before generating code
        #[arg(long)]
        concept: Option<String>,
        /// Write the generated script here
        #[arg(long, value_name = "FILE")]
        save_code: Option<PathBuf>,
        #[command(flatten)]
        output: ExportArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ExportArgs {
    /// Background image or GIF (video files need the `video` feature); produces a composited export
    #[arg(long, value_name = "MEDIA")]
    background: Option<PathBuf>,
    /// Overlay scale
    #[arg(long, default_value_t = 1.0)]
    scale: f32,
    /// Overlay offset, x
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset_x: i32,
    /// Overlay offset, y
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    offset_y: i32,
    /// Output directory
    #[arg(long, short, value_name = "DIR", default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
enum LogFormat {
    Pretty,
    Json,
}

/// Logs export progress in 10% steps.
struct ProgressLog;

impl ExportObserver for ProgressLog {
    fn state_changed(&self, state: ExportState) {
        info!(?state, "Export state");
    }

    fn progress(&self, percent: Option<u32>) {
        if let Some(p) = percent.filter(|p| p % 10 == 0) {
            info!("Export {}%", p);
        }
    }

    fn truncated(&self, notice: &TruncationNotice) {
        info!("{}", notice.message());
    }
}

fn init_logging(level: LogLevel, format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.to_string().parse()?)
        .from_env_lossy();

    let subscriber_builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Json => subscriber_builder.json().init(),
        LogFormat::Pretty => subscriber_builder.pretty().init(),
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_studio(config: Option<&Path>, svg: &Path) -> anyhow::Result<Studio> {
    let config = match config {
        Some(path) => StudioConfig::from_json_file(path)?,
        None => StudioConfig::default(),
    };
    let mut studio = Studio::new(config);
    let extraction = studio.upload(&read(svg)?)?;
    info!(layers = extraction.elements.len(), "Loaded {}", svg.display());
    Ok(studio)
}

async fn export(studio: &mut Studio, args: &ExportArgs) -> anyhow::Result<()> {
    studio.set_overlay(args.scale, args.offset_x, args.offset_y);
    let variant = match &args.background {
        Some(media) => {
            studio.import_media_file(media).await?;
            ExportVariant::Composited
        }
        None => ExportVariant::AnimationOnly,
    };
    let artifact = studio.export(variant, &ProgressLog).await?;
    let path = artifact.save_to(&args.out_dir)?;
    info!(
        frames = artifact.frame_count,
        duration_ms = artifact.effective_duration_ms,
        "Wrote {}",
        path.display()
    );
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Extract { svg, annotated } => {
            let studio = load_studio(config, &svg)?;
            let extraction = studio
                .extraction()
                .context("Document produced no extraction")?;
            println!("{}", serde_json::to_string_pretty(&extraction.elements)?);
            if let Some(path) = annotated {
                fs::write(&path, &extraction.annotated_document)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
        }
        Command::Run {
            svg,
            script,
            at,
            output,
        } => {
            let mut studio = load_studio(config, &svg)?;
            let timeline = studio.apply_source(&read(&script)?).await?;
            info!(duration_ms = timeline.duration_ms(), "Animation ready");
            let frame = studio.preview_at(at).await?;
            let output = output.unwrap_or_else(|| script.with_extension("png"));
            frame
                .save_png(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("Preview written to {}", output.display());
        }
        Command::Export {
            svg,
            script,
            output,
        } => {
            let mut studio = load_studio(config, &svg)?;
            match script {
                Some(script) => studio.apply_source(&read(&script)?).await?,
                None => studio.run_default_animation().await?,
            };
            export(&mut studio, &output).await?;
        }
        Command::Generate {
            svg,
            endpoint,
            concept,
            save_code,
            output,
        } => {
            let orchestrator = logomotion_llm::create_orchestrator(endpoint.as_deref())?;
            let mut studio = load_studio(config, &svg)?.with_orchestrator(orchestrator);
            let analysis = studio.analyze().await?;
            info!(concept = %analysis.concept_description, "Analysis ready");
            if let Some(concept) = concept {
                studio.set_concept_description(&concept)?;
            }
            studio.generate().await?;
            if let (Some(path), Some(source)) = (save_code, studio.source()) {
                fs::write(&path, source)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            export(&mut studio, &output).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level, cli.log_format) {
        eprintln!("Invalid log configuration: {e}");
        std::process::exit(2);
    }

    info!("Initializing logomotion...");
    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
