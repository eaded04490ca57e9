//! CLI for Plushy - transform images with Gemini.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use plushy::image::{self as img, ImageFormat, SourceFile, DEFAULT_DOWNLOAD_NAME};
use plushy::{AppState, GeminiModel, GeminiTransformer, ImageTransformer, Session, DEFAULT_INSTRUCTION};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plushy")]
#[command(about = "Turn any image into a soft, hairy plush world using Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform an image with a text instruction
    Transform(TransformArgs),

    /// Normalize an image without sending it anywhere
    Normalize(NormalizeArgs),

    /// Check that the model is reachable and the API key accepted
    Check(ModelArgs),
}

#[derive(Args)]
struct ModelArgs {
    /// Gemini model to use
    #[arg(short, long, value_enum, default_value = "nano-banana")]
    model: ModelArg,

    /// Explicit model identifier (overrides --model)
    #[arg(long)]
    model_id: Option<String>,

    /// API endpoint
    #[arg(long, env = "PLUSHY_BASE_URL", default_value = plushy::transform::DEFAULT_BASE_URL)]
    base_url: String,
}

#[derive(Args)]
struct TransformArgs {
    /// Input image path, or `-` to read from stdin
    input: PathBuf,

    /// Output file path
    #[arg(short, long, default_value = DEFAULT_DOWNLOAD_NAME)]
    output: PathBuf,

    /// Instruction describing the transformation
    #[arg(short, long, default_value = DEFAULT_INSTRUCTION)]
    prompt: String,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct NormalizeArgs {
    /// Input image path, or `-` to read from stdin
    input: PathBuf,

    /// Output file path for the normalized JPEG
    #[arg(short, long)]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    NanoBanana,
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("plushy={log_level}").into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let outcome = match cli.command {
        Commands::Transform(args) => transform(args, cli.json).await,
        Commands::Normalize(args) => normalize(args, cli.json).await,
        Commands::Check(args) => check(args, cli.json).await,
    };

    if let Err(err) = outcome {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn build_transformer(args: &ModelArgs) -> anyhow::Result<GeminiTransformer> {
    let mut builder = GeminiTransformer::builder()
        .model(args.model.into())
        .base_url(&args.base_url);
    if let Some(ref id) = args.model_id {
        builder = builder.model_id(id);
    }
    Ok(builder.build()?)
}

/// Opens the input, reading stdin fully when the path is `-`.
async fn open_input(path: &Path) -> anyhow::Result<SourceFile> {
    if path.as_os_str() != "-" {
        return Ok(SourceFile::from_path(path));
    }

    let mut bytes = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut bytes)
        .await
        .context("failed to read image from stdin")?;
    let content_type = ImageFormat::from_magic_bytes(&bytes)
        .map(|f| f.mime_type())
        .unwrap_or("application/octet-stream");
    Ok(SourceFile::from_bytes("stdin", content_type, bytes))
}

async fn transform(args: TransformArgs, json_output: bool) -> anyhow::Result<()> {
    let transformer = build_transformer(&args.model)?;
    let file = open_input(&args.input).await?;

    let mut session = Session::new();
    session.set_instruction(&args.prompt);
    session
        .intake(&file)
        .await
        .with_context(|| format!("could not use {}", args.input.display()))?;

    tracing::info!(model = %transformer.model(), "transforming image");
    session.generate(&transformer).await;

    let result = match (session.state(), session.result()) {
        (AppState::Success, Some(result)) => result,
        _ => anyhow::bail!(
            "{}",
            session.error().unwrap_or(plushy::session::GENERIC_ERROR_MESSAGE)
        ),
    };

    result.save(&args.output)?;
    let size_bytes = std::fs::metadata(&args.output)?.len();

    if json_output {
        let out = serde_json::json!({
            "success": true,
            "state": session.state(),
            "output": args.output.display().to_string(),
            "size_bytes": size_bytes,
            "format": result.detected_format().map(|f| f.extension()),
            "model": result.model,
            "duration_ms": result.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Transformed image: {} ({} bytes) via {}",
            args.output.display(),
            size_bytes,
            transformer.name()
        );
        if let Some(duration) = result.duration_ms {
            println!("Duration: {}ms", duration);
        }
    }

    Ok(())
}

async fn normalize(args: NormalizeArgs, json_output: bool) -> anyhow::Result<()> {
    let file = open_input(&args.input).await?;
    let source = img::intake(&file)
        .await
        .with_context(|| format!("could not use {}", args.input.display()))?;

    let bytes = source.to_bytes()?;
    std::fs::write(&args.output, &bytes)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    if json_output {
        let out = serde_json::json!({
            "success": true,
            "output": args.output.display().to_string(),
            "mime_type": source.mime_type,
            "width": source.width,
            "height": source.height,
            "size_bytes": bytes.len(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!(
            "Normalized image: {} ({}x{}, {} bytes)",
            args.output.display(),
            source.width,
            source.height,
            bytes.len()
        );
    }

    Ok(())
}

async fn check(args: ModelArgs, json_output: bool) -> anyhow::Result<()> {
    let transformer = build_transformer(&args)?;
    transformer.health_check().await?;

    if json_output {
        let out = serde_json::json!({
            "success": true,
            "model": transformer.model(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{} is reachable ({})", transformer.name(), transformer.model());
    }

    Ok(())
}
