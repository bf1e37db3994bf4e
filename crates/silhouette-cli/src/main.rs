use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use silhouette_contracts::jobs::SizingOptions;
use silhouette_contracts::prompt::{build_prompt, tables, BackgroundMode, GenerationMode, Selections};
use silhouette_engine::{service, GenerateInput, ServiceConfig, SilhouetteInput, Studio};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "silhouette", version, about = "Rear-view silhouette generator backed by Replicate")]
struct Cli {
    /// Extra env file read after the process environment.
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    /// -v for debug, -vv for trace. RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Generate a silhouette from category selections.
    Generate(GenerateArgs),
    /// Generate from a free-form prompt.
    Prompt(PromptArgs),
    /// Remove the background of an image URL.
    RemoveBackground(RemoveBackgroundArgs),
    /// Print the prompt for a set of selections without calling the provider.
    Preview(SelectionArgs),
    /// List models, removers and selection labels.
    Models,
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    bind: Option<SocketAddr>,
}

#[derive(Debug, Clone, Args)]
struct SelectionArgs {
    #[arg(long, default_value = "")]
    age: String,
    #[arg(long, default_value = "")]
    gender: String,
    #[arg(long, default_value = "")]
    ethnicity: String,
    #[arg(long, default_value = "")]
    clothing: String,
    /// Ask for a plain white backdrop and remove it afterwards.
    #[arg(long)]
    transparent: bool,
    #[arg(long)]
    reference_image_url: Option<String>,
}

impl SelectionArgs {
    fn selections(&self) -> Selections {
        Selections {
            age: self.age.clone(),
            gender: self.gender.clone(),
            ethnicity: self.ethnicity.clone(),
            clothing: self.clothing.clone(),
        }
    }

    fn background(&self) -> BackgroundMode {
        if self.transparent {
            BackgroundMode::Transparent
        } else {
            BackgroundMode::WithBackground
        }
    }
}

#[derive(Debug, Clone, Args)]
struct ProviderArgs {
    /// Replicate token; falls back to REPLICATE_API_TOKEN.
    #[arg(long, env = "SILHOUETTE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    aspect_ratio: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Directory to download result images into.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl ProviderArgs {
    fn sizing(&self) -> SizingOptions {
        SizingOptions {
            aspect_ratio: self.aspect_ratio.clone(),
            width: self.width,
            height: self.height,
            megapixels: None,
        }
    }
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    #[command(flatten)]
    provider: ProviderArgs,
    #[arg(long)]
    strength: Option<f64>,
}

#[derive(Debug, Parser)]
struct PromptArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    reference_image_url: Option<String>,
    #[arg(long)]
    strength: Option<f64>,
    #[command(flatten)]
    provider: ProviderArgs,
}

#[derive(Debug, Parser)]
struct RemoveBackgroundArgs {
    #[arg(long)]
    image_url: String,
    #[arg(long, env = "SILHOUETTE_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("silhouette error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(run_async(cli.command, cli.env_file))
}

async fn run_async(command: Command, env_file: Option<PathBuf>) -> Result<i32> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; cancelling");
            on_interrupt.cancel();
        }
    });

    match command {
        Command::Serve(args) => {
            let config = ServiceConfig::load(env_file.as_deref())?;
            let studio = Arc::new(config.build_studio()?);
            let bind = args.bind.unwrap_or(config.bind);
            let listener = TcpListener::bind(bind)
                .await
                .with_context(|| format!("failed to bind {bind}"))?;
            service::serve(listener, studio, cancel).await?;
            Ok(0)
        }
        Command::Generate(args) => {
            run_generate(&load_studio(env_file.as_deref())?, args, &cancel).await
        }
        Command::Prompt(args) => {
            run_prompt(&load_studio(env_file.as_deref())?, args, &cancel).await
        }
        Command::RemoveBackground(args) => {
            run_remove_background(&load_studio(env_file.as_deref())?, args, &cancel).await
        }
        Command::Models => {
            print_models(&load_studio(env_file.as_deref())?);
            Ok(0)
        }
        // Offline: no provider configuration is read.
        Command::Preview(args) => {
            print_preview(&args)?;
            Ok(0)
        }
    }
}

fn load_studio(env_file: Option<&Path>) -> Result<Studio> {
    ServiceConfig::load(env_file)?.build_studio()
}

fn init_tracing(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

async fn run_generate(studio: &Studio, args: GenerateArgs, cancel: &CancellationToken) -> Result<i32> {
    let selections = args.selection.selections();
    let background = args.selection.background();
    let result = studio
        .silhouette(
            SilhouetteInput {
                selections: selections.clone(),
                background,
                reference_image_url: args.selection.reference_image_url.clone(),
                strength: args.strength,
                credential: args.provider.token.clone(),
                sizing: args.provider.sizing(),
                model: args.provider.model.clone(),
            },
            cancel,
        )
        .await?;
    if let Some(warning) = &result.artifact.warning {
        warn!(%warning, "background removal degraded");
    }

    let mut report = json!({
        "model": result.model,
        "prompt": result.prompt.prompt,
        "imageUrl": result.artifact.image_url,
        "transparentImageUrl": result.artifact.transparent_image_url,
        "warning": result.artifact.warning,
        "predictionId": result.artifact.prediction_id,
    });
    if let Some(dir) = &args.provider.out {
        let name = silhouette_file_name(&selections, background, unix_epoch_millis());
        let url = result
            .artifact
            .transparent_image_url
            .as_deref()
            .unwrap_or(&result.artifact.image_url);
        let path = download_image(url, &dir.join(name)).await?;
        report["savedTo"] = json!(path.display().to_string());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

async fn run_prompt(studio: &Studio, args: PromptArgs, cancel: &CancellationToken) -> Result<i32> {
    let generated = studio
        .generate(
            GenerateInput {
                prompt: args.prompt,
                credential: args.provider.token.clone(),
                sizing: args.provider.sizing(),
                reference_image_url: args.reference_image_url,
                strength: args.strength,
                negative_prompt: None,
                model: args.provider.model.clone(),
            },
            cancel,
        )
        .await?;
    let mut report = json!({
        "model": generated.model,
        "imageUrl": generated.image_url,
        "predictionId": generated.prediction_id,
        "fallbackReason": generated.fallback_reason,
    });
    if let Some(dir) = &args.provider.out {
        let name = format!("generated-{}.png", unix_epoch_millis());
        let path = download_image(&generated.image_url, &dir.join(name)).await?;
        report["savedTo"] = json!(path.display().to_string());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

async fn run_remove_background(
    studio: &Studio,
    args: RemoveBackgroundArgs,
    cancel: &CancellationToken,
) -> Result<i32> {
    let outcome = studio
        .remove_background(Some(&args.image_url), args.token.as_deref(), cancel)
        .await?;
    let mut report = json!({
        "transparentImageUrl": outcome.transparent_image_url,
        "warning": outcome.warning,
        "predictionId": outcome.prediction_id,
    });
    if let Some(dir) = &args.out {
        let name = format!("transparent-{}.png", unix_epoch_millis());
        let path = download_image(&outcome.transparent_image_url, &dir.join(name)).await?;
        report["savedTo"] = json!(path.display().to_string());
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    // A degraded removal still answers, but scripts should notice.
    Ok(if outcome.warning.is_some() { 2 } else { 0 })
}

fn print_preview(args: &SelectionArgs) -> Result<()> {
    let mode = match args.reference_image_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => GenerationMode::Transform,
        _ => GenerationMode::Generate,
    };
    let built = build_prompt(&args.selections(), args.background(), mode);
    println!("{}", serde_json::to_string_pretty(&built)?);
    Ok(())
}

fn print_models(studio: &Studio) {
    let removers = studio.removers();
    let active = studio
        .background_remover()
        .map(|remover| remover.name().to_string())
        .ok();
    let models: Vec<Value> = studio
        .registry()
        .list()
        .map(|spec| {
            json!({
                "name": spec.name,
                "provider": spec.provider.as_str(),
                "capability": spec.capability.as_str(),
                "maxAttempts": spec.poll.max_attempts,
                "intervalMs": spec.poll.interval_ms,
                "degradesOnFailure": !spec.propagate_failure,
                "removerReady": removers.contains(&spec.name),
            })
        })
        .collect();
    let labels = json!({
        "age": tables::primary_labels(tables::AGE),
        "gender": tables::primary_labels(tables::GENDER),
        "ethnicity": tables::primary_labels(tables::ETHNICITY),
        "clothing": tables::primary_labels(tables::CLOTHING),
    });
    let report = json!({
        "models": models,
        "backgroundRemover": active,
        "labels": labels,
    });
    println!("{report:#}");
}

async fn download_image(url: &str, path: &Path) -> Result<PathBuf> {
    let bytes = if let Some(encoded) = url.strip_prefix("data:") {
        let Some((_, payload)) = encoded.split_once(";base64,") else {
            bail!("unsupported data URL (expected base64)");
        };
        BASE64
            .decode(payload.trim())
            .context("invalid base64 in data URL")?
    } else {
        let response = reqwest::get(url)
            .await
            .with_context(|| format!("failed to download {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("download of {url} failed ({status})");
        }
        response.bytes().await?.to_vec()
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "image saved");
    Ok(path.to_path_buf())
}

fn silhouette_file_name(selections: &Selections, background: BackgroundMode, millis: i64) -> String {
    let background = match background {
        BackgroundMode::WithBackground => "with-bg",
        BackgroundMode::Transparent => "transparent",
    };
    format!(
        "silhouette-{}-{}-{}-{}-{}.png",
        file_label(&selections.age, tables::DEFAULT_AGE),
        file_label(&selections.gender, tables::DEFAULT_GENDER),
        file_label(&selections.ethnicity, tables::DEFAULT_ETHNICITY),
        background,
        millis
    )
}

/// Alphanumerics only (Hangul included); blank labels use the default.
fn file_label(value: &str, default: &str) -> String {
    let raw = if value.trim().is_empty() { default } else { value };
    let label: String = raw.chars().filter(|ch| ch.is_alphanumeric()).collect();
    if label.is_empty() {
        "any".to_string()
    } else {
        label
    }
}

fn unix_epoch_millis() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{download_image, file_label, run_async, silhouette_file_name, Cli};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use clap::Parser;
    use silhouette_contracts::prompt::{BackgroundMode, Selections};
    use std::fs;

    #[test]
    fn file_label_strips_separators_and_keeps_hangul() {
        assert_eq!(file_label("East Asian", "x"), "EastAsian");
        assert_eq!(file_label("  경찰관 제복 ", "x"), "경찰관제복");
        assert_eq!(file_label("../../etc", "x"), "etc");
        assert_eq!(file_label("***", "x"), "any");
        assert_eq!(file_label(" ", "성인"), "성인");
    }

    #[test]
    fn silhouette_file_name_uses_defaults_for_blank_selections() {
        let name = silhouette_file_name(&Selections::default(), BackgroundMode::Transparent, 42);
        assert_eq!(name, "silhouette-성인-남성-동아시아-transparent-42.png");

        let picked = Selections {
            age: "노년".to_string(),
            gender: "female".to_string(),
            ethnicity: "south-asian".to_string(),
            clothing: String::new(),
        };
        let name = silhouette_file_name(&picked, BackgroundMode::WithBackground, 7);
        assert_eq!(name, "silhouette-노년-female-southasian-with-bg-7.png");
    }

    #[test]
    fn cli_parses_generate_flags() {
        let cli = Cli::try_parse_from([
            "silhouette",
            "-v",
            "generate",
            "--age",
            "청년",
            "--transparent",
            "--width",
            "1024",
            "--height",
            "1536",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            super::Command::Generate(args) => {
                assert!(args.selection.transparent);
                assert_eq!(args.provider.sizing().aspect_ratio().as_deref(), Some("2:3"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn preview_reads_no_provider_configuration() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let cli = Cli::try_parse_from(["silhouette", "preview", "--age", "청년"])?;

        let code = run_async(cli.command, Some(dir.path().join("missing.env"))).await?;
        assert_eq!(code, 0);

        let cli = Cli::try_parse_from(["silhouette", "models"])?;
        assert!(run_async(cli.command, Some(dir.path().join("missing.env"))).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn data_urls_are_decoded_to_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let url = format!("data:image/png;base64,{}", BASE64.encode(b"PNGDATA"));

        let path = download_image(&url, &dir.path().join("nested/out.png")).await?;

        assert_eq!(fs::read(path)?, b"PNGDATA");
        Ok(())
    }

    #[tokio::test]
    async fn data_urls_without_base64_are_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let err = download_image("data:text/plain,hello", &dir.path().join("out.png"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("base64"));
        Ok(())
    }
}
