use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use appicon_forge::{
    BundleConfig, FinalizeOutput, FinalizeRequest, IconPipeline, LayerAdjustment, LayerImages,
    LayerReference,
};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "appicon-forge", version)]
struct Cli {
    /// Bundle config JSON. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage layer images and print the preview handle as JSON.
    Stage(StageArgs),
    /// Build an archive from a finalize request JSON.
    Finalize(FinalizeArgs),
    /// Build an archive straight from image files.
    Bundle(BundleArgs),
}

#[derive(Args, Debug)]
struct StageArgs {
    #[arg(long)]
    background: PathBuf,

    #[arg(long)]
    layer1: PathBuf,

    #[arg(long)]
    layer2: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct FinalizeArgs {
    /// Finalize request JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output archive path. Defaults to the configured archive name.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct BundleArgs {
    #[arg(long)]
    background: PathBuf,

    #[arg(long)]
    layer1: PathBuf,

    #[arg(long)]
    layer2: Option<PathBuf>,

    /// Layer 1 scale in percent.
    #[arg(long, default_value_t = 100.0)]
    scale: f32,

    /// Layer 1 horizontal offset in pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    x: f32,

    /// Layer 1 vertical offset in pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    y: f32,

    #[arg(long, default_value_t = 100.0)]
    layer2_scale: f32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    layer2_x: f32,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    layer2_y: f32,

    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BundleConfig::from_file(path)?,
        None => BundleConfig::default(),
    };
    let pipeline = IconPipeline::new(config)?;

    match cli.cmd {
        Command::Stage(args) => cmd_stage(&pipeline, args),
        Command::Finalize(args) => cmd_finalize(&pipeline, args),
        Command::Bundle(args) => cmd_bundle(&pipeline, args),
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("read image '{}'", path.display()))
}

fn cmd_stage(pipeline: &IconPipeline, args: StageArgs) -> anyhow::Result<()> {
    let background = read_image(&args.background)?;
    let layer1 = read_image(&args.layer1)?;
    let layer2 = args.layer2.as_deref().map(read_image).transpose()?;

    let handle = pipeline.stage_preview(&background, &layer1, layer2.as_deref())?;
    println!("{}", serde_json::to_string_pretty(&handle)?);
    Ok(())
}

fn cmd_finalize(pipeline: &IconPipeline, args: FinalizeArgs) -> anyhow::Result<()> {
    let json = fs::read_to_string(&args.in_path)
        .with_context(|| format!("read request '{}'", args.in_path.display()))?;
    let output = pipeline.finalize_json(&json)?;
    write_output(&output, args.out)
}

fn cmd_bundle(pipeline: &IconPipeline, args: BundleArgs) -> anyhow::Result<()> {
    let images = LayerImages {
        background: LayerReference::inline(&read_image(&args.background)?),
        layer1: LayerReference::inline(&read_image(&args.layer1)?),
        layer2: args
            .layer2
            .as_deref()
            .map(|path| read_image(path).map(|bytes| LayerReference::inline(&bytes)))
            .transpose()?,
    };

    let mut request = FinalizeRequest::new(images, LayerAdjustment::new(args.scale, args.x, args.y));
    if request.images.layer2.is_some() {
        request = request.with_layer2_adjustment(LayerAdjustment::new(
            args.layer2_scale,
            args.layer2_x,
            args.layer2_y,
        ));
    }
    request.validate()?;

    let output = pipeline.finalize(&request)?;
    write_output(&output, args.out)
}

fn write_output(output: &FinalizeOutput, out: Option<PathBuf>) -> anyhow::Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(&output.file_name));
    fs::write(&path, &output.archive)
        .with_context(|| format!("write archive '{}'", path.display()))?;

    for degradation in &output.degradations {
        eprintln!(
            "degraded: {:?} {} {}",
            degradation.stage, degradation.role, degradation.reason
        );
    }
    eprintln!(
        "wrote {} ({} images)",
        path.display(),
        output.manifest.len()
    );
    Ok(())
}
