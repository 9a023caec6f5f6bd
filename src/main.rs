//! ferrite-mri: command-line front end for the screening / subtype /
//! explanation pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferrite_mri::{
    LazyModel, Network, NetworkSpec, Pipeline, PipelineConfig, RawImage, ReportPayload,
};

#[derive(Parser)]
#[command(name = "ferrite-mri")]
#[command(author, version)]
#[command(about = "Brain MRI tumor screening and subtype classification with Grad-CAM overlays")]
struct Cli {
    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline on one image and print the JSON summary
    Analyze {
        /// Stage-1 (screening) model JSON
        #[arg(long)]
        stage1: PathBuf,
        /// Stage-2 (subtype) model JSON
        #[arg(long)]
        stage2: PathBuf,
        /// Pipeline configuration JSON (defaults when omitted)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Input image (PNG, JPEG, BMP or GIF)
        #[arg(long)]
        image: PathBuf,
        /// Where to write the overlay PNG, when one is produced
        #[arg(long)]
        overlay: Option<PathBuf>,
        /// Where to write the original image as PNG
        #[arg(long)]
        original: Option<PathBuf>,
    },
    /// List a model's layers and their output shapes
    Layers {
        #[arg(long)]
        model: PathBuf,
    },
    /// Print or write the default pipeline configuration
    Config {
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write randomly initialized demo models built from the presets
    Init {
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    match cli.command {
        Commands::Analyze { stage1, stage2, config, image, overlay, original } => {
            analyze(stage1, stage2, config, image, overlay, original)
        }
        Commands::Layers { model } => layers(model),
        Commands::Config { out } => write_config(out),
        Commands::Init { out_dir, seed } => init(out_dir, seed),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load_json(&path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn analyze(
    stage1: PathBuf,
    stage2: PathBuf,
    config: Option<PathBuf>,
    image: PathBuf,
    overlay: Option<PathBuf>,
    original: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config)?;
    let stage1 = LazyModel::from_file("stage1", &stage1);
    let stage2 = LazyModel::from_file("stage2", &stage2);
    let pipeline = Pipeline::from_lazy(config, &stage1, &stage2).context("building the pipeline")?;

    let raw = RawImage::open(&image).with_context(|| format!("reading {}", image.display()))?;
    let result = pipeline.run(&raw).context("running the pipeline")?;
    println!("{}", serde_json::to_string_pretty(&result.summary())?);

    let payload = ReportPayload::new(&raw, &result)?;
    if let Some(path) = original {
        std::fs::write(&path, &payload.original_png).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "original written");
    }
    match (overlay, &payload.overlay_png) {
        (Some(path), Some(png)) => {
            std::fs::write(&path, png).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "overlay written");
        }
        (Some(_), None) => {
            if let Some(e) = result.explanation_error() {
                eprintln!("no overlay: {}", e);
            } else {
                eprintln!("no overlay: no tumor detected");
            }
        }
        _ => {}
    }
    Ok(())
}

fn layers(model: PathBuf) -> Result<()> {
    let network = Network::load_json(&model).with_context(|| format!("loading {}", model.display()))?;
    let shapes = network.layer_shapes()?;
    let (h, w, c) = network.input_shape();
    println!("{} (input {}x{}x{})", network.name(), h, w, c);
    for (layer, shape) in network.layers().iter().zip(shapes) {
        println!("  {:<20} {:<18} {}", layer.name(), layer.kind(), shape);
    }
    Ok(())
}

fn write_config(out: Option<PathBuf>) -> Result<()> {
    let config = PipelineConfig::default();
    match out {
        Some(path) => config.save_json(&path).with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init(out_dir: PathBuf, seed: u64) -> Result<()> {
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let config = PipelineConfig::default();
    let mut rng = StdRng::seed_from_u64(seed);
    for spec in [NetworkSpec::screening(), NetworkSpec::subtype(&config.subtype.labels)] {
        let network = spec.build(&mut rng)?;
        let path = out_dir.join(format!("{}.json", spec.name));
        network.save_json(&path).with_context(|| format!("writing {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
