// Copyright 2020 TwoCookingMice

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use console::style;

use sampleloom::core::settings_loader::load_session;
use sampleloom::io::exr_utils;
use sampleloom::presenters::PngPresenter;
use sampleloom::renderers::progressive::{ProgressiveRenderer, RenderSettings};
use sampleloom::renderers::Renderer;
use sampleloom::sources::SourceSpec;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Constant,
    Noise,
    Blackbody,
}

impl SourceKind {
    fn name(self) -> &'static str {
        match self {
            SourceKind::Constant => "constant",
            SourceKind::Noise => "noise",
            SourceKind::Blackbody => "blackbody",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "sampleloom", version, about = "Progressively render noisy samples into a converging image")]
struct Args {
    /// Output image, rewritten with every presented frame.
    #[arg(default_value = "image.png")]
    output: PathBuf,

    /// Session file providing settings and the sample source.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(short = 'W', long)]
    width: Option<u32>,

    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Samples to accumulate.
    #[arg(long)]
    spp: Option<u32>,

    #[arg(long)]
    workers: Option<usize>,

    /// Requests allowed in flight at once (defaults to twice the workers).
    #[arg(long)]
    in_flight: Option<usize>,

    #[arg(long)]
    present_every: Option<u32>,

    #[arg(long)]
    max_retries: Option<u32>,

    #[arg(long, value_enum)]
    source: Option<SourceKind>,

    #[arg(long)]
    seed: Option<u64>,

    /// Also write the unquantized average as OpenEXR.
    #[arg(long)]
    exr: Option<PathBuf>,

    #[arg(long)]
    no_progress: bool,
}

fn resolve_settings(args: &Args) -> Result<(RenderSettings, SourceSpec)> {
    let mut settings = RenderSettings::default();
    let mut source = None;

    if let Some(path) = &args.config {
        let session = load_session(path)
            .with_context(|| format!("failed to load session {}", path.display()))?;
        session.apply(&mut settings);
        source = session.source;
    }

    if let Some(v) = args.width { settings.width = v; }
    if let Some(v) = args.height { settings.height = v; }
    if let Some(v) = args.spp { settings.samples = v; }
    if let Some(v) = args.workers {
        settings.workers = v;
        settings.in_flight = v.max(1) * 2;
    }
    if let Some(v) = args.in_flight { settings.in_flight = v; }
    if let Some(v) = args.present_every { settings.present_every = v; }
    if let Some(v) = args.max_retries { settings.max_retries = v; }

    if let Some(kind) = args.source {
        source = SourceSpec::from_kind(kind.name());
    }
    let mut source = match source {
        Some(source) => source,
        None => SourceSpec::from_kind("blackbody").context("blackbody source is unavailable")?,
    };
    if let Some(seed) = args.seed {
        source = source.with_seed(seed);
    }

    Ok((settings, source))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let (settings, source) = resolve_settings(&args)?;

    let renderer = ProgressiveRenderer::new(settings, source.build())
        .with_progress(!args.no_progress);
    let mut presenter = PngPresenter::new(&args.output);
    let outcome = renderer
        .render(&mut presenter)
        .with_context(|| format!("rendering to {} failed", args.output.display()))?;

    if let Some(path) = &args.exr {
        exr_utils::write_average_exr(&outcome.accumulator, path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let stats = outcome.stats;
    println!(
        "{} {} samples in {:.2?} -> {}",
        style("done").green().bold(),
        stats.merged,
        stats.elapsed,
        style(args.output.display()).cyan()
    );
    if stats.lost > 0 {
        println!("{} {} samples lost and retried", style("warning").yellow().bold(), stats.lost);
    }
    Ok(())
}
