use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prism::accel::KdTree;
use prism::config::Options;
use prism::image::write_ppm;
use prism::parser::parse_scene_file;
use prism::preview::{self, PreviewMode};
use prism::render::{Renderer, Schedule};

/// prism — render a triangle-mesh scene to a PPM image
#[derive(Parser, Debug)]
#[command(
    name = "prism",
    version,
    about = "An offline SIMD-accelerated path tracer for triangle-mesh scenes",
    after_help = "EXAMPLES:\n  \
                  prism scene.json\n  \
                  prism scene.json --output render.ppm --schedule region\n  \
                  prism scene.json --spp 16 --diffuse-rays 4 --threads 8\n  \
                  prism scene.json --preview halfblock"
)]
struct Cli {
    /// Scene description file (JSON)
    scene: PathBuf,

    /// Output PPM path
    #[arg(short, long, default_value = "image.ppm")]
    output: PathBuf,

    /// How the image plane is partitioned into parallel work tiles
    #[arg(short, long, value_enum, default_value_t = CliSchedule::Bucket)]
    schedule: CliSchedule,

    /// Worker thread count (defaults to the hardware thread count)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Samples per pixel — 1 uses pixel centers, higher counts jitter
    #[arg(long, default_value_t = 1)]
    spp: usize,

    /// Maximum ray recursion depth
    #[arg(long, default_value_t = 5)]
    max_depth: usize,

    /// Hemispheric diffuse bounce rays per shading point
    #[arg(long, default_value_t = 0)]
    diffuse_rays: usize,

    /// RNG seed for deterministic renders
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Seed the RNG from device entropy instead of --seed
    #[arg(long)]
    random_seed: bool,

    /// Print the rendered frame to the terminal after writing the file
    #[arg(long, value_enum)]
    preview: Option<CliPreview>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliSchedule {
    /// One tile covering the full image
    Single,
    /// A √N × √N grid matched to the worker count
    Region,
    /// Fixed square tiles of the scene's bucket_size
    Bucket,
}

impl From<CliSchedule> for Schedule {
    fn from(s: CliSchedule) -> Self {
        match s {
            CliSchedule::Single => Schedule::Single,
            CliSchedule::Region => Schedule::Region,
            CliSchedule::Bucket => Schedule::Bucket,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliPreview {
    /// Half-block characters with 24-bit color
    Halfblock,
    /// ASCII grayscale density ramp
    Ascii,
}

impl From<CliPreview> for PreviewMode {
    fn from(m: CliPreview) -> Self {
        match m {
            CliPreview::Halfblock => PreviewMode::HalfBlock,
            CliPreview::Ascii => PreviewMode::Ascii,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // Print clap's usage message but exit 1 for every CLI mistake.
            let _ = err.print();
            std::process::exit(1);
        }
    };

    let options = Options {
        samples_per_pixel: cli.spp,
        max_ray_depth: cli.max_depth,
        diffuse_reflection_rays: cli.diffuse_rays,
        fixed_rng_seed: if cli.random_seed { None } else { Some(cli.seed) },
        ..Options::default()
    };

    let scene = parse_scene_file(&cli.scene)
        .with_context(|| format!("loading scene `{}`", cli.scene.display()))?;
    info!(
        triangles = scene.triangle_count(),
        meshes = scene.meshes.len(),
        "scene `{}` loaded",
        cli.scene.display()
    );

    let build_start = Instant::now();
    let accel = Arc::new(KdTree::build(Arc::new(scene)));
    info!(
        "acceleration structure built in {:.2?}",
        build_start.elapsed()
    );

    let mut renderer = Renderer::new(accel, options);
    renderer.schedule = cli.schedule.into();
    if let Some(threads) = cli.threads {
        renderer.threads = threads.max(1);
    }

    let (image, stats) = renderer.render();
    stats.log_summary();

    let file = File::create(&cli.output)
        .with_context(|| format!("creating output file `{}`", cli.output.display()))?;
    let mut out = BufWriter::new(file);
    write_ppm(&image, &mut out)
        .with_context(|| format!("writing `{}`", cli.output.display()))?;
    info!("wrote `{}`", cli.output.display());

    if let Some(mode) = cli.preview {
        preview::display(&image, mode.into());
    }

    Ok(())
}
