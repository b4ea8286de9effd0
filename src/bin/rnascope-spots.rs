use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use serde::Serialize;

use rnascope_spots::{
    load_config, BatchReport, Error, InMemoryImage, Region, SpotCollection, SpotConfig,
    SpotEngine, Warning,
};

#[derive(Parser)]
#[command(
    name = "rnascope-spots",
    about = "Count RNAScope spots per region and channel",
    version,
    after_help = "Example: rnascope-spots slide.tif --regions regions.json --pixel-size 0.325 \\\n  \
                  --channel Red --prominence 40 --channel Green --prominence 25 -o report.json"
)]
struct Cli {
    /// Input image file
    image: PathBuf,

    /// Regions JSON file (array of {classification, geometry})
    #[arg(short, long)]
    regions: PathBuf,

    /// Spot configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Channel to count (repeatable, overrides the config file)
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Prominence for the matching --channel (repeatable)
    #[arg(long = "prominence")]
    prominences: Vec<f32>,

    /// Comma-separated names for the image channels (default: Gray or Red,Green,Blue[,Alpha])
    #[arg(long, value_delimiter = ',')]
    channel_names: Option<Vec<String>>,

    /// Physical size of one pixel (e.g. µm)
    #[arg(short, long)]
    pixel_size: f64,

    /// Median filter radius in pixels
    #[arg(long)]
    denoise_radius: Option<f32>,

    /// LoG scale in pixels
    #[arg(long)]
    sigma_pixels: Option<f64>,

    /// Classification for unclassified regions
    #[arg(long)]
    base_class: Option<String>,

    /// Output report file (default: print to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct RegionReport<'a> {
    classification: Option<&'a str>,
    area: f64,
    measurements: &'a BTreeMap<String, f64>,
    spots: Vec<&'a SpotCollection>,
}

#[derive(Serialize)]
struct Report<'a> {
    image: String,
    pixel_size: f64,
    regions: Vec<RegionReport<'a>>,
    warnings: &'a [Warning],
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if cli.verbose && cli.quiet {
        eprintln!("Error: Cannot specify both --verbose and --quiet");
        process::exit(1);
    }

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn build_config(cli: &Cli) -> Result<SpotConfig, Error> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SpotConfig::default(),
    };
    if !cli.channels.is_empty() || !cli.prominences.is_empty() {
        config.channels.clone_from(&cli.channels);
        config.prominences.clone_from(&cli.prominences);
    }
    if let Some(r) = cli.denoise_radius {
        config.denoise_radius = r;
    }
    if let Some(s) = cli.sigma_pixels {
        config.sigma_pixels = s;
    }
    if cli.base_class.is_some() {
        config.base_class.clone_from(&cli.base_class);
    }
    Ok(config)
}

fn load_regions(path: &Path) -> Result<Vec<Region>, Error> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = build_config(cli)?;
    let image = InMemoryImage::open(&cli.image, cli.channel_names.clone(), cli.pixel_size)?;
    let engine = SpotEngine::new(&config, &image)?;
    let mut regions = load_regions(&cli.regions)?;

    if !cli.quiet {
        eprintln!(
            "Counting {} channel(s) in {} region(s) of {}",
            engine.specs().len(),
            regions.len(),
            cli.image.display()
        );
        eprintln!();
    }

    let report = engine.run_and_apply(&mut regions, &image)?;

    if !cli.quiet {
        print_summary(&regions, &report, cli.verbose);
    }

    let json = serde_json::to_string_pretty(&Report {
        image: cli.image.display().to_string(),
        pixel_size: cli.pixel_size,
        regions: region_reports(&regions, &report),
        warnings: &report.warnings,
    })?;
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, json)?;
            if !cli.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn region_reports<'a>(regions: &'a [Region], report: &'a BatchReport) -> Vec<RegionReport<'a>> {
    regions
        .iter()
        .enumerate()
        .map(|(i, region)| RegionReport {
            classification: region.classification.as_deref(),
            area: report.areas.get(i).copied().unwrap_or(0.0),
            measurements: &region.measurements,
            spots: report
                .units
                .iter()
                .filter(|u| u.region == i)
                .map(|u| &u.spots)
                .collect(),
        })
        .collect()
}

fn print_summary(regions: &[Region], report: &BatchReport, verbose: bool) {
    for (i, region) in regions.iter().enumerate() {
        let units: Vec<_> = report.units.iter().filter(|u| u.region == i).collect();
        let warnings: Vec<_> = report.warnings.iter().filter(|w| w.region == i).collect();

        if units.is_empty() {
            let reason = warnings.first().map_or("no result", |w| w.message.as_str());
            eprintln!("[SKIP] #{i} {}: {reason}", region.label());
            continue;
        }

        let counts: Vec<String> = units
            .iter()
            .map(|u| format!("{}={}", u.channel, u.count))
            .collect();
        let tag = if warnings.is_empty() { "OK" } else { "WARN" };
        eprintln!("[{tag}] #{i} {}: {}", region.label(), counts.join(", "));

        if verbose {
            for u in &units {
                eprintln!("  -> {} density {:.6}", u.channel, u.density);
            }
            for w in &warnings {
                eprintln!("  -> {}: {}", w.channel, w.message);
            }
        }
    }

    eprintln!();
    eprint!(
        "[Summary] Spots: {} in {} region(s)",
        report.total_spots(),
        regions.len()
    );
    if !report.warnings.is_empty() {
        eprint!(", Warnings: {}", report.warnings.len());
    }
    eprintln!();
}
