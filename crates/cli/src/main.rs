//! mugimap CLI - Sentinel-2 index maps for wheat fields

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mugimap_cloud::{Sentinel2Options, Sentinel2Source, StacCatalog};
use mugimap_colormap::{write_map_set, MapSummary, RenderOptions};
use mugimap_core::field::load_targets;
use mugimap_core::io::write_text;
use mugimap_core::{
    CacheStore, FieldTable, HistoryLedger, IncrementalSync, ObservationDate, PipelineConfig,
    Region, SyncOutcome,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mugimap")]
#[command(author, version, about = "NDVI / NDWI / GNDVI maps of wheat fields from Sentinel-2", long_about = None)]
struct Cli {
    /// Search scenes from this date (YYYY-MM-DD)
    #[arg(long, default_value = "2024-12-01")]
    last_date: ObservationDate,

    /// Reprocess every date from --start-date, overwriting cached records
    #[arg(long)]
    force_rebuild: bool,

    /// Start of the search window with --force-rebuild
    #[arg(long, default_value = "2025-12-01")]
    start_date: ObservationDate,

    /// Exclusive end of the search window (default: today)
    #[arg(long)]
    end_date: Option<ObservationDate>,

    /// Field list exported as CSV (polygon_uu, address)
    #[arg(long)]
    fields: Option<PathBuf>,

    /// Field boundaries (GeoJSON FeatureCollection)
    #[arg(long)]
    boundaries: Option<PathBuf>,

    /// Directory for the maps, the ledger and the cache
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// File receiving the latest newly processed date
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Maximum scene cloud cover in percent
    #[arg(long, default_value = "50")]
    cloud_threshold: f64,

    /// Sampling resolution in metres
    #[arg(long, default_value = "10")]
    pixel_scale: f64,

    /// STAC catalog: es (Earth Search), pc (Planetary Computer) or a URL
    #[arg(long, default_value = "es")]
    catalog: StacCatalog,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> PipelineConfig {
        let mut cfg = PipelineConfig::default();
        if let Some(dir) = &self.output_dir {
            cfg = cfg.with_output_dir(dir);
        }
        if let Some(path) = &self.fields {
            cfg.field_table = path.clone();
        }
        if let Some(path) = &self.boundaries {
            cfg.boundaries = path.clone();
        }
        if let Some(path) = &self.state_file {
            cfg.state_file = path.clone();
        }
        cfg.last_date = self.last_date;
        cfg.start_date = self.start_date;
        cfg.end_date = self.end_date;
        cfg.cloud_threshold = self.cloud_threshold;
        cfg.pixel_scale = self.pixel_scale;
        cfg.force_rebuild = self.force_rebuild;
        cfg
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn print_summary(new: usize, cached: usize, ledger: &HistoryLedger) {
    println!();
    println!("処理完了");
    println!("  新規処理: {} 日", new);
    println!("  キャッシュ利用: {} 日", cached);
    println!("  総観測日数: {} 日", ledger.len());
    println!("  総ピクセル数: {}", ledger.total_pixels());
}

// ─── Pipeline ───────────────────────────────────────────────────────────

fn run(cfg: &PipelineConfig, catalog: StacCatalog) -> Result<()> {
    let start = Instant::now();
    cfg.validate()?;

    let table = FieldTable::from_csv_path(&cfg.field_table)
        .with_context(|| format!("reading field table {}", cfg.field_table.display()))?;
    let targets = load_targets(&table, &cfg.boundaries)
        .with_context(|| format!("reading field boundaries {}", cfg.boundaries.display()))?;
    let region = Region::from_targets(&targets).context("computing the search region")?;
    info!("{} fields listed, {} with boundaries", table.len(), targets.len());

    let today = ObservationDate::new(Local::now().date_naive());
    let window = cfg.search_window(today)?;
    info!(
        "searching {} ({}, cloud cover < {}%)",
        window.to_interval(),
        catalog,
        cfg.cloud_threshold
    );

    let options = Sentinel2Options {
        catalog,
        cloud_threshold: cfg.cloud_threshold,
        pixel_scale: cfg.pixel_scale,
        ..Sentinel2Options::default()
    };
    let mut source = Sentinel2Source::new(options).context("initialising the imagery source")?;

    let ledger = HistoryLedger::load(&cfg.ledger_file)
        .with_context(|| format!("loading ledger {}", cfg.ledger_file.display()))?;
    let store = CacheStore::new(&cfg.cache_dir);
    let mut sync = IncrementalSync::new(store.clone(), ledger, cfg.force_rebuild);

    let pb = spinner("Sampling fields...");
    let outcome = sync.run(&mut source, &region, &window, &targets);
    pb.finish_and_clear();
    let outcome = outcome.context("imagery search failed")?;

    let (new, cached) = match &outcome {
        SyncOutcome::NoScenes => {
            info!("no scenes in {}, nothing to do", window.to_interval());
            return Ok(());
        }
        SyncOutcome::NothingNew { existing } => {
            info!("all {} dates already cached, maps left unchanged", existing.len());
            return Ok(());
        }
        SyncOutcome::Updated { reports, existing } => (reports.len(), existing.len()),
    };
    let latest = outcome.latest_new_date();

    let ledger = sync.into_ledger();
    let dates = ledger.sorted_dates();
    let records = store.read_all(&dates).context("reading cached records")?;

    let summary = MapSummary {
        dates,
        field_count: targets.len(),
        total_pixels: ledger.total_pixels(),
        latest_new_date: latest,
        cloud_threshold: cfg.cloud_threshold,
    };
    let render = RenderOptions {
        center: region.center(),
        pixel_scale: cfg.pixel_scale,
        ..RenderOptions::default()
    };

    let pb = spinner("Rendering maps...");
    let written = write_map_set(&cfg.output_dir, &records, &summary, &render);
    pb.finish_and_clear();
    for path in written.context("writing maps")? {
        info!("wrote {}", path.display());
    }

    ledger
        .save(&cfg.ledger_file)
        .with_context(|| format!("saving ledger {}", cfg.ledger_file.display()))?;

    if let Some(date) = latest {
        write_text(&cfg.state_file, &date.to_string())
            .with_context(|| format!("writing {}", cfg.state_file.display()))?;
    }

    print_summary(new, cached, &ledger);
    info!("done in {:.1?}", start.elapsed());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let cfg = cli.to_config();
    run(&cfg, cli.catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn defaults_match_pipeline_config() {
        let cli = Cli::try_parse_from(["mugimap"]).unwrap();
        assert_eq!(cli.to_config(), PipelineConfig::default());
        assert_eq!(cli.catalog, StacCatalog::EarthSearch);
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "mugimap",
            "--last-date",
            "2026-01-10",
            "--end-date",
            "2026-02-01",
            "--force-rebuild",
            "--output-dir",
            "maps",
            "--cloud-threshold",
            "30",
            "--catalog",
            "pc",
        ])
        .unwrap();
        let cfg = cli.to_config();

        assert!(cfg.force_rebuild);
        assert_eq!(cfg.last_date, "2026-01-10".parse().unwrap());
        assert_eq!(cfg.end_date, Some("2026-02-01".parse().unwrap()));
        assert_eq!(cfg.cache_dir, Path::new("maps/cache"));
        assert_eq!(cfg.cloud_threshold, 30.0);
        assert_eq!(cli.catalog, StacCatalog::PlanetaryComputer);
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(Cli::try_parse_from(["mugimap", "--last-date", "2026/01/10"]).is_err());
    }
}
