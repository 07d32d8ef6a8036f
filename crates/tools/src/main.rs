use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use mapview::{MapConfig, MapStyle};
use records::{FilterCriteria, distinct_cities, distinct_sectors, load_records_json};
use serde::Serialize;
use tools::{apply_env_overrides, parse_render_mode, render_snapshot};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scoremap", about = "Render scored business records on a headless map")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Filter and render records, then print a JSON snapshot of the result.
    Render {
        /// JSON array of business records.
        records: PathBuf,
        /// Map config JSON; missing fields use defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        style: Option<String>,
        /// markers, clusters or auto
        #[arg(long)]
        mode: Option<String>,
        /// Record count above which auto mode clusters.
        #[arg(long, default_value_t = 100)]
        threshold: usize,
        #[arg(long)]
        sector: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        min_score: Option<f64>,
        #[arg(long)]
        max_score: Option<f64>,
    },
    /// List the distinct sectors and cities in a record file.
    Facets { records: PathBuf },
}

#[derive(Serialize)]
struct Facets {
    sectors: Vec<String>,
    cities: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    match Cli::parse().command {
        Command::Render {
            records,
            config,
            style,
            mode,
            threshold,
            sector,
            city,
            min_score,
            max_score,
        } => {
            let records = read_records(&records)?;

            let mut map_config = match config {
                Some(p) => {
                    let text = fs::read_to_string(&p).map_err(|e| format!("read {p:?}: {e}"))?;
                    MapConfig::from_json_str(&text).map_err(|e| e.to_string())?
                }
                None => MapConfig::default(),
            };
            apply_env_overrides(&mut map_config, |k| std::env::var(k).ok());
            if let Some(s) = style {
                map_config.style =
                    MapStyle::parse(&s).ok_or_else(|| format!("unknown style: {s}"))?;
            }
            if let Some(m) = mode {
                map_config.render_mode = parse_render_mode(&m, threshold)
                    .ok_or_else(|| format!("unknown render mode: {m}"))?;
            }

            let mut criteria = FilterCriteria::all().score_range(min_score, max_score);
            criteria.sector = sector;
            criteria.city = city;

            info!(
                records = records.len(),
                style = map_config.style.as_str(),
                "rendering"
            );
            let snapshot = render_snapshot(records, criteria, map_config)?;
            print_json(&snapshot)
        }
        Command::Facets { records } => {
            let records = read_records(&records)?;
            print_json(&Facets {
                sectors: distinct_sectors(&records),
                cities: distinct_cities(&records),
            })
        }
    }
}

fn read_records(path: &Path) -> Result<Vec<records::BusinessRecord>, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
    load_records_json(&text).map_err(|e| format!("{path:?}: {e}"))
}

fn print_json(value: &impl Serialize) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}
