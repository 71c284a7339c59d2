use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cache;
mod config;
mod detection;
mod loader;
mod matrix;
mod models;
mod progress;
mod report;
mod risk;

use crate::cache::MatrixCache;
use crate::config::DetectionConfig;
use crate::matrix::{display_name, ScoreMatrix};
use crate::models::FindingKind;

#[derive(Parser)]
#[command(name = "bootcamp-integrity")]
#[command(about = "Flags anomalous score patterns in bootcamp daily test results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
#[command(group(
    ArgGroup::new("source")
        .args(["matrix", "datasets"])
        .required(true)
        .multiple(false)
))]
struct SourceArgs {
    /// Wide CSV with one row per student and one column per day
    #[arg(long)]
    matrix: Option<PathBuf>,
    /// Directory of hermes_<year>_<unit>_<slug>_delivery.csv exports
    #[arg(long)]
    datasets: Option<PathBuf>,
    /// Reuse loaded matrices stored in this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 5)]
    cache_ttl_minutes: i64,
}

#[derive(Args)]
struct ThresholdArgs {
    /// JSON file with detection thresholds
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    pair_tolerance: Option<f64>,
    #[arg(long)]
    pair_min_days: Option<usize>,
    #[arg(long)]
    pair_min_ratio: Option<f64>,
    #[arg(long)]
    peak_high: Option<f64>,
    #[arg(long)]
    peak_low: Option<f64>,
    #[arg(long)]
    peak_window: Option<usize>,
    #[arg(long)]
    oscillation_variation: Option<f64>,
    #[arg(long)]
    oscillation_min_alternations: Option<usize>,
    #[arg(long)]
    cluster_min_students: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank students by suspicion score
    Score {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print the full profile table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print raw findings as JSON
    Findings {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        #[arg(long, value_enum)]
        kind: Option<FindingKind>,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        thresholds: ThresholdArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Rank students by progression and print class statistics
    Leaderboard {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

impl ThresholdArgs {
    fn resolve(&self) -> anyhow::Result<DetectionConfig> {
        let mut config = match &self.config {
            Some(path) => DetectionConfig::from_json_file(path)?,
            None => DetectionConfig::default(),
        };

        if let Some(value) = self.pair_tolerance {
            config.pair_tolerance = value;
        }
        if let Some(value) = self.pair_min_days {
            config.pair_min_days = value;
        }
        if let Some(value) = self.pair_min_ratio {
            config.pair_min_ratio = value;
        }
        if let Some(value) = self.peak_high {
            config.peak_high = value;
        }
        if let Some(value) = self.peak_low {
            config.peak_low = value;
        }
        if let Some(value) = self.peak_window {
            config.peak_window = value;
        }
        if let Some(value) = self.oscillation_variation {
            config.oscillation_variation = value;
        }
        if let Some(value) = self.oscillation_min_alternations {
            config.oscillation_min_alternations = value;
        }
        if let Some(value) = self.cluster_min_students {
            config.cluster_min_students = value;
        }

        config.validate()?;
        Ok(config)
    }
}

impl SourceArgs {
    fn path(&self) -> anyhow::Result<&Path> {
        self.matrix
            .as_deref()
            .or(self.datasets.as_deref())
            .context("either --matrix or --datasets is required")
    }

    fn load(&self) -> anyhow::Result<ScoreMatrix> {
        let path = self.path()?;
        let key = path.display().to_string();
        let cache = self.cache_dir.as_deref().map(MatrixCache::open).transpose()?;

        if let Some(cache) = &cache {
            let max_age = chrono::Duration::try_minutes(self.cache_ttl_minutes)
                .context("--cache-ttl-minutes is out of range")?;
            if let Some(matrix) = cache.get(&key, max_age) {
                info!(source = %key, "using cached score matrix");
                return Ok(matrix);
            }
        }

        let matrix = if self.matrix.is_some() {
            loader::load_wide_csv(path)?
        } else {
            loader::load_export_dir(path)?
        };

        if matrix.is_empty() {
            warn!(source = %key, "score matrix is empty; nothing to analyse");
        }
        if let Some(cache) = &cache {
            cache.put(&key, &matrix)?;
        }
        Ok(matrix)
    }
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            source,
            thresholds,
            limit,
            json,
        } => {
            let config = thresholds.resolve()?;
            let matrix = source.load()?;
            let (_, profiles) = risk::suspicion_table(&matrix, &config);

            if json {
                println!("{}", serde_json::to_string_pretty(&profiles)?);
                return Ok(());
            }

            if profiles.is_empty() {
                println!("No suspicious pattern found with these thresholds.");
                return Ok(());
            }

            println!("Top students by suspicion score:");
            for profile in profiles.iter().take(limit) {
                println!(
                    "- {} score {:.1} across {} findings (pairs {:.1}, peaks {:.1}, oscillation {:.1}, collective {:.1})",
                    display_name(&profile.student),
                    profile.score,
                    profile.finding_count(),
                    profile.pair_similarity,
                    profile.peak,
                    profile.oscillation,
                    profile.collective
                );
                for reason in &profile.reasons {
                    println!("    {reason}");
                }
            }
        }
        Commands::Findings {
            source,
            thresholds,
            kind,
        } => {
            let config = thresholds.resolve()?;
            let matrix = source.load()?;
            let detections = detection::detect_all(&matrix, &config);
            if detections.is_empty() {
                info!("no finding with these thresholds");
            }

            let rendered = match kind {
                Some(kind) => serde_json::to_string_pretty(detections.of_kind(kind))?,
                None => serde_json::to_string_pretty(&detections)?,
            };
            println!("{rendered}");
        }
        Commands::Report {
            source,
            thresholds,
            out,
        } => {
            let config = thresholds.resolve()?;
            let matrix = source.load()?;
            let (detections, profiles) = risk::suspicion_table(&matrix, &config);
            let label = source.path()?.display().to_string();
            let report = report::build_report(&label, &matrix, &config, &detections, &profiles);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Leaderboard { source, limit } => {
            let matrix = source.load()?;
            let board = progress::leaderboard(&matrix);

            if board.is_empty() {
                println!("No scores recorded.");
                return Ok(());
            }

            println!("Top students by progression:");
            for entry in board.iter().take(limit) {
                println!(
                    "- {} global {:.2} (avg {:.1}, std {:.1}, trend {:+.2}, regularity {:.1}, range {:.0}-{:.0})",
                    display_name(&entry.student),
                    entry.global_score,
                    entry.average,
                    entry.std,
                    entry.trend,
                    entry.regularity,
                    entry.min,
                    entry.max
                );
            }

            if let Some(stats) = progress::class_stats(&matrix) {
                println!();
                println!(
                    "Class average {:.2} (std {:.2}); best {} at {:.2}",
                    stats.class_average,
                    stats.class_std,
                    display_name(&stats.best_student),
                    stats.best_score
                );
                println!(
                    "Hardest day {} ({:.2}), easiest day {} ({:.2})",
                    stats.hardest_day,
                    stats.hardest_day_score,
                    stats.easiest_day,
                    stats.easiest_day_score
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn source_flags_are_exclusive() {
        let parsed = Cli::try_parse_from([
            "bootcamp-integrity",
            "score",
            "--matrix",
            "a.csv",
            "--datasets",
            "dir",
        ]);
        assert!(parsed.is_err());
        assert!(Cli::try_parse_from(["bootcamp-integrity", "score"]).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("thresholds.json");
        std::fs::write(&path, r#"{"pair_tolerance": 3.0, "pic_fenetre": 4}"#).unwrap();

        let cli = Cli::try_parse_from([
            "bootcamp-integrity",
            "score",
            "--matrix",
            "a.csv",
            "--config",
            path.to_str().unwrap(),
            "--pair-tolerance",
            "0.5",
        ])
        .unwrap();
        let Commands::Score { thresholds, .. } = cli.command else {
            panic!("expected score command");
        };
        let config = thresholds.resolve().unwrap();
        assert_eq!(config.pair_tolerance, 0.5);
        assert_eq!(config.peak_window, 4);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let cli = Cli::try_parse_from([
            "bootcamp-integrity",
            "findings",
            "--datasets",
            "dir",
            "--pair-min-ratio",
            "2",
        ])
        .unwrap();
        let Commands::Findings { thresholds, .. } = cli.command else {
            panic!("expected findings command");
        };
        assert!(thresholds.resolve().is_err());
    }

    #[test]
    fn loads_and_caches_wide_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("scores.csv");
        std::fs::write(&csv, "login,day01,day02\nana,50,60\n").unwrap();
        let cache_dir = dir.path().join("cache");

        let source = SourceArgs {
            matrix: Some(csv.clone()),
            datasets: None,
            cache_dir: Some(cache_dir.clone()),
            cache_ttl_minutes: 5,
        };
        let first = source.load().unwrap();
        std::fs::remove_file(&csv).unwrap();
        let second = source.load().unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(&cache_dir).unwrap().count(), 1);
    }

    #[test]
    fn out_of_range_cache_ttl_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("scores.csv");
        std::fs::write(&csv, "login,day01\nana,50\n").unwrap();

        let source = SourceArgs {
            matrix: Some(csv),
            datasets: None,
            cache_dir: Some(dir.path().join("cache")),
            cache_ttl_minutes: i64::MAX,
        };
        let err = source.load().unwrap_err();
        assert!(err.to_string().contains("--cache-ttl-minutes"));
    }
}
