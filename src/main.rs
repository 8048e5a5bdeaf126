use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use spectra::analyzer::engine::FingerprintEngine;
use spectra::db::Database;
use spectra::output::{AnalyzeOutput, FlowItem, RecommendOutput, TrackView};
use spectra::recommend::{NoveltySource, RandomNovelty};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "spectra", version, about = "DJ track fingerprinting and mix recommendation")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register audio files (or directories of them) as pending tracks
    Ingest {
        /// Files or directories (defaults to config file media_dirs)
        paths: Vec<PathBuf>,

        /// Secondary id from the originating source (single file only)
        #[arg(long)]
        external_id: Option<String>,

        /// Reset already registered tracks to pending
        #[arg(long)]
        force: bool,
    },

    /// Fingerprint one audio file and print the result as JSON
    Analyze {
        /// Audio file to analyze
        file: PathBuf,
    },

    /// Fingerprint pending tracks in the library
    AnalyzePending {
        /// Number of parallel workers (0 = auto-detect from config)
        #[arg(short = 'j', long, default_value = "0")]
        jobs: usize,

        /// Re-analyze every track, not just pending ones
        #[arg(long)]
        force: bool,

        /// Only analyze tracks whose path contains this pattern
        #[arg(long)]
        filter: Option<String>,
    },

    /// Recommend the next track to mix into, as JSON
    Recommend {
        /// Current track: library id or external id
        track: String,

        /// Pin the novelty draw (overrides the config seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the stored analysis of one track as JSON
    Track {
        /// Library id or external id
        track: String,
    },

    /// List analyzed tracks by ascending BPM with transition predictions
    Flow,

    /// Show library statistics
    Stats,
}

fn main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return Ok(argument_error(e)),
    };

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    // Load config file (optional, defaults if missing)
    let config = spectra::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .clone()
        .or(config.db_path.clone())
        .unwrap_or_else(spectra::config::default_db_path);

    match cli.command {
        Commands::Ingest { paths, external_id, force } => {
            let db = open_db(&db_path)?;
            let paths = if !paths.is_empty() {
                paths
            } else if !config.media_dirs.is_empty() {
                config.media_dirs.clone()
            } else {
                anyhow::bail!(
                    "No paths to ingest. Pass files or directories, or set media_dirs in config."
                );
            };

            let result = spectra::scanner::ingest(&db, &paths, external_id.as_deref(), force)
                .context("Ingest failed")?;
            println!(
                "Ingest complete: {} scanned, {} new, {} updated, {} unchanged, {} errors",
                result.scanned, result.new, result.updated, result.unchanged, result.errors
            );
        }

        Commands::Analyze { file } => {
            let output = match load_engine(&config.analysis) {
                Ok(engine) => match spectra::analyzer::analyze_file(&engine, &file) {
                    Ok(fp) => AnalyzeOutput::from(&fp),
                    Err(e) => AnalyzeOutput::error(e.to_string()),
                },
                Err(e) => AnalyzeOutput::error(e.to_string()),
            };
            println!("{}", serde_json::to_string(&output)?);
            if !output.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::AnalyzePending { jobs, force, filter } => {
            let db = open_db(&db_path)?;
            let engine = load_engine(&config.analysis).context("Failed to load analysis engine")?;
            let workers = if jobs > 0 { jobs } else { config.resolve_workers() };
            let result = spectra::analyzer::analyze_tracks(
                &db,
                &engine,
                force,
                workers,
                filter.as_deref(),
            )
            .context("Analysis failed")?;
            println!(
                "Analysis complete: {} analyzed, {} failed",
                result.analyzed, result.failed
            );
        }

        Commands::Recommend { track, seed } => {
            let mut novelty: Box<dyn NoveltySource> = match seed.or(config.recommend.seed) {
                Some(seed) => Box::new(RandomNovelty::seeded(seed)),
                None => Box::new(RandomNovelty::fresh()),
            };

            let output = match open_db(&db_path) {
                Ok(db) => match spectra::recommend::recommend(&db, &track, novelty.as_mut()) {
                    Ok(rec) => RecommendOutput::from_recommendation(&rec, &config.stream_base_url),
                    Err(e) => RecommendOutput::error(e.to_string()),
                },
                Err(e) => RecommendOutput::error(format!("{e:#}")),
            };
            println!("{}", serde_json::to_string(&output)?);
            if !output.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Track { track } => {
            let db = open_db(&db_path)?;
            let entry = db
                .lookup_entry(&track)
                .context("Failed to load track")?
                .with_context(|| format!("No track with id or external id {track}"))?;
            println!("{}", serde_json::to_string_pretty(&TrackView::from(&entry))?);
        }

        Commands::Flow => {
            let db = open_db(&db_path)?;
            let entries = db.get_analyzed_entries().context("Failed to load tracks")?;
            let flow: Vec<FlowItem> = spectra::flow::bpm_flow(entries)
                .iter()
                .map(FlowItem::from)
                .collect();
            println!("{}", serde_json::to_string_pretty(&flow)?);
        }

        Commands::Stats => {
            let db = open_db(&db_path)?;
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Total tracks:     {}", stats.total_tracks);
            println!("Pending:          {}", stats.pending_tracks);
            println!("Analyzed:         {}", stats.analyzed_tracks);
            println!("Errors:           {}", stats.error_tracks);
            println!("Total duration:   {:.1} hours", stats.total_duration_hours);
            println!();

            if !stats.formats.is_empty() {
                println!("Formats:");
                for (fmt, count) in &stats.formats {
                    println!("  {:<8} {}", fmt, count);
                }
                println!();
            }

            if !stats.keys.is_empty() {
                println!("Keys:");
                for (key, count) in &stats.keys {
                    println!("  {:<10} {}", key, count);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn open_db(path: &Path) -> Result<Database> {
    log::info!("Database: {}", path.display());
    Database::open(path).context("Failed to open database")
}

fn load_engine(settings: &spectra::config::AnalysisConfig) -> Result<FingerprintEngine> {
    let mut engine = FingerprintEngine::new(settings.clone());
    engine.load()?;
    Ok(engine)
}

/// Report a command-line error as the JSON object the command would have
/// printed, so callers parsing stdout always get JSON back.
fn argument_error(e: clap::Error) -> ExitCode {
    if matches!(
        e.kind(),
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
    ) {
        e.exit();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let is_command = |name: &str| args.iter().any(|a| a == name);
    let missing = e.kind() == ErrorKind::MissingRequiredArgument;

    let json = if is_command("recommend") {
        let message = if missing { "No track ID provided".to_string() } else { first_line(&e) };
        serde_json::json!({ "error": message })
    } else {
        let message = if missing && is_command("analyze") {
            "No file provided".to_string()
        } else {
            first_line(&e)
        };
        serde_json::json!({ "status": "error", "message": message })
    };

    println!("{json}");
    ExitCode::from(2)
}

fn first_line(e: &clap::Error) -> String {
    let rendered = e.render().to_string();
    rendered
        .lines()
        .next()
        .unwrap_or("invalid arguments")
        .trim_start_matches("error: ")
        .to_string()
}
