use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use dental_assistant::{AssistantConfig, DentalAssistant, LoadOutcome, PatientSelection};
use dental_protocol::{wire_schemas, PatientVisit};
use dental_vector_store::{CodeIndex, EmbeddingMode};
use dental_visit_context::{VisitContext, DEFAULT_CONFIDENCE_THRESHOLD};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Session id used for one-shot CLI invocations.
const CLI_SESSION: &str = "cli";

#[derive(Parser)]
#[command(name = "dental-rag")]
#[command(about = "CDT code retrieval and visit context for dental assistants", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// TOML settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// CDT reference table (CSV)
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    /// Persisted index artifact
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Embedding backend: ollama|stub
    #[arg(long, global = true)]
    embedding_mode: Option<String>,

    /// Language model id
    #[arg(long, global = true)]
    llm_model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or validate) the persisted code index
    Index(IndexArgs),

    /// Rank CDT codes for a free-text query
    Match(MatchArgs),

    /// Render a visit document as plain text
    Summary(VisitArgs),

    /// Group a visit's anomalies by confidence
    Anomalies(AnomaliesArgs),

    /// Load a visit and ask the assistant a question
    Ask(AskArgs),

    /// Print the JSON Schemas of the exchanged records
    Schema,
}

#[derive(Args)]
struct IndexArgs {
    /// Rebuild even when the artifact is current
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct MatchArgs {
    query: String,

    /// Number of codes to return
    #[arg(short = 'k', long)]
    top_k: Option<usize>,
}

#[derive(Args)]
struct VisitArgs {
    /// Visit JSON file, `-` for stdin
    visit: PathBuf,
}

#[derive(Args)]
struct AnomaliesArgs {
    /// Visit JSON file, `-` for stdin
    visit: PathBuf,

    /// Confidence threshold in [0, 1]
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Args)]
struct AskArgs {
    question: String,

    /// Visit JSON to load before asking
    #[arg(long)]
    visit: Option<PathBuf>,

    /// Patient name or id
    #[arg(long)]
    patient: Option<String>,

    /// JSON array of prior visits for the patient
    #[arg(long, requires = "patient")]
    history: Option<PathBuf>,
}

#[derive(Serialize)]
struct IndexSummary<'a> {
    codes: usize,
    dimension: usize,
    embedding_mode: &'a str,
    model_id: &'a str,
    fingerprint: &'a str,
    path: &'a Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    if cli.json {
        cli.quiet = true;
    }

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    if !cli.verbose {
        builder.filter_module("reqwest", log::LevelFilter::Warn);
    }
    builder.target(env_logger::Target::Stderr).init();

    match &cli.command {
        Commands::Index(args) => run_index(&cli, args).await,
        Commands::Match(args) => run_match(&cli, args).await,
        Commands::Summary(args) => run_summary(&cli, args),
        Commands::Anomalies(args) => run_anomalies(&cli, args),
        Commands::Ask(args) => run_ask(&cli, args).await,
        Commands::Schema => run_schema(),
    }
}

/// Defaults, then the settings file and `DENTAL_*` variables, then flags.
fn load_config(cli: &Cli) -> Result<AssistantConfig> {
    let mut config =
        AssistantConfig::load(cli.config.as_deref()).context("Failed to load settings")?;
    if let Some(table) = &cli.table {
        config.table_path.clone_from(table);
    }
    if let Some(index) = &cli.index {
        config.index_path.clone_from(index);
    }
    if let Some(mode) = &cli.embedding_mode {
        config.embedding.mode = EmbeddingMode::parse(mode)?;
    }
    if let Some(model) = &cli.llm_model {
        config.llm.model.clone_from(model);
    }
    config.validate()?;
    Ok(config)
}

async fn start_assistant(config: AssistantConfig) -> Result<DentalAssistant> {
    DentalAssistant::start(config)
        .await
        .context("Failed to start assistant")
}

async fn run_index(cli: &Cli, args: &IndexArgs) -> Result<()> {
    let config = load_config(cli)?;
    let embedder = config.embedding.build()?;

    let index = if args.force {
        let index = CodeIndex::build(&config.table_path, embedder.as_ref()).await?;
        index.persist(&config.index_path).await?;
        index
    } else {
        CodeIndex::open(&config.table_path, &config.index_path, embedder.as_ref()).await?
    };

    let summary = IndexSummary {
        codes: index.len(),
        dimension: index.dimension(),
        embedding_mode: config.embedding.mode.as_str(),
        model_id: index.model_id(),
        fingerprint: index.fingerprint(),
        path: &config.index_path,
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Indexed {} codes ({}, dim {}) -> {}",
            summary.codes,
            summary.model_id,
            summary.dimension,
            summary.path.display()
        );
    }
    Ok(())
}

async fn run_match(cli: &Cli, args: &MatchArgs) -> Result<()> {
    let config = load_config(cli)?;
    let k = args.top_k.unwrap_or(config.retrieval.top_k);
    let assistant = start_assistant(config).await?;
    let matches = assistant.match_codes(&args.query, k).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No matching CDT code found.");
    }
    for (i, m) in matches.iter().enumerate() {
        println!("{}. {} {} (score: {:.3})", i + 1, m.code, m.description, m.score);
        println!("   cosine {:.3}, jaccard {:.3}", m.cosine, m.jaccard);
    }
    Ok(())
}

fn run_summary(cli: &Cli, args: &VisitArgs) -> Result<()> {
    let raw = read_input(&args.visit)?;
    let context = VisitContext::from_json_str(&raw, DEFAULT_CONFIDENCE_THRESHOLD)
        .with_context(|| format!("Cannot parse {}", args.visit.display()))?;

    if cli.json {
        let body = serde_json::json!({
            "shape": context.visit.shape.to_string(),
            "summary": context.full_text,
            "findings": context.findings,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", context.full_text);
    }
    Ok(())
}

fn run_anomalies(cli: &Cli, args: &AnomaliesArgs) -> Result<()> {
    let threshold = match args.threshold {
        Some(t) => t,
        None => load_config(cli)?.confidence_threshold,
    };
    if !(0.0..=1.0).contains(&threshold) {
        bail!("Threshold must be within [0, 1], got {threshold}");
    }

    let raw = read_input(&args.visit)?;
    let context = VisitContext::from_json_str(&raw, threshold)
        .with_context(|| format!("Cannot parse {}", args.visit.display()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&context.anomalies)?);
    } else {
        println!("{}", context.anomalies.to_llm_text());
    }
    Ok(())
}

async fn run_ask(cli: &Cli, args: &AskArgs) -> Result<()> {
    let config = load_config(cli)?;
    let assistant = start_assistant(config).await?;

    if let Some(patient) = &args.patient {
        let history: Vec<PatientVisit> = match &args.history {
            Some(path) => serde_json::from_str(&read_input(path)?)
                .with_context(|| format!("Invalid visit history in {}", path.display()))?,
            None => Vec::new(),
        };
        match assistant
            .select_patient(CLI_SESSION, patient, history)
            .await?
        {
            PatientSelection::Selected { message, .. } => log::info!("{message}"),
            PatientSelection::Rejected { reason } => bail!("⚠️ {reason}"),
        }
    }

    if let Some(path) = &args.visit {
        let raw = read_input(path)?;
        match assistant.load_context(CLI_SESSION, &raw).await? {
            LoadOutcome::Loaded { findings, .. } => {
                log::info!("Loaded {} ({findings} findings)", path.display());
            }
            LoadOutcome::Rejected { reason } => bail!("⚠️ {reason}"),
        }
    }

    let reply = assistant.ask(CLI_SESSION, &args.question).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        println!("{}", reply.answer);
    }
    Ok(())
}

fn run_schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&wire_schemas())?);
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut raw = String::new();
        io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read stdin")?;
        return Ok(raw);
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
