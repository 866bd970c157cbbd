//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use openkeywords_core::export::{self, ExportFormat};
use openkeywords_core::{PipelineConfig, PipelineOrchestrator, PipelineResult, ProgressReporter};
use openkeywords_providers::{GeminiClient, GeminiOptions, SeRankingClient, SeRankingOptions};
use openkeywords_shared::{
    AppConfig, CompanyContext, Stage, StageOutcome, StageStatus, gemini_api_key, init_config,
    load_config, seranking_api_key,
};
use tracing::{info, warn};

/// Keywords listed in the summary when no output file is given.
const PREVIEW_ROWS: usize = 15;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// OpenKeywords: AI-generated, scored and clustered SEO keywords.
#[derive(Parser)]
#[command(
    name = "openkeywords",
    version,
    about = "Generate scored, clustered SEO keywords for a company.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the keyword pipeline for a company file.
    Generate(GenerateArgs),

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug, Default)]
pub(crate) struct GenerateArgs {
    /// Company description file (.toml or .json).
    #[arg(short, long)]
    pub company: PathBuf,

    /// Number of keywords to return.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Minimum relevance score (0-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub min_score: Option<u8>,

    /// Minimum words per keyword.
    #[arg(long)]
    pub min_words: Option<usize>,

    /// Number of semantic clusters.
    #[arg(long)]
    pub clusters: Option<usize>,

    /// Skip semantic clustering.
    #[arg(long)]
    pub no_clustering: bool,

    /// Mine forums and Q&A sites with search grounding first.
    #[arg(long)]
    pub research: bool,

    /// Annotate keywords with SE Ranking volume and difficulty.
    #[arg(long)]
    pub enrich: bool,

    /// Market override, e.g. `de`.
    #[arg(long)]
    pub region: Option<String>,

    /// Language override, e.g. `de`.
    #[arg(long)]
    pub language: Option<String>,

    /// Write results to this file. The extension picks JSON or CSV.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "openkeywords=info",
        1 => "openkeywords=debug",
        _ => "openkeywords=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

/// Read a company file. The extension picks the format.
fn load_company(path: &Path) -> Result<CompanyContext> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read company file '{}': {e}", path.display()))?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let company: CompanyContext = match ext.as_deref() {
        Some("toml") => toml::from_str(&content)?,
        Some("json") => serde_json::from_str(&content)?,
        _ => {
            return Err(eyre!(
                "unsupported company file '{}': expected .toml or .json",
                path.display()
            ));
        }
    };

    if company.name.trim().is_empty() {
        return Err(eyre!("company file '{}' has no name", path.display()));
    }
    Ok(company)
}

/// File defaults, then flag overrides.
fn pipeline_config(config: &AppConfig, args: &GenerateArgs) -> PipelineConfig {
    let mut pipeline = PipelineConfig::from(config);
    if let Some(count) = args.count {
        pipeline.target_count = count;
    }
    if let Some(min_score) = args.min_score {
        pipeline.min_score = min_score;
    }
    if let Some(min_words) = args.min_words {
        pipeline.min_word_count = min_words;
    }
    if let Some(clusters) = args.clusters {
        pipeline.cluster_count = clusters;
    }
    pipeline.enable_clustering = !args.no_clustering;
    pipeline.enable_research = args.research;
    pipeline.enable_enrichment = args.enrich;
    pipeline
}

fn build_orchestrator(config: &AppConfig, enrich: bool) -> Result<PipelineOrchestrator> {
    let api_key = gemini_api_key(config)?;
    let gemini = GeminiClient::new(GeminiOptions::from_config(&config.gemini, api_key))?;
    let mut orchestrator = PipelineOrchestrator::new(Arc::new(gemini));

    if enrich {
        match seranking_api_key(config) {
            Some(key) => {
                let client =
                    SeRankingClient::new(SeRankingOptions::from_config(&config.seranking, key))?;
                orchestrator = orchestrator.with_metrics(Arc::new(client));
            }
            None => warn!(
                env = %config.seranking.api_key_env,
                "enrichment requested but no SE Ranking key is set, skipping"
            ),
        }
    }
    Ok(orchestrator)
}

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let config = load_config()?;
    let mut company = load_company(&args.company)?;
    if let Some(region) = &args.region {
        company.region = region.clone();
    }
    if let Some(language) = &args.language {
        company.language = language.clone();
    }

    let pipeline = pipeline_config(&config, &args);
    let orchestrator = build_orchestrator(&config, args.enrich)?;

    info!(
        company = %company.name,
        target = pipeline.target_count,
        research = pipeline.enable_research,
        enrich = pipeline.enable_enrichment,
        "generating keywords"
    );

    let reporter = Arc::new(CliProgress::new());
    let ctrl_c = {
        let reporter = reporter.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                reporter.cancel();
            }
        })
    };

    let outcome = orchestrator.run(&company, &pipeline, reporter.as_ref()).await;
    ctrl_c.abort();
    reporter.finish();
    let result = outcome?;

    print_summary(&company, &result);

    if let Some(path) = &args.output {
        let format = ExportFormat::from_path(path);
        let rendered = export::render(&result, format)?;
        std::fs::write(path, rendered)
            .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
        println!("  Wrote {} keywords to {} ({format})", result.keywords.len(), path.display());
        println!();
    }

    Ok(())
}

fn print_summary(company: &CompanyContext, result: &PipelineResult) {
    let stats = &result.statistics;

    println!();
    println!("  Keywords for {}", company.name);
    println!("  Total:      {}", stats.total);
    println!("  Avg score:  {:.1}", stats.avg_score);
    println!("  Research:   {}", stats.research_count);
    println!("  Generated:  {}", stats.generated_count);
    println!("  Duplicates: {}", stats.duplicates_removed);
    println!(
        "  Filtered:   {} low score, {} too short, {} over target",
        stats.low_score_removed, stats.short_removed, stats.truncated
    );
    println!("  AI calls:   {}", stats.ai_calls);
    println!("  Time:       {:.1}s", stats.duration_ms as f64 / 1000.0);
    if !stats.degraded_stages.is_empty() {
        let names: Vec<_> = stats.degraded_stages.iter().map(|s| s.as_str()).collect();
        println!("  Degraded:   {}", names.join(", "));
    }

    if !result.clusters.is_empty() {
        println!();
        println!("  Clusters:");
        for cluster in &result.clusters {
            println!("    {:<32} {}", cluster.name, cluster.count());
        }
    }

    println!();
    for keyword in result.keywords.iter().take(PREVIEW_ROWS) {
        let c = &keyword.scored.candidate;
        println!(
            "  {:>3}  {:<14} {}",
            keyword.score(),
            c.intent.as_str(),
            c.keyword
        );
    }
    if result.keywords.len() > PREVIEW_ROWS {
        println!("  ... {} more", result.keywords.len() - PREVIEW_ROWS);
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner showing the running stage. Ctrl-C requests a cancel that the
/// pipeline honors at the next stage boundary.
struct CliProgress {
    spinner: ProgressBar,
    cancelled: AtomicBool,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            cancelled: AtomicBool::new(false),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.spinner
            .set_message("Cancelling after the current stage...");
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

fn stage_line(outcome: &StageOutcome) -> String {
    let mark = match outcome.status {
        StageStatus::Success => "✓",
        StageStatus::Degraded => "!",
        StageStatus::Failed => "✗",
        StageStatus::Skipped => "-",
    };
    match &outcome.reason {
        Some(reason) => format!("{mark} {} ({reason})", outcome.stage),
        None => format!("{mark} {}", outcome.stage),
    }
}

impl ProgressReporter for CliProgress {
    fn stage_started(&self, stage: Stage) {
        if !self.cancelled.load(Ordering::SeqCst) {
            self.spinner.set_message(format!("{stage}..."));
        }
    }

    fn stage_finished(&self, outcome: &StageOutcome) {
        self.spinner.println(stage_line(outcome));
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
