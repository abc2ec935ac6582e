//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use deepresearch_core::{
    CancelFlag, ProgressReporter, ResearchConfig, ResearchReport, Researcher, cluster_store,
    save_clusters,
};
use deepresearch_providers::IdentityCondenser;
use deepresearch_providers::{
    Condenser, HttpPageFetcher, OpenAiCondenser, OpenAiEmbeddings, SerpApiSearch,
};
use deepresearch_shared::{
    AppConfig, KnowledgeId, KnowledgeItem, init_config, load_config, validate_search_key,
};
use deepresearch_storage::{KnowledgeStore, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DeepResearch: expand a topic into a condensed, persistent knowledge base.
#[derive(Parser)]
#[command(
    name = "deepresearch",
    version,
    about = "Iteratively expand search queries around a topic and condense what is found.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Knowledge database file (overrides `research.db_path`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

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
    /// Run the research loop for a topic.
    Run {
        /// Research topic (used as the report title).
        topic: String,

        /// Seed query (repeatable). Defaults to the topic itself.
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Number of depth iterations.
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        depth: Option<u32>,

        /// Frontier queries searched per depth.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        select_limit: Option<u64>,

        /// Enqueue follow-ups in discovery order instead of by novelty.
        #[arg(long)]
        no_ranking: bool,

        /// Condense full page text instead of search snippets.
        #[arg(long)]
        fetch_pages: bool,

        /// Report output file.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Knowledge export (JSON) output file.
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Group stored synopses into topics and label each item.
    Cluster {
        /// Number of groups.
        #[arg(short, long)]
        k: Option<usize>,

        /// Clusters JSON output file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Knowledge database management.
    Db {
        /// Database subcommand.
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database and apply migrations.
    Init,
    /// Print stored knowledge items and recent runs.
    Show {
        /// Only items produced at this depth.
        #[arg(long)]
        depth: Option<u32>,

        /// Number of recent runs to list.
        #[arg(long, default_value = "5")]
        runs: u32,
    },
    /// Delete every stored knowledge item.
    Reset {
        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
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
        0 => "deepresearch=info",
        1 => "deepresearch=debug",
        _ => "deepresearch=trace",
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
    let db = cli.db;
    match cli.command {
        Command::Run {
            topic,
            queries,
            depth,
            select_limit,
            no_ranking,
            fetch_pages,
            report,
            export,
        } => {
            let args = RunArgs {
                topic,
                queries,
                depth,
                select_limit: select_limit.map(|n| n as usize),
                no_ranking,
                fetch_pages,
                report,
                export,
            };
            cmd_run(args, db).await
        }
        Command::Cluster { k, out } => cmd_cluster(k, out, db).await,
        Command::Db { action } => match action {
            DbAction::Init => cmd_db_init(db).await,
            DbAction::Show { depth, runs } => cmd_db_show(db, depth, runs).await,
            DbAction::Reset { yes } => cmd_db_reset(db, yes).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn db_path(config: &AppConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(&config.research.db_path))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunArgs {
    topic: String,
    queries: Vec<String>,
    depth: Option<u32>,
    select_limit: Option<usize>,
    no_ranking: bool,
    fetch_pages: bool,
    report: Option<PathBuf>,
    export: Option<PathBuf>,
}

async fn cmd_run(args: RunArgs, db: Option<PathBuf>) -> Result<()> {
    // Validate the search key before doing anything
    let config = load_config()?;
    validate_search_key(&config)?;

    let defaults = &config.research;
    let seeds = if args.queries.is_empty() {
        vec![args.topic.clone()]
    } else {
        args.queries
    };

    let mut research = ResearchConfig::new(
        args.topic,
        seeds,
        args.depth.unwrap_or(defaults.default_depth),
    );
    research.select_limit = args.select_limit.unwrap_or(defaults.select_limit);
    research.ranking = defaults.ranking && !args.no_ranking;
    research.fetch_pages = defaults.fetch_pages || args.fetch_pages;
    research.report_path = Some(
        args.report
            .unwrap_or_else(|| PathBuf::from(&defaults.report_path)),
    );
    research.export_path = Some(
        args.export
            .unwrap_or_else(|| PathBuf::from(&defaults.export_path)),
    );
    research.validate()?;

    let store = Arc::new(Storage::open(&db_path(&config, db)).await?);
    let researcher = build_researcher(&config, &research, store)?;

    let cancel = researcher.cancel_flag();
    spawn_ctrl_c_handler(cancel);

    info!(
        topic = %research.topic,
        depth = research.max_depth,
        seeds = research.seed_queries.len(),
        "starting research"
    );

    let reporter = CliProgress::new();
    let report = researcher.run(&research, &reporter).await?;

    println!("{}", report.render());
    println!("  Run:     {}", report.run_id);
    println!("  Entries: {}", report.entries.len());
    if let Some(path) = &research.report_path {
        println!("  Report:  {}", path.display());
    }
    if let Some(path) = &research.export_path {
        println!("  Export:  {}", path.display());
    }
    println!();

    Ok(())
}

/// Wire configured adapters into a [`Researcher`].
///
/// Without an OpenAI key, condensation is the identity and ranking is
/// dropped; the run still proceeds.
fn build_researcher(
    config: &AppConfig,
    research: &ResearchConfig,
    store: Arc<dyn KnowledgeStore>,
) -> Result<Researcher> {
    let search = SerpApiSearch::new(&config.search)?;

    let openai = OpenAiCondenser::new(&config.openai)?;
    let has_openai = openai.has_credential();
    let condenser: Arc<dyn Condenser> = if has_openai {
        Arc::new(openai)
    } else {
        warn!(
            env_var = %config.openai.api_key_env,
            "OpenAI key not set: results are stored uncondensed and follow-ups are not ranked"
        );
        Arc::new(IdentityCondenser::new())
    };

    let mut researcher = Researcher::new(Arc::new(search), condenser, store);
    if research.ranking && has_openai {
        researcher = researcher.with_embedder(Arc::new(OpenAiEmbeddings::new(&config.openai)?));
    }
    if research.fetch_pages {
        researcher = researcher.with_fetcher(Arc::new(HttpPageFetcher::new(&config.fetch)?));
    }
    Ok(researcher)
}

/// First Ctrl-C cancels the run at the next safe point.
fn spawn_ctrl_c_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling after the current step...");
            cancel.cancel();
        }
    });
}

// ---------------------------------------------------------------------------
// cluster
// ---------------------------------------------------------------------------

async fn cmd_cluster(k: Option<usize>, out: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let k = k.unwrap_or(config.research.cluster_count);
    if k == 0 {
        return Err(eyre!("number of groups must be at least 1"));
    }

    let path = db_path(&config, db);
    if !path.exists() {
        return Err(eyre!("no knowledge database at '{}'", path.display()));
    }
    let store = Storage::open(&path).await?;

    let embedder = OpenAiEmbeddings::new(&config.openai)?;
    if !embedder.has_credential() {
        warn!(
            env_var = %config.openai.api_key_env,
            "OpenAI key not set: every item will embed as a zero vector"
        );
    }

    let spinner = CliProgress::new();
    spinner.spinner.set_message("Embedding and clustering synopses");
    let clusters = cluster_store(&store, k, &embedder).await?;
    spinner.spinner.finish_and_clear();

    let out = out.unwrap_or_else(|| PathBuf::from(&config.research.clusters_path));
    save_clusters(&clusters, &out)?;

    println!();
    for (label, texts) in &clusters {
        println!("  Group {label} ({} items)", texts.len());
        for text in texts.iter().take(3) {
            println!("    - {}", truncate(text, 100));
        }
    }
    println!();
    println!("  Clusters: {}", out.display());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// db
// ---------------------------------------------------------------------------

async fn cmd_db_init(db: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let path = db_path(&config, db);
    let store = Storage::open(&path).await?;
    println!(
        "Database ready at: {} (schema v{})",
        path.display(),
        store.schema_version().await
    );
    Ok(())
}

async fn cmd_db_show(db: Option<PathBuf>, depth: Option<u32>, runs: u32) -> Result<()> {
    let config = load_config()?;
    let path = db_path(&config, db);
    let store = Storage::open_readonly(&path).await?;

    if !store.is_current().await {
        warn!(path = %path.display(), "database schema is outdated; run `deepresearch db init`");
    }

    let items = match depth {
        Some(depth) => store.list_by_depth(depth).await?,
        None => store.scan().await?,
    };

    println!();
    println!("  Database: {}", path.display());
    println!("  Items:    {}", items.len());
    println!();
    for (id, item) in &items {
        print_item(*id, item);
    }

    let recent = store.list_runs(runs).await?;
    if !recent.is_empty() {
        println!();
        println!("  Recent runs:");
        for run in &recent {
            let status = match &run.finished_at {
                Some(at) => format!("finished {at}"),
                None => "unfinished".to_string(),
            };
            println!(
                "    {}  depth {}  {}  ({status})",
                run.id, run.max_depth, run.topic
            );
        }
    }
    println!();

    Ok(())
}

fn print_item(id: KnowledgeId, item: &KnowledgeItem) {
    let label = item
        .cluster_label
        .map(|l| format!(" [group {l}]"))
        .unwrap_or_default();
    println!("  {:>4}. (depth {}){label} {}", id.0, item.depth, truncate(&item.summary, 100));
    if !item.url.is_empty() {
        println!("        {}", item.url);
    }
}

async fn cmd_db_reset(db: Option<PathBuf>, yes: bool) -> Result<()> {
    let config = load_config()?;
    let path = db_path(&config, db);
    if !yes {
        return Err(eyre!(
            "refusing to delete knowledge in '{}' without --yes",
            path.display()
        ));
    }
    if !path.exists() {
        println!("Nothing to reset: '{}' does not exist", path.display());
        return Ok(());
    }

    let store = Storage::open(&path).await?;
    let removed = store.reset().await?;
    println!("Removed {removed} knowledge items from {}", path.display());
    Ok(())
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

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn depth_started(&self, depth: u32, max_depth: u32, queries: usize) {
        self.spinner
            .set_message(format!("Depth {depth}/{max_depth}: {queries} queries"));
    }

    fn query_started(&self, query: &str) {
        self.spinner
            .set_message(format!("Searching: {}", truncate(query, 60)));
    }

    fn item_stored(&self, id: KnowledgeId, item: &KnowledgeItem) {
        self.spinner
            .set_message(format!("Stored #{id}: {}", truncate(&item.title, 60)));
    }

    fn done(&self, _report: &ResearchReport) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

/// Cut `text` to `max` characters, marking the cut with `…`.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
