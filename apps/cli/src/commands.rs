//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use sitescribe_core::{
    DocumentConfig, DocumentRun, ProgressReporter, run_document_pipeline,
};
use sitescribe_crawler::CrawlOptions;
use sitescribe_engine::{BridgeBackend, RetryPolicy};
use sitescribe_shared::{
    AppConfig, config_file_path, init_config, load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteScribe — generate long-form documents from websites.
#[derive(Parser)]
#[command(
    name = "sitescribe",
    version,
    about = "Crawl a website, index its content, and generate a long-form document from it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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
    /// Crawl a site and generate a document from it.
    Generate {
        /// Target site homepage URL.
        url: String,

        /// Site/company display name.
        #[arg(short, long)]
        name: String,

        /// Optional topic hint; without one the pipeline picks a topic.
        #[arg(short, long)]
        topic: Option<String>,

        /// Maximum pages to crawl (overrides config).
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output language (overrides config).
        #[arg(long)]
        language: Option<String>,

        /// Write the document here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Create a default config file.
    Init,
    /// Print the effective configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitescribe=info",
        1 => "sitescribe=debug",
        _ => "sitescribe=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
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
        Command::Generate {
            url,
            name,
            topic,
            limit,
            language,
            out,
        } => {
            cmd_generate(
                &url,
                &name,
                topic.as_deref(),
                limit,
                language.as_deref(),
                out.as_deref(),
            )
            .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

async fn cmd_generate(
    url: &str,
    name: &str,
    topic: Option<&str>,
    limit: Option<usize>,
    language: Option<&str>,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let config = load_config()?;
    validate_api_key(&config)?;

    let url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;

    let output_root = expand_home(&config.defaults.output_dir);
    let document_config = DocumentConfig {
        url,
        name: name.to_string(),
        topic_hint: topic.map(str::to_string),
        language: language
            .map(str::to_string)
            .unwrap_or_else(|| config.defaults.language.clone()),
        output_root,
        crawl: CrawlOptions {
            limit: limit.unwrap_or(config.defaults.crawl_limit),
            concurrency: config.defaults.crawl_concurrency,
            timeout: Duration::from_secs(config.defaults.fetch_timeout_secs),
        },
        index_max_results: 6,
        retry: RetryPolicy {
            max_attempts: config.backend.max_attempts,
            base_delay: Duration::from_millis(config.backend.retry_base_ms),
        },
        servers: config.servers.clone(),
    };

    info!(url = %document_config.url, name, "starting generation");

    let backend = BridgeBackend::spawn(&config.backend).await?;
    let reporter = CliProgress::new();
    let result = run_document_pipeline(&document_config, &backend, &reporter).await;
    backend.shutdown().await?;
    let run = result?;

    match out {
        Some(path) => {
            std::fs::write(path, &run.document)?;
            println!();
            println!("  Document written to {}", path.display());
        }
        None => {
            println!();
            println!("{}", run.document);
            println!();
        }
    }

    println!("  Pages indexed:  {}", run.page_count);
    println!("  Content store:  {}", run.store_id);
    println!(
        "  Servers:        {}/{} connected{}",
        run.servers_connected,
        run.servers_configured,
        if run.degraded() { " (reduced capabilities)" } else { "" }
    );
    println!("  Time:           {:.1}s", run.elapsed.as_secs_f64());
    println!();

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Created config at {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let path = config_file_path()?;
    let config: AppConfig = load_config()?;
    println!("# {}", path.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
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
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &DocumentRun) {
        self.spinner.finish_and_clear();
    }
}
