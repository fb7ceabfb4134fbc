//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use magicpage_core::{Orchestrator, PipelineConfig, ProgressReporter};
use magicpage_crawler::{RenderedFetcher, StaticCrawler};
use magicpage_llm::{ChatModel, OpenAiChat};
use magicpage_shared::{
    AppConfig, CrawlOptions, FetchMethod, OrchestrationEnvelope, RenderOptions, init_config,
    load_config, normalize_seed_url, resolve_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Magic Page: turn a business website into chatbot-ready content.
#[derive(Parser)]
#[command(
    name = "magicpage",
    version,
    about = "Scrape a website into highlights and a knowledge-base document.",
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
    /// Scrape a website and print the result envelope as JSON.
    Scrape(ScrapeArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct ScrapeArgs {
    /// Website URL; `http://` is assumed when no scheme is given.
    pub url: String,

    /// Maximum pages fetched by the static crawl.
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Maximum link depth from the seed URL.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Skip the model calls and use the raw formatting.
    #[arg(long)]
    pub no_llm: bool,

    /// Never fall back to the headless browser.
    #[arg(long)]
    pub no_render: bool,

    /// Chat model to use instead of the configured one.
    #[arg(long)]
    pub model: Option<String>,

    /// Pretty-print the JSON envelope.
    #[arg(long)]
    pub pretty: bool,
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

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout only
/// carries the envelope.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "magicpage=info",
        1 => "magicpage=debug",
        _ => "magicpage=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Scrape(args) => cmd_scrape(args).await,
        Command::Config { action } => {
            match action {
                ConfigAction::Init => cmd_config_init()?,
                ConfigAction::Show => cmd_config_show()?,
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_scrape(args: ScrapeArgs) -> Result<ExitCode> {
    let mut config = load_config()?;
    apply_overrides(&mut config, &args);

    let seed = normalize_seed_url(&args.url)?;

    let crawler = StaticCrawler::new(CrawlOptions::from(&config))?;
    let renderer = config.render.enabled.then(|| {
        RenderedFetcher::chrome(
            RenderOptions::from(&config),
            config.render.chrome_path.as_deref().map(PathBuf::from),
        )
    });
    let model = build_model(&config)?;

    info!(
        url = %seed,
        max_pages = config.crawl.max_pages,
        max_depth = config.crawl.max_depth,
        render = config.render.enabled,
        llm = model.is_some(),
        "scraping website"
    );

    let orchestrator = Orchestrator::new(crawler, renderer, model, PipelineConfig::from(&config));
    let reporter = CliProgress::new()?;
    let envelope = orchestrator.run(&seed, &reporter).await;

    let json = if args.pretty {
        serde_json::to_string_pretty(&envelope)
    } else {
        serde_json::to_string(&envelope)
    }
    .wrap_err("failed to serialize result")?;
    println!("{json}");

    Ok(if envelope.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn apply_overrides(config: &mut AppConfig, args: &ScrapeArgs) {
    if let Some(max_pages) = args.max_pages {
        config.crawl.max_pages = max_pages;
    }
    if let Some(max_depth) = args.max_depth {
        config.crawl.max_depth = max_depth;
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if args.no_llm {
        config.llm.enabled = false;
    }
    if args.no_render {
        config.render.enabled = false;
    }
}

/// The chat model, or `None` when disabled or the API key is missing.
fn build_model(config: &AppConfig) -> Result<Option<Arc<dyn ChatModel>>> {
    if !config.llm.enabled {
        return Ok(None);
    }
    let Some(api_key) = resolve_api_key(config) else {
        warn!(
            env = %config.llm.api_key_env,
            "API key not set, using raw formatting"
        );
        return Ok(None);
    };
    let client: Arc<dyn ChatModel> = Arc::new(OpenAiChat::from_config(&config.llm, api_key)?);
    Ok(Some(client))
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner on stderr.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn fetched(&self, method: FetchMethod, pages: usize) {
        self.spinner
            .set_message(format!("{method} fetch returned {pages} page(s)"));
    }

    fn done(&self, _envelope: &OrchestrationEnvelope) {
        self.spinner.finish_and_clear();
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
