//! adless CLI
//!
//! Compiles block-lists, checks single references and runs documents through
//! the rewrite pipeline.

mod bench;
mod config;
mod fetch;
mod lists;
mod refresh;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use adless_compiler::Compilation;
use adless_core::{MatchContext, Matcher, Origin, ResourceType, RuleStore};
use adless_rewrite::{Document, Pipeline};

use crate::config::Config;
use crate::fetch::Fetcher;
use crate::refresh::Refresher;

#[derive(Parser)]
#[command(name = "adless")]
#[command(version, about = "adless content proxy pipeline tools")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile block-lists and print the report
    Compile {
        /// Block-list files or URLs (default: configured sources)
        #[arg(short = 'i', long = "list")]
        lists: Vec<String>,
    },

    /// Match one reference against the compiled rules
    Check {
        #[arg(short = 'i', long = "list")]
        lists: Vec<String>,

        /// Absolute reference URL
        #[arg(long)]
        url: String,

        /// Element scope (script, image, stylesheet, subdocument, ...)
        #[arg(long, default_value = "other")]
        scope: String,

        /// URL of the document containing the reference (default: --url)
        #[arg(long)]
        document: Option<String>,
    },

    /// Fetch or read a document and run it through the pipeline
    Rewrite {
        /// Requested document URL
        #[arg(long)]
        url: String,

        #[arg(short = 'i', long = "list")]
        lists: Vec<String>,

        /// Read the document from a file instead of fetching it
        #[arg(long)]
        input: Option<PathBuf>,

        /// Content type of --input (default: text/html)
        #[arg(long)]
        content_type: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Document fetch timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        #[arg(long)]
        no_base: bool,

        #[arg(long)]
        no_cosmetic: bool,

        #[arg(long)]
        no_signatures: bool,
    },

    /// Measure pipeline latency on a local document
    Bench {
        #[arg(short = 'i', long = "list")]
        lists: Vec<String>,

        /// Document file
        #[arg(long)]
        input: PathBuf,

        /// URL the document is served from
        #[arg(long, default_value = "https://example.com/")]
        url: String,

        #[arg(long, default_value_t = 1000)]
        iterations: usize,
    },

    /// Keep the rule set compiled, refreshing on an interval until Ctrl-C
    Watch {
        #[arg(short = 'i', long = "list")]
        lists: Vec<String>,

        /// Refresh interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match Config::load(cli.config.as_deref()) {
        Ok(config) => run(cli.command, config, cli.verbose).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run(command: Commands, config: Config, verbose: bool) -> Result<(), String> {
    let fetcher = Fetcher::new(&config.fetch.user_agent).map_err(|e| e.to_string())?;

    match command {
        Commands::Compile { lists } => cmd_compile(&config, &fetcher, lists, verbose).await,
        Commands::Check {
            lists,
            url,
            scope,
            document,
        } => cmd_check(&config, &fetcher, lists, &url, &scope, document.as_deref()).await,
        Commands::Rewrite {
            url,
            lists,
            input,
            content_type,
            output,
            timeout_ms,
            no_base,
            no_cosmetic,
            no_signatures,
        } => {
            let mut config = config;
            if let Some(timeout_ms) = timeout_ms {
                config.fetch.document_timeout_ms = timeout_ms;
            }
            config.rewrite.inject_base &= !no_base;
            config.rewrite.cosmetic_filters &= !no_cosmetic;
            config.rewrite.builtin_signatures &= !no_signatures;
            let target = RewriteTarget {
                url: &url,
                input: input.as_deref(),
                content_type: content_type.as_deref(),
                output: output.as_deref(),
            };
            cmd_rewrite(&config, &fetcher, lists, target).await
        }
        Commands::Bench {
            lists,
            input,
            url,
            iterations,
        } => cmd_bench(&config, &fetcher, lists, &input, &url, iterations).await,
        Commands::Watch { lists, interval } => cmd_watch(&config, fetcher, lists, interval).await,
    }
}

fn sources(config: &Config, lists: Vec<String>) -> Vec<String> {
    if lists.is_empty() {
        config.rules.sources.clone()
    } else {
        lists
    }
}

async fn load_rules(config: &Config, fetcher: &Fetcher, sources: &[String], verbose: bool) -> Result<Compilation, String> {
    let loaded = lists::load_sources(sources, fetcher, config.fetch.rule_list_timeout()).await?;
    lists::compile_loaded(&loaded, verbose)
}

async fn cmd_compile(config: &Config, fetcher: &Fetcher, lists: Vec<String>, verbose: bool) -> Result<(), String> {
    let sources = sources(config, lists);
    let start = Instant::now();
    let compilation = load_rules(config, fetcher, &sources, verbose).await?;
    let total_time = start.elapsed();

    let report = &compilation.report;
    let index = compilation.rule_set.index();

    println!("Compiled {} block-list(s)", sources.len());
    println!("  Lines:     {}", report.lines);
    println!("  Rules:     {} network, {} cosmetic", report.rules, report.cosmetic);
    println!(
        "  Removed:   {} duplicates, {} by badfilter",
        report.deduped, report.badfiltered
    );
    println!("  Skipped:   {} unsupported", report.skipped);
    println!("  Malformed: {}", report.malformed.len());
    println!(
        "  Index:     {} hosts, {} tokens, {} unindexed",
        index.host_keys(),
        index.token_keys(),
        index.unindexed_len()
    );
    println!("  Time:      {:.1}ms", total_time.as_secs_f64() * 1000.0);

    if verbose {
        for malformed in &report.malformed {
            println!("  ! {}", malformed);
        }
    }

    Ok(())
}

async fn cmd_check(
    config: &Config,
    fetcher: &Fetcher,
    lists: Vec<String>,
    url: &str,
    scope: &str,
    document: Option<&str>,
) -> Result<(), String> {
    let scope = ResourceType::from_option_name(scope).ok_or_else(|| format!("Unknown scope '{}'", scope))?;
    let reference = Origin::parse(url).map_err(|e| e.to_string())?;
    let document = Origin::parse(document.unwrap_or(url)).map_err(|e| e.to_string())?;

    let compilation = load_rules(config, fetcher, &sources(config, lists), false).await?;
    let matcher = Matcher::new(&compilation.rule_set).with_signatures(config.rewrite.builtin_signatures);

    let ctx = MatchContext {
        url: reference.document_url(),
        scope,
        document_host: document.host(),
    };
    let result = matcher.match_reference(&ctx);

    println!("URL:      {}", ctx.url);
    println!("Document: {}", document.document_url());
    println!("Decision: {:?}", result.decision);
    println!("Source:   {:?}", result.source);
    if let Some(rule) = result.rule_id.and_then(|id| compilation.rule_set.rule(id)) {
        println!("Rule:     {} (list {})", rule.raw, rule.list_id);
    }

    if scope.contains(ResourceType::DOCUMENT) {
        println!("Exempt:   {}", matcher.is_document_exempt(document.document_url()));
        for directive in matcher.csp_directives(document.document_url()) {
            println!("CSP:      {}", directive);
        }
    }

    Ok(())
}

struct RewriteTarget<'a> {
    url: &'a str,
    input: Option<&'a Path>,
    content_type: Option<&'a str>,
    output: Option<&'a Path>,
}

async fn cmd_rewrite(config: &Config, fetcher: &Fetcher, lists: Vec<String>, target: RewriteTarget<'_>) -> Result<(), String> {
    // reject a bad URL before anything is fetched
    let origin = Origin::parse(target.url).map_err(|e| e.to_string())?;

    let compilation = load_rules(config, fetcher, &sources(config, lists), false).await?;

    let (bytes, content_type) = match target.input {
        Some(path) => {
            let bytes = fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            let content_type = target.content_type.unwrap_or("text/html").to_string();
            (bytes, Some(content_type))
        }
        None => {
            let fetched = fetcher
                .fetch(origin.document_url(), config.fetch.document_timeout())
                .await
                .map_err(|e| e.to_string())?;
            (fetched.bytes, fetched.content_type)
        }
    };

    let pipeline = Pipeline::new(config.rewrite);
    let document = Document::new(&bytes, content_type.as_deref());
    let output = pipeline
        .run_or_passthrough(&compilation.rule_set, target.url, &document)
        .map_err(|e| e.to_string())?;

    if output.passthrough {
        tracing::info!(url = target.url, "document is not markup, passed through unmodified");
    } else {
        tracing::info!(
            url = target.url,
            resolved = output.stats.resolved,
            blocked = output.stats.blocked,
            redirected = output.stats.redirected,
            hidden = output.stats.hidden_by_signature,
            "document rewritten"
        );
    }

    if let Some(csp) = output.csp.header_value() {
        eprintln!("Content-Security-Policy: {}", csp);
    }

    match target.output {
        Some(path) => fs::write(path, &output.body).map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?,
        None => std::io::stdout()
            .write_all(&output.body)
            .map_err(|e| format!("Failed to write output: {}", e))?,
    }

    Ok(())
}

async fn cmd_bench(
    config: &Config,
    fetcher: &Fetcher,
    lists: Vec<String>,
    input: &Path,
    url: &str,
    iterations: usize,
) -> Result<(), String> {
    let html = fs::read(input).map_err(|e| format!("Failed to read '{}': {}", input.display(), e))?;
    let compilation = load_rules(config, fetcher, &sources(config, lists), false).await?;
    let pipeline = Pipeline::new(config.rewrite);

    let opts = bench::BenchOptions {
        url,
        iterations: iterations.max(1),
        warmup: (iterations / 10).clamp(1, 100),
    };
    bench::run(&pipeline, &compilation.rule_set, &html, &opts)
}

async fn cmd_watch(config: &Config, fetcher: Fetcher, lists: Vec<String>, interval: Option<u64>) -> Result<(), String> {
    let sources = sources(config, lists);
    let compilation = load_rules(config, &fetcher, &sources, false).await?;
    tracing::info!(
        rules = compilation.report.rules,
        cosmetic = compilation.report.cosmetic,
        "initial rule set compiled"
    );

    let store = Arc::new(RuleStore::new(compilation.rule_set));
    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.rules.refresh_interval());

    let handle = Refresher::new(Arc::clone(&store), sources, fetcher, config.fetch.rule_list_timeout()).spawn(interval);
    tracing::info!(interval_secs = interval.as_secs(), "watching block-lists, Ctrl-C to stop");

    let stopped = tokio::signal::ctrl_c().await;
    handle.abort();
    stopped.map_err(|e| format!("Failed to wait for Ctrl-C: {}", e))?;

    println!("Stopped after {} refresh(es)", store.generation());
    Ok(())
}
