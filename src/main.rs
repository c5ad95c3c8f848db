//! news-radar binary: batch runs, offline re-ranking, and the read-only feed server.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_radar::analyze::ai_adapter::build_provider;
use news_radar::api::{self, AppState};
use news_radar::config::PipelineConfig;
use news_radar::ingest::providers::{FileSource, InputFormat, SearchSource, StaticSampleSource};
use news_radar::metrics::Metrics;
use news_radar::pipeline::{rank_file, Pipeline};

#[derive(Parser)]
#[command(name = "news-radar", version, about = "Category news radar")]
struct Cli {
    /// Pipeline config (TOML). Defaults to $NEWS_RADAR_CONFIG or config/pipeline.toml.
    #[arg(long, global = true, env = "NEWS_RADAR_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest, score, backfill, rank and publish once.
    Run {
        /// Raw input file (markdown, JSON or plain lines); repeatable.
        #[arg(long = "input")]
        inputs: Vec<PathBuf>,
        /// Input format for every `--input`; `auto` picks by extension.
        #[arg(long, value_enum, default_value_t = InputFormat::Auto)]
        format: InputFormat,
        /// Include the built-in sample headlines.
        #[arg(long)]
        sample: bool,
        /// Ask the search provider for a daily briefing.
        #[arg(long)]
        search: bool,
        /// Skip quota backfill.
        #[arg(long)]
        no_backfill: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Dedup, rank and trim an existing document.
    Rank {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long = "out")]
        output: PathBuf,
    },
    /// Serve the document over HTTP, plus /metrics.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("news_radar=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load_from(p),
        None => PipelineConfig::load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            inputs,
            format,
            sample,
            search,
            no_backfill,
            json,
        } => {
            let search_provider = search.then(|| build_provider(&cfg.search_provider()));
            let (days_back, per_category) = (cfg.search.days_back, cfg.search.per_category);

            let mut pipeline = Pipeline::from_config(cfg)?;
            if no_backfill {
                pipeline = pipeline.without_backfill();
            }
            if sample {
                pipeline = pipeline.with_source(Box::new(StaticSampleSource::new()));
            }
            for p in inputs {
                pipeline = pipeline.with_source(Box::new(FileSource::new(p).with_format(format)));
            }
            if let Some(provider) = search_provider {
                pipeline = pipeline
                    .with_source(Box::new(SearchSource::new(provider).with_window(days_back, per_category)));
            }

            let summary = pipeline.run(Utc::now()).await.context("pipeline run")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
        }
        Command::Rank { input, output } => {
            let policy = news_radar::ingest::NormalizePolicy::new(Utc::now())
                .with_default_category(cfg.normalize.default_category)
                .with_date_fallback(cfg.normalize.date_fallback);
            let doc = rank_file(&input, &output, &cfg.ranking, &policy)
                .with_context(|| format!("ranking {}", input.display()))?;
            tracing::info!(items = doc.items.len(), out = %output.display(), "document ranked");
        }
        Command::Serve { addr } => {
            let metrics = Metrics::init()?;
            let app = api::router(AppState::new(cfg.paths.document.clone()), &metrics);
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            tracing::info!(%addr, document = %cfg.paths.document.display(), "serving feed");
            axum::serve(listener, app).await.context("server")?;
        }
    }
    Ok(())
}
