use anyhow::Result;
use clap::{Parser, Subcommand};
use jurisearch_core::{FetchConfig, PageFetcher};
use jurisearch_local::{format, matcher, BlockExtractor, HttpFetcher};
use jurisearch_server::config::ServerConfig;
use jurisearch_server::http::{build_router, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "jurisearch")]
#[command(about = "Electoral jurisprudence search service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service.
    Serve(ServeCmd),
    /// Run one fetch and extract pass (optionally matching a query) and
    /// print a JSON report.
    ///
    /// Useful for checking the scraper against the live compilation page or
    /// a fixture without standing up the whole service.
    Probe(ProbeCmd),
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    /// Bind address for the HTTP service.
    #[arg(long, env = "JURISEARCH_BIND", default_value = "127.0.0.1:8787")]
    bind: String,
}

#[derive(clap::Args, Debug)]
struct ProbeCmd {
    /// Source page override (default: JURISEARCH_SOURCE_URL or the built-in
    /// compilation page).
    #[arg(long)]
    url: Option<String>,
    /// Optional query; when present the probe also runs the matcher.
    #[arg(long)]
    query: Option<String>,
    /// Include full body text in match output.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = false)]
    full: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` autoload, with an opt-out so contract tests stay hermetic.
    if std::env::var("JURISEARCH_DOTENV").map(|v| v != "0").unwrap_or(true) {
        let _ = dotenvy::dotenv();
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Probe(args) => probe(args).await,
    }
}

async fn serve(args: ServeCmd) -> Result<()> {
    let cfg = ServerConfig::from_env();
    let state = AppState::new(&cfg)?;
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(bind = %args.bind, source = %cfg.fetch.source_url, "jurisearch listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn probe(args: ProbeCmd) -> Result<()> {
    let cfg = ServerConfig::from_env();
    let fetch = FetchConfig {
        source_url: args.url.unwrap_or(cfg.fetch.source_url.clone()),
        ..cfg.fetch
    };
    let fetcher = HttpFetcher::new(fetch)?;
    let source_url = fetcher.config().source_url.clone();
    let extractor = BlockExtractor::new(cfg.extract);

    let html = fetcher.fetch_page(&source_url).await?;
    let blocks = extractor.extract(&html)?;
    let keys: Vec<&str> = blocks.iter().filter_map(|b| b.key.as_deref()).collect();

    let report = match args.query.as_deref() {
        Some(q) => {
            let outcome = matcher::search_outcome(&blocks, q, args.full, &cfg.matching);
            serde_json::json!({
                "source_url": source_url,
                "blocks": blocks.len(),
                "keys": keys,
                "query": q,
                "result": outcome.to_body(|m| format::format_match(m, &source_url)),
            })
        }
        None => serde_json::json!({
            "source_url": source_url,
            "blocks": blocks.len(),
            "keys": keys,
        }),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
