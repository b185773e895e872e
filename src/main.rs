use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::{CandleWindow, Recommendation};
use kalshi_client::{CandleSource, KalshiRestClient, MarketDataSource};
use llm_client::{LlmClient, OfflineReasoning, ReasoningService};
use market_advisor::journal::{resolve_journal_dir, JournalEvent};
use market_advisor::{Advisor, AppConfig, RecommendationJournal};
use news_client::{ArticleSource, NewsApiClient, NoArticles};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "market-advisor",
    version,
    about = "BUY/NO_TRADE recommendations for Kalshi binary markets"
)]
struct Cli {
    /// TOML config; missing file means defaults.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Skip the reasoning service and news search; every reasoned step falls back.
    #[arg(long, global = true)]
    offline: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one market by ticker.
    Evaluate {
        ticker: String,

        /// Do not fetch candlestick history.
        #[arg(long)]
        no_candles: bool,

        /// Print the full recommendation as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Find markets whose title or ticker contains the query.
    Search {
        query: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.with_target(true).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(&cli.config)?;
    let kalshi = KalshiRestClient::new(config.kalshi.clone())?;

    match cli.command {
        Command::Evaluate {
            ticker,
            no_candles,
            json,
        } => evaluate(&config, &kalshi, cli.offline, &ticker, no_candles, json).await,
        Command::Search { query, limit } => search(&kalshi, &query, limit).await,
    }
}

fn reasoning_service(config: &AppConfig, offline: bool) -> Result<Arc<dyn ReasoningService>> {
    if offline {
        info!("offline mode: reasoning service disabled");
        return Ok(Arc::new(OfflineReasoning));
    }
    if !config.llm.provider.eq_ignore_ascii_case("anthropic") {
        warn!(
            "Configured provider '{}' but only Anthropic is supported",
            config.llm.provider
        );
    }
    match config.llm_api_key() {
        Some(key) => {
            let client = LlmClient::new(
                key,
                config.llm.model.clone(),
                config.llm.timeout_ms,
                config.llm.max_tokens,
            )?;
            info!(model = client.model(), "reasoning service ready");
            Ok(Arc::new(client))
        }
        None => {
            warn!(
                "{} not set; reasoned steps will fall back",
                config.llm.api_key_env
            );
            Ok(Arc::new(OfflineReasoning))
        }
    }
}

fn article_source(config: &AppConfig, offline: bool) -> Result<Arc<dyn ArticleSource>> {
    if offline {
        return Ok(Arc::new(NoArticles));
    }
    match config.news_api_key() {
        Some(key) => Ok(Arc::new(NewsApiClient::new(key, config.news.client.clone())?)),
        None => {
            warn!("{} not set; news evidence will abstain", config.news.api_key_env);
            Ok(Arc::new(NoArticles))
        }
    }
}

fn open_journal(config: &AppConfig) -> Option<RecommendationJournal> {
    if !config.journal.enabled {
        return None;
    }
    match RecommendationJournal::open(resolve_journal_dir(&config.journal)) {
        Ok(journal) => {
            info!("Recommendation journal: {}", journal.dir().display());
            Some(journal)
        }
        Err(e) => {
            warn!("journal unavailable: {}", e);
            None
        }
    }
}

async fn evaluate(
    config: &AppConfig,
    kalshi: &KalshiRestClient,
    offline: bool,
    ticker: &str,
    no_candles: bool,
    json: bool,
) -> Result<()> {
    let raw = kalshi.fetch(ticker).await?;

    let candles = if no_candles {
        None
    } else {
        match kalshi.fetch_candles(ticker, CandleWindow::default()).await {
            Ok(candles) => Some(candles),
            Err(e) => {
                warn!("candle fetch failed, evaluating without history: {}", e);
                None
            }
        }
    };

    let advisor = Advisor::new(
        reasoning_service(config, offline)?,
        article_source(config, offline)?,
        config,
    );

    let mut journal = open_journal(config);
    let evaluation_id = Uuid::new_v4();
    if let Some(j) = journal.as_mut() {
        j.record(&JournalEvent::EvaluationStart {
            evaluation_id,
            ticker,
            candles: candles.as_ref().map_or(0, Vec::len),
            offline,
        });
    }

    let rec = advisor.evaluate(&raw, candles.as_deref()).await;

    if let Some(j) = journal.as_mut() {
        j.record(&JournalEvent::recommendation(evaluation_id, ticker, &rec));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rec)?);
    } else {
        print_summary(ticker, &rec);
    }
    Ok(())
}

fn print_summary(ticker: &str, rec: &Recommendation) {
    let call = match rec.direction() {
        Some(side) => format!("BUY {}", side),
        None => rec.action().to_string(),
    };
    println!("{}: {} (confidence {:.2})", ticker, call, rec.confidence());
    println!("  {}", rec.explanation());
    println!();
    for out in rec.agents() {
        let verdict = match (out.action(), out.direction()) {
            (Some(action), Some(side)) => format!("{} {}", action, side),
            (Some(action), None) => action.to_string(),
            (None, _) => "abstain".to_string(),
        };
        println!("  {:<22} {:<10} {:.2}  {}", out.agent(), verdict, out.score(), out.reason());
    }
}

async fn search(kalshi: &KalshiRestClient, query: &str, limit: usize) -> Result<()> {
    let markets = kalshi.search(query).await?;
    if markets.is_empty() {
        println!("No markets match '{}'.", query);
        return Ok(());
    }

    for market in markets.iter().take(limit) {
        let field = |key: &str| market.get(key).and_then(Value::as_str).unwrap_or("");
        let ask = |key: &str| {
            market
                .get(key)
                .and_then(Value::as_i64)
                .map_or_else(|| "-".to_string(), |c| format!("{}¢", c))
        };
        println!(
            "{:<36} yes {:>4} / no {:>4}  {}",
            field("ticker"),
            ask("yes_ask"),
            ask("no_ask"),
            field("title")
        );
    }
    if markets.len() > limit {
        println!("... {} more", markets.len() - limit);
    }
    Ok(())
}
