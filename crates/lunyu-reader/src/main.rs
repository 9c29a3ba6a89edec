use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use lunyu_annotate::{Annotator, Identifier};
use lunyu_db::Corpus;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

use lunyu_reader::paraphrase::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use lunyu_reader::rate_limit::{DEFAULT_CLIENT_HEADER, RateLimiterLayer};
use lunyu_reader::{AppState, FlatIndex, GeminiClient, Paraphraser, RetryPolicy, router};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_MAX_PAGE_SIZE: usize = 200;
const DEFAULT_RATE_LIMIT_RPS: u32 = 1;
const DEFAULT_RATE_LIMIT_BURST: u32 = 5;
const DEFAULT_AI_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = load_config();
    info!("binding to {}:{}", config.host, config.port);
    info!("using corpus at {}", config.data_dir.display());
    if config.disable_cache {
        info!("cache headers disabled");
    }
    info!(
        "AI rate limit: {} req/s (burst {}), keyed by {}",
        config.rate_limit_rps, config.rate_limit_burst, config.client_header
    );

    let start = Instant::now();
    let corpus = Corpus::load(&config.data_dir)
        .with_context(|| format!("loading corpus from {}", config.data_dir.display()))?;
    info!("corpus loaded in {} ms", start.elapsed().as_millis());

    let index_start = Instant::now();
    let Corpus {
        rare_words,
        phrases,
        entities,
        chapters,
        history,
    } = corpus;
    let annotator = Annotator::new(rare_words, phrases).context("compiling dictionary patterns")?;
    info!("compiled {} dictionary patterns", annotator.patterns().keys().len());
    let identifier = Identifier::new(&entities);
    let index = FlatIndex::build(&chapters, &history, &annotator, &identifier);
    info!(
        "indexed {} verses and {} timeline entries in {} ms",
        index.len(),
        index.timeline().len(),
        index_start.elapsed().as_millis()
    );

    let client = GeminiClient::new(config.api_key.clone(), config.ai_endpoint.clone(), config.ai_model.clone());
    if client.is_configured() {
        info!("AI model {} at {}", config.ai_model, config.ai_endpoint);
    } else {
        warn!("GEMINI_API_KEY not set, AI routes will answer 502");
    }
    let policy = RetryPolicy {
        max_attempts: config.ai_max_attempts,
        ..RetryPolicy::default()
    };
    let paraphraser = Paraphraser::new(Arc::new(client), policy, config.ai_timeout);

    let state = AppState {
        index: Arc::new(index),
        entities: Arc::from(entities),
        paraphraser,
        max_page_size: config.max_page_size,
        disable_cache: config.disable_cache,
    };

    let ai_limiter = RateLimiterLayer::new(config.rate_limit_rps, config.rate_limit_burst)
        .with_client_header(&config.client_header);
    let app = router(state, ai_limiter).layer(TraceLayer::new_for_http());
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

#[derive(Debug, Clone)]
struct Config {
    host: String,
    port: u16,
    data_dir: PathBuf,
    disable_cache: bool,
    max_page_size: usize,
    rate_limit_rps: u32,
    rate_limit_burst: u32,
    client_header: String,
    api_key: Option<String>,
    ai_model: String,
    ai_endpoint: String,
    ai_max_attempts: u32,
    ai_timeout: Duration,
}

fn load_config() -> Config {
    let mut disable_cache = false;
    let mut cli_data_dir: Option<PathBuf> = None;
    let mut args = env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--no-cache" => disable_cache = true,
            "--data-dir" => {
                if let Some(path) = args.next() {
                    cli_data_dir = Some(PathBuf::from(path));
                }
            }
            _ => {
                if let Some(path) = arg.strip_prefix("--data-dir=") {
                    cli_data_dir = Some(PathBuf::from(path));
                } else {
                    warn!("ignoring unknown argument {arg}");
                }
            }
        }
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let data_dir = cli_data_dir
        .or_else(|| env::var("DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let max_page_size = positive_env("MAX_PAGE_SIZE").unwrap_or(DEFAULT_MAX_PAGE_SIZE);
    let rate_limit_rps = positive_env("RATE_LIMIT_RPS").unwrap_or(DEFAULT_RATE_LIMIT_RPS);
    let rate_limit_burst = positive_env("RATE_LIMIT_BURST").unwrap_or(DEFAULT_RATE_LIMIT_BURST);
    let client_header = env::var("RATE_LIMIT_CLIENT_HEADER")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_HEADER.to_string());
    let api_key = env::var("GEMINI_API_KEY").ok();
    let ai_model = env::var("AI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let ai_endpoint = env::var("AI_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let ai_max_attempts = positive_env("AI_MAX_ATTEMPTS").unwrap_or(DEFAULT_AI_MAX_ATTEMPTS);
    let ai_timeout = Duration::from_secs(
        positive_env("AI_TIMEOUT_SECS").unwrap_or(DEFAULT_AI_TIMEOUT_SECS),
    );

    Config {
        host,
        port,
        data_dir,
        disable_cache,
        max_page_size,
        rate_limit_rps,
        rate_limit_burst,
        client_header,
        api_key,
        ai_model,
        ai_endpoint,
        ai_max_attempts,
        ai_timeout,
    }
}

fn positive_env<T>(name: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let max_level = env_filter
        .max_level_hint()
        .and_then(|hint| hint.into_level())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_max_level(max_level)
        .init();
}
