use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

mod app;
mod http;
mod lock_guard;
mod locale;
mod notify;
mod proactive;
mod reply;
mod trigger;

use gryag_admission::{QuotaTracker, RateLimiter};
use gryag_agent::anthropic::AnthropicClient;
use gryag_agent::openai::GenericProvider;
use gryag_agent::{AgentRuntime, LlmProvider};
use gryag_core::Config;
use gryag_jobs::JobLock;
use gryag_persistence::Repository;
use lock_guard::RateLimiterHandle;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gryag_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("GRYAG_CONFIG").ok();
    let config = Config::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        Config::default()
    });

    let repository = Arc::new(Repository::new(&config.database.path, config.database.pool_size)?);
    let limiter = Arc::new(RateLimiterHandle(
        RateLimiter::connect(
            &config.database.redis_url,
            config.admission.chat_per_minute,
            config.admission.user_per_minute,
            config.admission.lock_ttl_secs,
        )
        .await?,
    ));
    let quotas = QuotaTracker::connect(&config.database.redis_url).await?;
    let job_lock = Arc::new(JobLock::connect(&config.database.redis_url).await?);

    let provider: Box<dyn LlmProvider> = build_provider(&config);
    let agent = Arc::new(AgentRuntime::new(provider, config.agent.model.clone()));

    let admins = std::env::var("GRYAG_ADMIN_IDS")
        .ok()
        .map(|raw| raw.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();

    let state = Arc::new(app::AppState::new(
        config.clone(),
        Arc::clone(&repository),
        Arc::clone(&limiter),
        quotas,
        Arc::clone(&agent),
        Arc::clone(&job_lock),
        admins,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_background_jobs(&config, &state, &repository, &agent, &job_lock, shutdown_rx.clone());

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let router = app::build_router(Arc::clone(&state));

    info!("gryag gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await;
    let _ = shutdown_tx.send(true);
    result?;

    Ok(())
}

/// Picks the LLM client from `agent.base_url`: Anthropic's own API by
/// default, any other host treated as an OpenAI-compatible endpoint
/// (spec.md §1's "any provider behind the same chat-completion contract").
fn build_provider(config: &Config) -> Box<dyn LlmProvider> {
    if config.agent.base_url.contains("anthropic.com") {
        Box::new(AnthropicClient::new(config.agent.api_key.clone(), Some(config.agent.base_url.clone())))
    } else {
        Box::new(GenericProvider::new(config.agent.api_key.clone(), Some(config.agent.base_url.clone())))
    }
}

fn spawn_background_jobs(
    config: &Config,
    state: &Arc<app::AppState>,
    repository: &Arc<Repository>,
    agent: &Arc<AgentRuntime>,
    job_lock: &Arc<JobLock>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let clock = Arc::clone(&state.clock);

    tokio::spawn(gryag_jobs::summarizer::run(
        Duration::from_secs(3_600),
        Arc::clone(repository),
        Arc::clone(agent),
        Arc::clone(job_lock),
        Arc::clone(&clock),
        shutdown_rx.clone(),
    ));
    tokio::spawn(gryag_jobs::memory_extractor::run(
        Duration::from_secs(24 * 3_600),
        Arc::clone(repository),
        Arc::clone(agent),
        Arc::clone(job_lock),
        Arc::clone(&clock),
        shutdown_rx.clone(),
    ));
    tokio::spawn(gryag_jobs::media_sweeper::run(
        Duration::from_secs(600),
        Arc::clone(repository),
        Arc::clone(job_lock),
        clock,
        shutdown_rx.clone(),
    ));

    if config.features.proactive_messaging {
        tokio::spawn(proactive::run(Arc::clone(state), Arc::clone(job_lock), shutdown_rx));
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
