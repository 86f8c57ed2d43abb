//! automatic-messaging service.
//!
//! Main entry point: loads configuration from the environment, connects the
//! store and the optional sent cache, wires the dispatch engine, and serves
//! the operator control plane until shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use messaging_api::{AppState, Config};
use messaging_core::{
    storage::postgres::ensure_schema, MessageStore, PostgresMessageStore, RealClock,
};
use messaging_dispatch::{
    Dispatcher, NoopSentCache, RedisSentCache, Scheduler, SentCache, StoreOutcomes, TickFn,
    WebhookClient,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, error, info};

/// Startup deadline for the database connectivity probe.
const DB_PING_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::load()?;
    info!(
        postgres_url = %config.postgres_url_masked(),
        webhook_url = %config.webhook_url,
        server_address = %config.server_address,
        interval_secs = config.sched_interval_seconds,
        batch_size = config.sched_batch_size,
        content_max = config.content_max,
        cache_enabled = config.redis_config().is_some(),
        "configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(DB_PING_DEADLINE)
        .connect(&config.postgres_url)
        .await
        .context("failed to create database connection pool")?;

    let store = PostgresMessageStore::new(pool.clone());
    store.ping(DB_PING_DEADLINE).await.context("database connectivity check failed")?;
    ensure_schema(&pool).await.context("failed to ensure database schema")?;
    info!("database connected");

    let cache: Arc<dyn SentCache> = match config.redis_config() {
        Some(cache_config) => Arc::new(
            RedisSentCache::connect(&cache_config)
                .await
                .context("failed to connect sent cache")?,
        ),
        None => {
            info!("sent cache disabled");
            Arc::new(NoopSentCache)
        },
    };

    let store: Arc<dyn MessageStore> = Arc::new(store);
    let client =
        WebhookClient::new(config.to_webhook_config()).context("failed to build webhook client")?;
    let outcomes = Arc::new(StoreOutcomes::new(store.clone(), cache, Arc::new(RealClock)));
    let dispatcher = Arc::new(Dispatcher::new(client, outcomes, config.content_max()));

    let tick = dispatch_tick(dispatcher, store.clone(), config.sched_batch_size);
    let scheduler = Arc::new(
        Scheduler::new(config.interval(), tick).context("failed to create scheduler")?,
    );
    scheduler.start().await;
    info!("dispatch scheduler started");

    let addr = config.server_addr()?;
    let state = AppState::new(scheduler.clone(), store);
    messaging_api::start_server(state, addr).await.context("control plane server failed")?;

    // The server only returns after a shutdown signal; stop the engine
    // before tearing down connections so the in-flight tick can finish.
    scheduler.stop().await;
    pool.close().await;
    info!("shutdown complete");

    Ok(())
}

/// Builds the tick function: claim one batch, dispatch it, log the counts.
fn dispatch_tick(
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn MessageStore>,
    batch_size: i64,
) -> TickFn {
    Arc::new(move |cancel| {
        let dispatcher = dispatcher.clone();
        let store = store.clone();
        Box::pin(async move {
            let messages = match store.claim_pending(batch_size).await {
                Ok(messages) => messages,
                Err(claim_error) => {
                    error!(error = %claim_error, "claim failed, aborting tick");
                    return;
                },
            };

            if messages.is_empty() {
                debug!("no pending messages");
                return;
            }

            let stats = dispatcher.process_batch(messages, &cancel).await;
            info!(sent = stats.sent, failed = stats.failed, "dispatch tick finished");
        })
    })
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,messaging=debug"))
        .expect("invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
