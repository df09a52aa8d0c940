//! Analytics engine entrypoint: wires the application context, starts
//! the scheduler and the event consumer loop, and shuts down cleanly on
//! ctrl-c.

use restock_analytics::{tasks, AppContext};
use restock_core::{Config, Scheduler};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the consumer polls the event streams between batches.
const CONSUMER_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restock_analytics=info,restock_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    info!(environment = %config.app.environment, "starting analytics engine");

    let ctx = AppContext::initialize(config).await?;

    let mut scheduler = Scheduler::new(
        Arc::clone(&ctx.task_store),
        Arc::clone(&ctx.clock),
        ctx.config.scheduler.clone(),
    );
    tasks::register_all(
        &mut scheduler,
        Arc::clone(&ctx.calculator),
        Arc::clone(&ctx.analyzer),
        Arc::clone(&ctx.engine),
        Arc::clone(&ctx.repo),
        ctx.inventory_api(),
        Arc::clone(&ctx.client),
        Arc::clone(&ctx.clock),
        ctx.config.analytics.clone(),
    );
    let scheduler_handle = scheduler.start().await?;

    // Consumer loop: drain the order and payment streams on a short
    // interval. Shutdown finishes the in-flight batch before stopping.
    let consumer = Arc::clone(&ctx.consumer);
    let (consumer_stop_tx, mut consumer_stop_rx) = tokio::sync::oneshot::channel::<()>();
    let consumer_loop = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CONSUMER_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = &mut consumer_stop_rx => {
                    info!("event consumer stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = consumer.consume_orders().await {
                        error!(error = %e, "order stream consumption failed");
                    }
                    if let Err(e) = consumer.consume_payments().await {
                        error!(error = %e, "payment stream consumption failed");
                    }
                }
            }
        }
    });

    info!("analytics engine running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = consumer_stop_tx.send(());
    let _ = consumer_loop.await;
    scheduler_handle.shutdown().await;

    info!("analytics engine stopped");
    Ok(())
}
