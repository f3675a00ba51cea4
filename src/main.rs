//! One-Shield Flowstream
//!
//! Runs the batch producer, directory watcher and event relay, alone or
//! together, as selected by `MODE`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oneshield_flowstream::config::{Config, Mode};
use oneshield_flowstream::model;
use oneshield_flowstream::producer;
use oneshield_flowstream::relay::{self, AppState, Broker};
use oneshield_flowstream::watcher::{BrokerSink, HttpForwarder, RecordSink, Watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "oneshield_flowstream=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!("One-Shield Flowstream starting ({:?} mode, {})...", config.mode, config.environment);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("[STOP] shutdown requested");
                cancel.cancel();
            }
        }
    });

    match config.mode {
        Mode::Relay => {
            let broker = Broker::new(config.dispatch_mode, config.queue_high_water);
            let listener = bind(&config).await?;
            relay::serve(listener, AppState::new(broker), cancel).await?;
        }
        Mode::Watch => {
            let sink = HttpForwarder::new(config.relay_url.clone(), config.forward_timeout)?;
            tracing::info!("Forwarding to {}", sink.url());
            watcher(&config, Box::new(sink)).run(cancel).await?;
        }
        Mode::Produce => {
            produce(&config, &cancel).await?;
        }
        Mode::Pipeline => run_pipeline(&config, cancel).await?,
    }

    Ok(())
}

async fn bind(config: &Config) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay on {addr}"))
}

fn watcher(config: &Config, sink: Box<dyn RecordSink>) -> Watcher {
    let classifier = model::load_optional(config.model_path.as_deref());
    Watcher::new(config.watcher_config(), sink).with_classifier(classifier)
}

async fn produce(config: &Config, cancel: &CancellationToken) -> anyhow::Result<()> {
    let report = producer::simulate_stream_until(
        &config.source_path,
        &config.watch_dir,
        &config.stream_options(),
        cancel,
    )
    .await
    .with_context(|| format!("failed to stream {}", config.source_path.display()))?;

    tracing::info!(
        batches = report.batches.len(),
        rows = report.total_rows,
        cancelled = report.cancelled,
        "Producer finished"
    );
    Ok(())
}

/// Producer, watcher and relay in one process; the watcher feeds the broker directly
async fn run_pipeline(config: &Config, cancel: CancellationToken) -> anyhow::Result<()> {
    let broker = Broker::new(config.dispatch_mode, config.queue_high_water);
    let listener = bind(config).await?;

    let relay = tokio::spawn(relay::serve(
        listener,
        AppState::new(Arc::clone(&broker)),
        cancel.clone(),
    ));

    let mut watcher = watcher(config, Box::new(BrokerSink::new(broker)));
    let watch = tokio::spawn({
        let cancel = cancel.clone();
        async move { watcher.run(cancel).await }
    });

    // Producer is one-shot; watcher and relay keep serving until shutdown
    if let Err(e) = produce(config, &cancel).await {
        cancel.cancel();
        let _ = watch.await;
        let _ = relay.await;
        return Err(e);
    }

    watch.await??;
    relay.await??;
    Ok(())
}
