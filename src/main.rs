//! Binary entry point: resolves configuration, wires the state engine to
//! every ingestion/analytic loop, and serves the read API.

use anyhow::Result;
use axum::Router;
use clap::Parser;
use kalshi_signal_engine::alerts::{AlertDispatcher, AlertEngine, SinkShape, WebhookSink};
use kalshi_signal_engine::api::{self, ApiState};
use kalshi_signal_engine::auth::KalshiSigner;
use kalshi_signal_engine::config::{Cli, Config};
use kalshi_signal_engine::ingestion::{RestPoller, StreamHandler};
use kalshi_signal_engine::middleware::logging::request_logging_simple;
use kalshi_signal_engine::signals::SignalProcessor;
use kalshi_signal_engine::state::StateEngine;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DISCOVERY_CATEGORY: &str = "";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    init_tracing(&config.log_level);

    info!(bind_addr = %config.bind_addr, "starting kalshi-signal-engine");

    let signer = match (&config.api_key_id, &config.private_key_path) {
        (Some(key_id), Some(path)) => Some(KalshiSigner::from_pem_file(key_id.clone(), path)?),
        _ => None,
    };

    let state = StateEngine::new(config.trade_ring_capacity, config.snapshot_ring_capacity);
    let cancel = CancellationToken::new();

    let rest_poller = Arc::new(RestPoller::new(config.clone(), signer, state.clone()));
    let stream_handler =
        Arc::new(StreamHandler::new(config.stream_url.clone(), config.stream_reconnect_base_secs, state.clone()));

    let (signal_tx, mut signal_rx) = tokio::sync::mpsc::channel(100);
    let signal_processor = Arc::new(SignalProcessor::new(state.clone(), &config, signal_tx));

    let (alert_engine_tx, mut alert_engine_rx) = tokio::sync::mpsc::channel(100);
    let alert_engine = Arc::new(AlertEngine::new(state.clone(), alert_engine_tx));

    let api_state = ApiState::new(state.clone());

    let sinks: Vec<WebhookSink> =
        config.webhook_urls.iter().map(|url| WebhookSink { url: url.clone(), shape: SinkShape::Content }).collect();
    let dispatcher = Arc::new(AlertDispatcher::new(sinks, config.alert_cooldown_secs));
    let (dispatcher_tx, dispatcher_rx) = tokio::sync::mpsc::channel(100);

    // Fans the signal processor's single stream out to both the API ring and
    // the dispatcher, since an mpsc channel has exactly one receiver.
    let fanout_api_state = api_state.clone();
    let alerting_enabled = config.alerting_enabled;
    let fanout_handle = tokio::spawn(async move {
        while let Some(signal) = signal_rx.recv().await {
            fanout_api_state.record_signal(signal.clone());
            if alerting_enabled {
                let _ = dispatcher_tx.try_send(signal);
            }
        }
    });

    let alert_api_state = api_state.clone();
    let alert_drain_handle = tokio::spawn(async move {
        while let Some(alert) = alert_engine_rx.recv().await {
            alert_api_state.record_alert(alert);
        }
    });

    let mut handles = Vec::new();

    {
        let rest_poller = rest_poller.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { rest_poller.run_discovery_loop(DISCOVERY_CATEGORY, cancel).await }));
    }
    {
        let rest_poller = rest_poller.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { rest_poller.run_orderbook_loop(cancel).await }));
    }
    {
        let stream_handler = stream_handler.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { stream_handler.run(cancel).await }));
    }
    {
        let signal_processor = signal_processor.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { signal_processor.run(cancel).await }));
    }
    {
        let alert_engine = alert_engine.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { alert_engine.run(cancel).await }));
    }
    {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { dispatcher.run(dispatcher_rx, cancel).await }));
    }

    let cors = if config.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = config.cors_allowed_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let app: Router = Router::new()
        .nest("/api/v1", api::router(api_state))
        .layer(cors)
        .layer(axum::middleware::from_fn(request_logging_simple));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(bind_addr = %config.bind_addr, "read API listening");

    let serve_cancel = cancel.clone();
    let server = axum::serve(listener, app.into_make_service()).with_graceful_shutdown(async move {
        serve_cancel.cancelled().await;
    });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    let _ = fanout_handle.await;
    let _ = alert_drain_handle.await;

    Ok(())
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("kalshi_signal_engine={log_level},tower_http=info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
