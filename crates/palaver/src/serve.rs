// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `palaver serve`: wires storage, adapters and the pipeline, then runs the
//! gateway and background tasks until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use palaver_anthropic::AnthropicProvider;
use palaver_config::PalaverConfig;
use palaver_core::{PalaverError, PluginAdapter, StorageAdapter};
use palaver_cost::CostLedger;
use palaver_gateway::GatewayState;
use palaver_pipeline::{IdempotencyGuard, Pipeline, ReminderSweep};
use palaver_prometheus::PrometheusExporter;
use palaver_storage::SqliteStorage;
use palaver_whatsapp::TwilioTransport;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const IDEMPOTENCY_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the `palaver serve` command.
pub async fn run_serve(config: PalaverConfig) -> Result<(), PalaverError> {
    init_tracing(&config.server.log_level);

    info!("starting palaver serve");

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    info!(path = %config.storage.database_path, "storage initialized");

    let cost_ledger = if config.cost.track_tokens {
        Some(CostLedger::new(storage.database()?.connection().clone()))
    } else {
        debug!("token cost tracking disabled");
        None
    };

    let provider = Arc::new(AnthropicProvider::new(&config.anthropic)?);
    let transport = Arc::new(TwilioTransport::new(&config.whatsapp)?);

    if !config.whatsapp.verify_signatures {
        warn!("webhook signature verification is disabled -- do not run this way in production");
    } else if config.server.public_url.is_none() {
        warn!("server.public_url not set -- webhook signatures are checked against the Host header");
    }
    if config.admin.bearer_token.is_none() {
        info!("admin.bearer_token not set -- admin API rejects every request");
    }

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        if config.server.metrics_enabled {
            let exporter = PrometheusExporter::install()?;
            Some(Arc::new(move || exporter.render()))
        } else {
            debug!("prometheus metrics disabled");
            None
        };

    let pipeline = Arc::new(Pipeline::new(
        &config,
        storage.clone(),
        transport,
        provider,
        cost_ledger,
    )?);

    let cancel = install_signal_handler();

    let reminders = {
        let sweep = ReminderSweep::new(
            pipeline.storage().clone(),
            pipeline.notifier().clone(),
            config.pipeline.reminder_horizon_hours,
        )
        .with_no_show_grace(config.pipeline.no_show_grace_minutes);
        let interval = Duration::from_secs(config.pipeline.reminder_interval_secs);
        tokio::spawn(sweep.run(interval, cancel.clone()))
    };
    info!(
        interval_secs = config.pipeline.reminder_interval_secs,
        horizon_hours = config.pipeline.reminder_horizon_hours,
        no_show_grace_minutes = config.pipeline.no_show_grace_minutes,
        "booking sweep started"
    );

    let purge = {
        let pipeline = pipeline.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            purge_idempotency(pipeline.guard(), cancel).await;
        })
    };

    let state = GatewayState::from_config(&config, pipeline, prometheus_render);
    let turns = state.turns.clone();
    let served =
        palaver_gateway::start_server(&config.server.host, config.server.port, state, cancel.clone())
            .await;

    // A bind failure returns before any signal; stop the background tasks too.
    cancel.cancel();
    palaver_gateway::drain_turns(
        &turns,
        Duration::from_secs(config.server.drain_timeout_secs),
    )
    .await;
    if let Err(e) = reminders.await {
        warn!(error = %e, "reminder task ended abnormally");
    }
    if let Err(e) = purge.await {
        warn!(error = %e, "idempotency purge task ended abnormally");
    }
    if let Err(e) = storage.shutdown().await {
        warn!(error = %e, "storage shutdown failed");
    }

    served?;
    info!("palaver serve shutdown complete");
    Ok(())
}

async fn purge_idempotency(guard: &IdempotencyGuard, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(IDEMPOTENCY_PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = guard.purge_expired();
                if purged > 0 {
                    debug!(purged, remaining = guard.len(), "expired idempotency keys purged");
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Returns a token cancelled on SIGINT (Ctrl+C) or, on unix, SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler; only Ctrl+C stops the server");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
    });

    token
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("palaver={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
