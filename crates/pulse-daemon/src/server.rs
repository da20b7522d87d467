//! Server setup and lifecycle management

use std::sync::Arc;

use pulse_engine::{DispatchWorker, NotificationDispatcher, PulseEngine, SystemClock};
use pulse_types::Normalizer;
use reqwest::Client;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::PulseConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::ingest::{backfill, stream, LiveStream};
use crate::notify::HttpNotificationSink;

/// Startup options that are not part of the configuration file
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Go straight to the live stream
    pub skip_backfill: bool,
}

/// Pulse Daemon Server
pub struct Server {
    config: PulseConfig,
    engine: Arc<PulseEngine>,
    worker: DispatchWorker,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: PulseConfig) -> DaemonResult<Self> {
        config.validate()?;

        let sink = HttpNotificationSink::new(
            &config.sources.notify_base_url,
            config.sources.request_timeout(),
        )
        .map_err(|e| DaemonError::Server(e.to_string()))?;
        tracing::info!(endpoint = %sink.endpoint(), "Spike notifications enabled");

        let (dispatcher, worker) =
            NotificationDispatcher::new(&config.engine.dispatcher, Arc::new(sink));
        let engine = Arc::new(PulseEngine::new(&config.engine, dispatcher)?);

        Ok(Self {
            config,
            engine,
            worker,
        })
    }

    pub fn engine(&self) -> &Arc<PulseEngine> {
        &self.engine
    }

    /// Run until Ctrl+C or SIGTERM
    pub async fn run(self, options: RunOptions) -> DaemonResult<()> {
        let Server {
            config,
            engine,
            worker,
        } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Notification delivery and the reaper run for the whole process lifetime.
        let worker_handle = worker.spawn();
        let reaper = Arc::new(engine.reaper(Arc::new(SystemClock)));
        let reaper_handle = tokio::spawn(reaper.clone().run(shutdown_rx.clone()));

        let normalizer = Normalizer::new(config.sources.normalizer.clone());
        if options.skip_backfill {
            tracing::info!("Historical backfill skipped");
        } else {
            let client = Client::builder()
                .timeout(config.sources.request_timeout())
                .build()
                .map_err(|e| DaemonError::Server(e.to_string()))?;
            // A failed backfill is not fatal: the daemon continues with no history.
            if let Err(e) = backfill::run(&client, &config.sources, &normalizer, &engine).await {
                tracing::error!(error = %e, "Historical backfill failed, continuing without history");
            }
        }
        reaper.end_historical_spikes();

        let live = LiveStream::new(
            stream::stream_client(config.sources.request_timeout())
                .map_err(|e| DaemonError::Server(e.to_string()))?,
            config.sources.live_stream_url.clone(),
            config.stream.clone(),
            normalizer,
            engine.clone(),
        );
        let state = AppState::new(engine.clone(), live.health());
        let stream_handle = tokio::spawn(live.run(shutdown_rx));

        let addr = config.server.listen_addr;
        let app = create_router(state, config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Pulse daemon listening on {}", addr);

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Pulse daemon shutting down");

        // Stop background tasks; the worker drains once the last queue handle is gone.
        let _ = shutdown_tx.send(true);
        let _ = stream_handle.await;
        let _ = reaper_handle.await;
        drop(reaper);
        drop(engine);
        let _ = worker_handle.await;

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
