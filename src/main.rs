use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, info_span, Span};

use drainpipe::api::{ApiServer, AppStateInner};
use drainpipe::cli::{Cli, Commands};
use drainpipe::metrics::{FanoutMetrics, InMemoryMetrics, Metrics, StatsdMetrics};
use drainpipe::queue::{Listener, MockListener, QueueListener};
use drainpipe::shutdown::{signal as shutdown_signal, ShutdownSignal};
use drainpipe::telemetry;
use drainpipe::utils::{Config, SourceKind};
use drainpipe::worker::{LogHandler, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = telemetry::init_telemetry() {
        eprintln!("Failed to initialize telemetry: {}", e);
    }

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env();

    if let Some(queue_url) = cli.queue_url.clone() {
        config.queue.queue_url = Some(queue_url);
    }
    if let Some(region) = cli.region.clone() {
        config.queue.region = Some(region);
    }

    let result = match cli.command {
        Commands::Listen { fixtures, host, port } => {
            if let Some(fixtures) = fixtures {
                config.queue.fixtures = Some(fixtures);
                config.queue.source = SourceKind::Mock;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            listen_command(config).await
        }
    };

    telemetry::shutdown_telemetry();
    result
}

async fn build_listener(
    config: &Config,
    logger: Span,
    metrics: Metrics,
) -> Result<Arc<dyn Listener>> {
    match config.queue.source {
        SourceKind::Sqs => {
            let queue_url = config
                .queue
                .queue_url
                .as_deref()
                .context("queue_url must be set for the sqs source")?;

            let listener = QueueListener::connect(
                queue_url,
                config.queue.region.as_deref(),
                config.queue.endpoint_url.as_deref(),
                config.listener_settings(),
                logger,
                metrics,
            )
            .await
            .context("Failed to create queue listener")?;

            Ok(Arc::new(listener))
        }
        SourceKind::Mock => {
            let fixtures = config
                .queue
                .fixtures
                .as_ref()
                .context("fixtures must be set for the mock source")?;

            let listener = MockListener::new(fixtures, logger)
                .context("Failed to load fixtures")?
                .with_interval(config.fixture_interval());

            Ok(Arc::new(listener))
        }
    }
}

async fn listen_command(config: Config) -> Result<()> {
    config.validate()?;
    info!("{}", config);

    let sink = Arc::new(InMemoryMetrics::new());
    let mut fanout = FanoutMetrics::new().with_sink(sink.clone());
    if let Some(addr) = config.metrics.statsd_addr.as_deref() {
        let statsd = StatsdMetrics::new(addr, &config.metrics.prefix)
            .context("Failed to set up statsd metrics")?;
        fanout = fanout.with_sink(Arc::new(statsd));
    }

    let logger = info_span!("drainpipe", source = ?config.queue.source);
    let listener = build_listener(&config, logger, Metrics::new(Arc::new(fanout))).await?;
    let streams = listener.listen()?;

    let shutdown = ShutdownSignal::new();

    let state = Arc::new(AppStateInner {
        listener: listener.clone(),
        metrics: sink,
        max_staleness: config.max_staleness(),
    });
    let server = ApiServer::new(state, config.server.host.clone(), config.server.port);
    let server_handle = tokio::spawn(server.run(shutdown.wait()));

    {
        let listener = listener.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            listener.shutdown();
            shutdown.trigger();
        });
    }

    // Returns once the listener has closed its streams, either after a
    // shutdown signal or when a mock listener runs out of fixtures.
    let stats = Worker::new(LogHandler).run(streams).await;
    info!(
        "Processed {} messages ({} failed, {} listener errors)",
        stats.processed, stats.failed, stats.errors
    );

    shutdown.trigger();
    server_handle
        .await
        .context("API server task panicked")??;

    Ok(())
}
