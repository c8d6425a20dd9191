use anyhow::{bail, Context, Result};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Destination for log records and spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exporter {
    /// Human-readable lines on stdout.
    Stdout,
    /// One JSON object per line, with the current span attached.
    Json,
    /// Plain lines appended to a file.
    File(PathBuf),
    /// Stdout lines plus spans shipped to an OTLP collector.
    Otlp,
}

impl FromStr for Exporter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdout" => Ok(Exporter::Stdout),
            "json" => Ok(Exporter::Json),
            "file" => Ok(Exporter::File(default_log_file())),
            "otlp" => Ok(Exporter::Otlp),
            other => bail!("Unknown OTEL_EXPORTER: {}", other),
        }
    }
}

impl Exporter {
    /// Reads `OTEL_EXPORTER`, and `LOG_FILE` for the file exporter. Unset or
    /// unknown values fall back to stdout.
    pub fn from_env() -> Self {
        let name = std::env::var("OTEL_EXPORTER").unwrap_or_else(|_| "stdout".to_string());

        match name.parse() {
            Ok(Exporter::File(default)) => Exporter::File(
                std::env::var("LOG_FILE").map(PathBuf::from).unwrap_or(default),
            ),
            Ok(exporter) => exporter,
            Err(e) => {
                eprintln!("{}, falling back to stdout", e);
                Exporter::Stdout
            }
        }
    }
}

fn service_name() -> String {
    std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "drainpipe".to_string())
}

fn default_log_file() -> PathBuf {
    PathBuf::from(format!("{}.log", service_name()))
}

fn resource() -> Resource {
    let host_name = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    Resource::new(vec![
        KeyValue::new("service.name", service_name()),
        KeyValue::new("host.name", host_name),
    ])
}

fn layers(exporter: &Exporter) -> Result<Vec<BoxedLayer>> {
    let layers: Vec<BoxedLayer> = match exporter {
        Exporter::Stdout => vec![fmt::layer().boxed()],
        Exporter::Json => vec![fmt::layer().json().with_current_span(true).boxed()],
        Exporter::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            vec![fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .boxed()]
        }
        Exporter::Otlp => {
            let tracer = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(opentelemetry_otlp::new_exporter().tonic())
                .with_trace_config(opentelemetry_sdk::trace::config().with_resource(resource()))
                .install_batch(opentelemetry_sdk::runtime::Tokio)
                .context("Failed to install OTLP pipeline")?;

            vec![
                tracing_opentelemetry::layer().with_tracer(tracer).boxed(),
                fmt::layer().boxed(),
            ]
        }
    };

    Ok(layers)
}

/// Installs the global subscriber for the exporter chosen by `OTEL_EXPORTER`.
/// Filtering follows `RUST_LOG`.
pub fn init_telemetry() -> Result<()> {
    let exporter = Exporter::from_env();

    tracing_subscriber::registry()
        .with(layers(&exporter)?)
        .with(EnvFilter::from_default_env())
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Exporter::File(path) = &exporter {
        eprintln!("Logging to file: {}", path.display());
    }

    Ok(())
}

/// Flushes spans still buffered for the OTLP exporter.
pub fn shutdown_telemetry() {
    opentelemetry::global::shutdown_tracer_provider();
}
