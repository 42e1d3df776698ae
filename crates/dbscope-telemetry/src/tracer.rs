//! Subscriber and tracer provider setup

use anyhow::{Context, anyhow};
use dbscope_core::ObservabilityConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{SimpleSpanProcessor, TracerProvider};
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACER_PROVIDER: OnceLock<Arc<TracerProvider>> = OnceLock::new();

type ProcessorBuilder = Box<dyn FnOnce() -> SimpleSpanProcessor + Send>;

/// Builders registered before initialisation; `None` once telemetry is up.
static SPAN_PROCESSOR_BUILDERS: Mutex<Option<Vec<ProcessorBuilder>>> = Mutex::new(Some(Vec::new()));

/// Register a span processor to attach when [`init_telemetry`] runs.
///
/// Registration after initialisation is ignored with a warning.
pub fn register_span_processor(builder: ProcessorBuilder) {
    let mut builders = match SPAN_PROCESSOR_BUILDERS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match builders.as_mut() {
        Some(pending) => pending.push(builder),
        None => tracing::warn!("Attempted to register span processor after telemetry initialization"),
    }
}

/// Initialise logging and tracing for the process.
///
/// Installs an `EnvFilter` (`RUST_LOG` wins over `config.log_filter`), a
/// `fmt` layer writing to stderr (JSON when `config.json` is set) and the
/// OpenTelemetry bridge. Fails if a global subscriber is already installed.
///
/// ```rust,no_run
/// use dbscope_core::ObservabilityConfig;
/// use dbscope_telemetry::init_telemetry;
///
/// init_telemetry(&ObservabilityConfig::default()).unwrap();
/// ```
pub fn init_telemetry(config: &ObservabilityConfig) -> anyhow::Result<()> {
    let builders = match SPAN_PROCESSOR_BUILDERS.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
    .unwrap_or_default();

    let mut provider_builder = TracerProvider::builder();
    for builder in builders {
        provider_builder = provider_builder.with_span_processor(builder());
    }
    let tracer_provider = provider_builder.build();
    let tracer = tracer_provider.tracer(config.service_name.clone());

    if TRACER_PROVIDER.set(Arc::new(tracer_provider)).is_err() {
        return Err(anyhow!("telemetry already initialized"));
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .with_context(|| format!("Invalid log filter: {}", config.log_filter))?;

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
    });
    let plain_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(json_layer)
        .with(plain_layer)
        .with(filter)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(service = %config.service_name, json = config.json, "Telemetry initialized");
    Ok(())
}

/// Get the global tracer provider if initialised
pub fn tracer_provider() -> Option<Arc<TracerProvider>> {
    TRACER_PROVIDER.get().cloned()
}
