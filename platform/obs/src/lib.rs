use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{self as sdk, Resource};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: OnceCell<()> = OnceCell::new();

const DEFAULT_FILTER: &str = "info,tower_http=warn";

/// Configuration for tracing initialization.
#[derive(Clone, Debug)]
pub struct ObsConfig {
    pub service_name: &'static str,
    pub env_filter: Option<String>,
    pub otlp_endpoint: Option<String>,
}

impl ObsConfig {
    pub fn for_service(service_name: &'static str) -> Self {
        Self {
            service_name,
            env_filter: None,
            otlp_endpoint: None,
        }
    }
}

/// Install tracing subscribers with optional OTLP span export. Safe to call
/// more than once; later calls are no-ops.
pub fn init_tracing(config: ObsConfig) -> Result<()> {
    if INIT.set(()).is_err() {
        return Ok(());
    }

    let filter = resolve_filter(config.env_filter)?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

    let endpoint = config
        .otlp_endpoint
        .or_else(|| std::env::var("OTLP_ENDPOINT").ok());
    let otlp_layer = match endpoint {
        Some(endpoint) => {
            let exporter = SpanExporter::builder()
                .with_http()
                .with_protocol(Protocol::HttpBinary)
                .with_endpoint(endpoint)
                .build()?;
            let resource = Resource::builder()
                .with_service_name(config.service_name)
                .build();
            let provider = sdk::trace::SdkTracerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build();
            Some(tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otlp_layer)
        .try_init()?;
    Ok(())
}

fn resolve_filter(explicit: Option<String>) -> Result<EnvFilter> {
    let spec = explicit
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string());
    Ok(EnvFilter::try_new(spec)?)
}
