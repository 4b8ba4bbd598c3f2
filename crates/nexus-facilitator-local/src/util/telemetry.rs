//! Logging and optional OpenTelemetry export.
//!
//! [`Telemetry::register`] always installs a `tracing` fmt layer filtered by
//! `RUST_LOG` (default `info`). When built with the `telemetry` feature and
//! any of `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_EXPORTER_OTLP_HEADERS` or
//! `OTEL_EXPORTER_OTLP_PROTOCOL` is set, traces and metrics are exported over
//! OTLP as well.

use tower_http::trace::{DefaultMakeSpan, HttpMakeClassifier, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[cfg(feature = "telemetry")]
use opentelemetry::{KeyValue, global, trace::TracerProvider as _};
#[cfg(feature = "telemetry")]
use opentelemetry_sdk::{
    Resource,
    metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider},
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
};
#[cfg(feature = "telemetry")]
use opentelemetry_semantic_conventions::{
    SCHEMA_URL,
    attribute::{DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION},
};

/// Telemetry protocol to use for OTLP export
#[cfg(feature = "telemetry")]
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelemetryProtocol {
    HTTP,
    GRPC,
}

#[cfg(feature = "telemetry")]
impl TelemetryProtocol {
    /// Determines telemetry protocol from environment variables if OTEL is configured
    fn from_env() -> Option<Self> {
        let is_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok()
            || std::env::var("OTEL_EXPORTER_OTLP_HEADERS").is_ok()
            || std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").is_ok();
        if !is_enabled {
            return None;
        }
        let protocol = match std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
            Ok("grpc") => TelemetryProtocol::GRPC,
            _ => TelemetryProtocol::HTTP,
        };
        Some(protocol)
    }
}

/// Builder for the process-wide tracing subscriber.
#[derive(Debug, Clone)]
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    fn env_filter() -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Installs the global subscriber. Keep the returned guard alive for the
    /// lifetime of the process; dropping it flushes exporters.
    #[cfg(not(feature = "telemetry"))]
    pub fn register(self) -> TelemetryGuard {
        let _ = tracing_subscriber::registry()
            .with(Self::env_filter())
            .with(tracing_subscriber::fmt::layer())
            .try_init();
        tracing::debug!(service = self.name, version = self.version, "Logging initialized");
        TelemetryGuard {}
    }

    /// Installs the global subscriber. Keep the returned guard alive for the
    /// lifetime of the process; dropping it flushes exporters.
    #[cfg(feature = "telemetry")]
    pub fn register(self) -> TelemetryGuard {
        let Some(protocol) = TelemetryProtocol::from_env() else {
            let _ = tracing_subscriber::registry()
                .with(Self::env_filter())
                .with(tracing_subscriber::fmt::layer())
                .try_init();
            tracing::info!("OpenTelemetry is not enabled");
            return TelemetryGuard::default();
        };
        let tracer_provider = match self.init_tracer_provider(protocol) {
            Ok(provider) => provider,
            Err(error) => {
                let _ = tracing_subscriber::registry()
                    .with(Self::env_filter())
                    .with(tracing_subscriber::fmt::layer())
                    .try_init();
                tracing::error!(%error, "Failed to build OTLP span exporter, exporting disabled");
                return TelemetryGuard::default();
            }
        };
        let meter_provider = match self.init_meter_provider(protocol) {
            Ok(provider) => Some(provider),
            Err(error) => {
                eprintln!("Failed to build OTLP metric exporter: {error}");
                None
            }
        };
        let tracer = tracer_provider.tracer("tracing-otel-subscriber");
        let _ = tracing_subscriber::registry()
            // Exporter internals must not re-enter the OpenTelemetry layer below DEBUG.
            .with(Self::env_filter())
            .with(tracing_subscriber::fmt::layer())
            .with(
                meter_provider
                    .clone()
                    .map(tracing_opentelemetry::MetricsLayer::new),
            )
            .with(tracing_opentelemetry::OpenTelemetryLayer::new(tracer))
            .try_init();
        tracing::info!(
            "OpenTelemetry tracing and metrics exporter is enabled via {:?}",
            protocol
        );
        TelemetryGuard {
            tracer_provider: Some(tracer_provider),
            meter_provider,
        }
    }

    #[cfg(feature = "telemetry")]
    fn resource(&self) -> Resource {
        let deployment_env =
            std::env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
        Resource::builder()
            .with_service_name(self.name)
            .with_schema_url(
                [
                    KeyValue::new(SERVICE_VERSION, self.version),
                    KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
                ],
                SCHEMA_URL,
            )
            .build()
    }

    #[cfg(feature = "telemetry")]
    fn init_meter_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkMeterProvider, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::MetricExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter
                .with_http()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build()?,
            TelemetryProtocol::GRPC => exporter
                .with_tonic()
                .with_temporality(opentelemetry_sdk::metrics::Temporality::default())
                .build()?,
        };
        let reader = PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();
        let meter_provider = MeterProviderBuilder::default()
            .with_resource(self.resource())
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(meter_provider.clone());
        Ok(meter_provider)
    }

    #[cfg(feature = "telemetry")]
    fn init_tracer_provider(
        &self,
        protocol: TelemetryProtocol,
    ) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
        let exporter = opentelemetry_otlp::SpanExporter::builder();
        let exporter = match protocol {
            TelemetryProtocol::HTTP => exporter.with_http().build()?,
            TelemetryProtocol::GRPC => exporter.with_tonic().build()?,
        };
        Ok(SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(self.resource())
            .with_batch_exporter(exporter)
            .build())
    }
}

/// Owns the exporter providers and shuts them down on drop.
#[derive(Default)]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<SdkTracerProvider>,
    #[cfg(feature = "telemetry")]
    meter_provider: Option<SdkMeterProvider>,
}

impl TelemetryGuard {
    /// Request spans for the HTTP server.
    pub fn http_tracing(&self) -> TraceLayer<HttpMakeClassifier, DefaultMakeSpan> {
        TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::new().level(Level::INFO))
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "telemetry")]
        {
            if let Some(tracer_provider) = self.tracer_provider.as_ref()
                && let Err(err) = tracer_provider.shutdown()
            {
                eprintln!("{err:?}");
            }
            if let Some(meter_provider) = self.meter_provider.as_ref()
                && let Err(err) = meter_provider.shutdown()
            {
                eprintln!("{err:?}");
            }
        }
    }
}
