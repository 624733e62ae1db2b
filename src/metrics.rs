//! OpenTelemetry metrics and tracing spans.
//!
//! Instruments are created from the global meter the first time [`METRICS`]
//! is touched, so call [`install_prometheus`] during startup, before the
//! first allocation or authorization check.

#[cfg(feature = "metrics")]
pub use self::otel::*;

#[cfg(feature = "metrics")]
mod otel {
    use crate::authz::Decision;
    use crate::sequence::EntityKind;
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use std::time::Duration;

    pub static METRICS: Lazy<SirtisMetrics> = Lazy::new(SirtisMetrics::init);

    pub struct SirtisMetrics {
        pub identifiers_allocated: Counter<u64>,
        pub authz_decisions: Counter<u64>,
        pub storage_errors: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl SirtisMetrics {
        pub fn init() -> Self {
            let meter = global::meter("sirtis");

            let identifiers_allocated = meter
                .u64_counter("sirtis_identifiers_allocated_total")
                .with_description("Case and call identifiers handed out")
                .build();

            let authz_decisions = meter
                .u64_counter("sirtis_authz_decisions_total")
                .with_description("Authorization decisions by outcome")
                .build();

            let storage_errors = meter
                .u64_counter("sirtis_storage_errors_total")
                .with_description("Failed storage round trips")
                .build();

            let query_duration = meter
                .f64_histogram("sirtis_query_duration_seconds")
                .with_description("Duration of storage queries")
                .build();

            Self {
                identifiers_allocated,
                authz_decisions,
                storage_errors,
                query_duration,
            }
        }

        pub fn record_allocation(&self, kind: EntityKind, strategy: &'static str) {
            self.identifiers_allocated.add(
                1,
                &[
                    KeyValue::new("kind", kind.as_str()),
                    KeyValue::new("strategy", strategy),
                ],
            );
        }

        pub fn record_decision(&self, decision: Decision) {
            self.authz_decisions
                .add(1, &[KeyValue::new("outcome", decision.as_str())]);
        }

        pub fn record_storage_error(&self) {
            self.storage_errors.add(1, &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }
    }

    /// Register a Prometheus exporter on `registry` and make it the global
    /// meter provider.
    pub fn install_prometheus(registry: &prometheus::Registry) -> Result<SdkMeterProvider, String> {
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()
            .map_err(|e| format!("failed to build prometheus exporter: {e}"))?;
        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        global::set_meter_provider(provider.clone());
        Ok(provider)
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use opentelemetry::metrics::MeterProvider;

        #[test]
        fn test_prometheus_registry_sees_recorded_counters() {
            let registry = prometheus::Registry::new();
            let provider = install_prometheus(&registry).unwrap();

            provider
                .meter("sirtis-test")
                .u64_counter("sirtis_probe")
                .build()
                .add(3, &[KeyValue::new("kind", "case")]);

            let text = prometheus::TextEncoder::new()
                .encode_to_string(&registry.gather())
                .unwrap();
            assert!(text.contains("sirtis_probe"), "{text}");
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};

    pub fn allocate_span(kind: &'static str, year: i32) -> Span {
        info_span!("sirtis.allocate", kind, year)
    }

    pub fn authorize_span(operation: &str) -> Span {
        info_span!("sirtis.authorize", operation)
    }

    pub fn execute_query_span(query: &str) -> Span {
        debug_span!("sirtis.query", query)
    }

    pub fn acquire_connection_span() -> Span {
        debug_span!("sirtis.connect")
    }

    pub fn begin_transaction_span() -> Span {
        debug_span!("sirtis.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        debug_span!("sirtis.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        debug_span!("sirtis.transaction.rollback")
    }
}
