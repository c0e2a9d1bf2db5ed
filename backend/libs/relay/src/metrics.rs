//! Relay metrics, generalized from `transactional_outbox::metrics::OutboxMetrics`
//! (published counter + pending/oldest-pending gauges) to the messaging
//! core's claim-based lifecycle.

use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct RelayMetrics {
    pub published: IntCounter,
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
}

impl RelayMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let published = IntCounter::with_opts(
            Opts::new(
                "relay_published_total",
                "Total number of outbox rows marked published",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for relay_published_total");

        let pending = IntGauge::with_opts(
            Opts::new(
                "relay_pending_count",
                "Number of outbox rows currently NEW or FAILED-and-due",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for relay_pending_count");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "relay_oldest_pending_age_seconds",
                "Age in seconds of the oldest pending outbox row",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for relay_oldest_pending_age_seconds");

        for metric in [
            Box::new(published.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(pending.clone()),
            Box::new(oldest_pending_age_seconds.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("failed to register relay metric: {}", e);
            }
        }

        Self {
            published,
            pending,
            oldest_pending_age_seconds,
        }
    }
}
