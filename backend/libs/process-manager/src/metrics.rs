//! Process-manager metrics, following `relay::metrics::RelayMetrics`'s
//! const-labeled-counter shape.

use prometheus::{IntCounter, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct ProcessMetrics {
    pub started: IntCounter,
    pub completed: IntCounter,
    pub failed: IntCounter,
    pub compensated: IntCounter,
}

impl ProcessMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let started = IntCounter::with_opts(
            Opts::new("process_started_total", "Total number of process instances started")
                .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for process_started_total");

        let completed = IntCounter::with_opts(
            Opts::new(
                "process_completed_total",
                "Total number of process instances that reached SUCCEEDED",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for process_completed_total");

        let failed = IntCounter::with_opts(
            Opts::new(
                "process_failed_total",
                "Total number of process instances that reached FAILED",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for process_failed_total");

        let compensated = IntCounter::with_opts(
            Opts::new(
                "process_compensated_total",
                "Total number of process instances that reached COMPENSATED",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for process_compensated_total");

        for metric in [
            Box::new(started.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(completed.clone()),
            Box::new(failed.clone()),
            Box::new(compensated.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("failed to register process metric: {}", e);
            }
        }

        Self {
            started,
            completed,
            failed,
            compensated,
        }
    }
}
