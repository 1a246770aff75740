//! Prometheus metrics registry.
//!
//! Decision counters double as the source for the PDP statistics report, so
//! every counter here can also be read back as a plain number.

use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

/// Outcome of a policy decision, as reported to the caller.
pub mod decision {
    pub const PERMIT: &str = "PERMIT";
    pub const DENY: &str = "DENY";
    pub const INDETERMINATE: &str = "INDETERMINATE";
}

/// Decision labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    pub decision: String,
}

/// Outbound status labels (registration, heartbeat, response).
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StatusLabels {
    pub kind: String,
    pub result: String,
}

/// Inbound message labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct InboundLabels {
    pub outcome: String,
}

/// Metrics registry holding all agent metrics.
pub struct MetricsRegistry {
    /// The prometheus-client registry for encoding.
    pub registry: Registry,

    // Decision metrics
    pub decisions_total: Family<DecisionLabels, Counter>,
    pub errors_total: Counter,
    pub query_success_total: Counter,
    pub query_failure_total: Counter,

    // Control-plane metrics
    pub status_messages_total: Family<StatusLabels, Counter>,
    pub inbound_messages_total: Family<InboundLabels, Counter>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "opa_pdp_decisions",
            "Policy decisions returned, by outcome",
            decisions_total.clone(),
        );

        let errors_total = Counter::default();
        registry.register(
            "opa_pdp_errors",
            "Decision requests that ended in an error response",
            errors_total.clone(),
        );

        let query_success_total = Counter::default();
        registry.register(
            "opa_pdp_query_success",
            "Data queries answered successfully",
            query_success_total.clone(),
        );

        let query_failure_total = Counter::default();
        registry.register(
            "opa_pdp_query_failure",
            "Data queries that failed",
            query_failure_total.clone(),
        );

        let status_messages_total = Family::<StatusLabels, Counter>::default();
        registry.register(
            "opa_pdp_status_messages",
            "PDP_STATUS messages published to the PAP topic",
            status_messages_total.clone(),
        );

        let inbound_messages_total = Family::<InboundLabels, Counter>::default();
        registry.register(
            "opa_pdp_inbound_messages",
            "Messages consumed from the PAP topic, by outcome",
            inbound_messages_total.clone(),
        );

        Self {
            registry,
            decisions_total,
            errors_total,
            query_success_total,
            query_failure_total,
            status_messages_total,
            inbound_messages_total,
        }
    }

    /// Record a decision outcome (`decision::PERMIT`, `DENY` or `INDETERMINATE`).
    pub fn record_decision(&self, outcome: &str) {
        self.decisions_total
            .get_or_create(&DecisionLabels {
                decision: outcome.to_string(),
            })
            .inc();
    }

    /// Record a decision request that produced an error response.
    pub fn record_error(&self) {
        self.errors_total.inc();
    }

    /// Record a published (or failed) status message.
    pub fn record_status(&self, kind: &str, success: bool) {
        let labels = StatusLabels {
            kind: kind.to_string(),
            result: if success { "ok" } else { "failed" }.to_string(),
        };
        self.status_messages_total.get_or_create(&labels).inc();
    }

    /// Record what happened to an inbound message.
    pub fn record_inbound(&self, outcome: &str) {
        self.inbound_messages_total
            .get_or_create(&InboundLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    /// Current count for one decision outcome.
    pub fn decision_count(&self, outcome: &str) -> u64 {
        self.decisions_total
            .get_or_create(&DecisionLabels {
                decision: outcome.to_string(),
            })
            .get()
    }

    /// Current count for one inbound-message outcome.
    pub fn inbound_count(&self, outcome: &str) -> u64 {
        self.inbound_messages_total
            .get_or_create(&InboundLabels {
                outcome: outcome.to_string(),
            })
            .get()
    }

    /// Snapshot of the counters reported by the statistics endpoint.
    pub fn snapshot(&self) -> DecisionStatistics {
        DecisionStatistics {
            permit: self.decision_count(decision::PERMIT),
            deny: self.decision_count(decision::DENY),
            indeterminate: self.decision_count(decision::INDETERMINATE),
            errors: self.errors_total.get(),
            query_success: self.query_success_total.get(),
            query_failure: self.query_failure_total.get(),
        }
    }
}

/// Point-in-time copy of the decision counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionStatistics {
    pub permit: u64,
    pub deny: u64,
    pub indeterminate: u64,
    pub errors: u64,
    pub query_success: u64,
    pub query_failure: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_is_empty() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.snapshot(), DecisionStatistics::default());
    }

    #[test]
    fn test_record_decisions() {
        let metrics = MetricsRegistry::new();
        metrics.record_decision(decision::PERMIT);
        metrics.record_decision(decision::PERMIT);
        metrics.record_decision(decision::DENY);
        metrics.record_decision(decision::INDETERMINATE);
        metrics.record_error();

        let stats = metrics.snapshot();
        assert_eq!(stats.permit, 2);
        assert_eq!(stats.deny, 1);
        assert_eq!(stats.indeterminate, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.query_success, 0);
    }

    #[test]
    fn test_record_status_and_inbound() {
        let metrics = MetricsRegistry::new();
        metrics.record_status("heartbeat", true);
        metrics.record_status("heartbeat", false);
        metrics.record_inbound("not_targeted");

        let ok = metrics
            .status_messages_total
            .get_or_create(&StatusLabels {
                kind: "heartbeat".to_string(),
                result: "ok".to_string(),
            })
            .get();
        assert_eq!(ok, 1);

        let foreign = metrics
            .inbound_messages_total
            .get_or_create(&InboundLabels {
                outcome: "not_targeted".to_string(),
            })
            .get();
        assert_eq!(foreign, 1);
        assert_eq!(metrics.inbound_count("not_targeted"), 1);
        assert_eq!(metrics.inbound_count("rejected"), 0);
    }
}
