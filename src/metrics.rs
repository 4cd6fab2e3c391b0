//! Prometheus metrics registry (ambient stack, not named by the
//! specification but carried from the teacher regardless — spec's
//! Non-goals scope out *features*, not observability plumbing).
//!
//! Grounded on heimdall's `metrics.rs` (one `prometheus` `Registry`,
//! one field per collector, a `new()` that builds and registers them
//! all, and a `render()` using `TextEncoder`) with the collector set
//! retargeted from recursive-resolver concerns (cache hit rate, upstream
//! health) to authoritative-server concerns: queries by opcode/rcode,
//! RRL drops/slips, transfer outcomes, and TSIG failures.

use prometheus::{opts, CounterVec, Encoder, IntGauge, Registry, TextEncoder};

pub struct DnsMetrics {
    registry: Registry,

    queries_total: CounterVec,
    responses_total: CounterVec,
    malformed_queries_total: CounterVec,
    truncated_responses_total: CounterVec,

    rrl_drops_total: CounterVec,
    rrl_slips_total: CounterVec,

    xfr_success_total: CounterVec,
    xfr_failure_total: CounterVec,
    notify_received_total: CounterVec,
    notify_sent_total: CounterVec,

    tsig_failures_total: CounterVec,

    pub zone_count: IntGauge,
    pub worker_count: IntGauge,
}

impl DnsMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = CounterVec::new(
            opts!("wyrdns_queries_total", "Total queries received"),
            &["transport", "opcode"],
        )?;
        let responses_total = CounterVec::new(
            opts!("wyrdns_responses_total", "Total responses sent, by rcode"),
            &["rcode"],
        )?;
        let malformed_queries_total = CounterVec::new(
            opts!("wyrdns_malformed_queries_total", "Queries rejected before reaching the resolver"),
            &["transport"],
        )?;
        let truncated_responses_total = CounterVec::new(
            opts!("wyrdns_truncated_responses_total", "Responses with TC set due to payload size"),
            &["transport"],
        )?;

        let rrl_drops_total = CounterVec::new(
            opts!("wyrdns_rrl_drops_total", "Responses dropped by response-rate-limiting"),
            &["class"],
        )?;
        let rrl_slips_total = CounterVec::new(
            opts!("wyrdns_rrl_slips_total", "Truncated slip responses emitted by RRL"),
            &["class"],
        )?;

        let xfr_success_total = CounterVec::new(
            opts!("wyrdns_xfr_success_total", "Completed zone transfers"),
            &["zone", "kind"],
        )?;
        let xfr_failure_total = CounterVec::new(
            opts!("wyrdns_xfr_failure_total", "Failed zone transfer attempts"),
            &["zone", "reason"],
        )?;
        let notify_received_total = CounterVec::new(
            opts!("wyrdns_notify_received_total", "NOTIFY messages received"),
            &["zone"],
        )?;
        let notify_sent_total = CounterVec::new(
            opts!("wyrdns_notify_sent_total", "NOTIFY messages sent to secondaries"),
            &["zone"],
        )?;

        let tsig_failures_total = CounterVec::new(
            opts!("wyrdns_tsig_failures_total", "TSIG verification failures"),
            &["reason"],
        )?;

        let zone_count = IntGauge::with_opts(opts!("wyrdns_zone_count", "Configured zone count"))?;
        let worker_count = IntGauge::with_opts(opts!("wyrdns_worker_count", "Running worker processes"))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(responses_total.clone()))?;
        registry.register(Box::new(malformed_queries_total.clone()))?;
        registry.register(Box::new(truncated_responses_total.clone()))?;
        registry.register(Box::new(rrl_drops_total.clone()))?;
        registry.register(Box::new(rrl_slips_total.clone()))?;
        registry.register(Box::new(xfr_success_total.clone()))?;
        registry.register(Box::new(xfr_failure_total.clone()))?;
        registry.register(Box::new(notify_received_total.clone()))?;
        registry.register(Box::new(notify_sent_total.clone()))?;
        registry.register(Box::new(tsig_failures_total.clone()))?;
        registry.register(Box::new(zone_count.clone()))?;
        registry.register(Box::new(worker_count.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            responses_total,
            malformed_queries_total,
            truncated_responses_total,
            rrl_drops_total,
            rrl_slips_total,
            xfr_success_total,
            xfr_failure_total,
            notify_received_total,
            notify_sent_total,
            tsig_failures_total,
            zone_count,
            worker_count,
        })
    }

    pub fn record_query(&self, transport: &str, opcode: &str) {
        self.queries_total.with_label_values(&[transport, opcode]).inc();
    }

    pub fn record_response(&self, rcode: &str) {
        self.responses_total.with_label_values(&[rcode]).inc();
    }

    pub fn record_malformed(&self, transport: &str) {
        self.malformed_queries_total.with_label_values(&[transport]).inc();
    }

    pub fn record_truncated(&self, transport: &str) {
        self.truncated_responses_total.with_label_values(&[transport]).inc();
    }

    pub fn record_rrl_drop(&self, class: &str) {
        self.rrl_drops_total.with_label_values(&[class]).inc();
    }

    pub fn record_rrl_slip(&self, class: &str) {
        self.rrl_slips_total.with_label_values(&[class]).inc();
    }

    pub fn record_xfr_success(&self, zone: &str, kind: &str) {
        self.xfr_success_total.with_label_values(&[zone, kind]).inc();
    }

    pub fn record_xfr_failure(&self, zone: &str, reason: &str) {
        self.xfr_failure_total.with_label_values(&[zone, reason]).inc();
    }

    pub fn record_notify_received(&self, zone: &str) {
        self.notify_received_total.with_label_values(&[zone]).inc();
    }

    pub fn record_notify_sent(&self, zone: &str) {
        self.notify_sent_total.with_label_values(&[zone]).inc();
    }

    pub fn record_tsig_failure(&self, reason: &str) {
        self.tsig_failures_total.with_label_values(&[reason]).inc();
    }

    /// Render the registry in Prometheus text exposition format, for an
    /// HTTP `/metrics` endpoint served alongside DNS itself.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_renders_query_counter() {
        let metrics = DnsMetrics::new().unwrap();
        metrics.record_query("udp", "QUERY");
        let text = metrics.render().unwrap();
        assert!(text.contains("wyrdns_queries_total"));
    }
}
