//! Prometheus-compatible counters for the Valyria server.

use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    http_requests: AtomicU64,
    http_errors: AtomicU64,
    chat_messages: AtomicU64,
    offline_answers: AtomicU64,
    llm_input_tokens: AtomicU64,
    llm_output_tokens: AtomicU64,
    tool_calls: AtomicU64,
    policy_decisions: AtomicU64,
    bracelet_readings: AtomicU64,
    bracelet_alerts: AtomicU64,
    emergency_escalations: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub fn inc_http_requests(&self) {
        bump(&self.inner.http_requests, 1);
    }

    pub fn inc_http_errors(&self) {
        bump(&self.inner.http_errors, 1);
    }

    pub fn inc_chat_messages(&self) {
        bump(&self.inner.chat_messages, 1);
    }

    /// Answers produced by the offline brain, including fallbacks.
    pub fn inc_offline_answers(&self) {
        bump(&self.inner.offline_answers, 1);
    }

    pub fn add_llm_tokens(&self, input: u32, output: u32) {
        bump(&self.inner.llm_input_tokens, input as u64);
        bump(&self.inner.llm_output_tokens, output as u64);
    }

    pub fn add_tool_calls(&self, n: usize) {
        bump(&self.inner.tool_calls, n as u64);
    }

    pub fn inc_policy_decisions(&self) {
        bump(&self.inner.policy_decisions, 1);
    }

    pub fn inc_bracelet_readings(&self) {
        bump(&self.inner.bracelet_readings, 1);
    }

    pub fn add_bracelet_alerts(&self, n: usize) {
        bump(&self.inner.bracelet_alerts, n as u64);
    }

    pub fn inc_emergency_escalations(&self) {
        bump(&self.inner.emergency_escalations, 1);
    }

    /// Render in the Prometheus text exposition format.
    pub fn render_prometheus(&self, started_at: Instant) -> String {
        let m = &self.inner;
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let series: [(&str, &str, &str, u64); 12] = [
            ("uptime_seconds", "gauge", "Time since the server started.", started_at.elapsed().as_secs()),
            ("http_requests_total", "counter", "Total HTTP requests served.", load(&m.http_requests)),
            ("http_errors_total", "counter", "Total HTTP errors (4xx/5xx).", load(&m.http_errors)),
            ("chat_messages_total", "counter", "Total chat messages answered.", load(&m.chat_messages)),
            ("offline_answers_total", "counter", "Chat answers produced by the offline brain.", load(&m.offline_answers)),
            ("llm_input_tokens_total", "counter", "Total LLM input tokens.", load(&m.llm_input_tokens)),
            ("llm_output_tokens_total", "counter", "Total LLM output tokens.", load(&m.llm_output_tokens)),
            ("tool_calls_total", "counter", "Workspace tool calls made by the online brain.", load(&m.tool_calls)),
            ("policy_decisions_total", "counter", "Policy decisions logged.", load(&m.policy_decisions)),
            ("bracelet_readings_total", "counter", "Bracelet readings received.", load(&m.bracelet_readings)),
            ("bracelet_alerts_total", "counter", "Emergency alerts raised by bracelet readings.", load(&m.bracelet_alerts)),
            ("emergency_escalations_total", "counter", "Automatic switches into EMERGENCY mode.", load(&m.emergency_escalations)),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            let _ = writeln!(out, "# HELP valyria_{name} {help}");
            let _ = writeln!(out, "# TYPE valyria_{name} {kind}");
            let _ = writeln!(out, "valyria_{name} {value}\n");
        }
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render() {
        let m = Metrics::new();
        m.inc_http_requests();
        m.inc_http_requests();
        m.inc_chat_messages();
        m.add_llm_tokens(100, 50);
        m.add_llm_tokens(200, 100);
        m.add_bracelet_alerts(3);
        let out = m.render_prometheus(Instant::now());
        assert!(out.contains("valyria_http_requests_total 2\n"));
        assert!(out.contains("valyria_chat_messages_total 1\n"));
        assert!(out.contains("valyria_llm_input_tokens_total 300\n"));
        assert!(out.contains("valyria_llm_output_tokens_total 150\n"));
        assert!(out.contains("valyria_bracelet_alerts_total 3\n"));
    }

    #[test]
    fn exposition_format() {
        let out = Metrics::new().render_prometheus(Instant::now());
        assert!(out.contains("# HELP valyria_uptime_seconds"));
        assert!(out.contains("# TYPE valyria_uptime_seconds gauge"));
        assert!(out.contains("# TYPE valyria_emergency_escalations_total counter"));
    }

    #[test]
    fn clones_share_counters() {
        let m = Metrics::new();
        m.clone().inc_emergency_escalations();
        assert!(
            m.render_prometheus(Instant::now())
                .contains("valyria_emergency_escalations_total 1\n")
        );
    }
}
