use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::tracker::TransitionKind;

#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    polls_total: IntCounter,
    poll_failures_total: IntCounter,
    transitions_total: IntCounterVec,
    deliveries_total: IntCounter,
    delivery_failures_total: IntCounter,
    registered_chats: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let polls_total =
            IntCounter::with_opts(Opts::new("polls_total", "Backend snapshots requested"))?;
        let poll_failures_total = IntCounter::with_opts(Opts::new(
            "poll_failures_total",
            "Backend snapshots that could not be fetched",
        ))?;
        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Torrent transitions detected by kind"),
            &["kind"],
        )?;
        let deliveries_total = IntCounter::with_opts(Opts::new(
            "deliveries_total",
            "Notifications delivered to chats",
        ))?;
        let delivery_failures_total = IntCounter::with_opts(Opts::new(
            "delivery_failures_total",
            "Notifications that failed to reach a chat",
        ))?;
        let registered_chats =
            IntGauge::with_opts(Opts::new("registered_chats", "Chats receiving notifications"))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_failures_total.clone()))?;
        registry.register(Box::new(transitions_total.clone()))?;
        registry.register(Box::new(deliveries_total.clone()))?;
        registry.register(Box::new(delivery_failures_total.clone()))?;
        registry.register(Box::new(registered_chats.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                polls_total,
                poll_failures_total,
                transitions_total,
                deliveries_total,
                delivery_failures_total,
                registered_chats,
            }),
        })
    }

    pub fn inc_poll(&self) {
        self.inner.polls_total.inc();
    }

    pub fn inc_poll_failure(&self) {
        self.inner.poll_failures_total.inc();
    }

    pub fn inc_transition(&self, kind: TransitionKind) {
        self.inner
            .transitions_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_delivery(&self) {
        self.inner.deliveries_total.inc();
    }

    pub fn inc_delivery_failure(&self) {
        self.inner.delivery_failures_total.inc();
    }

    pub fn set_registered_chats(&self, count: usize) {
        self.inner
            .registered_chats
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    #[cfg(test)]
    pub fn deliveries(&self) -> u64 {
        self.inner.deliveries_total.get()
    }

    #[cfg(test)]
    pub fn delivery_failures(&self) -> u64 {
        self.inner.delivery_failures_total.get()
    }

    #[cfg(test)]
    pub fn poll_failures(&self) -> u64 {
        self.inner.poll_failures_total.get()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_collectors() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_poll();
        metrics.inc_transition(TransitionKind::Finished);
        metrics.set_registered_chats(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("polls_total 1"));
        assert!(text.contains("transitions_total{kind=\"finished\"} 1"));
        assert!(text.contains("registered_chats 3"));
    }
}
