use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::torrent::Item;
use crate::tracker::StateTracker;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[async_trait]
pub trait PollSource: Send + Sync + 'static {
    async fn fetch_snapshot(&self) -> Result<Vec<Item>>;
}

pub struct Watcher {
    source: Arc<dyn PollSource>,
    tracker: StateTracker,
    dispatcher: Dispatcher,
    metrics: Metrics,
    period: Duration,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn PollSource>,
        dispatcher: Dispatcher,
        metrics: Metrics,
        period: Duration,
    ) -> Self {
        Self {
            source,
            tracker: StateTracker::new(),
            dispatcher,
            metrics,
            period,
        }
    }

    pub async fn run(mut self) {
        info!("Watching torrents every {:?}", self.period);
        loop {
            tokio::time::sleep(self.period).await;
            self.run_cycle().await;
        }
    }

    pub async fn run_cycle(&mut self) -> usize {
        self.metrics.inc_poll();
        let snapshot = match self.source.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.metrics.inc_poll_failure();
                error!("Watch: failed to get torrents info: {}", e);
                return 0;
            }
        };

        let events = self.tracker.diff(&snapshot);
        debug!(
            "Watch: {} torrents, {} transitions, {} downloading",
            snapshot.len(),
            events.len(),
            self.tracker.watched_count()
        );

        let count = events.len();
        for event in events {
            self.metrics.inc_transition(event.kind);
            self.dispatcher.publish(event);
        }
        count
    }

    #[cfg(test)]
    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }
}
