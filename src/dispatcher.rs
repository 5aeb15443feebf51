use crate::error::Result;
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::tracker::TransitionEvent;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

#[async_trait]
pub trait DeliverySink: Send + Sync + 'static {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Producer half of the notification queue.
///
/// The queue holds a single event. When it is occupied the event is handed to
/// a detached task that waits for room, so publishing never stalls the caller.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<TransitionEvent>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        sink: Arc<dyn DeliverySink>,
        metrics: Metrics,
    ) -> (Self, DeliveryWorker) {
        let (tx, rx) = mpsc::channel(1);
        let worker = DeliveryWorker {
            rx,
            registry,
            sink,
            metrics,
        };
        (Self { tx }, worker)
    }

    pub fn publish(&self, event: TransitionEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!("Notification queue busy, deferring {}", event);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = tx.send(event).await {
                        warn!("Delivery worker stopped, dropping {}", e.0);
                    }
                });
            }
            Err(TrySendError::Closed(event)) => {
                warn!("Delivery worker stopped, dropping {}", event);
            }
        }
    }
}

pub struct DeliveryWorker {
    rx: mpsc::Receiver<TransitionEvent>,
    registry: Arc<Registry>,
    sink: Arc<dyn DeliverySink>,
    metrics: Metrics,
}

impl DeliveryWorker {
    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.deliver(&event).await;
        }
        debug!("Notification queue closed");
    }

    pub async fn deliver(&self, event: &TransitionEvent) -> usize {
        let text = event.message();
        let chats = self.registry.list();
        self.metrics.set_registered_chats(chats.len());

        let results = join_all(chats.iter().map(|&chat_id| {
            let text = text.as_str();
            async move { (chat_id, self.sink.send(chat_id, text).await) }
        }))
        .await;

        let mut delivered = 0;
        for (chat_id, result) in results {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.inc_delivery();
                }
                Err(e) => {
                    self.metrics.inc_delivery_failure();
                    error!("Failed to notify chat {} about {}: {}", chat_id, event, e);
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tracker::TransitionKind;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        failing: HashSet<i64>,
        sent: Mutex<Vec<(i64, String)>>,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<(i64, String)> {
            let mut sent = self.sent.lock().unwrap().clone();
            sent.sort();
            sent
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            if self.failing.contains(&chat_id) {
                return Err(Error::Telegram("Forbidden: bot was blocked by the user".into()));
            }
            Ok(())
        }
    }

    fn event(kind: TransitionKind, id: &str) -> TransitionEvent {
        TransitionEvent {
            kind,
            id: id.to_string(),
            name: format!("Torrent {}", id),
        }
    }

    fn registry_with(chats: &[i64]) -> Arc<Registry> {
        let registry = Registry::ephemeral();
        for &chat in chats {
            registry.add_if_not_exists(chat);
        }
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_event_reaches_every_chat() {
        let sink = Arc::new(RecordingSink::default());
        let (_, worker) = Dispatcher::new(
            registry_with(&[111, 222]),
            sink.clone(),
            Metrics::new().unwrap(),
        );

        let delivered = worker.deliver(&event(TransitionKind::Started, "a")).await;

        assert_eq!(delivered, 2);
        let text = "<--Downloading-->\nTorrent a".to_string();
        assert_eq!(sink.sent(), vec![(111, text.clone()), (222, text)]);
    }

    #[tokio::test]
    async fn test_failed_chat_does_not_block_others() {
        let sink = Arc::new(RecordingSink {
            failing: HashSet::from([111]),
            ..Default::default()
        });
        let metrics = Metrics::new().unwrap();
        let (_, worker) =
            Dispatcher::new(registry_with(&[111, 222]), sink.clone(), metrics.clone());

        let delivered = worker.deliver(&event(TransitionKind::Finished, "a")).await;

        assert_eq!(delivered, 1);
        let chats: Vec<i64> = sink.sent().into_iter().map(|(chat, _)| chat).collect();
        assert_eq!(chats, vec![111, 222]);
        assert_eq!(metrics.deliveries(), 1);
        assert_eq!(metrics.delivery_failures(), 1);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_on_a_full_queue() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) =
            Dispatcher::new(registry_with(&[7]), sink.clone(), Metrics::new().unwrap());

        // The worker is not running yet, so only the first event fits in the queue.
        tokio::time::timeout(Duration::from_millis(100), async {
            for id in ["a", "b", "c", "d"] {
                dispatcher.publish(event(TransitionKind::Started, id));
            }
        })
        .await
        .expect("publish blocked");

        tokio::spawn(worker.run());
        tokio::time::timeout(Duration::from_secs(2), async {
            while sink.sent().len() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("events were not delivered");

        let mut texts: Vec<String> = sink.sent().into_iter().map(|(_, text)| text).collect();
        texts.sort();
        assert_eq!(
            texts,
            ["a", "b", "c", "d"]
                .iter()
                .map(|id| format!("<--Downloading-->\nTorrent {}", id))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_publish_after_worker_stopped_is_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, worker) =
            Dispatcher::new(registry_with(&[7]), sink.clone(), Metrics::new().unwrap());
        drop(worker);

        dispatcher.publish(event(TransitionKind::Started, "a"));
        assert!(sink.sent().is_empty());
    }
}
