use crate::dispatcher::DeliveryWorker;
use crate::handlers::inbound::{InboundMessage, MessageHandler};
use crate::qbittorrent::QbitClient;
use crate::telegram::{TelegramClient, Update};
use crate::watcher::Watcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const UPDATES_TIMEOUT_SECS: u64 = 60;
const UPDATES_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct BackgroundTasks {
    pub watcher: Watcher,
    pub delivery: DeliveryWorker,
    pub handler: MessageHandler,
    pub telegram: Arc<TelegramClient>,
    pub qbittorrent: Arc<QbitClient>,
    pub session_refresh: Duration,
}

pub fn start_background_tasks(tasks: BackgroundTasks) {
    // 1. Notification delivery
    tokio::spawn(tasks.delivery.run());

    // 2. Torrent watch loop
    tokio::spawn(tasks.watcher.run());

    // 3. qBittorrent session renewal
    let qbittorrent = tasks.qbittorrent;
    let period = tasks.session_refresh;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            if let Err(e) = qbittorrent.login().await {
                error!("Failed to renew qBittorrent session: {}", e);
            }
        }
    });

    // 4. Inbound messages
    let telegram = tasks.telegram;
    let handler = tasks.handler;
    tokio::spawn(async move {
        info!("Listening for Telegram updates...");
        let mut offset = 0;
        loop {
            let updates = match telegram.get_updates(offset, UPDATES_TIMEOUT_SECS).await {
                Ok(updates) => updates,
                Err(e) => {
                    error!("Failed to get Telegram updates: {}", e);
                    tokio::time::sleep(UPDATES_RETRY_DELAY).await;
                    continue;
                }
            };
            offset = handle_updates(&handler, offset, updates).await;
        }
    });
}

// Returns the offset that acknowledges every update in the batch.
async fn handle_updates(handler: &MessageHandler, offset: i64, updates: Vec<Update>) -> i64 {
    let mut next = offset;
    for update in updates {
        next = next.max(update.update_id + 1);
        if let Some(message) = update.message {
            handler.handle(&InboundMessage::from(message)).await;
        }
    }
    next
}
