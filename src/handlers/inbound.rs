use crate::dispatcher::DeliverySink;
use crate::error::Result;
use crate::registry::Registry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

#[async_trait]
pub trait TorrentIntake: Send + Sync + 'static {
    async fn add_magnet(&self, link: &str) -> Result<()>;
    async fn add_torrent_file(&self, torrent: &[u8]) -> Result<()>;
}

#[async_trait]
pub trait AttachmentFetcher: Send + Sync + 'static {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub text: Option<String>,
    pub attachment: Option<String>,
}

impl InboundMessage {
    fn magnet(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|text| text.starts_with("magnet:"))
    }
}

pub struct MessageHandler {
    registry: Arc<Registry>,
    intake: Arc<dyn TorrentIntake>,
    attachments: Arc<dyn AttachmentFetcher>,
    replies: Arc<dyn DeliverySink>,
}

impl MessageHandler {
    pub fn new(
        registry: Arc<Registry>,
        intake: Arc<dyn TorrentIntake>,
        attachments: Arc<dyn AttachmentFetcher>,
        replies: Arc<dyn DeliverySink>,
    ) -> Self {
        Self {
            registry,
            intake,
            attachments,
            replies,
        }
    }

    pub async fn handle(&self, message: &InboundMessage) {
        self.registry.add_if_not_exists(message.chat_id);

        if let Err(e) = self.forward_torrents(message).await {
            error!("Message handling for chat {}: {}", message.chat_id, e);
            let reply = format!("Failed to add torrent: {}", e);
            if let Err(e) = self.replies.send(message.chat_id, &reply).await {
                error!("Failed to reply to chat {}: {}", message.chat_id, e);
            }
        }
    }

    async fn forward_torrents(&self, message: &InboundMessage) -> Result<()> {
        if let Some(file_id) = &message.attachment {
            let torrent = self.attachments.fetch(file_id).await?;
            self.intake.add_torrent_file(&torrent).await?;
            info!("Chat {} added a torrent file ({} bytes)", message.chat_id, torrent.len());
        }
        if let Some(link) = message.magnet() {
            self.intake.add_magnet(link).await?;
            info!("Chat {} added a magnet link", message.chat_id);
        }
        Ok(())
    }
}
