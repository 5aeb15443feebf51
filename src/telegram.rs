use crate::dispatcher::DeliverySink;
use crate::error::{Error, Result};
use crate::handlers::inbound::{AttachmentFetcher, InboundMessage};
use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const FILE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: Option<String>,
}

impl From<Message> for InboundMessage {
    fn from(message: Message) -> Self {
        Self {
            chat_id: message.chat.id,
            text: message.text,
            attachment: message.document.map(|d| d.file_id),
        }
    }
}

pub struct TelegramClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    file_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Http(e.without_url()))?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            file_timeout: FILE_DOWNLOAD_TIMEOUT,
        })
    }

    #[cfg(test)]
    fn with_file_timeout(mut self, timeout: Duration) -> Self {
        self.file_timeout = timeout;
        self
    }

    async fn call<T, P>(&self, method: &str, params: &P, timeout: Duration) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let url = format!("{}/bot{}/{}", self.api_url, self.token, method);
        let response: ApiResponse<T> = self
            .http
            .post(url)
            .json(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?
            .json()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;

        match response {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse { description, .. } => Err(Error::Telegram(format!(
                "{}: {}",
                method,
                description.unwrap_or_else(|| "no description".to_string())
            ))),
        }
    }

    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &json!({}), Duration::from_secs(30)).await
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let params = json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call(
            "getUpdates",
            &params,
            Duration::from_secs(timeout_secs + 10),
        )
        .await
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let params = json!({ "chat_id": chat_id, "text": text });
        let _: IgnoredAny = self
            .call("sendMessage", &params, Duration::from_secs(30))
            .await?;
        Ok(())
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file: File = self
            .call("getFile", &json!({ "file_id": file_id }), Duration::from_secs(30))
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| Error::Telegram(format!("getFile: no path for {}", file_id)))?;

        let url = format!("{}/file/bot{}/{}", self.api_url, self.token, path);
        let response = self
            .http
            .get(url)
            .timeout(self.file_timeout)
            .send()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        if !response.status().is_success() {
            return Err(Error::Status {
                route: "telegram file download",
                status: response.status(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(e.without_url()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DeliverySink for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await
    }
}

#[async_trait]
impl AttachmentFetcher for TelegramClient {
    async fn fetch(&self, file_id: &str) -> Result<Vec<u8>> {
        self.download_file(file_id).await
    }
}
