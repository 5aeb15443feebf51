use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{route} returned status {status}")]
    Status { route: &'static str, status: StatusCode },

    #[error("qbittorrent rejected the credentials")]
    LoginRejected,

    #[error("telegram api error: {0}")]
    Telegram(String),

    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage format: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
