use crate::error::{Error, Result};
use crate::handlers::inbound::TorrentIntake;
use crate::torrent::{Item, TorrentInfo};
use crate::watcher::PollSource;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{info, warn};

const LOGIN_ROUTE: &str = "/api/v2/auth/login";
const TORRENTS_INFO_ROUTE: &str = "/api/v2/torrents/info";
const ADD_TORRENTS_ROUTE: &str = "/api/v2/torrents/add";

pub struct QbitClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl QbitClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let http = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    pub async fn login(&self) -> Result<()> {
        let response = self
            .http
            .post(self.url(LOGIN_ROUTE))
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;
        let response = check_status(response, LOGIN_ROUTE)?;

        // qBittorrent answers 200 with "Fails." on bad credentials.
        let body = response.text().await?;
        if body.trim() != "Ok." {
            return Err(Error::LoginRejected);
        }
        info!("Logged in to qBittorrent at {}", self.base_url);
        Ok(())
    }

    pub async fn torrents_info(&self) -> Result<Vec<TorrentInfo>> {
        let response = self
            .send_authorized(|| Ok(self.http.get(self.url(TORRENTS_INFO_ROUTE))))
            .await?;
        let response = check_status(response, TORRENTS_INFO_ROUTE)?;
        Ok(response.json().await?)
    }

    pub async fn add_magnet(&self, link: &str) -> Result<()> {
        let response = self
            .send_authorized(|| {
                let form = Form::new().text("urls", link.to_string());
                Ok(self.http.post(self.url(ADD_TORRENTS_ROUTE)).multipart(form))
            })
            .await?;
        check_status(response, ADD_TORRENTS_ROUTE)?;
        Ok(())
    }

    pub async fn add_torrent_file(&self, torrent: &[u8]) -> Result<()> {
        let response = self
            .send_authorized(|| {
                let part = Part::bytes(torrent.to_vec())
                    .file_name("t.torrent")
                    .mime_str("application/x-bittorrent")?;
                let form = Form::new().part("torrents", part);
                Ok(self.http.post(self.url(ADD_TORRENTS_ROUTE)).multipart(form))
            })
            .await?;
        check_status(response, ADD_TORRENTS_ROUTE)?;
        Ok(())
    }

    /// Sends the request, logging in again and retrying once when the session
    /// has expired. `build` is called again for the retry.
    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let response = build()?.send().await?;
        if !matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Ok(response);
        }

        warn!(
            "qBittorrent session rejected ({}), logging in again",
            response.status()
        );
        self.login().await?;
        Ok(build()?.send().await?)
    }
}

fn check_status(response: Response, route: &'static str) -> Result<Response> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status { route, status });
    }
    Ok(response)
}

#[async_trait]
impl PollSource for QbitClient {
    async fn fetch_snapshot(&self) -> Result<Vec<Item>> {
        let torrents = self.torrents_info().await?;
        Ok(torrents.into_iter().map(Item::from).collect())
    }
}

#[async_trait]
impl TorrentIntake for QbitClient {
    async fn add_magnet(&self, link: &str) -> Result<()> {
        QbitClient::add_magnet(self, link).await
    }

    async fn add_torrent_file(&self, torrent: &[u8]) -> Result<()> {
        QbitClient::add_torrent_file(self, torrent).await
    }
}
