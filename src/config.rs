use config::{Config, ConfigError, Environment, File, builder::DefaultState};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub system_port: u16,
    pub log_level: String,
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub qbittorrent_url: String,
    pub qbittorrent_username: String,
    pub qbittorrent_password: String,
    pub registry_path: PathBuf,
    pub poll_interval_secs: u64,
    pub session_refresh_secs: u64,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::defaults()?
            // Config file (optional)
            .add_source(File::with_name("config").required(false))
            // Environment variables (e.g. TORRENT_HERALD_TELEGRAM_TOKEN=...)
            .add_source(Environment::with_prefix("TORRENT_HERALD"))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<config::ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("system_port", 9090)?
            .set_default("log_level", "info")?
            .set_default("telegram_api_url", "https://api.telegram.org")?
            .set_default("qbittorrent_url", "http://localhost:8080")?
            .set_default("qbittorrent_username", "admin")?
            .set_default("qbittorrent_password", "")?
            .set_default("registry_path", "./data/torrent_bot.json")?
            .set_default("poll_interval_secs", 3)?
            .set_default("session_refresh_secs", 3600)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn session_refresh(&self) -> Duration {
        Duration::from_secs(self.session_refresh_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_with_token() {
        let settings: Settings = Settings::defaults()
            .unwrap()
            .set_override("telegram_token", "123:abc")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.system_port, 9090);
        assert_eq!(settings.telegram_token, "123:abc");
        assert_eq!(settings.qbittorrent_url, "http://localhost:8080");
        assert_eq!(settings.poll_interval(), Duration::from_secs(3));
        assert_eq!(settings.session_refresh(), Duration::from_secs(3600));
        assert_eq!(settings.registry_path, PathBuf::from("./data/torrent_bot.json"));
    }

    #[test]
    fn test_token_is_required() {
        let result = Settings::defaults()
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize::<Settings>();
        assert!(result.is_err());
    }
}
