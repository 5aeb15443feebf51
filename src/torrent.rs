use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    Downloading,
    Uploading,
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BackendState {
    #[serde(rename = "queuedUP")]
    QueuedUp,
    #[serde(rename = "uploading")]
    Uploading,
    #[serde(rename = "checkingDL")]
    CheckingDl,
    #[serde(rename = "downloading")]
    Downloading,
    #[serde(other)]
    Other,
}

impl BackendState {
    pub fn classify(self) -> TorrentState {
        match self {
            BackendState::QueuedUp | BackendState::Uploading => TorrentState::Uploading,
            BackendState::CheckingDl | BackendState::Downloading => TorrentState::Downloading,
            BackendState::Other => TorrentState::Undefined,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TorrentInfo {
    pub hash: String,
    pub name: String,
    pub state: BackendState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub state: TorrentState,
}

impl Item {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: TorrentState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
        }
    }
}

impl From<TorrentInfo> for Item {
    fn from(info: TorrentInfo) -> Self {
        Self {
            id: info.hash,
            name: info.name,
            state: info.state.classify(),
        }
    }
}
