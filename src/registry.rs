use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait RegistryStore: Send + Sync + 'static {
    async fn load(&self) -> Result<HashSet<i64>>;
    async fn save(&self, chats: &HashSet<i64>) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(rename = "Chats", default)]
    chats: BTreeMap<i64, Subscribed>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Subscribed {}

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn write(&self, chats: &HashSet<i64>) -> Result<()> {
        let file = RegistryFile {
            chats: chats.iter().map(|id| (*id, Subscribed {})).collect(),
        };
        let bytes = serde_json::to_vec(&file)?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for JsonFileStore {
    async fn load(&self) -> Result<HashSet<i64>> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        if !tokio::fs::try_exists(&self.path).await? {
            info!("Creating chat registry at {:?}", self.path);
            let empty = HashSet::new();
            self.write(&empty).await?;
            return Ok(empty);
        }

        let content = tokio::fs::read(&self.path).await?;
        let file: RegistryFile = serde_json::from_slice(&content)?;
        Ok(file.chats.into_keys().collect())
    }

    async fn save(&self, chats: &HashSet<i64>) -> Result<()> {
        self.write(chats).await
    }
}

#[derive(Default)]
struct Members {
    chats: HashSet<i64>,
    generation: u64,
}

/// Append-only set of chats that receive notifications.
///
/// Membership sits behind one `RwLock`; saves are serialized by a separate
/// async mutex that remembers the last generation written. The two are never
/// held at the same time.
pub struct Registry {
    members: RwLock<Members>,
    store: Option<Arc<dyn RegistryStore>>,
    persisted: Arc<tokio::sync::Mutex<u64>>,
}

impl Registry {
    pub async fn open(store: Arc<dyn RegistryStore>) -> Self {
        match store.load().await {
            Ok(chats) => {
                info!("Loaded {} registered chats", chats.len());
                Self::with_members(chats, Some(store))
            }
            Err(e) => {
                error!("Failed to load chat registry: {}", e);
                warn!("Chat registry persistence disabled for this session");
                Self::ephemeral()
            }
        }
    }

    pub fn ephemeral() -> Self {
        Self::with_members(HashSet::new(), None)
    }

    fn with_members(chats: HashSet<i64>, store: Option<Arc<dyn RegistryStore>>) -> Self {
        Self {
            members: RwLock::new(Members {
                chats,
                generation: 0,
            }),
            store,
            persisted: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    #[cfg(test)]
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    pub fn add_if_not_exists(&self, chat_id: i64) -> bool {
        if self.read().chats.contains(&chat_id) {
            return false;
        }

        let (generation, snapshot) = {
            let mut members = self.write();
            if !members.chats.insert(chat_id) {
                return false;
            }
            members.generation += 1;
            (members.generation, members.chats.clone())
        };
        info!("Registered chat {}", chat_id);

        if let Some(store) = &self.store {
            self.persist(store.clone(), generation, snapshot);
        }
        true
    }

    pub fn list(&self) -> Vec<i64> {
        self.read().chats.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().chats.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, store: Arc<dyn RegistryStore>, generation: u64, snapshot: HashSet<i64>) {
        let persisted = self.persisted.clone();
        tokio::spawn(async move {
            let mut last = persisted.lock().await;
            if *last >= generation {
                debug!("Skipping stale registry save (generation {})", generation);
                return;
            }
            match store.save(&snapshot).await {
                Ok(()) => *last = generation,
                Err(e) => error!("Failed to save chat registry: {}", e),
            }
        });
    }

    fn read(&self) -> RwLockReadGuard<'_, Members> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Members> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }
}
