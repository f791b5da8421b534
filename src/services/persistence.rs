//! Key-value persistence for engine state blobs
//!
//! The engine only sees [`PersistenceGateway`]: `load` returns whatever was
//! last saved under a key, `save` is fire-and-forget. Failures are logged
//! here and never reach the timer or mixer.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
};

use futures::future::{BoxFuture, FutureExt};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub const TIMER_STATE_KEY: &str = "timer-state";
pub const AMBIENCE_STATE_KEY: &str = "ambience-state";
pub const STATS_KEY: &str = "stats";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON for key '{key}': {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Storage consumed by the engine
pub trait PersistenceGateway: Send + Sync {
    /// Previously saved value for `key`, or `None` if never saved
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>>;

    /// Persist `value` under `key` without waiting for the write
    fn save(&self, key: &str, value: Value);
}

/// Load and decode `key`, logging and discarding anything unusable
pub async fn load_as<T: DeserializeOwned>(store: &dyn PersistenceGateway, key: &str) -> Option<T> {
    match store.load(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Ignoring unreadable '{}' state: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to load '{}': {}", key, e);
            None
        }
    }
}

/// Encode and save `value` under `key`
pub fn save_as<T: Serialize>(store: &dyn PersistenceGateway, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(encoded) => store.save(key, encoded),
        Err(e) => warn!("Failed to encode '{}' state: {}", key, e),
    }
}

/// In-process store, used by tests and as a scratch backend
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek at the stored value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().ok().and_then(|values| values.get(key).cloned())
    }
}

impl PersistenceGateway for MemoryStore {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        let value = self.get(key);
        async move { Ok(value) }.boxed()
    }

    fn save(&self, key: &str, value: Value) {
        match self.values.lock() {
            Ok(mut values) => {
                values.insert(key.to_string(), value);
            }
            Err(e) => warn!("Failed to lock memory store: {}", e),
        }
    }
}

enum WriteCommand {
    Put { key: String, value: Value },
    Flush(oneshot::Sender<()>),
}

/// One `<key>.json` file per key under a data directory.
///
/// Saves land in a cache immediately and are written by a single writer task
/// in the order they were made.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Value>>,
    writer_tx: mpsc::UnboundedSender<WriteCommand>,
}

impl std::fmt::Debug for WriteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteCommand::Put { key, .. } => write!(f, "Put({})", key),
            WriteCommand::Flush(_) => write!(f, "Flush"),
        }
    }
}

impl JsonFileStore {
    /// Create the data directory if needed and start the writer task
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::DataDir {
                path: dir.clone(),
                source,
            })?;

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_task(dir.clone(), writer_rx));
        debug!("JSON store opened at {}", dir.display());

        Ok(Self {
            dir,
            cache: Mutex::new(HashMap::new()),
            writer_tx,
        })
    }

    /// Wait until every save issued so far has reached disk
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.writer_tx.send(WriteCommand::Flush(done_tx)).is_err() {
            warn!("Store writer is gone, nothing to flush");
            return;
        }
        let _ = done_rx.await;
    }

    fn cached(&self, key: &str) -> Option<Value> {
        self.cache.lock().ok().and_then(|cache| cache.get(key).cloned())
    }

    fn remember(&self, key: &str, value: Value) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key.to_string(), value);
        }
    }
}

impl PersistenceGateway for JsonFileStore {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, StoreError>> {
        async move {
            if let Some(value) = self.cached(key) {
                return Ok(Some(value));
            }

            let path = file_for(&self.dir, key);
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(source) => {
                    return Err(StoreError::Io {
                        key: key.to_string(),
                        source,
                    })
                }
            };

            let value: Value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                key: key.to_string(),
                source,
            })?;
            self.remember(key, value.clone());
            Ok(Some(value))
        }
        .boxed()
    }

    fn save(&self, key: &str, value: Value) {
        self.remember(key, value.clone());
        let command = WriteCommand::Put {
            key: key.to_string(),
            value,
        };
        if let Err(e) = self.writer_tx.send(command) {
            warn!("Store writer is gone, dropping save: {:?}", e.0);
        }
    }
}

/// Map a key to its file, keeping it inside the data directory
fn file_for(dir: &Path, key: &str) -> PathBuf {
    let name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    dir.join(format!("{}.json", name))
}

async fn writer_task(dir: PathBuf, mut rx: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Put { key, value } => {
                if let Err(e) = write_file(&dir, &key, &value).await {
                    warn!("Failed to persist '{}': {}", key, e);
                }
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Store writer stopped");
}

async fn write_file(dir: &Path, key: &str, value: &Value) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        key: key.to_string(),
        source,
    })?;
    let path = file_for(dir, key);
    let tmp = path.with_extension("json.tmp");
    let io_err = |source| StoreError::Io {
        key: key.to_string(),
        source,
    };

    tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
    debug!("Persisted '{}' ({} bytes)", key, bytes.len());
    Ok(())
}
