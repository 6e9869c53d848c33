//! Key-value persistence for the dashboard collections.
//!
//! Every collection is stored as one JSON document under its own key, the
//! way a browser keeps them in local storage. There is no schema version:
//! what was written is read back as-is.

use std::{collections::HashMap, fmt, path::PathBuf, sync::Mutex};

use bson::doc;
use mongodb::{options::UpdateOptions, Client, Collection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Subscriptions,
    Friends,
    PaymentHistory,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Subscriptions => "ats-subscriptions",
            StorageKey::Friends => "ats-friends",
            StorageKey::PaymentHistory => "ats-payment-history",
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StoredValue {
    key: String,
    value: String,
}

pub enum Storage {
    Memory(Mutex<HashMap<StorageKey, String>>),
    File(PathBuf),
    Mongo(Collection<StoredValue>),
}

impl Storage {
    pub fn memory() -> Self {
        Storage::Memory(Mutex::new(HashMap::new()))
    }

    pub async fn file(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!("Storing collections under {}", dir.display());
        Ok(Storage::File(dir))
    }

    pub async fn mongo(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        info!("Connected to MongoDB, using database {database}");
        Ok(Storage::Mongo(
            client.database(database).collection::<StoredValue>("Storage"),
        ))
    }

    pub async fn load(&self, key: StorageKey) -> Result<Option<String>> {
        match self {
            Storage::Memory(values) => Ok(lock(values).get(&key).cloned()),
            Storage::File(dir) => match tokio::fs::read_to_string(file_path(dir, key)).await {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            },
            Storage::Mongo(collection) => Ok(collection
                .find_one(doc! { "key": key.as_str() }, None)
                .await?
                .map(|stored| stored.value)),
        }
    }

    pub async fn save(&self, key: StorageKey, value: String) -> Result<()> {
        debug!("Writing {} bytes to {key}", value.len());
        match self {
            Storage::Memory(values) => {
                lock(values).insert(key, value);
            }
            Storage::File(dir) => {
                // Readers only ever see a whole document.
                let path = file_path(dir, key);
                let staging = dir.join(format!("{}.{}.tmp", key.as_str(), uuid::Uuid::new_v4()));
                tokio::fs::write(&staging, value).await?;
                if let Err(err) = tokio::fs::rename(&staging, &path).await {
                    let _ = tokio::fs::remove_file(&staging).await;
                    return Err(err.into());
                }
            }
            Storage::Mongo(collection) => {
                let options = UpdateOptions::builder().upsert(true).build();
                let stored = StoredValue {
                    key: key.as_str().to_string(),
                    value,
                };
                collection
                    .update_one(
                        doc! { "key": key.as_str() },
                        doc! { "$set": bson::to_document(&stored)? },
                        options,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn file_path(dir: &std::path::Path, key: StorageKey) -> PathBuf {
    dir.join(format!("{}.json", key.as_str()))
}

fn lock(
    values: &Mutex<HashMap<StorageKey, String>>,
) -> std::sync::MutexGuard<'_, HashMap<StorageKey, String>> {
    values.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
