use std::{collections::HashMap, ffi::OsString, path::{Path, PathBuf}, sync::Arc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, sync::RwLock};
use tracing::{debug, error, info, warn};

use crate::errors::StoreError;

/// Generic JSON file-backed map store keyed by string.
///
/// Holds a `HashMap<String, V>` in memory and rewrites the whole JSON file on
/// every persisted change. Before each write the previous file is moved to
/// `<path>.backup`, so exactly one older generation is kept on disk.
///
/// Load and save failures never escape: they are logged and the in-memory
/// map stays authoritative for the rest of the process.
pub struct JsonMapStore<V> {
    inner: RwLock<HashMap<String, V>>,
    file_path: PathBuf,
}

impl<V> JsonMapStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Open the store at `path`, dropping any of the `reserved` keys found in the file.
    /// A missing or unreadable file yields an empty map.
    pub async fn open<P: Into<PathBuf>>(path: P, reserved: &[&str]) -> Arc<Self> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.ok();
        }

        let map = match load_entries::<V>(&file_path, reserved).await {
            Ok(Some(map)) => {
                info!(file = %file_path.display(), records = map.len(), "loaded records");
                map
            }
            Ok(None) => {
                info!(file = %file_path.display(), "data file not found, starting empty");
                HashMap::new()
            }
            Err(e) => {
                error!(file = %file_path.display(), error = %e, "failed to load data file, starting empty");
                HashMap::new()
            }
        };

        Arc::new(Self { inner: RwLock::new(map), file_path })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Path of the single-generation backup kept next to the data file.
    pub fn backup_path(&self) -> PathBuf {
        backup_path(&self.file_path)
    }

    /// Get value by key.
    pub async fn get(&self, key: &str) -> Option<V> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Run a read-only pass over the map.
    pub async fn read_map<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&HashMap<String, V>) -> R,
    {
        let map = self.inner.read().await;
        f(&map)
    }

    /// Insert or replace a value and persist.
    pub async fn insert(&self, key: String, value: V) {
        self.update_map(|map| {
            map.insert(key, value);
            ((), true)
        })
        .await
    }

    /// Apply a mutation under the write lock.
    ///
    /// The closure returns its result together with a flag telling whether
    /// the map changed; the file is rewritten only when it did. The write
    /// lock is held across the save so file generations follow mutation order.
    pub async fn update_map<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<String, V>) -> (R, bool),
    {
        let mut map = self.inner.write().await;
        let (out, changed) = f(&mut map);
        if changed {
            self.persist(&map).await;
        }
        out
    }

    async fn persist(&self, map: &HashMap<String, V>) {
        match write_file(&self.file_path, map).await {
            Ok(()) => info!(file = %self.file_path.display(), records = map.len(), "saved records"),
            Err(e) => error!(file = %self.file_path.display(), error = %e, "failed to save data file"),
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".backup");
    PathBuf::from(name)
}

async fn load_entries<V: DeserializeOwned>(
    path: &Path,
    reserved: &[&str],
) -> Result<Option<HashMap<String, V>>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(&bytes)?;
    let mut map = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        if reserved.contains(&key.as_str()) {
            debug!(%key, "skipping reserved key");
            continue;
        }
        match serde_json::from_value::<V>(value) {
            Ok(v) => {
                map.insert(key, v);
            }
            Err(e) => warn!(%key, error = %e, "skipping unreadable entry"),
        }
    }
    Ok(Some(map))
}

async fn write_file<V: Serialize>(path: &Path, map: &HashMap<String, V>) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(map)?;
    if fs::try_exists(path).await? {
        let backup = backup_path(path);
        if fs::try_exists(&backup).await? {
            fs::remove_file(&backup).await?;
        }
        fs::rename(path, &backup).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}
