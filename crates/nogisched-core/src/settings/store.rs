use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::durable::{DurableStore, FileDurableStore};
use super::{Theme, AUTO_APPLY_KEY, FAVORITES_KEY, THEME_KEY};
use crate::cache::StorageError;

const MIRROR_FILE: &str = "settings-cache.json";
const DURABLE_FILE: &str = "settings.json";

enum DurableOp {
    Write(String, Value),
    Remove(String),
    Flush(oneshot::Sender<()>),
}

/// Settings with a synchronous mirror and an asynchronous durable store.
///
/// Reads are served from the mirror. Writes update the mirror (and its
/// file) immediately and queue the durable write, which runs in the
/// background in submission order. Storage failures are logged, never
/// returned.
pub struct SettingsStore {
    mirror: Mutex<HashMap<String, Value>>,
    mirror_path: PathBuf,
    durable: Arc<dyn DurableStore>,
    writes: mpsc::UnboundedSender<DurableOp>,
}

impl SettingsStore {
    /// Open the store in `dir` with the file-backed durable store.
    /// Must be called within a Tokio runtime.
    pub fn open(dir: &Path) -> Self {
        let durable = Arc::new(FileDurableStore::new(dir.join(DURABLE_FILE)));
        Self::with_durable(dir.join(MIRROR_FILE), durable)
    }

    /// Must be called within a Tokio runtime: spawns the durable writer.
    pub fn with_durable(mirror_path: PathBuf, durable: Arc<dyn DurableStore>) -> Self {
        let mirror = match read_mirror(&mirror_path) {
            Ok(mirror) => mirror,
            Err(e) => {
                warn!(path = %mirror_path.display(), error = %e, "Failed to read settings mirror");
                HashMap::new()
            }
        };

        let (writes, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::clone(&durable), rx));

        Self {
            mirror: Mutex::new(mirror),
            mirror_path,
            durable,
            writes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_mirror(&self, mirror: &HashMap<String, Value>) {
        let result = serde_json::to_string(mirror)
            .map_err(StorageError::from)
            .and_then(|contents| {
                if let Some(parent) = self.mirror_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&self.mirror_path, contents).map_err(StorageError::from)
            });

        if let Err(e) = result {
            warn!(path = %self.mirror_path.display(), error = %e, "Failed to write settings mirror");
        }
    }

    fn enqueue(&self, op: DurableOp) {
        if self.writes.send(op).is_err() {
            warn!("Settings writer stopped, durable update dropped");
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Read `key` from the durable store once queued writes have landed,
    /// updating the mirror with what it holds. Falls back to the mirror if
    /// the durable read fails.
    pub async fn get_durable(&self, key: &str) -> Option<Value> {
        self.flush().await;
        match self.durable.read(key).await {
            Ok(Some(value)) => {
                let mut mirror = self.lock();
                if mirror.get(key) != Some(&value) {
                    mirror.insert(key.to_string(), value.clone());
                    self.persist_mirror(&mirror);
                }
                Some(value)
            }
            Ok(None) => self.get(key),
            Err(e) => {
                warn!(key, error = %e, "Durable settings read failed, using mirror");
                self.get(key)
            }
        }
    }

    pub fn set(&self, key: &str, value: Value) {
        {
            let mut mirror = self.lock();
            mirror.insert(key.to_string(), value.clone());
            self.persist_mirror(&mirror);
        }
        self.enqueue(DurableOp::Write(key.to_string(), value));
    }

    pub fn remove(&self, key: &str) {
        {
            let mut mirror = self.lock();
            if mirror.remove(key).is_some() {
                self.persist_mirror(&mirror);
            }
        }
        self.enqueue(DurableOp::Remove(key.to_string()));
    }

    /// Bring the mirror in line with the durable store.
    ///
    /// Durable values win. Keys only the mirror knows (for example from a
    /// durable write that failed last session) are copied to the durable
    /// store.
    pub async fn reconcile(&self) {
        self.flush().await;
        let entries = match self.durable.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Durable settings unavailable, keeping mirror");
                return;
            }
        };

        let missing: Vec<(String, Value)> = {
            let mut mirror = self.lock();
            let missing: Vec<(String, Value)> = mirror
                .iter()
                .filter(|(key, _)| !entries.contains_key(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            mirror.extend(entries);
            self.persist_mirror(&mirror);
            missing
        };

        debug!(migrated = missing.len(), "Settings reconciled");
        for (key, value) in missing {
            self.enqueue(DurableOp::Write(key, value));
        }
    }

    /// Wait until every queued durable write has been attempted.
    pub async fn flush(&self) {
        let (done, rx) = oneshot::channel();
        self.enqueue(DurableOp::Flush(done));
        let _ = rx.await;
    }

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(key, error = %e, "Ignoring invalid stored setting");
                None
            }
        }
    }

    // ---- typed accessors ----

    /// Stored theme; missing or invalid values read as `Theme::System`.
    pub fn theme(&self) -> Theme {
        self.get_as(THEME_KEY).unwrap_or_default()
    }

    pub fn set_theme(&self, theme: Theme) {
        self.set(THEME_KEY, Value::from(theme.as_str()));
    }

    pub fn favorites(&self) -> Vec<String> {
        self.get_as(FAVORITES_KEY).unwrap_or_default()
    }

    pub fn is_favorite(&self, code: &str) -> bool {
        self.favorites().iter().any(|c| c == code)
    }

    /// Add or remove `code`. Returns whether it is a favorite afterwards.
    pub fn toggle_favorite(&self, code: &str) -> bool {
        let mut favorites = self.favorites();
        let now_favorite = match favorites.iter().position(|c| c == code) {
            Some(pos) => {
                favorites.remove(pos);
                false
            }
            None => {
                favorites.push(code.to_string());
                true
            }
        };
        self.set_favorites(favorites);
        now_favorite
    }

    pub fn set_favorites(&self, codes: Vec<String>) {
        self.set(FAVORITES_KEY, Value::from(codes));
    }

    pub fn clear_favorites(&self) {
        self.set_favorites(Vec::new());
    }

    pub fn auto_apply(&self) -> bool {
        match self.get(AUTO_APPLY_KEY) {
            Some(Value::Bool(b)) => b,
            // Older builds stored the flag as text
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    pub fn set_auto_apply(&self, enabled: bool) {
        self.set(AUTO_APPLY_KEY, Value::Bool(enabled));
    }

    /// Members to preselect in the filter: the favorites when auto-apply is
    /// on, otherwise none.
    pub fn initial_member_filter(&self) -> Vec<String> {
        if self.auto_apply() {
            self.favorites()
        } else {
            Vec::new()
        }
    }
}

fn read_mirror(path: &Path) -> Result<HashMap<String, Value>, StorageError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

async fn run_writer(durable: Arc<dyn DurableStore>, mut rx: mpsc::UnboundedReceiver<DurableOp>) {
    while let Some(op) = rx.recv().await {
        match op {
            DurableOp::Write(key, value) => {
                if let Err(e) = durable.write(&key, value).await {
                    warn!(key = %key, error = %e, "Durable settings write failed");
                }
            }
            DurableOp::Remove(key) => {
                if let Err(e) = durable.remove(&key).await {
                    warn!(key = %key, error = %e, "Durable settings remove failed");
                }
            }
            DurableOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
