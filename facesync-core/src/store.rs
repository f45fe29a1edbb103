//! Local preference store.
//!
//! One store per preference file on a device. Values are kept in memory and
//! written through to a JSON file on every change. Subscribers are told about
//! each change together with its [`ChangeOrigin`], which is how the sync
//! layer avoids sending a remote change straight back to where it came from.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::prefs::PrefValue;

/// Why a value in a store changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Edited on this device (user input or watch face completion).
    Local,
    /// Applied from an inbound sync message.
    Remote,
    /// Copied from another local store during start-up.
    Restore,
}

/// Notification delivered to store subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceChange {
    pub store: String,
    pub key: String,
    pub value: PrefValue,
    pub origin: ChangeOrigin,
}

/// Handle returned by [`PreferenceStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&PreferenceChange) + Send + Sync>;

struct Inner {
    name: String,
    path: Option<PathBuf>,
    values: Mutex<BTreeMap<String, PrefValue>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

/// A named key-value preference store.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct PreferenceStore {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PreferenceStore {
    /// Creates a store that is never written to disk.
    pub fn in_memory(name: impl Into<String>) -> Self {
        Self::with_values(name.into(), None, BTreeMap::new())
    }

    /// Opens a store backed by a JSON file.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first write.
    pub fn open(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Parse(path.clone(), e.to_string()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::Io(path, e)),
        };

        Ok(Self::with_values(name.into(), Some(path), values))
    }

    fn with_values(name: String, path: Option<PathBuf>, values: BTreeMap<String, PrefValue>) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                path,
                values: Mutex::new(values),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<PrefValue> {
        lock(&self.inner.values).get(key).cloned()
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.get(key).and_then(|v| v.as_int()).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner.values).contains_key(key)
    }

    /// Returns a snapshot of every entry.
    pub fn all(&self) -> BTreeMap<String, PrefValue> {
        lock(&self.inner.values).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.values).is_empty()
    }

    /// Writes a value.
    ///
    /// The store is persisted before the in-memory map is updated, so a
    /// failed write leaves the store untouched. Returns `Ok(false)` without
    /// notifying anyone if the value was already present.
    pub fn put(&self, key: &str, value: PrefValue, origin: ChangeOrigin) -> Result<bool, StoreError> {
        {
            let mut values = lock(&self.inner.values);
            if values.get(key) == Some(&value) {
                return Ok(false);
            }

            let mut next = values.clone();
            next.insert(key.to_string(), value.clone());
            self.persist(&next)?;
            *values = next;
        }

        tracing::debug!(
            "{}: {} = {} ({:?})",
            self.inner.name,
            key,
            value,
            origin
        );

        self.notify(&PreferenceChange {
            store: self.inner.name.clone(),
            key: key.to_string(),
            value,
            origin,
        });

        Ok(true)
    }

    /// Registers a listener called after every change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&PreferenceChange) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    // Listeners run without any lock held so they may read or write stores.
    fn notify(&self, change: &PreferenceChange) {
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(change);
        }
    }

    fn persist(&self, values: &BTreeMap<String, PrefValue>) -> Result<(), StoreError> {
        let Some(path) = &self.inner.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StoreError::Io(parent.to_path_buf(), e))?;
        }

        let bytes = serde_json::to_vec_pretty(values)
            .map_err(|e| StoreError::Parse(path.clone(), e.to_string()))?;
        fs::write(path, bytes).map_err(|e| StoreError::Io(path.clone(), e))
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("name", &self.inner.name)
            .field("path", &self.inner.path)
            .field("len", &self.len())
            .finish()
    }
}

/// Errors that can occur reading or writing a preference store.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error reading or writing the store file.
    Io(PathBuf, io::Error),
    /// The store file is not a valid preference map.
    Parse(PathBuf, String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StoreError::Parse(path, e) => {
                write!(f, "Failed to parse preferences {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Io(_, e) => Some(e),
            StoreError::Parse(_, _) => None,
        }
    }
}
