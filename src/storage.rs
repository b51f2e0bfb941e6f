/// Key-value storage access for chrome.storage.local

use crate::error::{Error, Result};
use crate::post_data::{
    KEY_AUTO_CHECK_ENABLED, KEY_AUTO_CLEANUP_ENABLED, KEY_CHECK_INTERVAL, KEY_CLEANUP_DAYS,
    KEY_MAX_RECORDS, KEY_OPEN_IN_NEW_TAB, KEY_SAVED_POSTS, ListEntry, Settings, StoredEntry,
    TrackedPost,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Flat key-value store holding all extension state.
///
/// Values are whole JSON documents; callers read a list, change it and write
/// the whole list back.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// `None` when the key has never been written.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

impl<T: Store + ?Sized> Store for &T {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }
}

/// Load `key`, falling back to `T::default()` when it is absent or null
pub async fn load_or_default<S, T>(store: &S, key: &str) -> Result<T>
where
    S: Store,
    T: DeserializeOwned + Default,
{
    match store.get(key).await? {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        }),
    }
}

pub async fn save<S: Store, T: Serialize>(store: &S, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).map_err(|source| Error::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value).await
}

/// Load the saved posts, skipping records that no longer decode
pub async fn load_posts<S: Store>(store: &S) -> Result<Vec<TrackedPost>> {
    let raw: Vec<Value> = load_or_default(store, KEY_SAVED_POSTS).await?;
    Ok(raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<TrackedPost>(value) {
            Ok(post) => Some(post),
            Err(e) => {
                log::warn!("Skipping unreadable saved post: {}", e);
                None
            }
        })
        .collect())
}

pub async fn save_posts<S: Store>(store: &S, posts: &[TrackedPost]) -> Result<()> {
    save(store, KEY_SAVED_POSTS, &posts).await
}

/// Load a hidden-thread or blocked-id list in canonical form.
///
/// Returns whether any element had to be migrated from a legacy shape.
pub async fn load_entries<S: Store>(store: &S, key: &str, now: f64) -> Result<(Vec<ListEntry>, bool)> {
    let stored: Vec<StoredEntry> = load_or_default(store, key).await?;
    Ok(crate::lists::canonicalize(stored, now))
}

pub async fn save_entries<S: Store>(store: &S, key: &str, entries: &[ListEntry]) -> Result<()> {
    save(store, key, &entries).await
}

/// One setting; a value of the wrong type counts as missing
async fn load_setting<S, T>(store: &S, key: &str) -> Result<Option<T>>
where
    S: Store,
    T: DeserializeOwned,
{
    match load_or_default::<S, Option<T>>(store, key).await {
        Err(Error::Decode { key, source }) => {
            log::warn!("Ignoring malformed setting `{}`: {}", key, source);
            Ok(None)
        }
        other => other,
    }
}

/// Read every setting, using the default for each key that is missing or malformed
pub async fn load_settings<S: Store>(store: &S) -> Result<Settings> {
    let defaults = Settings::default();
    let max_records: Option<usize> = load_setting(store, KEY_MAX_RECORDS).await?;
    let auto_check_enabled: Option<bool> = load_setting(store, KEY_AUTO_CHECK_ENABLED).await?;
    let check_interval: Option<u64> = load_setting(store, KEY_CHECK_INTERVAL).await?;
    let auto_cleanup_enabled: Option<bool> = load_setting(store, KEY_AUTO_CLEANUP_ENABLED).await?;
    let cleanup_days: Option<u32> = load_setting(store, KEY_CLEANUP_DAYS).await?;
    let open_in_new_tab: Option<bool> = load_setting(store, KEY_OPEN_IN_NEW_TAB).await?;

    Ok(Settings {
        // The popup never stores less than 1; older builds might have.
        max_records: max_records.unwrap_or(defaults.max_records).max(1),
        auto_check_enabled: auto_check_enabled.unwrap_or(defaults.auto_check_enabled),
        check_interval_seconds: check_interval.unwrap_or(defaults.check_interval_seconds),
        auto_cleanup_enabled: auto_cleanup_enabled.unwrap_or(defaults.auto_cleanup_enabled),
        cleanup_retention_days: cleanup_days.unwrap_or(defaults.cleanup_retention_days),
        open_in_new_tab: open_in_new_tab.unwrap_or(defaults.open_in_new_tab),
    })
}

/// Write the default for every key that is not present yet.
///
/// Returns the keys that were written.
pub async fn seed_defaults<S: Store>(store: &S) -> Result<Vec<&'static str>> {
    let mut written = Vec::new();
    for (key, value) in Settings::install_defaults() {
        if matches!(store.get(key).await?, None | Some(Value::Null)) {
            store.set(key, value).await?;
            written.push(key);
        }
    }
    Ok(written)
}

#[cfg(test)]
pub(crate) use memory::MemoryStore;

#[cfg(test)]
mod memory {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// In-memory store with injectable read and write failures
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        values: RefCell<HashMap<String, Value>>,
        fail_reads: Cell<bool>,
        fail_writes: Cell<bool>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            MemoryStore::default()
        }

        pub fn with(self, key: &str, value: Value) -> Self {
            self.values.borrow_mut().insert(key.to_string(), value);
            self
        }

        /// Current raw value of `key`
        pub fn value(&self, key: &str) -> Option<Value> {
            self.values.borrow().get(key).cloned()
        }

        pub fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.set(fail);
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.set(fail);
        }
    }

    impl Store for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            if self.fail_reads.get() {
                return Err(Error::Storage(format!("read of `{}` failed", key)));
            }
            Ok(self.value(key))
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            if self.fail_writes.get() {
                return Err(Error::Storage(format!("write of `{}` failed", key)));
            }
            self.values.borrow_mut().insert(key.to_string(), value);
            Ok(())
        }
    }
}
