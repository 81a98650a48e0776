//! Preference store for short-lived per-flow secrets
//!
//! The authorization code flow spans a browser redirect and, on native
//! platforms, usually a fresh process launch. The `state`, `nonce` and PKCE
//! `verifier` issued when the flow starts must therefore survive outside the
//! client instance. [`PreferenceStore`] is the keyed map the protocol core
//! reads and writes; it never owns the storage itself.
//!
//! Three backends are provided:
//!
//! - [`MemoryPreferenceStore`] -- process memory, for tests and single-process
//!   embeddings.
//! - [`FilePreferenceStore`] -- a JSON file in the platform data directory.
//! - [`KeyringPreferenceStore`] -- the OS credential store (Keychain, Secret
//!   Service, Windows Credential Manager).
//!
//! Each key holds at most one value; a new authorization attempt overwrites
//! the values of the previous one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::io::AsyncWriteExt;

use crate::config::{PreferenceBackend, PreferencesConfig};
use crate::error::{NativeOidcError, Result};

/// Preference key under which the anti-CSRF `state` is stored
pub const PREF_KEY_STATE: &str = "state";

/// Preference key under which the identity token `nonce` is stored
pub const PREF_KEY_NONCE: &str = "nonce";

/// Preference key under which the PKCE code verifier is stored
pub const PREF_KEY_VERIFIER: &str = "verifier";

// ---------------------------------------------------------------------------
// PreferenceStore
// ---------------------------------------------------------------------------

/// Keyed string store shared between the stages of one authorization attempt.
///
/// Implementations must make a completed [`store_preference`] visible to every
/// later [`load_preference`] for the same key, including from a different
/// process when the backend is persistent.
///
/// [`store_preference`]: PreferenceStore::store_preference
/// [`load_preference`]: PreferenceStore::load_preference
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn store_preference(&self, key: &str, value: &str) -> Result<()>;

    /// Loads the value under `key`, or `None` when nothing is stored.
    async fn load_preference(&self, key: &str) -> Result<Option<String>>;

    /// Removes the value under `key`. Removing an absent key is not an error.
    async fn remove_preference(&self, key: &str) -> Result<()>;
}

/// Builds the backend selected in configuration.
///
/// # Errors
///
/// Returns [`NativeOidcError::Preference`] when the file backend has no
/// explicit path and the platform data directory cannot be determined.
pub fn from_config(config: &PreferencesConfig) -> Result<Arc<dyn PreferenceStore>> {
    let store: Arc<dyn PreferenceStore> = match config.backend {
        PreferenceBackend::Memory => Arc::new(MemoryPreferenceStore::new()),
        PreferenceBackend::Keyring => Arc::new(KeyringPreferenceStore::new("default")),
        PreferenceBackend::File => match &config.path {
            Some(path) => Arc::new(FilePreferenceStore::new(path)),
            None => Arc::new(FilePreferenceStore::in_data_dir()?),
        },
    };
    tracing::debug!("Using {:?} preference store", config.backend);
    Ok(store)
}

// ---------------------------------------------------------------------------
// MemoryPreferenceStore
// ---------------------------------------------------------------------------

/// In-memory preference store.
///
/// # Examples
///
/// ```
/// use native_oidc::preferences::{MemoryPreferenceStore, PreferenceStore};
///
/// # #[tokio::main]
/// # async fn main() -> native_oidc::error::Result<()> {
/// let store = MemoryPreferenceStore::new();
/// store.store_preference("state", "abc").await?;
/// assert_eq!(store.load_preference("state").await?, Some("abc".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_values<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| NativeOidcError::Preference("memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn store_preference(&self, key: &str, value: &str) -> Result<()> {
        self.with_values(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    async fn load_preference(&self, key: &str) -> Result<Option<String>> {
        self.with_values(|values| values.get(key).cloned())
    }

    async fn remove_preference(&self, key: &str) -> Result<()> {
        self.with_values(|values| {
            values.remove(key);
        })
    }
}

// ---------------------------------------------------------------------------
// FilePreferenceStore
// ---------------------------------------------------------------------------

/// Preference store backed by a JSON object on disk.
///
/// The whole map is rewritten on every change. Writes within one process are
/// serialized; concurrent writers in different processes are not supported,
/// which matches the one-attempt-in-flight model of the flow.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FilePreferenceStore {
    /// Creates a store that reads and writes `path`.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a store in the user's data directory.
    ///
    /// # Errors
    ///
    /// Returns [`NativeOidcError::Preference`] if the platform data directory
    /// cannot be determined.
    pub fn in_data_dir() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("org", "native-oidc", "native-oidc").ok_or_else(|| {
            NativeOidcError::Preference("Could not determine data directory".to_string())
        })?;
        Ok(Self::new(proj_dirs.data_dir().join("preferences.json")))
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                NativeOidcError::Preference(format!(
                    "corrupt preference file {}: {}",
                    self.path.display(),
                    e
                ))
                .into()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(NativeOidcError::Io(e).into()),
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(map)?;

        // Owner-only from creation, then renamed over the old map so a
        // reader never sees a partial file.
        let tmp_path = self.temp_path();
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(NativeOidcError::Io(e).into());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "preferences.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn store_preference(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn load_preference(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.write_lock.lock().await;
        Ok(self.read_map().await?.get(key).cloned())
    }

    async fn remove_preference(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// KeyringPreferenceStore
// ---------------------------------------------------------------------------

/// Preference store backed by the OS native keyring.
///
/// Each key is one keyring entry under a service name derived from the
/// namespace, so several relying parties can keep flows apart. Keyring calls
/// block, so they run on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringPreferenceStore {
    service: String,
}

impl KeyringPreferenceStore {
    /// Creates a store whose entries live under `native-oidc-<namespace>`.
    pub fn new(namespace: &str) -> Self {
        Self {
            service: format!("native-oidc-{}", namespace),
        }
    }

    async fn run<T, F>(&self, key: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key).map_err(NativeOidcError::Keyring)?;
            op(entry)
        })
        .await
        .map_err(|e| NativeOidcError::Preference(format!("keyring task failed: {e}")))?
    }
}

#[async_trait]
impl PreferenceStore for KeyringPreferenceStore {
    async fn store_preference(&self, key: &str, value: &str) -> Result<()> {
        let value = value.to_string();
        self.run(key, move |entry| {
            entry
                .set_password(&value)
                .map_err(NativeOidcError::Keyring)?;
            Ok(())
        })
        .await
    }

    async fn load_preference(&self, key: &str) -> Result<Option<String>> {
        self.run(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(NativeOidcError::Keyring(e).into()),
        })
        .await
    }

    async fn remove_preference(&self, key: &str) -> Result<()> {
        self.run(key, |entry| match entry.delete_password() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(NativeOidcError::Keyring(e).into()),
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_error_contains;

    #[tokio::test]
    async fn test_memory_store_overwrites_previous_value() {
        let store = MemoryPreferenceStore::new();
        store.store_preference(PREF_KEY_STATE, "first").await.unwrap();
        store.store_preference(PREF_KEY_STATE, "second").await.unwrap();
        assert_eq!(
            store.load_preference(PREF_KEY_STATE).await.unwrap(),
            Some("second".to_string())
        );
    }

    #[tokio::test]
    async fn test_memory_store_missing_key_is_none() {
        let store = MemoryPreferenceStore::new();
        assert!(store.load_preference(PREF_KEY_NONCE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_remove_is_idempotent() {
        let store = MemoryPreferenceStore::new();
        store.store_preference(PREF_KEY_VERIFIER, "v").await.unwrap();
        store.remove_preference(PREF_KEY_VERIFIER).await.unwrap();
        store.remove_preference(PREF_KEY_VERIFIER).await.unwrap();
        assert!(store
            .load_preference(PREF_KEY_VERIFIER)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let first = FilePreferenceStore::new(&path);
        first.store_preference(PREF_KEY_STATE, "s1").await.unwrap();
        first.store_preference(PREF_KEY_NONCE, "n1").await.unwrap();

        let second = FilePreferenceStore::new(&path);
        assert_eq!(
            second.load_preference(PREF_KEY_STATE).await.unwrap(),
            Some("s1".to_string())
        );
        assert_eq!(
            second.load_preference(PREF_KEY_NONCE).await.unwrap(),
            Some("n1".to_string())
        );
    }

    #[tokio::test]
    async fn test_file_store_missing_file_loads_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("absent.json"));
        assert!(store.load_preference(PREF_KEY_STATE).await.unwrap().is_none());
        store.remove_preference(PREF_KEY_STATE).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FilePreferenceStore::new(&path);
        assert_error_contains(
            store.load_preference(PREF_KEY_STATE).await,
            "corrupt preference file",
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        let store = FilePreferenceStore::new(&path);
        store.store_preference(PREF_KEY_STATE, "s").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_store_replaces_world_readable_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"state":"old"}"#).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FilePreferenceStore::new(&path);
        store.store_preference(PREF_KEY_NONCE, "n").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            store.load_preference(PREF_KEY_STATE).await.unwrap(),
            Some("old".to_string())
        );

        // Only the map itself is left in the directory.
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("prefs.json")]);
    }

    #[test]
    fn test_from_config_memory_backend() {
        let config = PreferencesConfig {
            backend: PreferenceBackend::Memory,
            path: None,
        };
        assert!(from_config(&config).is_ok());
    }

    #[test]
    fn test_keyring_service_name_is_namespaced() {
        let store = KeyringPreferenceStore::new("notes");
        assert_eq!(store.service, "native-oidc-notes");
    }
}
