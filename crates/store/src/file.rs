//! JSON-file credential store.
//!
//! The whole [`CredentialSet`] lives in one JSON object keyed by provider:
//!
//! ```json
//! { "anthropic": { "type": "oauth", "access": "…", "refresh": "…", "expires": 1735689600000 } }
//! ```
//!
//! Files holding a single bare credential (the older layout) are read as a
//! one-entry set under `anthropic`; the next write converts them to the keyed
//! layout. Every write replaces the file atomically and leaves it readable
//! by the owner only.

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use subproxy_types::{
    Credential, CredentialSet, CredentialStore, ProviderKey, ProxyError, traits::Result,
};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;

/// A [`CredentialStore`] persisted to a single JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles so concurrent writers cannot lose
    /// each other's updates.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Creates a store backed by `path`. The file is not touched until the
    /// first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing record.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_set(&self) -> Result<CredentialSet> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => parse_record(&bytes).map_err(|e| {
                ProxyError::Storage(format!("cannot parse {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(CredentialSet::new()),
            Err(e) => Err(storage_err("read", &self.path, &e)),
        }
    }

    async fn write_set(&self, set: &CredentialSet) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err("create directory for", &self.path, &e))?;
        }

        let bytes = serde_json::to_vec_pretty(set)?;
        let tmp = self.tmp_path();

        let mut opts = tokio::fs::OpenOptions::new();
        opts.write(true).create(true).truncate(true);
        #[cfg(unix)]
        opts.mode(0o600);
        let mut file = opts
            .open(&tmp)
            .await
            .map_err(|e| storage_err("open", &tmp, &e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| storage_err("write", &tmp, &e))?;
        file.sync_all()
            .await
            .map_err(|e| storage_err("sync", &tmp, &e))?;
        drop(file);

        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| storage_err("replace", &self.path, &e))?;
        tracing::debug!(path = %self.path.display(), entries = set.len(), "credential record written");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Decodes either the keyed layout or a single bare credential.
fn parse_record(bytes: &[u8]) -> serde_json::Result<CredentialSet> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(CredentialSet::new());
    }
    let value: Value = serde_json::from_slice(bytes)?;
    if value.get("type").is_some_and(Value::is_string) {
        let single: Credential = serde_json::from_value(value)?;
        return Ok(CredentialSet::from([(ProviderKey::anthropic(), single)]));
    }
    serde_json::from_value(value)
}

fn storage_err(op: &str, path: &Path, e: &std::io::Error) -> ProxyError {
    ProxyError::Storage(format!("cannot {op} {}: {e}", path.display()))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| storage_err("restrict permissions of", path, &e))
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &ProviderKey) -> Result<Option<Credential>> {
        Ok(self.read_set().await?.remove(key))
    }

    async fn set(&self, key: &ProviderKey, credential: &Credential) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut set = self.read_set().await?;
        set.insert(key.clone(), credential.clone());
        self.write_set(&set).await
    }

    async fn remove(&self, key: &ProviderKey) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut set = self.read_set().await?;
        if set.remove(key).is_none() {
            return Ok(());
        }
        self.write_set(&set).await
    }

    async fn get_all(&self) -> Result<CredentialSet> {
        self.read_set().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn cred(access: &str, expires: u64) -> Credential {
        Credential::oauth(access, Some(format!("{access}-refresh")), expires)
    }

    fn store_in(dir: &tempfile::TempDir) -> FileCredentialStore {
        FileCredentialStore::new(dir.path().join("creds.json"))
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get(&ProviderKey::anthropic()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blank_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), " \n").unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .set(&ProviderKey::anthropic(), &cred("a1", 99))
            .await
            .unwrap();
        let got = store.get(&ProviderKey::anthropic()).await.unwrap().unwrap();
        assert_eq!(got.access, "a1");
        assert_eq!(got.expires, 99);
    }

    #[tokio::test]
    async fn test_written_layout_is_keyed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap();
        let raw: Value = serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            json!({"anthropic": {"type": "oauth", "access": "a1", "refresh": "a1-refresh", "expires": 5}})
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions_owner_only() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{}").unwrap();
        std::fs::set_permissions(store.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_set_preserves_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"openai": {"type": "api", "key": "sk-keep"}}"#,
        )
        .unwrap();

        store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap();

        let raw: Value = serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["openai"]["type"], "api");
        assert_eq!(raw["openai"]["key"], "sk-keep");
        assert_eq!(raw["anthropic"]["access"], "a1");
    }

    #[tokio::test]
    async fn test_legacy_single_credential_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"type": "oauth", "access": "legacy", "refresh": "r", "expires": 7}"#,
        )
        .unwrap();

        let got = store.get(&ProviderKey::anthropic()).await.unwrap().unwrap();
        assert_eq!(got.access, "legacy");

        store
            .set(&ProviderKey::anthropic(), &cred("fresh", 8))
            .await
            .unwrap();
        let raw: Value = serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["anthropic"]["access"], "fresh");
        assert!(raw.get("type").is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap();
        store
            .set(&ProviderKey::new("other"), &cred("o1", 5))
            .await
            .unwrap();
        store.remove(&ProviderKey::anthropic()).await.unwrap();

        assert!(store.get(&ProviderKey::anthropic()).await.unwrap().is_none());
        assert!(store.get(&ProviderKey::new("other")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_missing_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.remove(&ProviderKey::anthropic()).await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not json").unwrap();

        let err = store.get(&ProviderKey::anthropic()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Storage(_)));
        let err = store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Storage(_)));
        // the unreadable record must not have been overwritten
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "{not json");
    }

    #[tokio::test]
    async fn test_unreadable_path_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let err = store.get_all().await.unwrap_err();
        assert!(matches!(err, ProxyError::Storage(_)));
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("nested/deeper/creds.json"));
        store
            .set(&ProviderKey::anthropic(), &cred("a1", 5))
            .await
            .unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn test_concurrent_sets_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .set(&ProviderKey::new(format!("p{i}")), &cred("x", i))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.get_all().await.unwrap().len(), 16);
    }
}
