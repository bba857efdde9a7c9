//! Signing-secret resolution.
//!
//! Resolution order: durable secret store, then an environment-provided
//! secret of sufficient length, then a freshly generated secret. Whatever
//! wins is memoized for the process lifetime and written back to the
//! durable store on a best-effort basis. A failing store is reported once
//! and then ignored for the rest of the process.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Environment secrets shorter than this are ignored.
pub const MIN_ENV_SECRET_LEN: usize = 32;

const ENV_SECRET_KEYS: [&str; 2] = ["SESSION_SECRET", "TESSARO_SESSION_SECRET"];

/// Durable secret backend: get/set of a single named secret.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self) -> anyhow::Result<Option<String>>;
    async fn set(&self, secret: &str) -> anyhow::Result<()>;
}

/// File-backed durable store, one secret per file.
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self) -> anyhow::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let trimmed = contents.trim().to_string();
                Ok((!trimmed.is_empty()).then_some(trimmed))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("reading secret file {}", self.path.display()))),
        }
    }

    async fn set(&self, secret: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, secret).await?;
        Ok(())
    }
}

struct SecretProviderInner {
    store: Option<Arc<dyn SecretStore>>,
    env_secret: Option<String>,
    cache: OnceCell<String>,
    store_down: AtomicBool,
}

/// Memoized secret source shared by all session operations.
#[derive(Clone)]
pub struct SecretProvider {
    inner: Arc<SecretProviderInner>,
}

impl SecretProvider {
    pub fn new(store: Option<Arc<dyn SecretStore>>, env_secret: Option<String>) -> Self {
        let env_secret = env_secret.and_then(|secret| {
            if secret.len() >= MIN_ENV_SECRET_LEN {
                Some(secret)
            } else {
                tracing::warn!(
                    min_length = MIN_ENV_SECRET_LEN,
                    "Ignoring configured session secret below minimum length"
                );
                None
            }
        });

        Self {
            inner: Arc::new(SecretProviderInner {
                store,
                env_secret,
                cache: OnceCell::new(),
                store_down: AtomicBool::new(false),
            }),
        }
    }

    /// Build from process environment (`SESSION_SECRET`, falling back to
    /// `TESSARO_SESSION_SECRET`).
    pub fn from_env(store: Option<Arc<dyn SecretStore>>) -> Self {
        let env_secret = ENV_SECRET_KEYS
            .iter()
            .find_map(|key| std::env::var(key).ok())
            .filter(|value| !value.is_empty());
        Self::new(store, env_secret)
    }

    /// Resolve the signing secret, memoizing the first successful result.
    /// Never fails: store errors degrade to the env or generated secret.
    pub async fn load(&self) -> String {
        self.inner
            .cache
            .get_or_init(|| self.resolve())
            .await
            .clone()
    }

    async fn resolve(&self) -> String {
        if let Some(stored) = self.store_get().await {
            return stored;
        }

        if let Some(env_secret) = self.inner.env_secret.clone() {
            self.store_set(&env_secret).await;
            return env_secret;
        }

        let generated = generate_secret();
        self.store_set(&generated).await;
        generated
    }

    async fn store_get(&self) -> Option<String> {
        let store = self.store()?;
        match store.get().await {
            Ok(secret) => secret,
            Err(err) => {
                self.mark_store_down(&err);
                None
            }
        }
    }

    async fn store_set(&self, secret: &str) {
        let Some(store) = self.store() else {
            return;
        };
        if let Err(err) = store.set(secret).await {
            self.mark_store_down(&err);
        }
    }

    fn store(&self) -> Option<&Arc<dyn SecretStore>> {
        if self.inner.store_down.load(Ordering::Relaxed) {
            return None;
        }
        self.inner.store.as_ref()
    }

    fn mark_store_down(&self, err: &anyhow::Error) {
        if !self.inner.store_down.swap(true, Ordering::Relaxed) {
            tracing::error!(error = %err, "Durable secret store unavailable, continuing without it");
            tracing::warn!(
                "Sessions minted with a process-local secret will not verify on other replicas"
            );
        }
    }
}

/// 48 random bytes, base64url. Comfortably above the 128-bit entropy floor.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 48];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStore;

    #[async_trait]
    impl SecretStore for FailingStore {
        async fn get(&self) -> anyhow::Result<Option<String>> {
            anyhow::bail!("store offline")
        }

        async fn set(&self, _secret: &str) -> anyhow::Result<()> {
            anyhow::bail!("store offline")
        }
    }

    #[tokio::test]
    async fn prefers_durable_store_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSecretStore::new(dir.path().join("session-secret"));
        store.set("stored-secret-stored-secret-stored").await.unwrap();

        let provider = SecretProvider::new(
            Some(Arc::new(store)),
            Some("env-secret-env-secret-env-secret!".to_string()),
        );
        assert_eq!(provider.load().await, "stored-secret-stored-secret-stored");
    }

    #[tokio::test]
    async fn env_secret_is_persisted_to_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-secret");
        let provider = SecretProvider::new(
            Some(Arc::new(FileSecretStore::new(path.clone()))),
            Some("env-secret-env-secret-env-secret!".to_string()),
        );

        assert_eq!(provider.load().await, "env-secret-env-secret-env-secret!");
        let persisted = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(persisted, "env-secret-env-secret-env-secret!");
    }

    #[tokio::test]
    async fn short_env_secret_is_ignored() {
        let provider = SecretProvider::new(None, Some("too-short".to_string()));
        let secret = provider.load().await;
        assert_ne!(secret, "too-short");
        assert!(secret.len() >= MIN_ENV_SECRET_LEN);
    }

    #[tokio::test]
    async fn generated_secret_is_memoized() {
        let provider = SecretProvider::new(None, None);
        let first = provider.load().await;
        let second = provider.load().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn failing_store_degrades_to_env_secret() {
        let provider = SecretProvider::new(
            Some(Arc::new(FailingStore)),
            Some("env-secret-env-secret-env-secret!".to_string()),
        );
        assert_eq!(provider.load().await, "env-secret-env-secret-env-secret!");
    }
}
