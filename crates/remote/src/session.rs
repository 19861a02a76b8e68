//! Cross-process session key cache
//!
//! One key per host is persisted under the session directory. The file's
//! mtime is the last time the key was known to be valid; the service expires
//! idle sessions, so a key older than the TTL is rotated. Rotation happens
//! under an exclusive advisory lock so concurrent processes converge on a
//! single fresh key.

use async_trait::async_trait;
use filetime::FileTime;
use fs4::FileExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use sipforge_config::RemoteConfig;
use sipforge_errors::{AuthError, Error};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::{fs, task};
use tracing::{debug, info};

use crate::xml::Element;

/// Obtains a fresh session key from the service
#[async_trait]
pub trait CredentialExchange: Send + Sync {
    /// # Errors
    ///
    /// Returns an `AuthError` if the service rejects the credentials.
    async fn exchange(&self) -> Result<String, Error>;
}

/// Exchanges the configured username and password for a session key
pub struct HttpCredentialExchange {
    http: Client,
    url: String,
    host: String,
    username: String,
    password: String,
}

impl HttpCredentialExchange {
    #[must_use]
    pub fn new(http: Client, config: &RemoteConfig, host: impl Into<String>) -> Self {
        Self {
            http,
            url: config.url.trim_end_matches('/').to_string(),
            host: host.into(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn failed(&self, message: impl Into<String>) -> AuthError {
        AuthError::ExchangeFailed {
            host: self.host.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl CredentialExchange for HttpCredentialExchange {
    async fn exchange(&self) -> Result<String, Error> {
        let response = self
            .http
            .get(format!("{}/session", self.url))
            .basic_auth(
                format!("user[{}]", self.username),
                Some(format!("password[{}]", self.password)),
            )
            .header(ACCEPT, "application/xml")
            .send()
            .await
            .map_err(|e| self.failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.failed(format!("HTTP {status}")).into());
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.failed(e.to_string()))?;
        let root = Element::parse(&body).map_err(|e| self.failed(e.to_string()))?;

        root.find("key")
            .map(|key| key.text().trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                AuthError::MissingSessionKey {
                    host: self.host.clone(),
                }
                .into()
            })
    }
}

struct CachedKey {
    token: String,
    age: Duration,
}

/// Host-scoped persisted session key
pub struct SessionKeyCache {
    dir: PathBuf,
    host: String,
    ttl: Duration,
    exchange: Arc<dyn CredentialExchange>,
}

impl SessionKeyCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        host: impl Into<String>,
        ttl: Duration,
        exchange: Arc<dyn CredentialExchange>,
    ) -> Self {
        Self {
            dir: dir.into(),
            host: host.into(),
            ttl,
            exchange,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        self.dir.join(format!("{}.session", self.host))
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(format!("{}.lock", self.host))
    }

    /// Return a usable session key, rotating it if it has gone stale
    ///
    /// # Errors
    ///
    /// Returns an `AuthError` if a credential exchange was needed and failed,
    /// or an I/O error if the cache cannot be read or written.
    pub async fn acquire(&self) -> Result<String, Error> {
        match self.read_cached().await? {
            Some(cached) if cached.age < self.ttl => {
                debug!(host = %self.host, age = ?cached.age, "reusing cached session key");
                Ok(cached.token)
            }
            Some(cached) => self.refresh(Some(cached.token)).await,
            None => {
                fs::create_dir_all(&self.dir)
                    .await
                    .map_err(|e| Error::io_with_path(&e, &self.dir))?;
                self.refresh(None).await
            }
        }
    }

    /// Mark the cached key as recently used without contacting the service
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the session file cannot be updated.
    pub async fn touch(&self) -> Result<(), Error> {
        let path = self.session_path();
        task::spawn_blocking(move || {
            filetime::set_file_mtime(&path, FileTime::now())
                .map_err(|e| Error::io_with_path(&e, &path))
        })
        .await
        .map_err(|e| Error::internal(format!("session touch task failed: {e}")))?
    }

    /// Rotate the key unless another holder of the lock already did
    async fn refresh(&self, previous: Option<String>) -> Result<String, Error> {
        let _lock = SessionLock::acquire(self.lock_path()).await?;

        if let Some(current) = self.read_cached().await? {
            if previous.as_deref() != Some(current.token.as_str()) {
                debug!(host = %self.host, "session key was rotated by another holder");
                return Ok(current.token);
            }
        }

        info!(host = %self.host, path = %self.session_path().display(), "regenerating session key");
        let token = self.exchange.exchange().await?;
        self.persist(&token).await?;
        Ok(token)
    }

    async fn read_cached(&self) -> Result<Option<CachedKey>, Error> {
        let path = self.session_path();
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_with_path(&e, &path)),
        };
        let token = match fs::read_to_string(&path).await {
            Ok(token) => token.trim().to_string(),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io_with_path(&e, &path)),
        };
        if token.is_empty() {
            return Ok(None);
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        Ok(Some(CachedKey { token, age }))
    }

    async fn persist(&self, token: &str) -> Result<(), Error> {
        let path = self.session_path();
        let staging = path.with_extension("session.tmp");
        let persist_failed = |e: std::io::Error| AuthError::PersistFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        fs::write(&staging, token).await.map_err(persist_failed)?;
        fs::rename(&staging, &path).await.map_err(persist_failed)?;
        Ok(())
    }
}

/// Exclusive advisory lock held for the lifetime of the value
struct SessionLock {
    file: File,
}

impl SessionLock {
    async fn acquire(path: PathBuf) -> Result<Self, Error> {
        task::spawn_blocking(move || {
            let file = open_lock_file(&path).map_err(|e| lock_failed(&path, &e))?;
            file.lock_exclusive().map_err(|e| lock_failed(&path, &e))?;
            Ok::<_, Error>(Self { file })
        })
        .await
        .map_err(|e| Error::internal(format!("session lock task failed: {e}")))?
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

fn lock_failed(path: &Path, err: &std::io::Error) -> Error {
    AuthError::LockFailed {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .into()
}
