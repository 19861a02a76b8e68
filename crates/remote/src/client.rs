//! HTTP client for the metadata service

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use sipforge_config::RemoteConfig;
use sipforge_errors::{Error, NetworkError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use crate::session::{HttpCredentialExchange, SessionKeyCache};

/// User agent sent with every request
#[must_use]
pub fn user_agent() -> String {
    format!("sipforge/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the underlying HTTP client from configuration
///
/// # Errors
///
/// Returns an error if the reqwest client fails to initialize.
pub fn build_http_client(config: &RemoteConfig) -> Result<Client, Error> {
    Client::builder()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .pool_max_idle_per_host(config.connection_limit)
        .user_agent(user_agent())
        .build()
        .map_err(|e| NetworkError::ConnectionRefused(e.to_string()).into())
}

/// Authenticated client for the metadata service
///
/// Cloning is cheap; clones share the connection pool and the bound on
/// outstanding requests.
#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    username: String,
    session_key: String,
    sessions: Arc<SessionKeyCache>,
    permits: Arc<Semaphore>,
}

impl RemoteClient {
    /// Connect to the service configured in `config`
    ///
    /// The session key is taken from the cache under `session_dir`, or
    /// obtained through a credential exchange if the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or no session key can be
    /// acquired.
    pub async fn connect(config: &RemoteConfig, session_dir: &Path) -> Result<Self, Error> {
        let host = Self::host_of(&config.url)?;
        let http = build_http_client(config)?;
        let exchange = HttpCredentialExchange::new(http.clone(), config, host.clone());
        let sessions = SessionKeyCache::new(
            session_dir,
            host,
            config.session_ttl(),
            Arc::new(exchange),
        );
        Self::with_sessions(http, config, Arc::new(sessions)).await
    }

    /// Connect using an existing HTTP client and session cache
    ///
    /// # Errors
    ///
    /// Returns an error if no session key can be acquired.
    pub async fn with_sessions(
        http: Client,
        config: &RemoteConfig,
        sessions: Arc<SessionKeyCache>,
    ) -> Result<Self, Error> {
        let session_key = sessions.acquire().await?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            session_key,
            sessions,
            permits: Arc::new(Semaphore::new(config.connection_limit.max(1))),
        })
    }

    fn host_of(url: &str) -> Result<String, Error> {
        let parsed = Url::parse(url).map_err(|e| NetworkError::InvalidUrl(format!("{url}: {e}")))?;
        parsed
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| NetworkError::InvalidUrl(url.to_string()).into())
    }

    /// Absolute URL of a path relative to the service root
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authenticated(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            format!("user[{}]", self.username),
            Some(format!("session[{}]", self.session_key)),
        )
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, Error> {
        self.authenticated(request)
            .send()
            .await
            .map_err(|e| request_error(url, &e))
    }

    /// Read a response body, touching the session key once the first
    /// chunk arrives
    async fn read_body(&self, response: Response, url: &str) -> Result<Vec<u8>, Error> {
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(format!("{url}: {e}")))?;
            if body.is_empty() && !chunk.is_empty() {
                self.mark_session_used().await;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn mark_session_used(&self) {
        if let Err(e) = self.sessions.touch().await {
            warn!(host = self.sessions.host(), error = %e, "failed to touch session key");
        }
    }

    /// GET a path and return the body
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service responds with an
    /// error status.
    pub async fn get_bytes(&self, path: &str, accept: &str) -> Result<Vec<u8>, Error> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        let url = self.endpoint(path);
        debug!(url = %url, "GET");

        let response = self
            .send(self.http.get(&url).header(ACCEPT, accept), &url)
            .await?;
        let response = ensure_success(response, &url)?;
        self.read_body(response, &url).await
    }

    /// GET an XML document
    ///
    /// # Errors
    ///
    /// See [`RemoteClient::get_bytes`].
    pub async fn get_xml(&self, path: &str) -> Result<Vec<u8>, Error> {
        self.get_bytes(path, "application/xml").await
    }

    /// POST an XML body and return the response body
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service responds with an
    /// error status.
    pub async fn post_xml(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, Error> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        let url = self.endpoint(path);
        debug!(url = %url, "POST");

        let request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/xml")
            .header(ACCEPT, "application/xml")
            .body(body);
        let response = ensure_success(self.send(request, &url).await?, &url)?;
        self.read_body(response, &url).await
    }

    /// PUT an XML body
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the service responds with an
    /// error status.
    pub async fn put_xml(&self, path: &str, body: Vec<u8>) -> Result<(), Error> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        let url = self.endpoint(path);
        debug!(url = %url, "PUT");

        let request = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, "application/xml")
            .body(body);
        let response = ensure_success(self.send(request, &url).await?, &url)?;
        self.read_body(response, &url).await?;
        Ok(())
    }

    /// Stream a binary body into `dest`
    ///
    /// The body is written to a `.download` sibling and renamed into place
    /// once complete. A 404 or an empty body means there is no payload and
    /// yields `None`; nothing is left on disk in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the service responds with an
    /// error status other than 404, or writing the file fails.
    pub async fn download(&self, path: &str, dest: &Path) -> Result<Option<u64>, Error> {
        let _permit = self.permits.acquire().await.map_err(|_| Error::Cancelled)?;
        let url = self.endpoint(path);
        debug!(url = %url, dest = %dest.display(), "downloading");

        let request = self
            .http
            .get(&url)
            .header(ACCEPT, "application/octet-stream");
        let response = self.send(request, &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response, &url)?;

        let staging = staging_path(dest);
        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| Error::io_with_path(&e, &staging))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| NetworkError::DownloadFailed(format!("{url}: {e}")))?;
            if written == 0 && !chunk.is_empty() {
                self.mark_session_used().await;
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io_with_path(&e, &staging))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| Error::io_with_path(&e, &staging))?;
        drop(file);

        if written == 0 {
            tokio::fs::remove_file(&staging)
                .await
                .map_err(|e| Error::io_with_path(&e, &staging))?;
            return Ok(None);
        }

        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|e| Error::io_with_path(&e, dest))?;
        Ok(Some(written))
    }
}

/// `<dest>.download`, next to the final file
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".download");
    PathBuf::from(name)
}

fn ensure_success(response: Response, url: &str) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NetworkError::HttpError {
            status: status.as_u16(),
            url: url.to_string(),
        }
        .into())
    }
}

fn request_error(url: &str, err: &reqwest::Error) -> Error {
    NetworkError::from_request(url, &err.to_string(), err.is_timeout(), err.is_connect()).into()
}
