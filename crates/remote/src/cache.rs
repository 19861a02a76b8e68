//! Metadata documents cached on disk

use sipforge_errors::Error;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::client::RemoteClient;

/// A document read from the local cache or retrieved from the service
#[derive(Debug, Clone)]
pub struct CachedDocument {
    pub data: Vec<u8>,
    /// Whether the service was contacted
    pub fetched: bool,
}

/// Return the document cached at `cache_path`, retrieving and caching it
/// from `remote_path` if it is absent
///
/// The document is only written once it has been received in full.
///
/// # Errors
///
/// Returns an error if the request fails or the cache cannot be written.
pub async fn cached_document(
    client: &RemoteClient,
    remote_path: &str,
    cache_path: &Path,
) -> Result<CachedDocument, Error> {
    match fs::read(cache_path).await {
        Ok(data) if !data.is_empty() => {
            debug!(path = %cache_path.display(), "using cached document");
            return Ok(CachedDocument {
                data,
                fetched: false,
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(Error::io_with_path(&e, cache_path)),
    }

    let data = client.get_xml(remote_path).await?;
    write_atomically(cache_path, &data).await?;
    Ok(CachedDocument {
        data,
        fetched: true,
    })
}

/// Write `data` to a `.download` sibling and rename it into place
///
/// # Errors
///
/// Returns an I/O error if any file operation fails.
pub(crate) async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    let mut staging = path.as_os_str().to_os_string();
    staging.push(".download");
    let staging = std::path::PathBuf::from(staging);

    fs::write(&staging, data)
        .await
        .map_err(|e| Error::io_with_path(&e, &staging))?;
    fs::rename(&staging, path)
        .await
        .map_err(|e| Error::io_with_path(&e, path))
}
