//! Concurrent fail-fast fetching of sub-resources

use sipforge_errors::Error;
use std::collections::HashSet;
use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Run `fetch_one` for every id concurrently and collect the results in id
/// order
///
/// The first task to fail aborts all tasks still running and its error is
/// returned. When several tasks fail at about the same time, which error
/// wins depends on completion order. Every failure is logged.
///
/// # Errors
///
/// Returns the error of the first task observed to fail.
pub async fn fetch_all<T, F, Fut>(ids: &[u64], fetch_one: F) -> Result<Vec<T>, Error>
where
    T: Send + 'static,
    F: Fn(u64) -> Fut,
    Fut: Future<Output = Result<T, Error>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, &id) in ids.iter().enumerate() {
        let fut = fetch_one(id);
        tasks.spawn(async move { (index, id, fut.await) });
    }

    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(ids.len()).collect();
    let mut first_error: Option<Error> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, _, Ok(value))) => results[index] = Some(value),
            Ok((_, id, Err(e))) => {
                error!(id, error = %e, "fetch failed");
                if first_error.is_none() {
                    tasks.abort_all();
                    first_error = Some(e);
                }
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                error!(error = %e, "fetch task panicked");
                if first_error.is_none() {
                    tasks.abort_all();
                    first_error = Some(Error::internal(format!("fetch task failed: {e}")));
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    results
        .into_iter()
        .map(|value| value.ok_or_else(|| Error::internal("fetch task produced no result")))
        .collect()
}

/// Remove every numeric sub-resource directory under `dir` whose id is not
/// in `keep`, returning the names removed
///
/// Entries vanishing while the directory is scanned are not an error.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be read or an orphan cannot
/// be removed.
pub async fn prune_orphans(dir: &Path, keep: &HashSet<u64>) -> Result<Vec<String>, Error> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io_with_path(&e, dir)),
    };

    let mut pruned = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::io_with_path(&e, dir))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = match entry.file_type().await {
            Ok(file_type) => file_type.is_dir(),
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io_with_path(&e, entry.path())),
        };
        if !is_dir || name.parse::<u64>().is_ok_and(|id| keep.contains(&id)) {
            continue;
        }

        match fs::remove_dir_all(entry.path()).await {
            Ok(()) => {
                debug!(path = %entry.path().display(), "pruned orphaned directory");
                pruned.push(name);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %entry.path().display(), "orphan already removed");
            }
            Err(e) => return Err(Error::io_with_path(&e, entry.path())),
        }
    }
    pruned.sort();
    Ok(pruned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipforge_errors::NetworkError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn results_follow_id_order() {
        let ids = [30, 10, 20];
        let results = fetch_all(&ids, |id| async move {
            tokio::time::sleep(Duration::from_millis(id)).await;
            Ok(id * 2)
        })
        .await
        .unwrap();
        assert_eq!(results, vec![60, 20, 40]);
    }

    #[tokio::test]
    async fn empty_id_set_is_a_no_op() {
        let results: Vec<u64> = fetch_all(&[], |id| async move { Ok(id) }).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn single_failure_cancels_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let ids: Vec<u64> = (1..=8).collect();

        let err = fetch_all(&ids, |id| {
            let finished = finished.clone();
            async move {
                if id == 5 {
                    return Err(NetworkError::DownloadFailed(format!("item {id}")).into());
                }
                tokio::time::sleep(Duration::from_secs(30)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(id)
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::Network(NetworkError::DownloadFailed(message)) => assert_eq!(message, "item 5"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_failures_raise_one_of_them() {
        let ids = [1, 2, 3];
        let err = fetch_all(&ids, |id| async move {
            if id == 1 {
                Ok(id)
            } else {
                Err::<u64, _>(NetworkError::DownloadFailed(id.to_string()).into())
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::Network(NetworkError::DownloadFailed(message)) => {
                assert!(message == "2" || message == "3");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn prunes_only_orphaned_directories() {
        let temp = tempdir().unwrap();
        for name in ["1", "2", "3"] {
            std::fs::create_dir_all(temp.path().join(name)).unwrap();
            std::fs::write(temp.path().join(name).join("Multimedia.xml"), b"<x/>").unwrap();
        }
        std::fs::write(temp.path().join("stray.txt"), b"keep").unwrap();

        let keep: HashSet<u64> = [1, 3].into_iter().collect();
        let pruned = prune_orphans(temp.path(), &keep).await.unwrap();

        assert_eq!(pruned, vec!["2".to_string()]);
        assert!(temp.path().join("1/Multimedia.xml").exists());
        assert!(!temp.path().join("2").exists());
        assert!(temp.path().join("3/Multimedia.xml").exists());
        assert!(temp.path().join("stray.txt").exists());
    }

    #[tokio::test]
    async fn pruning_missing_directory_is_a_no_op() {
        let temp = tempdir().unwrap();
        let pruned = prune_orphans(&temp.path().join("absent"), &HashSet::new())
            .await
            .unwrap();
        assert!(pruned.is_empty());
    }
}
