use std::error::Error as StdError;
use std::io;
use std::path::Path;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("File size exceeds max limit of {0} bytes")]
    PayloadTooLarge(u64),
    #[error("Upload stream ended early: {0}")]
    Incomplete(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] io::Error),
}

/// Streams `stream` into `dest`, never holding more than one chunk in memory.
///
/// Bytes land in a hidden temp file next to `dest` and are renamed into place
/// only once the whole stream is written and synced. Any failure drops the
/// temp file, so `dest` either holds the full stream or does not exist.
pub async fn save<S, E>(stream: S, dest: &Path, max_bytes: u64) -> Result<u64, BlobError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: StdError,
{
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
    tokio::fs::create_dir_all(parent).await?;

    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".upload-")
        .suffix(".part")
        .tempfile_in(parent)?
        .into_parts();
    let mut out = tokio::fs::File::from_std(file);

    let mut stream = std::pin::pin!(stream);
    let mut total: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BlobError::Incomplete(e.to_string()))?;
        total += chunk.len() as u64;
        if total > max_bytes {
            tracing::warn!(dest = %dest.display(), limit = max_bytes, "upload over size cap, discarding");
            return Err(BlobError::PayloadTooLarge(max_bytes));
        }
        out.write_all(&chunk).await?;
    }

    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    temp_path.persist(dest).map_err(|e| e.error)?;

    tracing::debug!(dest = %dest.display(), bytes = total, "blob saved");
    Ok(total)
}

/// Writes `bytes` to a uniquely named temp file beside `dest`, syncs it, and
/// renames it over `dest`. Concurrent writers to the same `dest` never share a
/// temp file; the last rename wins.
pub async fn write_atomic(dest: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;

    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".write-")
        .suffix(".tmp")
        .tempfile_in(parent)?
        .into_parts();
    let mut out = tokio::fs::File::from_std(file);

    out.write_all(bytes).await?;
    out.flush().await?;
    out.sync_all().await?;
    drop(out);

    temp_path.persist(dest).map_err(|e| e.error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes, io::Error>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn writes_full_stream() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/a.wav");

        let written = save(chunks(&[b"RIFF", b"data"]), &dest, 64).await.unwrap();

        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"RIFFdata");
        assert_eq!(leftovers(dest.parent().unwrap()), vec!["a.wav".to_string()]);
    }

    #[tokio::test]
    async fn exactly_at_cap_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.wav");

        let written = save(chunks(&[b"12345678"]), &dest, 8).await.unwrap();
        assert_eq!(written, 8);
    }

    #[tokio::test]
    async fn over_cap_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.wav");

        let err = save(chunks(&[b"12345678", b"12345678"]), &dest, 8)
            .await
            .unwrap_err();

        assert!(matches!(err, BlobError::PayloadTooLarge(8)));
        assert!(!dest.exists());
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn broken_stream_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.wav");
        let parts: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"RIFF")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];

        let err = save(stream::iter(parts), &dest, 64).await.unwrap_err();

        assert!(matches!(err, BlobError::Incomplete(_)));
        assert!(leftovers(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn write_atomic_replaces_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("abc.txt");

        write_atomic(&dest, b"first").await.unwrap();
        write_atomic(&dest, b"second").await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        assert_eq!(leftovers(dir.path()), vec!["abc.txt".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_atomic_writes_to_one_destination_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("abc.txt");
        let bodies: Vec<Vec<u8>> = (0..8).map(|i| vec![b'a' + i as u8; 4096]).collect();

        let results =
            futures::future::join_all(bodies.iter().map(|b| write_atomic(&dest, b))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        let written = std::fs::read(&dest).unwrap();
        assert!(bodies.contains(&written), "destination holds a torn write");
        assert_eq!(leftovers(dir.path()), vec!["abc.txt".to_string()]);
    }
}
