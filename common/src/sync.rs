use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;

use crate::error::Error;

/// The single destination handle shared by all workers.
///
/// Workers only get [`SharedDestination::seek_and_write`]: the seek and the write run under one
/// lock acquisition, so no other worker can move the file position in between. The lock is held
/// per call, never for a whole segment, which leaves reads free to overlap.
#[derive(Debug)]
pub struct SharedDestination {
    path: std::path::PathBuf,
    handle: tokio::sync::Mutex<Option<tokio::fs::File>>,
}

impl SharedDestination {
    pub fn new(file: tokio::fs::File, path: &std::path::Path) -> Self {
        Self {
            path: path.to_owned(),
            handle: tokio::sync::Mutex::new(Some(file)),
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn detail(&self) -> String {
        self.path.display().to_string()
    }

    /// Writes all of `bytes` at absolute `offset`.
    ///
    /// The write is flushed before the lock is released, so the next holder always starts from an
    /// idle handle.
    pub async fn seek_and_write(&self, offset: u64, bytes: &[u8]) -> Result<(), Error> {
        let mut guard = self.handle.lock().await;
        let file = guard
            .as_mut()
            .ok_or_else(|| Error::sync("destination handle already released", self.detail()))?;
        let pos = file
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|err| Error::from_io(err, self.detail()))?;
        if pos != offset {
            return Err(Error::from_errno(nix::errno::Errno::ESPIPE, self.detail()));
        }
        file.write_all(bytes)
            .await
            .map_err(|err| Error::from_io(err, self.detail()))?;
        file.flush()
            .await
            .map_err(|err| Error::from_io(err, self.detail()))?;
        Ok(())
    }

    /// Releases the handle after syncing it to disk. Any later write fails with a sync error.
    ///
    /// Closing an already released handle is a no-op.
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn close(&self) -> Result<(), Error> {
        let file = self.handle.lock().await.take();
        match file {
            Some(file) => {
                tracing::debug!("syncing and closing destination");
                file.sync_all()
                    .await
                    .map_err(|err| Error::from_io(err, self.detail()))
            }
            None => Ok(()),
        }
    }

    pub async fn is_released(&self) -> bool {
        self.handle.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    async fn open_destination(
        tmp_dir: &tempfile::TempDir,
    ) -> Result<SharedDestination, anyhow::Error> {
        let path = tmp_dir.path().join("dst");
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(SharedDestination::new(file, &path))
    }

    #[tokio::test]
    #[traced_test]
    async fn writes_land_at_their_offsets() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let dst = open_destination(&tmp_dir).await?;
        dst.seek_and_write(5, b"world").await?;
        dst.seek_and_write(0, b"hello").await?;
        dst.close().await?;
        assert_eq!(tokio::fs::read(dst.path()).await?, b"helloworld");
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    #[traced_test]
    async fn concurrent_writers_never_interleave() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let dst = std::sync::Arc::new(open_destination(&tmp_dir).await?);
        const WRITERS: u64 = 32;
        const CHUNK: u64 = 512;
        const ROUNDS: u64 = 16;
        let mut join_set = tokio::task::JoinSet::new();
        for writer in 0..WRITERS {
            let dst = dst.clone();
            join_set.spawn(async move {
                let fill = vec![writer as u8; CHUNK as usize];
                for round in 0..ROUNDS {
                    let offset = (round * WRITERS + writer) * CHUNK;
                    dst.seek_and_write(offset, &fill).await?;
                }
                Ok::<(), Error>(())
            });
        }
        while let Some(res) = join_set.join_next().await {
            res??;
        }
        dst.close().await?;
        let content = tokio::fs::read(dst.path()).await?;
        assert_eq!(content.len() as u64, WRITERS * CHUNK * ROUNDS);
        for (idx, chunk) in content.chunks(CHUNK as usize).enumerate() {
            let expected = (idx as u64 % WRITERS) as u8;
            assert!(chunk.iter().all(|b| *b == expected), "chunk {idx} corrupted");
        }
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn write_after_close_is_sync_error() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let dst = open_destination(&tmp_dir).await?;
        dst.close().await?;
        assert!(dst.is_released().await);
        match dst.seek_and_write(0, b"late").await {
            Err(Error::Sync { message, .. }) => {
                assert_eq!(message, "destination handle already released");
            }
            other => panic!("expected sync error, got {other:?}"),
        }
        // closing twice is harmless
        dst.close().await?;
        Ok(())
    }
}
