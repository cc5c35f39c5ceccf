use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::instrument;

use crate::error::Error;
use crate::partition::Segment;
use crate::sync::SharedDestination;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Result reported by one worker. There is no partial success: a failed segment reports only
/// its error, never how many bytes made it.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub segment: Segment,
    pub result: Result<u64, Error>,
}

impl WorkerOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Copies `segment` of `source` to the same offset in `destination`, one chunk at a time.
///
/// Every worker opens its own source handle, so source positions are never shared. Errors are
/// returned as data in the outcome.
#[instrument(skip(destination, segment), fields(segment = %segment))]
pub async fn copy_segment(
    source: &std::path::Path,
    destination: &SharedDestination,
    segment: Segment,
    chunk_size: usize,
) -> WorkerOutcome {
    let result = copy_range(source, destination, segment, chunk_size).await;
    match &result {
        Ok(bytes) => tracing::debug!("segment done, {} bytes", bytes),
        Err(error) => tracing::debug!("segment aborted: {:#}", error),
    }
    WorkerOutcome { segment, result }
}

async fn copy_range(
    source: &std::path::Path,
    destination: &SharedDestination,
    segment: Segment,
    chunk_size: usize,
) -> Result<u64, Error> {
    if segment.is_empty() {
        return Ok(0);
    }
    if chunk_size == 0 {
        return Err(Error::argument("Chunk size must be positive"));
    }
    let _open_file_guard = throttle::open_file_permit().await;
    let source_detail = || source.display().to_string();
    let mut reader = tokio::fs::File::open(source)
        .await
        .map_err(|err| Error::from_io(err, source_detail()))?;
    reader
        .seek(std::io::SeekFrom::Start(segment.offset))
        .await
        .map_err(|err| Error::from_io(err, source_detail()))?;
    let chunk_size = chunk_size as u64;
    let mut buffer = vec![0u8; std::cmp::min(chunk_size, segment.length) as usize];
    let mut offset = segment.offset;
    while offset < segment.end() {
        let want = std::cmp::min(segment.end() - offset, chunk_size) as usize;
        let chunk = &mut buffer[..want];
        read_chunk(&mut reader, chunk)
            .await
            .map_err(|err| Error::from_io(err, source_detail()))?;
        throttle::get_chunk_token().await;
        destination.seek_and_write(offset, chunk).await?;
        offset += want as u64;
    }
    Ok(segment.length)
}

/// Fills `chunk` completely, retrying short reads. Hitting end of file first means the source
/// shrank underneath the copy.
async fn read_chunk(reader: &mut tokio::fs::File, chunk: &mut [u8]) -> std::io::Result<()> {
    match reader.read_exact(chunk).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "Source file truncated during copy",
        )),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use tracing_test::traced_test;

    async fn fresh_destination(
        path: &std::path::Path,
    ) -> Result<SharedDestination, anyhow::Error> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        Ok(SharedDestination::new(file, path))
    }

    #[tokio::test]
    #[traced_test]
    async fn copies_segment_at_its_offset() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        let content = testutils::write_random_file(&src, 3 * 4096 + 17).await?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        let segment = Segment {
            offset: 4000,
            length: 5000,
        };
        let outcome = copy_segment(&src, &dst, segment, DEFAULT_CHUNK_SIZE).await;
        assert_eq!(outcome.result?, 5000);
        dst.close().await?;
        let copied = tokio::fs::read(dst.path()).await?;
        assert_eq!(copied.len(), 9000);
        // bytes before the segment were never written
        assert!(copied[..4000].iter().all(|b| *b == 0));
        assert_eq!(&copied[4000..], &content[4000..9000]);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn chunk_size_smaller_than_segment() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        let content = testutils::write_random_file(&src, 1000).await?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        let segment = Segment {
            offset: 0,
            length: 1000,
        };
        let outcome = copy_segment(&src, &dst, segment, 7).await;
        assert!(outcome.is_success());
        dst.close().await?;
        assert_eq!(tokio::fs::read(dst.path()).await?, content);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_segment_is_a_no_op() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        // the source is never opened for an empty segment
        let outcome = copy_segment(
            &tmp_dir.path().join("missing"),
            &dst,
            Segment {
                offset: 0,
                length: 0,
            },
            DEFAULT_CHUNK_SIZE,
        )
        .await;
        assert_eq!(outcome.result?, 0);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn truncated_source_aborts_without_partial_chunk() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        testutils::write_random_file(&src, 4096 + 100).await?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        let segment = Segment {
            offset: 0,
            length: 3 * 4096,
        };
        let outcome = copy_segment(&src, &dst, segment, DEFAULT_CHUNK_SIZE).await;
        match outcome.result {
            Err(Error::Io { source, detail }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof);
                assert_eq!(detail, src.display().to_string());
            }
            other => panic!("expected truncation error, got {other:?}"),
        }
        dst.close().await?;
        // the first full chunk made it, the short second one was never written
        assert_eq!(tokio::fs::metadata(dst.path()).await?.len(), 4096);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_source_is_reported_as_not_found() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        let outcome = copy_segment(
            &tmp_dir.path().join("missing"),
            &dst,
            Segment {
                offset: 0,
                length: 10,
            },
            DEFAULT_CHUNK_SIZE,
        )
        .await;
        assert!(!outcome.is_success());
        assert!(matches!(outcome.result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn released_destination_fails_with_sync_error() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        testutils::write_random_file(&src, 100).await?;
        let dst = fresh_destination(&tmp_dir.path().join("dst")).await?;
        dst.close().await?;
        let outcome = copy_segment(
            &src,
            &dst,
            Segment {
                offset: 0,
                length: 100,
            },
            DEFAULT_CHUNK_SIZE,
        )
        .await;
        assert!(matches!(outcome.result, Err(Error::Sync { .. })));
        Ok(())
    }
}
