use tracing::instrument;

use crate::error::Error;

/// Returns the byte length of the regular file at `path` without reading its content.
///
/// The path is stat'ed before it is opened: opening a FIFO read-only blocks until a writer
/// shows up, so anything but a regular file is rejected first. The file is then opened
/// read-only so that an unreadable source fails here rather than inside a worker.
#[instrument]
pub async fn size(path: &std::path::Path) -> Result<u64, Error> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| Error::from_io(err, path.display().to_string()))?;
    if metadata.is_dir() {
        return Err(Error::from_errno(
            nix::errno::Errno::EISDIR,
            path.display().to_string(),
        ));
    }
    if !metadata.is_file() {
        return Err(Error::from_errno(
            nix::errno::Errno::EINVAL,
            path.display().to_string(),
        ));
    }
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| Error::from_io(err, path.display().to_string()))?;
    let len = file
        .metadata()
        .await
        .map_err(|err| Error::from_io(err, path.display().to_string()))?
        .len();
    tracing::debug!("source is {} bytes", len);
    Ok(len)
}
