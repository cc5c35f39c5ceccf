use std::os::unix::fs::PermissionsExt;

use tracing::instrument;

use crate::error::{self, SegmentError};
use crate::partition::{self, Segment};
use crate::probe;
use crate::segment::{self, WorkerOutcome};
use crate::sync::SharedDestination;

/// Error type for copy operations that preserves the job summary even on failure.
///
/// # Logging Convention
/// The Display implementation shows the primary failure (the first failed segment, in segment
/// order, for worker failures):
/// ```ignore
/// tracing::error!("copy failed: {}", &error);
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct Error {
    #[source]
    pub source: error::Error,
    pub summary: Summary,
}

impl Error {
    #[must_use]
    pub fn new(source: error::Error, summary: Summary) -> Self {
        Error { source, summary }
    }
}

/// A validated request to copy one file using `workers` segments.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub source: std::path::PathBuf,
    pub destination: std::path::PathBuf,
    pub workers: std::num::NonZeroUsize,
}

impl CopyJob {
    pub fn new(
        source: std::path::PathBuf,
        destination: std::path::PathBuf,
        workers: i64,
    ) -> Result<Self, error::Error> {
        let workers = usize::try_from(workers)
            .ok()
            .and_then(std::num::NonZeroUsize::new)
            .ok_or_else(|| error::Error::argument("Number of workers must be positive"))?;
        Ok(Self {
            source,
            destination,
            workers,
        })
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Settings {
    /// Bytes read and written per lock acquisition, must be > 0
    pub chunk_size: usize,
    /// Remove the destination if the job fails after creating it
    pub remove_partial: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chunk_size: segment::DEFAULT_CHUNK_SIZE,
            remove_partial: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_copied: u64,
    pub segments_copied: usize,
    pub segments_failed: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            bytes_copied: self.bytes_copied + other.bytes_copied,
            segments_copied: self.segments_copied + other.segments_copied,
            segments_failed: self.segments_failed + other.segments_failed,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes copied: {}\n\
            segments copied: {}\n\
            segments failed: {}",
            bytesize::ByteSize(self.bytes_copied),
            self.segments_copied,
            self.segments_failed,
        )
    }
}

/// Coordinator progress through a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Init,
    DestinationCreated,
    SizeKnown,
    Partitioned,
    WorkersRunning,
    Joined,
    Done,
    Failed,
}

fn advance(state: &mut State, next: State) {
    tracing::debug!("state {:?} -> {:?}", state, next);
    *state = next;
}

/// Creates `path` exclusively. Permissions are applied by [`fill_destination`], so a failed chmod
/// counts as a failure after creation.
async fn create_destination(
    path: &std::path::Path,
    mode: u32,
) -> Result<tokio::fs::File, error::Error> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode & 0o777)
        .open(path)
        .await
        .map_err(|err| error::Error::from_io(err, path.display().to_string()))
}

/// Copies `job.source` to a new file at `job.destination` with one worker per segment.
///
/// Never overwrites: an existing destination fails with `AlreadyExists` and is left untouched.
/// All segments are attempted even if some fail. The destination handle is released on every
/// path out of this function.
#[instrument]
pub async fn copy(job: &CopyJob, settings: &Settings) -> Result<Summary, Error> {
    let mut state = State::Init;
    tracing::debug!("reading source metadata");
    let src_metadata = tokio::fs::metadata(&job.source)
        .await
        .map_err(|err| {
            Error::new(
                error::Error::from_io(err, job.source.display().to_string()),
                Default::default(),
            )
        })?;
    let mode = src_metadata.permissions().mode() & 0o7777;
    let file = create_destination(&job.destination, mode)
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    advance(&mut state, State::DestinationCreated);
    copy_created(job, settings, file, mode, &mut state).await
}

/// Everything after the destination exists: on failure the destination is removed if
/// `settings.remove_partial` is set.
async fn copy_created(
    job: &CopyJob,
    settings: &Settings,
    file: tokio::fs::File,
    mode: u32,
    state: &mut State,
) -> Result<Summary, Error> {
    let result = fill_destination(job, settings, file, mode, state).await;
    match &result {
        Ok(summary) => {
            advance(state, State::Done);
            tracing::info!("copied {:?} -> {:?}: {:?}", job.source, job.destination, summary);
        }
        Err(error) => {
            advance(state, State::Failed);
            tracing::info!("copy {:?} -> {:?} failed: {}", job.source, job.destination, error);
            if settings.remove_partial {
                remove_partial(&job.destination).await;
            }
        }
    }
    result
}

async fn fill_destination(
    job: &CopyJob,
    settings: &Settings,
    file: tokio::fs::File,
    mode: u32,
    state: &mut State,
) -> Result<Summary, Error> {
    let detail = || job.destination.display().to_string();
    // creation mode is filtered by the umask
    file.set_permissions(std::fs::Permissions::from_mode(mode & 0o777))
        .await
        .map_err(|err| Error::new(error::Error::from_io(err, detail()), Default::default()))?;
    let destination = std::sync::Arc::new(SharedDestination::new(file, &job.destination));
    let result = copy_into(job, settings, &destination, state).await;
    let closed = destination.close().await;
    let summary = match (result, closed) {
        (Ok(summary), Ok(())) => summary,
        (Ok(summary), Err(err)) => return Err(Error::new(err, summary)),
        (Err(err), _) => return Err(err),
    };
    if mode & !0o777 != 0 {
        // writes clear setgid, so special bits go on once the content is in place
        tokio::fs::set_permissions(&job.destination, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|err| Error::new(error::Error::from_io(err, detail()), summary))?;
    }
    Ok(summary)
}

async fn copy_into(
    job: &CopyJob,
    settings: &Settings,
    destination: &std::sync::Arc<SharedDestination>,
    state: &mut State,
) -> Result<Summary, Error> {
    let total_size = probe::size(&job.source)
        .await
        .map_err(|err| Error::new(err, Default::default()))?;
    advance(state, State::SizeKnown);
    let segments = partition::partition(total_size, job.workers);
    advance(state, State::Partitioned);
    advance(state, State::WorkersRunning);
    let outcomes = run_workers(&job.source, destination, segments, settings.chunk_size).await;
    advance(state, State::Joined);
    aggregate(outcomes)
}

async fn remove_partial(path: &std::path::Path) {
    tracing::debug!("removing partial destination {:?}", path);
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!("failed removing partial destination {:?}: {}", path, err);
    }
}

/// Runs one worker per segment and waits for all of them. Outcomes are returned in segment
/// order, whatever order the workers finished in.
pub(crate) async fn run_workers(
    source: &std::path::Path,
    destination: &std::sync::Arc<SharedDestination>,
    segments: Vec<Segment>,
    chunk_size: usize,
) -> Vec<WorkerOutcome> {
    let mut join_set = tokio::task::JoinSet::new();
    let mut spawned = std::collections::HashMap::new();
    for (idx, segment) in segments.iter().copied().enumerate() {
        let source = source.to_owned();
        let destination = destination.clone();
        let do_copy = || async move {
            segment::copy_segment(&source, &destination, segment, chunk_size).await
        };
        let handle = join_set.spawn(do_copy());
        spawned.insert(handle.id(), idx);
    }
    let mut outcomes: Vec<Option<WorkerOutcome>> = segments.iter().map(|_| None).collect();
    while let Some(res) = join_set.join_next_with_id().await {
        match res {
            Ok((id, outcome)) => {
                if let Some(idx) = spawned.get(&id) {
                    outcomes[*idx] = Some(outcome);
                }
            }
            Err(join_error) => {
                if let Some(idx) = spawned.get(&join_error.id()) {
                    let segment = segments[*idx];
                    tracing::warn!("worker for segment {} died: {}", segment, join_error);
                    outcomes[*idx] = Some(WorkerOutcome {
                        segment,
                        result: Err(error::Error::from_io(
                            std::io::Error::other(join_error),
                            format!("segment {segment}"),
                        )),
                    });
                }
            }
        }
    }
    outcomes
        .into_iter()
        .zip(segments)
        .map(|(outcome, segment)| {
            outcome.unwrap_or_else(|| WorkerOutcome {
                segment,
                result: Err(error::Error::sync(
                    "worker finished without reporting an outcome",
                    format!("segment {segment}"),
                )),
            })
        })
        .collect()
}

fn aggregate(outcomes: Vec<WorkerOutcome>) -> Result<Summary, Error> {
    let mut summary = Summary::default();
    let mut failures = vec![];
    for WorkerOutcome { segment, result } in outcomes {
        match result {
            Ok(bytes) => {
                summary = summary
                    + Summary {
                        bytes_copied: bytes,
                        segments_copied: 1,
                        ..Default::default()
                    };
            }
            Err(error) => {
                tracing::warn!("segment {} failed with: {}", segment, &error);
                summary.segments_failed += 1;
                failures.push(SegmentError { segment, error });
            }
        }
    }
    if failures.is_empty() {
        Ok(summary)
    } else {
        Err(Error::new(error::Error::Segments { failures }, summary))
    }
}
