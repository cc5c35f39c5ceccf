//! Concurrency caps and rate limiting for segmented copies
//!
//! Two process-wide limits are provided:
//!
//! 1. **Open Files Limit** - caps how many segment workers hold an open source handle at once.
//!    Workers over the cap wait for a permit, so every segment still runs eventually.
//! 2. **Chunk Throttle** - caps the number of chunk writes per second.
//!
//! Both limits are disabled until configured with a non-zero value.
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! # async fn example() {
//! throttle::set_max_open_files(64);
//! throttle::init_chunk_tokens(10);
//! tokio::spawn(throttle::run_chunk_replenish_thread(10, Duration::from_millis(100)));
//!
//! let _guard = throttle::open_file_permit().await;
//! // open the source here
//! throttle::get_chunk_token().await;
//! // write one chunk here
//! # }
//! ```

mod semaphore;

static OPEN_FILES_LIMIT: std::sync::LazyLock<semaphore::Semaphore> =
    std::sync::LazyLock::new(semaphore::Semaphore::new);
static CHUNK_THROTTLE: std::sync::LazyLock<semaphore::Semaphore> =
    std::sync::LazyLock::new(semaphore::Semaphore::new);

pub fn set_max_open_files(max_open_files: usize) {
    OPEN_FILES_LIMIT.setup(max_open_files);
}

pub struct OpenFileGuard {
    _permit: Option<tokio::sync::SemaphorePermit<'static>>,
}

pub async fn open_file_permit() -> OpenFileGuard {
    OpenFileGuard {
        _permit: OPEN_FILES_LIMIT.acquire().await,
    }
}

pub fn init_chunk_tokens(chunk_tokens: usize) {
    CHUNK_THROTTLE.setup(chunk_tokens);
}

pub async fn get_chunk_token() {
    CHUNK_THROTTLE.consume().await;
}

pub async fn run_chunk_replenish_thread(replenish: usize, interval: std::time::Duration) {
    tracing::debug!(
        "replenishing {} chunk tokens every {:?}",
        replenish,
        interval
    );
    CHUNK_THROTTLE
        .run_replenish_thread(replenish, interval)
        .await;
}

/// Splits a per-second rate into `(tokens, interval)` so that the bucket refills in small steps.
///
/// Rates of 10/s or more refill every 100ms, lower rates refill one token at a time.
#[must_use]
pub fn replenish_schedule(per_second: usize) -> (usize, std::time::Duration) {
    if per_second >= 10 {
        (per_second / 10, std::time::Duration::from_millis(100))
    } else {
        let per_second = std::cmp::max(per_second, 1) as u64;
        (1, std::time::Duration::from_millis(1000 / per_second))
    }
}
