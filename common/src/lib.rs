//! Segmented concurrent copy of a single file
//!
//! The source's byte range is split into one [`partition::Segment`] per worker. Each worker
//! reads its segment through its own source handle and writes it to the single shared
//! destination handle at the same offset. The destination is wrapped in
//! [`sync::SharedDestination`], which runs every seek-then-write pair under one lock so workers
//! can never move the file position out from under each other.
//!
//! [`copy::copy`] drives a job end to end; [`run`] wraps it in a tokio runtime with logging and
//! throttling configured, for use from binaries.

pub mod config;
pub mod copy;
pub mod error;
pub mod partition;
pub mod probe;
pub mod reporter;
pub mod segment;
pub mod sync;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, ThrottleConfig};
pub use copy::{CopyJob, Settings, Summary};
pub use error::Error;
pub use reporter::Reporter;

/// Share of the open files limit used when `max_open_files` is not given.
const OPEN_FILES_LIMIT_SHARE: f64 = 0.8;

fn default_max_open_files() -> Option<usize> {
    match nix::sys::resource::getrlimit(nix::sys::resource::Resource::RLIMIT_NOFILE) {
        Ok((soft, _hard)) => {
            let limit = (soft as f64 * OPEN_FILES_LIMIT_SHARE) as usize;
            Some(std::cmp::max(limit, 1))
        }
        Err(err) => {
            tracing::info!("failed reading the open files limit, not capping workers: {}", err);
            None
        }
    }
}

fn init_logging(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(
            tracing_subscriber::filter::LevelFilter::from_level(output.log_level()).into(),
        )
        .parse_lossy("");
    // a subscriber may already be installed, e.g. under tests
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn setup_throttle(throttle: &ThrottleConfig) {
    if let Some(max_open_files) = throttle.max_open_files.or_else(default_max_open_files) {
        tracing::debug!("capping concurrent segment workers at {}", max_open_files);
        throttle::set_max_open_files(max_open_files);
    }
    if throttle.iops_throttle > 0 {
        let (tokens, interval) = throttle::replenish_schedule(throttle.iops_throttle);
        throttle::init_chunk_tokens(tokens);
        tokio::spawn(throttle::run_chunk_replenish_thread(tokens, interval));
    }
}

/// Runs `func` on a fresh tokio runtime.
///
/// Failures are printed through `reporter`, one line per distinct failure. Returns `None` if the
/// runtime could not be built or `func` failed, so the caller can exit non-zero.
pub fn run<Fut>(
    reporter: &Reporter,
    output: OutputConfig,
    runtime: RuntimeConfig,
    throttle: ThrottleConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Fut: std::future::Future<Output = Result<Summary, copy::Error>>,
{
    init_logging(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(err) => {
            let err = Error::from_io(err, "failed to start runtime");
            reporter.report_error(&err);
            return None;
        }
    };
    let res = tokio_runtime.block_on(async {
        setup_throttle(&throttle);
        func().await
    });
    match res {
        Ok(summary) => {
            if output.print_summary {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            reporter.report_error(&error.source);
            if output.print_summary {
                println!("{}", error.summary);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_open_files_cap_is_positive() {
        if let Some(limit) = default_max_open_files() {
            assert!(limit >= 1);
        }
    }
}
