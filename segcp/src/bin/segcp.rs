use clap::Parser;
use tracing::instrument;

use segcp_tools_segcp::path;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "segcp",
    version,
    about = "Copy one large file using N concurrent workers, each copying its own byte range",
    long_about = "`segcp` copies a single regular file to a new destination by splitting it into N contiguous segments and copying every segment with a separate concurrent worker.

All workers write into one shared destination handle; each chunk is written at its own absolute offset under a lock, so the order in which workers finish does not matter.

The destination must not exist - `segcp` never overwrites. The source's permission bits are preserved.

EXIT CODES:
    0 - File copied
    1 - Wrong number of arguments, non-positive worker count, or any copy failure

EXAMPLES:
    # Copy with 8 workers
    segcp /data/big.img /backup/big.img 8

    # Copy into a directory, keep the file name and print a summary
    segcp /data/big.img /backup/ 8 --summary

    # Larger chunks, and remove the destination if anything fails
    segcp /data/big.img /backup/big.img 16 --chunk-size 1MiB --remove-partial"
)]
struct Args {
    // Copy options
    /// Bytes read and written per chunk
    ///
    /// Each chunk write takes the destination lock once. Accepts sizes like "4KiB", "1MiB".
    #[arg(
        long,
        default_value = "4KiB",
        value_name = "SIZE",
        help_heading = "Copy options"
    )]
    chunk_size: bytesize::ByteSize,

    /// Remove the destination if the copy fails after it was created
    ///
    /// By default a failed copy leaves the (possibly incomplete) destination in place.
    #[arg(long, help_heading = "Copy options")]
    remove_partial: bool,

    // Progress & output
    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Maximum number of workers with an open source file (0 = no limit, unspecified = 80% of system limit)
    ///
    /// Workers over the limit wait their turn; every segment is still copied.
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    max_open_files: Option<usize>,

    /// Limit chunk writes per second (0 = no throttle)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Performance & throttling"
    )]
    iops_throttle: usize,

    // Advanced settings
    /// Number of worker threads (0 = number of CPU cores)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads (0 = Tokio default of 512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// File to copy
    #[arg()]
    src: String,

    /// New file to create, or an existing directory followed by '/'
    #[arg()]
    dst: String,

    /// Number of segments, each copied by its own worker (must be positive)
    #[arg(allow_hyphen_values = true)]
    workers: String,
}

/// Maps a clap failure to a diagnostic message and, where clap knows it, the offending argument.
fn describe_parse_error(err: &clap::Error) -> (String, Option<String>) {
    use clap::error::{ContextKind, ContextValue, ErrorKind};
    match err.kind() {
        ErrorKind::MissingRequiredArgument | ErrorKind::WrongNumberOfValues => {
            ("Wrong number of parameters".to_string(), None)
        }
        ErrorKind::UnknownArgument => match err.get(ContextKind::InvalidArg) {
            Some(ContextValue::String(arg)) if arg.starts_with('-') => {
                (format!("Unknown option '{arg}'"), None)
            }
            _ => ("Wrong number of parameters".to_string(), None),
        },
        ErrorKind::ValueValidation | ErrorKind::InvalidValue => {
            // clap renders the flag as "--chunk-size <SIZE>"
            let arg = match err.get(ContextKind::InvalidArg) {
                Some(ContextValue::String(arg)) => arg.split_whitespace().next().map(str::to_string),
                _ => None,
            };
            let value = match err.get(ContextKind::InvalidValue) {
                Some(ContextValue::String(value)) => Some(value.clone()),
                _ => None,
            };
            let detail = match (arg, value) {
                (Some(arg), Some(value)) => Some(format!("{arg} {value}")),
                (arg, value) => arg.or(value),
            };
            ("invalid value".to_string(), detail)
        }
        kind => (
            kind.as_str().unwrap_or("Invalid arguments").to_string(),
            None,
        ),
    }
}

/// Like `atoi`: anything that is not a number counts as zero and is rejected with the
/// non-positive values.
fn parse_workers(workers: &str) -> i64 {
    workers.trim().parse::<i64>().unwrap_or(0)
}

#[instrument]
fn build_job(args: &Args) -> Result<common::CopyJob, common::Error> {
    let workers = parse_workers(&args.workers);
    if workers < 1 {
        return Err(common::Error::argument("Number of workers must be positive"));
    }
    if args.chunk_size.0 == 0 {
        return Err(common::Error::argument("Chunk size must be positive"));
    }
    let dst = path::resolve_destination_path(&args.src, &args.dst)?;
    let src = path::canonicalize_source(&args.src)?;
    let dst = path::canonicalize_destination(&dst)?;
    tracing::debug!("resolved {:?} -> {:?}", src, dst);
    common::CopyJob::new(src, dst, workers)
}

async fn async_main(
    job: common::CopyJob,
    settings: common::Settings,
) -> Result<common::Summary, common::copy::Error> {
    common::copy::copy(&job, &settings).await
}

fn main() {
    let argv0 = std::env::args().next();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            use clap::error::ErrorKind;
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                err.exit();
            }
            let reporter = common::Reporter::from_argv0(argv0.as_deref(), "segcp", false);
            let (message, detail) = describe_parse_error(&err);
            reporter.report(&message, detail.as_deref());
            std::process::exit(1);
        }
    };
    let reporter = common::Reporter::from_argv0(argv0.as_deref(), "segcp", args.quiet);
    let job = match build_job(&args) {
        Ok(job) => job,
        Err(err) => {
            reporter.report_error(&err);
            std::process::exit(1);
        }
    };
    let settings = common::Settings {
        chunk_size: usize::try_from(args.chunk_size.0).unwrap_or(usize::MAX),
        remove_partial: args.remove_partial,
    };
    let func = || async_main(job, settings);
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary || args.verbose > 0,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let throttle = common::ThrottleConfig {
        max_open_files: args.max_open_files,
        iops_throttle: args.iops_throttle,
    };
    let res = common::run(&reporter, output, runtime, throttle, func);
    if res.is_none() {
        std::process::exit(1);
    }
}
