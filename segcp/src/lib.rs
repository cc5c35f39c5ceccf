//! Segmented file copy - `segcp`
//!
//! `segcp` copies one regular file to a new destination by splitting its byte range into N
//! contiguous segments and copying each segment with its own concurrent worker. On storage that
//! benefits from overlapped I/O this cuts wall-clock time for large files.
//!
//! ```bash
//! # copy with 8 workers
//! segcp /data/big.img /backup/big.img 8
//!
//! # copy into a directory, keeping the file name, and print a summary
//! segcp /data/big.img /backup/ 8 --summary
//! ```
//!
//! The destination is always created fresh: `segcp` never overwrites an existing file. The
//! source's permission bits are carried over.
//!
//! # Exit codes
//!
//! - `0` - the whole file was copied
//! - `1` - wrong number of arguments, a non-positive worker count, or any copy failure
//!
//! Every failure is reported on stderr as `segcp: <error>[: <path>]`, one line per failure.

pub mod path;
