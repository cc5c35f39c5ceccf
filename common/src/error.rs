use crate::partition::Segment;

/// Failure taxonomy for a segmented copy.
///
/// Each variant carries the system error (or a message) and an optional detail, usually the path
/// involved. [`Error::message`] and [`Error::detail`] are what the reporter prints, in the form
/// `<program>: <message>[: <detail>]`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    Argument { message: String },
    #[error("{}", describe_io(.source))]
    NotFound {
        source: std::io::Error,
        detail: String,
    },
    #[error("{}", describe_io(.source))]
    PermissionDenied {
        source: std::io::Error,
        detail: String,
    },
    #[error("{}", describe_io(.source))]
    AlreadyExists {
        source: std::io::Error,
        detail: String,
    },
    #[error("{}", describe_io(.source))]
    Io {
        source: std::io::Error,
        detail: String,
    },
    #[error("{message}")]
    Sync { message: String, detail: String },
    /// One entry per failed worker, in segment order.
    #[error("{}", describe_segments(.failures))]
    Segments { failures: Vec<SegmentError> },
}

#[derive(Debug)]
pub struct SegmentError {
    pub segment: Segment,
    pub error: Error,
}

impl Error {
    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument {
            message: message.into(),
        }
    }

    pub fn sync(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Sync {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// Classifies an I/O error by its kind; `detail` names the path or operation involved.
    pub fn from_io(source: std::io::Error, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound { source, detail },
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied { source, detail },
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists { source, detail },
            _ => Error::Io { source, detail },
        }
    }

    pub fn from_errno(errno: nix::errno::Errno, detail: impl Into<String>) -> Self {
        Self::from_io(std::io::Error::from(errno), detail)
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Argument { .. } => None,
            Error::NotFound { detail, .. }
            | Error::PermissionDenied { detail, .. }
            | Error::AlreadyExists { detail, .. }
            | Error::Io { detail, .. }
            | Error::Sync { detail, .. } => Some(detail.as_str()),
            Error::Segments { failures } => failures.first().and_then(|f| f.error.detail()),
        }
    }

    /// Errors to report one line each: the failed segments for [`Error::Segments`], otherwise
    /// just this error.
    pub fn distinct(&self) -> Vec<&Error> {
        match self {
            Error::Segments { failures } => failures.iter().map(|f| &f.error).collect(),
            other => vec![other],
        }
    }
}

/// Renders an OS error by its errno description, without the "(os error N)" suffix.
fn describe_io(error: &std::io::Error) -> String {
    match error.raw_os_error() {
        Some(code) => nix::errno::Errno::from_raw(code).desc().to_string(),
        None => error.to_string(),
    }
}

fn describe_segments(failures: &[SegmentError]) -> String {
    match failures.first() {
        Some(first) => first.error.to_string(),
        None => "segment copy failed".to_string(),
    }
}
