use std::io::Write;

use crate::error::Error;

/// Emits one diagnostic line per event to stderr: `<program>: <message>[: <detail>]`.
#[derive(Debug, Clone)]
pub struct Reporter {
    program: String,
    quiet: bool,
}

impl Reporter {
    pub fn new(program: impl Into<String>, quiet: bool) -> Self {
        Self {
            program: program.into(),
            quiet,
        }
    }

    /// Uses the file name of `argv[0]`, falling back to `fallback` when it is unavailable.
    pub fn from_argv0(argv0: Option<&str>, fallback: &str, quiet: bool) -> Self {
        let program = argv0
            .and_then(|arg| std::path::Path::new(arg).file_name())
            .and_then(|name| name.to_str())
            .unwrap_or(fallback);
        Self::new(program, quiet)
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn report(&self, message: &str, detail: Option<&str>) {
        if self.quiet {
            return;
        }
        let stderr = std::io::stderr();
        // nowhere left to report a failure to write to stderr
        let _ = self.write_line(&mut stderr.lock(), message, detail);
    }

    pub fn report_error(&self, error: &Error) {
        for err in error.distinct() {
            self.report(&err.message(), err.detail());
        }
    }

    pub fn write_line(
        &self,
        out: &mut impl Write,
        message: &str,
        detail: Option<&str>,
    ) -> std::io::Result<()> {
        writeln!(out, "{}", format_line(&self.program, message, detail))
    }
}

#[must_use]
pub fn format_line(program: &str, message: &str, detail: Option<&str>) -> String {
    match detail {
        Some(detail) => format!("{program}: {message}: {detail}"),
        None => format!("{program}: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_without_detail() {
        assert_eq!(
            format_line("segcp", "Wrong number of parameters", None),
            "segcp: Wrong number of parameters"
        );
    }

    #[test]
    fn line_with_detail() {
        assert_eq!(
            format_line("segcp", "File exists", Some("/tmp/dst")),
            "segcp: File exists: /tmp/dst"
        );
    }

    #[test]
    fn write_line_appends_newline() {
        let reporter = Reporter::new("segcp", false);
        let mut out = Vec::new();
        reporter
            .write_line(&mut out, "Permission denied", Some("/root/secret"))
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "segcp: Permission denied: /root/secret\n"
        );
    }

    #[test]
    fn program_name_is_basename_of_argv0() {
        let reporter = Reporter::from_argv0(Some("/usr/local/bin/segcp"), "fallback", false);
        assert_eq!(reporter.program(), "segcp");
        let reporter = Reporter::from_argv0(None, "fallback", false);
        assert_eq!(reporter.program(), "fallback");
    }
}
