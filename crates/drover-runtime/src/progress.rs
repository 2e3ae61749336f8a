//! Structured progress extraction from subprocess stdout.
//!
//! Background processes report progress by printing marker lines:
//!
//! ```text
//! PROGRESS:<percent 0-100>:<free-text message>
//! ```
//!
//! The parser sits behind a trait so an alternative transport (e.g. a
//! side-channel pipe) can be substituted without touching the executor or
//! the job state machine. Lines that do not match are not progress; the
//! executor still captures them in the job's output tail.

/// A parsed progress report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Percent complete, 0-100.
    pub percent: u8,
    /// Free-text message (may be empty).
    pub message: String,
}

/// Extracts progress reports from subprocess output lines.
pub trait ProgressParser: Send + Sync {
    /// Parse one output line; `None` when the line carries no progress.
    fn parse_line(&self, line: &str) -> Option<ProgressUpdate>;
}

/// Parser for the `PROGRESS:<percent>:<message>` marker format.
#[derive(Clone, Copy, Debug, Default)]
pub struct MarkerProgressParser;

impl ProgressParser for MarkerProgressParser {
    fn parse_line(&self, line: &str) -> Option<ProgressUpdate> {
        let rest = line.trim_end().strip_prefix("PROGRESS:")?;
        let (percent_str, message) = match rest.split_once(':') {
            Some((p, m)) => (p, m),
            None => (rest, ""),
        };
        let percent: u8 = percent_str.trim().parse().ok()?;
        if percent > 100 {
            return None;
        }
        Some(ProgressUpdate {
            percent,
            message: message.trim().to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ProgressUpdate> {
        MarkerProgressParser.parse_line(line)
    }

    #[test]
    fn parses_basic_marker() {
        let update = parse("PROGRESS:50:halfway there").unwrap();
        assert_eq!(update.percent, 50);
        assert_eq!(update.message, "halfway there");
    }

    #[test]
    fn boundaries_zero_and_hundred() {
        assert_eq!(parse("PROGRESS:0:starting").unwrap().percent, 0);
        assert_eq!(parse("PROGRESS:100:done").unwrap().percent, 100);
    }

    #[test]
    fn message_may_contain_colons() {
        let update = parse("PROGRESS:75:uploading chunk 3: retry 1").unwrap();
        assert_eq!(update.percent, 75);
        assert_eq!(update.message, "uploading chunk 3: retry 1");
    }

    #[test]
    fn missing_message_is_empty() {
        let update = parse("PROGRESS:10").unwrap();
        assert_eq!(update.percent, 10);
        assert_eq!(update.message, "");
    }

    #[test]
    fn out_of_range_is_not_progress() {
        assert!(parse("PROGRESS:101:too much").is_none());
        assert!(parse("PROGRESS:-5:negative").is_none());
    }

    #[test]
    fn non_marker_lines_ignored() {
        assert!(parse("building module foo").is_none());
        assert!(parse("progress:50:lowercase").is_none());
        assert!(parse("PROGRESS abc").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn garbage_percent_is_not_progress() {
        assert!(parse("PROGRESS:fifty:words").is_none());
        assert!(parse("PROGRESS::no percent").is_none());
    }

    #[test]
    fn trailing_newline_tolerated() {
        let update = parse("PROGRESS:25:quarter\n").unwrap();
        assert_eq!(update.percent, 25);
        assert_eq!(update.message, "quarter");
    }
}
