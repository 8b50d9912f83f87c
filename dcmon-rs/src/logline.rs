//! Raw log line parsing and cleanup.
//!
//! `docker-compose logs --timestamps` emits lines of the form
//!
//! ```text
//! container-name    | 2024-05-01T12:34:56.789012345Z message text
//! ```
//!
//! [`parse`] splits off the container name and timestamp;
//! [`clean_message`] removes ANSI SGR color sequences, any timestamps
//! the application itself prefixed to its output, and trailing
//! whitespace.

use std::sync::LazyLock;

use regex::Regex;

/// Leading ISO-8601-ish timestamps (optionally bracketed, repeated)
/// that applications commonly print at the start of their own output.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:\[?\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(?::\d{2}(?:[.,]\d+)?)? ?(?:Z|UTC)?\]?\s?)+",
    )
    .expect("timestamp regex")
});

/// Marker docker emits when the log stream breaks and must be relaunched.
pub const LOG_EOF_MARKER: &str = "Error grabbing logs: unexpected EOF";

// ── Parsed line ───────────────────────────────────────────────────────────

/// One log line as split from the compose stream, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub container: String,
    /// The docker-side timestamp, verbatim (e.g.
    /// `2024-05-01T12:34:56.789012345Z`), when present.
    pub timestamp: Option<String>,
    pub message: String,
}

/// Split a compose log line into container, timestamp, and message.
///
/// Lines without the `container |` prefix (startup banners, attach
/// notices) yield `None` and are skipped by the caller.
pub fn parse(line: &str) -> Option<RawLine> {
    let (container, rest) = line.split_once('|')?;
    let container = container.trim();
    if container.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(' ').unwrap_or(rest);

    // With --timestamps the message is preceded by an RFC 3339 stamp
    // ending in `Z `.
    let (timestamp, message) = match rest.find("Z ") {
        Some(z) => {
            let (ts, msg) = rest.split_at(z + 1);
            (Some(ts.trim().to_owned()), &msg[1..])
        }
        None => (None, rest),
    };

    Some(RawLine {
        container: container.to_owned(),
        timestamp,
        message: message.trim_end().to_owned(),
    })
}

/// Remove ANSI SGR sequences from `msg`.
///
/// Well-formed color sequences (`ESC [ <digits/;> m`) are deleted;
/// a malformed escape is made visible as `<ESC>` rather than leaking a
/// raw control byte into the display.
pub fn strip_color(msg: &str) -> String {
    let bytes = msg.as_bytes();
    let mut out = String::with_capacity(msg.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x1b && i + 1 < bytes.len() && bytes[i + 1] == b'[' {
            let mut j = i + 2;
            while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b';') {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'm' {
                i = j + 1;
                continue;
            }
            out.push_str("<ESC>");
            i += 1;
            continue;
        }
        if bytes[i] == 0x1b {
            out.push_str("<ESC>");
            i += 1;
            continue;
        }
        // Copy one whole UTF-8 scalar.
        let ch_len = utf8_len(bytes[i]);
        let end = (i + ch_len).min(bytes.len());
        out.push_str(&msg[i..end]);
        i = end;
    }
    out
}

fn utf8_len(first: u8) -> usize {
    match first {
        b if b < 0x80 => 1,
        b if b & 0xe0 == 0xc0 => 2,
        b if b & 0xf0 == 0xe0 => 3,
        b if b & 0xf8 == 0xf0 => 4,
        _ => 1,
    }
}

/// Full cleanup pass: strip color, drop leading application
/// timestamps, trim trailing whitespace.
pub fn clean_message(msg: &str) -> String {
    let stripped = strip_color(msg);
    let stripped = TIMESTAMP_RE.replace(&stripped, "");
    stripped.trim_end().to_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_container_timestamp_and_message() {
        let line = "web-1    | 2024-05-01T12:34:56.789012345Z GET /health 200";
        let raw = parse(line).unwrap();
        assert_eq!(raw.container, "web-1");
        assert_eq!(raw.timestamp.as_deref(), Some("2024-05-01T12:34:56.789012345Z"));
        assert_eq!(raw.message, "GET /health 200");
    }

    #[test]
    fn parses_line_without_timestamp() {
        let raw = parse("db | ready to accept connections").unwrap();
        assert_eq!(raw.container, "db");
        assert_eq!(raw.timestamp, None);
        assert_eq!(raw.message, "ready to accept connections");
    }

    #[test]
    fn rejects_lines_without_pipe() {
        assert_eq!(parse("Attaching to web-1, db-1"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn strips_well_formed_sgr_sequences() {
        assert_eq!(strip_color("\u{1b}[31mred\u{1b}[0m plain"), "red plain");
        assert_eq!(strip_color("\u{1b}[1;32mbold green\u{1b}[m"), "bold green");
    }

    #[test]
    fn malformed_escape_becomes_visible() {
        assert_eq!(strip_color("\u{1b}[9Xoops"), "<ESC>[9Xoops");
        assert_eq!(strip_color("tail\u{1b}"), "tail<ESC>");
    }

    #[test]
    fn clean_message_drops_leading_app_timestamps() {
        assert_eq!(
            clean_message("2024-05-01 12:34:56.123 starting up"),
            "starting up"
        );
        assert_eq!(
            clean_message("[2024-05-01T12:34:56Z] 2024-05-01T12:34:57Z chained"),
            "chained"
        );
        assert_eq!(clean_message("no timestamp here"), "no timestamp here");
    }

    #[test]
    fn clean_message_trims_trailing_whitespace() {
        assert_eq!(clean_message("hello   \t"), "hello");
    }

    #[test]
    fn multibyte_text_survives_stripping() {
        assert_eq!(strip_color("\u{1b}[36m日本語\u{1b}[0m"), "日本語");
    }
}
