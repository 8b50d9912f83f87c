//! Command-line argument parsing.
//!
//! Usage:
//!   dcmon [--tail <n>] [--no-lua] [--view <name>] [--list-views] [--] [<path>]
//!
//! `<path>` may be a project directory, a compose file, or a
//! `dcmon.lua`; with no path the most recently opened file is reused.

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    /// Start path: project directory, compose file, or `dcmon.lua`.
    pub start: Option<PathBuf>,
    /// Initial `--tail=` passed to `docker-compose logs`.
    pub tail: Option<u32>,
    /// Skip any `dcmon.lua` (`--no-lua`).
    pub no_lua: bool,
    /// Group lines through this named view.
    pub view: Option<String>,
    /// Print declared view names and exit (`--list-views`).
    pub list_views: bool,
}

/// Default `--tail=` when the flag is not given.
pub const DEFAULT_TAIL: u32 = 100;

// ── Parsing ───────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    parse(std::env::args().skip(1))
}

/// Parse an argument list (without the program name).
pub fn parse(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut out = CliArgs::default();
    let mut args = args.into_iter();
    let mut positional_only = false;

    while let Some(arg) = args.next() {
        if !positional_only && arg == "--" {
            positional_only = true;
        } else if !positional_only && arg.starts_with('-') {
            match arg.as_str() {
                "--tail" => {
                    let value = args.next().ok_or("--tail needs a value")?;
                    let n = value
                        .parse::<u32>()
                        .map_err(|_| format!("bad --tail value: {value}"))?;
                    out.tail = Some(n);
                }
                "--no-lua" => out.no_lua = true,
                "--view" => {
                    out.view = Some(args.next().ok_or("--view needs a name")?);
                }
                "--list-views" => out.list_views = true,
                _ => return Err(format!("unknown flag: {arg}")),
            }
        } else {
            if out.start.is_some() {
                return Err(format!("unexpected parameter: {arg}"));
            }
            out.start = Some(PathBuf::from(arg));
        }
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_vec(args: &[&str]) -> Result<CliArgs, String> {
        parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn empty_args_use_defaults() {
        let args = parse_vec(&[]).unwrap();
        assert_eq!(args, CliArgs::default());
    }

    #[test]
    fn positional_path_and_flags() {
        let args = parse_vec(&["--tail", "50", "--no-lua", "proj/"]).unwrap();
        assert_eq!(args.start.as_deref(), Some(std::path::Path::new("proj/")));
        assert_eq!(args.tail, Some(50));
        assert!(args.no_lua);
    }

    #[test]
    fn view_selection() {
        let args = parse_vec(&["--view", "errors"]).unwrap();
        assert_eq!(args.view.as_deref(), Some("errors"));
        let args = parse_vec(&["--list-views"]).unwrap();
        assert!(args.list_views);
    }

    #[test]
    fn double_dash_ends_flag_parsing() {
        let args = parse_vec(&["--", "--tail"]).unwrap();
        assert_eq!(args.start.as_deref(), Some(std::path::Path::new("--tail")));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse_vec(&["-x"]).is_err());
        assert!(parse_vec(&["--frobnicate"]).is_err());
    }

    #[test]
    fn second_positional_is_rejected() {
        assert!(parse_vec(&["a", "b"]).is_err());
    }

    #[test]
    fn tail_requires_a_number() {
        assert!(parse_vec(&["--tail"]).is_err());
        assert!(parse_vec(&["--tail", "lots"]).is_err());
    }
}
