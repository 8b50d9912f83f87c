//! The `docker-compose logs` follower.
//!
//! Spawns `docker-compose -f FILE logs --no-color --follow --tail=N
//! --timestamps`, parses each line with [`logline::parse`], and feeds
//! the result through an mpsc channel to the main loop (which applies
//! the user's Lua filters — the interpreter is single-threaded and
//! never leaves that loop).
//!
//! When docker reports its log-grab EOF error, or the child exits while
//! we are still supposed to be following, the child is relaunched.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::logline::{self, RawLine, LOG_EOF_MARKER};

/// How the child process is launched; parameterized so tests can
/// substitute a shell one-liner for docker.
#[derive(Debug, Clone)]
pub struct StreamCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl StreamCommand {
    /// The real thing: follow a compose project's logs.
    pub fn compose_logs(compose_file: &Path, tail: u32) -> Self {
        Self {
            program: "docker-compose".into(),
            args: vec![
                "-f".into(),
                compose_file.display().to_string(),
                "logs".into(),
                "--no-color".into(),
                "--follow".into(),
                format!("--tail={tail}"),
                "--timestamps".into(),
            ],
        }
    }
}

/// Handle to a running log follower.
#[derive(Debug)]
pub struct LogStream {
    pub events: mpsc::Receiver<RawLine>,
    stop: watch::Sender<bool>,
}

impl LogStream {
    /// Spawn the follower task.
    pub fn spawn(command: StreamCommand) -> Self {
        Self::spawn_with_relaunch(command, true)
    }

    /// Spawn without relaunch-on-exit (used by tests with finite input).
    pub fn spawn_once(command: StreamCommand) -> Self {
        Self::spawn_with_relaunch(command, false)
    }

    fn spawn_with_relaunch(command: StreamCommand, relaunch: bool) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(follow_loop(command, tx, stop_rx, relaunch));
        Self { events: rx, stop: stop_tx }
    }

    /// Stop following and kill the child.
    pub fn terminate(&self) {
        let _ = self.stop.send(true);
    }
}

async fn follow_loop(
    command: StreamCommand,
    tx: mpsc::Sender<RawLine>,
    mut stop: watch::Receiver<bool>,
    relaunch: bool,
) {
    loop {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(c) => c,
            Err(_) => return,
        };
        let Some(stdout) = child.stdout.take() else {
            return;
        };
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let Some(raw) = logline::parse(&line) else { continue };
                            // The broken-stream marker is swallowed; the
                            // child exits shortly after and is relaunched.
                            if raw.message.contains(LOG_EOF_MARKER) {
                                continue;
                            }
                            if tx.send(raw).await.is_err() {
                                let _ = child.kill().await;
                                return;
                            }
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
                changed = stop.changed() => {
                    // A send of `true` or a dropped handle both end the follow.
                    if changed.is_err() || *stop.borrow() {
                        let _ = child.kill().await;
                        return;
                    }
                }
            }
        }

        let _ = child.kill().await;
        let _ = child.wait().await;
        if !relaunch || *stop.borrow() {
            return;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> StreamCommand {
        StreamCommand {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[tokio::test]
    async fn streams_parsed_lines() {
        let cmd = shell(
            "printf 'web | 2024-01-01T00:00:00Z hello\\ndb | ready\\nAttaching to x\\n'",
        );
        let mut stream = LogStream::spawn_once(cmd);

        let first = stream.events.recv().await.unwrap();
        assert_eq!(first.container, "web");
        assert_eq!(first.message, "hello");
        assert_eq!(first.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));

        let second = stream.events.recv().await.unwrap();
        assert_eq!(second.container, "db");
        assert_eq!(second.message, "ready");

        // The bannerless third line is skipped; channel closes on exit.
        assert!(stream.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn eof_marker_lines_are_not_forwarded() {
        let cmd = shell(
            "printf 'web | Error grabbing logs: unexpected EOF\\nweb | after\\n'",
        );
        let mut stream = LogStream::spawn_once(cmd);
        // The marker line is swallowed; the rest of the stream still
        // arrives.
        let ev = stream.events.recv().await.unwrap();
        assert_eq!(ev.message, "after");
    }

    #[tokio::test]
    async fn terminate_closes_the_stream() {
        let cmd = shell("printf 'web | one\\n'; sleep 30");
        let mut stream = LogStream::spawn(cmd);
        let ev = stream.events.recv().await.unwrap();
        assert_eq!(ev.message, "one");
        stream.terminate();
        assert!(stream.events.recv().await.is_none());
    }
}
