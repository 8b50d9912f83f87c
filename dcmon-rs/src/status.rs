//! Container status polling.
//!
//! Every five seconds the poller runs
//! `docker ps -a --format {{.Names}}|{{.State}}|{{.Status}}`, diffs the
//! result against the last known status of each tracked container, and
//! reports transitions.  The tracked set is seeded once from
//! `docker-compose ps` so containers from unrelated projects on the
//! same host are ignored.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{mpsc, watch};

/// How often the container list is re-polled.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A status transition observed by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// One container's status changed (e.g. `running`, or the exit code
    /// for exited containers).
    Changed { container: String, status: String },
    /// Every tracked container is stopped.
    AllStopped,
    /// At least one container is running again after all were stopped.
    Started,
}

// ── Line parsing ──────────────────────────────────────────────────────────

/// Parse one `docker ps --format {{.Names}}|{{.State}}|{{.Status}}` line
/// into `(name, status)`.
///
/// Exited containers report their exit code (the number from
/// `Exited (N) …`) instead of the state word.  Returns `None` for
/// malformed lines.
pub fn parse_ps_line(line: &str) -> Option<(String, String, bool)> {
    let mut parts = line.trim().splitn(3, '|');
    let name = parts.next()?.trim();
    let state = parts.next()?.trim();
    if name.is_empty() || state.is_empty() {
        return None;
    }
    if state == "exited" {
        let status = parts.next().unwrap_or("");
        let code = status
            .strip_prefix("Exited (")
            .and_then(|rest| rest.split(')').next())
            .unwrap_or("?");
        Some((name.to_owned(), code.to_owned(), false))
    } else {
        Some((name.to_owned(), state.to_owned(), true))
    }
}

/// Parse `docker-compose ps` output into the set of container names to
/// track (skips the header and separator lines).
pub fn parse_compose_ps(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('-') && !l.starts_with("Name ") && !l.starts_with("NAME"))
        .filter_map(|l| l.split_whitespace().next())
        .map(str::to_owned)
        .collect()
}

// ── Poller ────────────────────────────────────────────────────────────────

/// Handle to a running status poller.
#[derive(Debug)]
pub struct StatusPoller {
    pub events: mpsc::Receiver<StatusEvent>,
    stop: watch::Sender<bool>,
}

impl StatusPoller {
    /// Seed the tracked-container set from `docker-compose ps` and start
    /// polling in a background task.
    pub fn spawn(compose_file: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(poll_loop(compose_file, tx, stop_rx));
        Self { events: rx, stop: stop_tx }
    }

    /// Stop the background task.
    pub fn terminate(&self) {
        let _ = self.stop.send(true);
    }
}

async fn poll_loop(
    compose_file: PathBuf,
    tx: mpsc::Sender<StatusEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut statuses: HashMap<String, String> = HashMap::new();
    if let Ok(output) = Command::new("docker-compose")
        .arg("-f")
        .arg(&compose_file)
        .arg("ps")
        .output()
        .await
    {
        for name in parse_compose_ps(&String::from_utf8_lossy(&output.stdout)) {
            statuses.insert(name, String::new());
        }
    }

    let mut was_stopped = true;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                // A send of `true` or a dropped handle both stop the poll.
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
        }

        let output = match Command::new("docker")
            .args(["ps", "-a", "--format", "{{.Names}}|{{.State}}|{{.Status}}"])
            .output()
            .await
        {
            Ok(out) => out,
            Err(_) => continue,
        };

        let mut num_running = 0usize;
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let Some((name, status, running)) = parse_ps_line(line) else {
                continue;
            };
            let Some(known) = statuses.get_mut(&name) else {
                continue;
            };
            if running {
                num_running += 1;
            }
            if *known != status {
                *known = status.clone();
                if tx
                    .send(StatusEvent::Changed { container: name, status })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }

        if num_running == 0 {
            if tx.send(StatusEvent::AllStopped).await.is_err() {
                return;
            }
            was_stopped = true;
        } else if was_stopped {
            was_stopped = false;
            if tx.send(StatusEvent::Started).await.is_err() {
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_containers_report_their_state_word() {
        let (name, status, running) = parse_ps_line("proj-web-1|running|Up 3 hours").unwrap();
        assert_eq!(name, "proj-web-1");
        assert_eq!(status, "running");
        assert!(running);
    }

    #[test]
    fn exited_containers_report_the_exit_code() {
        let (name, status, running) =
            parse_ps_line("proj-db-1|exited|Exited (137) 2 minutes ago").unwrap();
        assert_eq!(name, "proj-db-1");
        assert_eq!(status, "137");
        assert!(!running);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        assert_eq!(parse_ps_line(""), None);
        assert_eq!(parse_ps_line("no-pipes-here"), None);
        assert_eq!(parse_ps_line("|running|Up"), None);
    }

    #[test]
    fn compose_ps_header_and_rule_are_skipped() {
        let output = "\
    Name                  Command               State    Ports
--------------------------------------------------------------
proj-web-1     nginx -g daemon off;             Up      80/tcp
proj-db-1      docker-entrypoint.sh postgres    Up      5432/tcp
";
        assert_eq!(parse_compose_ps(output), vec!["proj-web-1", "proj-db-1"]);
    }
}
