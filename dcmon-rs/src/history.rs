//! Recently-opened file history.
//!
//! A small most-recently-used list of compose/config files, persisted
//! as one path per line in the platform config directory so that
//! `dcmon` run with no arguments can reopen the last project.

use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Maximum entries kept in the history file.
pub const MAX_FILE_HISTORY: usize = 4;

/// Persistent MRU list of opened files.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    entries: Vec<PathBuf>,
}

impl History {
    /// Open the default per-user history (`<config dir>/dcmon/history`).
    ///
    /// Returns `None` when no home directory can be determined.
    pub fn open_default() -> Option<Self> {
        let dirs = ProjectDirs::from("", "", "dcmon")?;
        Some(Self::open(dirs.config_dir().join("history")))
    }

    /// Open (or create on first save) a history file at `path`.
    pub fn open(path: PathBuf) -> Self {
        let entries = std::fs::read_to_string(&path)
            .map(|text| {
                text.lines()
                    .filter(|l| !l.trim().is_empty())
                    .take(MAX_FILE_HISTORY)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        Self { path, entries }
    }

    /// The remembered files, most recent first, excluding `exclude`.
    pub fn recent(&self, exclude: Option<&Path>) -> Vec<&Path> {
        self.entries
            .iter()
            .map(PathBuf::as_path)
            .filter(|p| Some(*p) != exclude)
            .collect()
    }

    /// The most recently opened file, if any.
    pub fn most_recent(&self) -> Option<&Path> {
        self.entries.first().map(PathBuf::as_path)
    }

    /// Move `file` to the front of the list and persist it.
    pub fn remember(&mut self, file: &Path) -> io::Result<()> {
        self.entries.retain(|p| p != file);
        self.entries.insert(0, file.to_path_buf());
        self.entries.truncate(MAX_FILE_HISTORY);

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.display().to_string());
            text.push('\n');
        }
        std::fs::write(&self.path, text)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn history_in(dir: &tempfile::TempDir) -> History {
        History::open(dir.path().join("history"))
    }

    #[test]
    fn remember_puts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        h.remember(Path::new("/a")).unwrap();
        h.remember(Path::new("/b")).unwrap();
        assert_eq!(h.most_recent(), Some(Path::new("/b")));
        assert_eq!(h.recent(None), vec![Path::new("/b"), Path::new("/a")]);
    }

    #[test]
    fn remembering_again_moves_to_front_without_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        h.remember(Path::new("/a")).unwrap();
        h.remember(Path::new("/b")).unwrap();
        h.remember(Path::new("/a")).unwrap();
        assert_eq!(h.recent(None), vec![Path::new("/a"), Path::new("/b")]);
    }

    #[test]
    fn list_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        for i in 0..10 {
            h.remember(Path::new(&format!("/f{i}"))).unwrap();
        }
        assert_eq!(h.recent(None).len(), MAX_FILE_HISTORY);
        assert_eq!(h.most_recent(), Some(Path::new("/f9")));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut h = history_in(&dir);
            h.remember(Path::new("/x")).unwrap();
            h.remember(Path::new("/y")).unwrap();
        }
        let h = history_in(&dir);
        assert_eq!(h.recent(None), vec![Path::new("/y"), Path::new("/x")]);
    }

    #[test]
    fn exclude_filters_the_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = history_in(&dir);
        h.remember(Path::new("/cur")).unwrap();
        h.remember(Path::new("/old")).unwrap();
        assert_eq!(h.recent(Some(Path::new("/old"))), vec![Path::new("/cur")]);
    }
}
