//! Persisted follow log and follow counter.
//!
//! The log is an append-only list of usernames, one per line, that doubles as
//! the de-duplication source across passes. The counter is a single integer
//! holding the cumulative number of follows recorded in the log. Each
//! mutation is written through immediately so the process can be stopped
//! between two follow calls without losing or corrupting state.

use crate::error::StoreError;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Append-only record of followed usernames
pub trait FollowLog {
    fn contains(&self, username: &str) -> bool;
    fn append(&mut self, username: &str) -> Result<(), StoreError>;
    fn entries(&self) -> &[String];

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Cumulative number of follow actions
pub trait FollowCounter {
    fn value(&self) -> u64;
    fn increment(&mut self) -> Result<u64, StoreError>;
}

/// Follow log backed by a plain text file
#[derive(Debug)]
pub struct FileFollowLog {
    path: PathBuf,
    entries: Vec<String>,
    index: HashSet<String>,
    needs_newline: bool,
}

impl FileFollowLog {
    /// Load the log, treating a missing file as empty
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No '{}' found, assuming no users have been followed yet",
                    path.display()
                );
                String::new()
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let mut entries = Vec::new();
        let mut index = HashSet::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if index.insert(line.to_string()) {
                entries.push(line.to_string());
            }
        }

        info!(
            "Loaded {} already followed users from '{}'",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries,
            index,
            needs_newline: !content.is_empty() && !content.ends_with('\n'),
        })
    }
}

impl FollowLog for FileFollowLog {
    fn contains(&self, username: &str) -> bool {
        self.index.contains(username)
    }

    fn append(&mut self, username: &str) -> Result<(), StoreError> {
        let write_error = |source| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_error)?;

        let line = if self.needs_newline {
            format!("\n{username}\n")
        } else {
            format!("{username}\n")
        };
        file.write_all(line.as_bytes()).map_err(write_error)?;
        file.sync_data().map_err(write_error)?;

        self.needs_newline = false;
        self.index.insert(username.to_string());
        self.entries.push(username.to_string());
        debug!("Appended {} to {}", username, self.path.display());
        Ok(())
    }

    fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// Follow counter backed by a plain text file holding one integer
#[derive(Debug)]
pub struct FileFollowCounter {
    path: PathBuf,
    value: u64,
}

impl FileFollowCounter {
    /// Load the counter; a missing or unparseable file counts as zero
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let value = match std::fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse::<u64>() {
                Ok(value) => value,
                Err(_) if content.trim().is_empty() => 0,
                Err(_) => {
                    warn!(
                        "Invalid counter value {:?} in '{}', starting from 0",
                        content.trim(),
                        path.display()
                    );
                    0
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No '{}' found, starting follower counter at 0", path.display());
                0
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        Ok(Self { path, value })
    }

    /// Replace the file in one rename so a crash never leaves a half-written number
    fn persist(&self, value: u64) -> Result<(), StoreError> {
        let write_error = |source| StoreError::Write {
            path: self.path.display().to_string(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_error)?;
        tmp.write_all(value.to_string().as_bytes())
            .map_err(write_error)?;
        tmp.as_file().sync_data().map_err(write_error)?;
        tmp.persist(&self.path).map_err(|e| write_error(e.error))?;
        Ok(())
    }
}

impl FollowCounter for FileFollowCounter {
    fn value(&self) -> u64 {
        self.value
    }

    fn increment(&mut self) -> Result<u64, StoreError> {
        let next = self.value.saturating_add(1);
        self.persist(next)?;
        self.value = next;
        debug!("Updated follower counter to {}", next);
        Ok(next)
    }
}

/// In-memory follow log
#[derive(Debug, Default, Clone)]
pub struct MemoryFollowLog {
    entries: Vec<String>,
}

impl MemoryFollowLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut log = Self::default();
        for entry in entries {
            let entry = entry.into();
            if !log.entries.contains(&entry) {
                log.entries.push(entry);
            }
        }
        log
    }
}

impl FollowLog for MemoryFollowLog {
    fn contains(&self, username: &str) -> bool {
        self.entries.iter().any(|e| e == username)
    }

    fn append(&mut self, username: &str) -> Result<(), StoreError> {
        self.entries.push(username.to_string());
        Ok(())
    }

    fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// In-memory follow counter
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryFollowCounter {
    value: u64,
}

impl MemoryFollowCounter {
    pub fn new(value: u64) -> Self {
        Self { value }
    }
}

impl FollowCounter for MemoryFollowCounter {
    fn value(&self) -> u64 {
        self.value
    }

    fn increment(&mut self) -> Result<u64, StoreError> {
        self.value = self.value.saturating_add(1);
        Ok(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_log_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileFollowLog::open(dir.path().join("followers.txt")).unwrap();
        assert!(log.is_empty());
        assert!(!log.contains("alice"));
    }

    #[test]
    fn test_file_log_append_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("followers.txt");

        let mut log = FileFollowLog::open(&path).unwrap();
        log.append("alice").unwrap();
        log.append("carol").unwrap();
        assert!(log.contains("alice"));
        assert_eq!(log.len(), 2);

        let reopened = FileFollowLog::open(&path).unwrap();
        assert_eq!(reopened.entries(), ["alice", "carol"]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "alice\ncarol\n");
    }

    #[test]
    fn test_file_log_skips_blank_and_duplicate_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("followers.txt");
        std::fs::write(&path, "alice\n\n  bob  \nalice\n").unwrap();

        let log = FileFollowLog::open(&path).unwrap();
        assert_eq!(log.entries(), ["alice", "bob"]);
        assert!(log.contains("bob"));
    }

    #[test]
    fn test_file_log_append_after_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("followers.txt");
        std::fs::write(&path, "alice").unwrap();

        let mut log = FileFollowLog::open(&path).unwrap();
        log.append("bob").unwrap();
        log.append("carol").unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "alice\nbob\ncarol\n"
        );
    }

    #[test]
    fn test_file_counter_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("follower_counter.txt");

        let mut counter = FileFollowCounter::open(&path).unwrap();
        assert_eq!(counter.value(), 0);
        assert_eq!(counter.increment().unwrap(), 1);
        assert_eq!(counter.increment().unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2");

        let reopened = FileFollowCounter::open(&path).unwrap();
        assert_eq!(reopened.value(), 2);
    }

    #[test]
    fn test_file_counter_existing_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("follower_counter.txt");
        std::fs::write(&path, "5\n").unwrap();

        let mut counter = FileFollowCounter::open(&path).unwrap();
        assert_eq!(counter.value(), 5);
        assert_eq!(counter.increment().unwrap(), 6);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "6");
    }

    #[test]
    fn test_file_counter_invalid_content_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("follower_counter.txt");
        std::fs::write(&path, "not-a-number").unwrap();

        let counter = FileFollowCounter::open(&path).unwrap();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_file_log_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let mut log = FileFollowLog {
            path: dir.path().to_path_buf(),
            entries: Vec::new(),
            index: HashSet::new(),
            needs_newline: false,
        };

        let result = log.append("alice");
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert!(!log.contains("alice"));
    }

    #[test]
    fn test_memory_stores() {
        let mut log = MemoryFollowLog::with_entries(["bob", "bob", "dave"]);
        assert_eq!(log.entries(), ["bob", "dave"]);
        log.append("alice").unwrap();
        assert!(log.contains("alice"));
        assert_eq!(log.len(), 3);

        let mut counter = MemoryFollowCounter::new(7);
        assert_eq!(counter.increment().unwrap(), 8);
        assert_eq!(counter.value(), 8);
    }
}
