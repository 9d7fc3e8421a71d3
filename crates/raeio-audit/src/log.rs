// log.rs — Append-only JSONL audit log.
//
// One JSON object per line. Each event's `previous_hash` is the SHA-256 of
// the preceding raw line, so inserting, deleting or editing a line breaks
// the chain and is caught by `verify_chain`.
//
// Each line reaches the file in a single unbuffered write. If that write
// fails, the file is truncated back to its previous length and the chain
// tail is left where it was, so a failed append leaves no trace on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::error::AuditError;
use crate::event::AuditEvent;
use crate::hasher;

/// An append-only audit log backed by a JSONL file.
///
/// Not synchronized on its own; wrap it in [`crate::JsonlSink`] to share it
/// between threads.
pub struct AuditLog {
    /// Opened in append mode; every write lands at the end of the file.
    file: File,
    path: PathBuf,
    /// Hash of the last line written, linked into the next event.
    last_hash: Option<String>,
}

impl AuditLog {
    /// Open (or create) an audit log at the given path.
    ///
    /// Missing parent directories are created. If the file already has
    /// content, the hash of its last line is recovered so new events
    /// continue the chain.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        // Recover the chain tail so events written by a previous process
        // and this one form a single chain.
        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            file,
            path,
            last_hash,
        })
    }

    /// Append an event, linking it to the previous one.
    ///
    /// On error nothing is left on disk and the next append links to the
    /// same previous line as this one would have.
    pub fn append(&mut self, event: &mut AuditEvent) -> Result<(), AuditError> {
        // Link this event to the previous one.
        event.previous_hash = self.last_hash.clone();

        // One JSON object per line, no pretty-printing. The hash covers the
        // line without its newline, matching what `verify_chain` reads back.
        let json = serde_json::to_string(event)?;
        let mut line = json.clone().into_bytes();
        line.push(b'\n');

        // Remember where the file ended so a partial write can be undone.
        let len_before = self.file.metadata()?.len();
        if let Err(e) = self.file.write_all(&line) {
            if let Err(truncate_err) = self.file.set_len(len_before) {
                tracing::error!(
                    path = %self.path.display(),
                    "could not roll back partial audit line: {}",
                    truncate_err
                );
            }
            return Err(e.into());
        }

        // Only advance the chain once the line is actually written.
        self.last_hash = Some(hasher::hash_str(&json));
        Ok(())
    }

    /// Read all events from a log file, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut events = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }

        Ok(events)
    }

    /// Verify the hash chain of a log file.
    ///
    /// Returns `Ok(true)` when every event links to the hash of the raw
    /// line before it, or an `IntegrityViolation` naming the first bad line.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<bool, AuditError> {
        let reader = Self::reader(path.as_ref())?;
        let mut previous_hash: Option<String> = None;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            // Each event must point at the line before it (None for the first).
            let event: AuditEvent = serde_json::from_str(&line)?;
            if event.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num + 1,
                    expected: previous_hash.unwrap_or_else(|| "None".to_string()),
                    actual: event.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }

            // Hash the raw line, not a re-serialization.
            previous_hash = Some(hasher::hash_str(&line));
        }

        Ok(true)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(path: &Path) -> Result<BufReader<File>, AuditError> {
        let file = File::open(path).map_err(|source| AuditError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(BufReader::new(file))
    }

    // Hash of the last non-blank line, or None for an empty file.
    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let mut last_line: Option<String> = None;
        for line in Self::reader(path)?.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::hash_str(&line)))
    }
}
