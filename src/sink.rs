// Archival sinks - append-only copies of every payload, independent of
// the relational write. A sink failure is logged and swallowed; it never
// rolls back or blocks the relational result.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StreamError;
use crate::payload::EventPayload;

/// Capability interface for secondary sinks: "put object". Callers
/// depend only on this shape.
pub trait EventSink {
    fn name(&self) -> &'static str;

    /// Store one serialized payload. Fire-and-forget relative to the
    /// relational write.
    fn write(&mut self, payload: &EventPayload) -> Result<()>;
}

/// Deterministic object key, partitioned by the payload's calendar date:
/// `events/YYYY/MM/DD/<sanitized-timestamp>.json`. Sanitization replaces
/// `-`, `:` and `.` with `_`, so distinct timestamps never collide.
pub fn archive_key(event_ts: &str) -> Result<String> {
    let ts = NaiveDateTime::parse_from_str(event_ts, "%Y-%m-%dT%H:%M:%S%.f")
        .with_context(|| format!("invalid event_ts: {event_ts}"))?;

    let partition = ts.format("%Y/%m/%d");
    let filename: String = event_ts
        .chars()
        .map(|c| match c {
            '-' | ':' | '.' => '_',
            other => other,
        })
        .collect();

    Ok(format!("events/{partition}/{filename}.json"))
}

/// Directory-backed object store holding one immutable JSON object per
/// event under its timestamp-partitioned key.
pub struct ArchiveTarget {
    root: PathBuf,
}

impl ArchiveTarget {
    /// Open the archive rooted at `root`, creating it if absent.
    /// Failure here is fatal at startup.
    pub fn open(root: &Path) -> Result<Self, StreamError> {
        fs::create_dir_all(root)
            .with_context(|| format!("failed to create archive root {}", root.display()))
            .map_err(|source| StreamError::connection("archive", source))?;
        Ok(ArchiveTarget {
            root: root.to_path_buf(),
        })
    }

    /// Delete every previously archived object. Only used when the
    /// store is being recreated.
    pub fn purge(&self) -> Result<()> {
        let events = self.root.join("events");
        match fs::remove_dir_all(&events) {
            Ok(()) => {
                info!(root = %self.root.display(), "emptied archive");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to purge archive at {}", events.display()))
            }
        }
    }

    /// Absolute path an event would be stored at.
    pub fn object_path(&self, event_ts: &str) -> Result<PathBuf> {
        Ok(self.root.join(archive_key(event_ts)?))
    }
}

impl EventSink for ArchiveTarget {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn write(&mut self, payload: &EventPayload) -> Result<()> {
        let path = self.object_path(payload.event_ts())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create partition {}", parent.display()))?;
        }

        let body = serde_json::to_vec(payload).context("failed to serialize payload")?;
        fs::write(&path, body)
            .with_context(|| format!("failed to write object {}", path.display()))?;

        debug!(key = %path.display(), "archived event record");
        Ok(())
    }
}

/// Streaming delivery sink: one JSON line per event appended to a
/// delivery file. Optional; enabled by the `STREAM_PATH` credential.
pub struct StreamTarget {
    path: PathBuf,
}

impl StreamTarget {
    pub fn open(path: &Path) -> Result<Self, StreamError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| {
                        format!("failed to create stream directory {}", parent.display())
                    })
                    .map_err(|source| StreamError::connection("stream", source))?;
            }
        }
        Ok(StreamTarget {
            path: path.to_path_buf(),
        })
    }
}

impl EventSink for StreamTarget {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn write(&mut self, payload: &EventPayload) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open stream file {}", self.path.display()))?;

        let line = serde_json::to_string(payload).context("failed to serialize payload")?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        Ok(())
    }
}
