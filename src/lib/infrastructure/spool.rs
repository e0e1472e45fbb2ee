//! File-backed message spool.
//!
//! Each undelivered message becomes one JSON file named `<uuid-v7>.msg` in the
//! spool directory. Files are written to a `.tmp_` name first and renamed into
//! place, so a crash mid-write never leaves a half-written `.msg` file behind.
//! Version 7 UUIDs sort by creation time, so restoring in file-name order keeps
//! the enqueue order.
//!
//! A file that cannot be parsed is moved to `quarantine/` inside the spool
//! directory and never read again by the spool.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::messaging::{errors::SpoolError, Message, MessageQueue, MessageStore};

/// Extension of spill files
pub const SPILL_EXTENSION: &str = "msg";

/// Subdirectory unreadable spill files are moved to
pub const QUARANTINE_DIR: &str = "quarantine";

const TEMP_PREFIX: &str = ".tmp_";

/// Spool storing one file per message under a directory
#[derive(Debug, Clone)]
pub struct FileSpool {
    path: PathBuf,
}

impl FileSpool {
    /// Create a spool rooted at `path`. Nothing is touched on disk until the
    /// spool is used.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The spool directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_message(&self, message: &Message) -> Result<PathBuf, SpoolError> {
        let id = Uuid::now_v7();
        let target = self.path.join(format!("{id}.{SPILL_EXTENSION}"));

        if fs::try_exists(&target).await? {
            return Err(io::Error::new(
                ErrorKind::AlreadyExists,
                format!("{} already exists", target.display()),
            )
            .into());
        }

        let data = serde_json::to_vec_pretty(message)?;
        let temp = self.path.join(format!("{TEMP_PREFIX}{id}.{SPILL_EXTENSION}"));

        fs::write(&temp, data).await?;

        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        Ok(target)
    }

    async fn read_message(path: &Path) -> Result<Message, SpoolError> {
        let data = fs::read(path).await?;

        Ok(serde_json::from_slice(&data)?)
    }

    async fn quarantine(&self, path: &Path) -> Result<PathBuf, SpoolError> {
        let quarantine = self.path.join(QUARANTINE_DIR);
        fs::create_dir_all(&quarantine).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format!("{}.{SPILL_EXTENSION}", Uuid::now_v7()).into());
        let target = quarantine.join(file_name);

        fs::rename(path, &target).await?;

        Ok(target)
    }

    /// Spill files currently in the spool, oldest first
    async fn spilled_files(&self) -> Result<Vec<PathBuf>, SpoolError> {
        let mut entries = fs::read_dir(&self.path).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }

            let path = entry.path();
            let is_temp = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
            let is_spill = path.extension().is_some_and(|ext| ext == SPILL_EXTENSION);

            if is_spill && !is_temp {
                files.push(path);
            }
        }

        files.sort();

        Ok(files)
    }
}

#[async_trait]
impl MessageStore for FileSpool {
    async fn ensure_directory(&self) -> Result<(), SpoolError> {
        match fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(SpoolError::NotADirectory(self.path.clone())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "creating spool directory");
                fs::create_dir_all(&self.path).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn store_remaining(&self, queue: &MessageQueue) -> Result<usize, SpoolError> {
        self.ensure_directory().await?;

        let mut stored = 0;

        while let Some(message) = queue.try_dequeue() {
            match self.write_message(&message).await {
                Ok(path) => {
                    debug!(path = %path.display(), "spooled message");
                    stored += 1;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        subject = %message.subject,
                        "could not spool message; message lost"
                    );
                }
            }
        }

        if stored > 0 {
            info!(count = stored, path = %self.path.display(), "spooled undelivered messages");
        }

        Ok(stored)
    }

    async fn restore_all(&self, queue: &MessageQueue) -> Result<usize, SpoolError> {
        self.ensure_directory().await?;

        let mut restored = 0;

        for path in self.spilled_files().await? {
            match Self::read_message(&path).await {
                Ok(message) => {
                    queue.enqueue(message);
                    restored += 1;

                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(
                            error = %e,
                            path = %path.display(),
                            "restored message but could not remove its spool file"
                        );
                    }
                }
                Err(SpoolError::Serialization(e)) => match self.quarantine(&path).await {
                    Ok(target) => {
                        error!(
                            error = %e,
                            path = %target.display(),
                            "unreadable spool file quarantined"
                        );
                    }
                    Err(qe) => {
                        error!(
                            error = %e,
                            quarantine_error = %qe,
                            path = %path.display(),
                            "unreadable spool file could not be quarantined"
                        );
                    }
                },
                Err(e) => {
                    error!(error = %e, path = %path.display(), "could not read spool file");
                }
            }
        }

        Ok(restored)
    }
}
