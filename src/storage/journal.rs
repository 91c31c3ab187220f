// src/storage/journal.rs
//! Append-only JSON-lines journal backing the in-memory store.
//!
//! Every mutation is written and synced as one typed [`Record`] before it is
//! applied in memory. A failed write is truncated away; if even that fails the
//! journal refuses further appends until restart.
//!
//! On start the journal is replayed; for certificates the last record per id
//! wins. A final line without its newline that does not decode is a torn write
//! and is dropped. Any other line that does not decode aborts the load.

use crate::models::certificate::Certificate;
use crate::models::verification::VerificationAttempt;
use crate::storage::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// One journal line.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "record", rename_all = "camelCase")]
pub enum Record {
    Certificate(Certificate),
    VerificationAttempt(VerificationAttempt),
}

impl Record {
    /// Decodes and validates a single journal line.
    pub fn decode(line: &str) -> Result<Self, String> {
        let record: Record = serde_json::from_str(line).map_err(|e| e.to_string())?;
        if let Record::Certificate(certificate) = &record {
            certificate.validate()?;
        }
        Ok(record)
    }
}

pub struct Journal {
    path: PathBuf,
    file: File,
    poisoned: bool,
}

impl Journal {
    /// Opens (creating if needed) the journal at `path` and returns the records
    /// already in it.
    ///
    /// # Errors
    /// - `Unavailable` if the file cannot be read, repaired or opened for appending
    /// - `Corrupt` if any complete line fails to decode or validate
    pub async fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<Record>), StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
        }

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(StoreError::Unavailable(format!("{}: {}", path.display(), e)))
            }
        };

        let (complete, tail) = match contents.rfind('\n') {
            Some(end) => contents.split_at(end + 1),
            None => ("", contents.as_str()),
        };

        let mut records = Vec::new();
        let mut line_count = 0;
        for (index, line) in complete.lines().enumerate() {
            line_count = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let record = Record::decode(line).map_err(|e| {
                StoreError::Corrupt(format!("{} line {}: {}", path.display(), index + 1, e))
            })?;
            records.push(record);
        }

        let mut torn = false;
        let mut unterminated = false;
        if !tail.trim().is_empty() {
            match Record::decode(tail) {
                Ok(record) => {
                    records.push(record);
                    unterminated = true;
                }
                Err(e) => {
                    log::warn!(
                        "{} line {}: dropping torn final write ({})",
                        path.display(),
                        line_count + 1,
                        e
                    );
                    torn = true;
                }
            }
        }

        let io_err =
            |e: std::io::Error| StoreError::Unavailable(format!("{}: {}", path.display(), e));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;
        if torn {
            file.set_len(complete.len() as u64).await.map_err(io_err)?;
            file.sync_data().await.map_err(io_err)?;
        } else if unterminated {
            file.write_all(b"\n").await.map_err(io_err)?;
            file.sync_data().await.map_err(io_err)?;
        }

        log::info!(
            "opened journal {} with {} records",
            path.display(),
            records.len()
        );
        Ok((
            Self {
                path,
                file,
                poisoned: false,
            },
            records,
        ))
    }

    /// Appends a record and syncs it to disk before returning.
    ///
    /// A failed write is rolled back to the previous end of file so the next
    /// append never lands after a partial line.
    pub async fn append(&mut self, record: &Record) -> Result<(), StoreError> {
        if self.poisoned {
            return Err(StoreError::Unavailable(format!(
                "{}: journal disabled after an unrecoverable write failure",
                self.path.display()
            )));
        }

        let mut line = serde_json::to_vec(record)
            .map_err(|e| StoreError::Unavailable(format!("encode journal record: {}", e)))?;
        line.push(b'\n');

        let committed = self
            .file
            .metadata()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", self.path.display(), e)))?
            .len();

        if let Err(e) = self.write_line(&line).await {
            match self.file.set_len(committed).await {
                Ok(()) => log::warn!(
                    "journal write to {} failed, rolled back to {} bytes: {}",
                    self.path.display(),
                    committed,
                    e
                ),
                Err(rollback) => {
                    log::error!(
                        "journal {} could not be rolled back ({}), refusing further writes",
                        self.path.display(),
                        rollback
                    );
                    self.poisoned = true;
                }
            }
            return Err(StoreError::Unavailable(format!("{}: {}", self.path.display(), e)));
        }
        Ok(())
    }

    async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }
}
