use crate::error::PersistenceError;
use chrono::{DateTime, Local};
use fs2::FileExt;
use log::{info, warn};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default store location, relative to the working directory.
pub const DEFAULT_STORE: &str = "student_thoughts.csv";
/// Header written at the top of a new store.
pub const STORE_HEADER: &str = "reflection text";

/// One stored reflection. Entries have no identity beyond their position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReflectionEntry {
    pub position: usize,
    pub text: String,
}

/// What a successful [`ReflectionLog::submit`] hands back to the caller.
#[derive(Clone, Debug, Serialize)]
pub struct Receipt {
    pub entry: ReflectionEntry,
    pub submitted_at: DateTime<Local>,
}

/// Append-only store of student reflections in a one-column CSV file.
///
/// Writers are serialized twice over: a mutex for threads in this process and
/// an exclusive advisory lock on the file for other processes. The lock is
/// held from validation of the existing store through the append, so two
/// submissions can never overwrite each other.
pub struct ReflectionLog {
    path: PathBuf,
    writer: Mutex<()>,
}

impl ReflectionLog {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        ReflectionLog {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `text` as a new entry
    ///
    /// Creates the store (header plus entry) when it does not exist yet.
    /// Otherwise the existing store is read and checked in full before the
    /// entry is appended; a store that fails the check is left untouched.
    ///
    /// # Returns
    /// * `Result<Receipt, PersistenceError>` - The stored entry, echoed back
    pub fn submit(&self, text: &str) -> Result<Receipt, PersistenceError> {
        // a poisoned mutex only means another submit panicked; the file lock still guards the data
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        FileExt::lock_exclusive(&file)?;

        let result = self.append_locked(&mut file, text);
        if let Err(e) = FileExt::unlock(&file) {
            warn!("could not unlock {}: {}", self.path.display(), e);
        }

        match &result {
            Ok(receipt) => info!(
                "stored reflection #{} in {}",
                receipt.entry.position,
                self.path.display()
            ),
            Err(e) => warn!("reflection not stored: {}", e),
        }
        result
    }

    fn append_locked(&self, file: &mut File, text: &str) -> Result<Receipt, PersistenceError> {
        let contents = self.read_contents(file)?;
        let existing = self.parse(&contents)?;

        let mut buffer = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut buffer);
            if contents.is_empty() {
                writer
                    .write_record([STORE_HEADER])
                    .map_err(|e| self.corrupt(e))?;
            }
            writer.write_record([text]).map_err(|e| self.corrupt(e))?;
            writer.flush()?;
        }

        if !contents.is_empty() && !contents.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.write_all(&buffer)?;
        file.flush()?;

        Ok(Receipt {
            entry: ReflectionEntry {
                position: existing.len(),
                text: text.to_string(),
            },
            submitted_at: Local::now(),
        })
    }

    /// Every stored entry, in submission order. A missing store has no entries.
    pub fn entries(&self) -> Result<Vec<ReflectionEntry>, PersistenceError> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        FileExt::lock_shared(&file)?;
        let contents = self.read_contents(&mut file);
        FileExt::unlock(&file)?;
        self.parse(&contents?)
    }

    fn read_contents(&self, file: &mut File) -> Result<String, PersistenceError> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| self.corrupt("not valid UTF-8"))
    }

    fn parse(&self, contents: &str) -> Result<Vec<ReflectionEntry>, PersistenceError> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(contents.as_bytes());

        let headers = reader.headers().map_err(|e| self.corrupt(e))?;
        if headers.len() != 1 {
            return Err(self.corrupt(format!(
                "expected a single column, found {}",
                headers.len()
            )));
        }

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| self.corrupt(e))?;
            entries.push(ReflectionEntry {
                position: entries.len(),
                text: record.get(0).unwrap_or_default().to_string(),
            });
        }
        Ok(entries)
    }

    fn corrupt(&self, reason: impl ToString) -> PersistenceError {
        PersistenceError::Corrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
