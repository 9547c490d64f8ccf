//! Persistent dictionary from raw field values to dense integer codes.
//!
//! Each distinct value owns one file in the dictionary directory whose
//! contents are the decimal code. Codes are assigned sequentially from 0
//! and never reused.

use cedar_common::{CedarError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Prefix of file names holding hex-encoded values.
const HEX_PREFIX: char = '~';

/// Scratch name an entry is written under before being renamed into place.
/// Entry names never start with `.`, so it cannot collide with one.
const PENDING_ENTRY: &str = ".pending";

/// Longest raw value stored under its own name.
const MAX_PLAIN_NAME: usize = 128;

/// Maps raw string values to dictionary codes.
pub struct CodeDictionary {
    dir: PathBuf,
    /// Next code to assign; equals the number of registered values.
    next_code: u64,
    fsync_enabled: bool,
}

impl CodeDictionary {
    /// Creates an empty dictionary, discarding any entries left in `dir`.
    pub fn create(dir: &Path, fsync_enabled: bool) -> Result<Self> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next_code: 0,
            fsync_enabled,
        })
    }

    /// Opens a dictionary and reloads its counter from the persisted entries.
    ///
    /// An entry left half-written by an interrupted `code_of` is discarded.
    pub fn open(dir: &Path, fsync_enabled: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut next_code = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name() == PENDING_ENTRY {
                fs::remove_file(entry.path())?;
                continue;
            }
            let code = read_code(&entry.path())?;
            next_code = next_code.max(code + 1);
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            next_code,
            fsync_enabled,
        })
    }

    /// Number of distinct values registered.
    #[inline]
    pub fn len(&self) -> u64 {
        self.next_code
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.next_code == 0
    }

    /// True if `code` has been assigned.
    #[inline]
    pub fn contains_code(&self, code: u64) -> bool {
        code < self.next_code
    }

    /// Returns the code of `raw`, assigning and persisting the next code
    /// on first sight.
    pub fn code_of(&mut self, raw: &str) -> Result<u64> {
        let path = self.entry_path(raw);
        if path.exists() {
            return read_code(&path);
        }

        let code = self.next_code;
        self.write_entry(&path, code)?;
        self.next_code += 1;
        tracing::debug!(value = raw, code, "dictionary entry created");
        Ok(code)
    }

    /// Returns the code of `raw` without assigning one.
    pub fn lookup(&self, raw: &str) -> Result<Option<u64>> {
        let path = self.entry_path(raw);
        if !path.exists() {
            return Ok(None);
        }
        read_code(&path).map(Some)
    }

    /// Returns the code of a value that must already be registered.
    pub fn code(&self, raw: &str) -> Result<u64> {
        self.lookup(raw)?
            .ok_or_else(|| CedarError::UnknownDictionaryValue(raw.to_string()))
    }

    fn entry_path(&self, raw: &str) -> PathBuf {
        self.dir.join(path_component(raw))
    }

    /// Writes an entry under a scratch name and renames it into place, so an
    /// entry file is either absent or complete.
    fn write_entry(&self, path: &Path, code: u64) -> Result<()> {
        let pending = self.dir.join(PENDING_ENTRY);
        let mut file = fs::File::create(&pending)?;
        file.write_all(format!("{}\n", code).as_bytes())?;
        if self.fsync_enabled {
            file.sync_all()?;
        }
        drop(file);
        fs::rename(&pending, path)?;
        Ok(())
    }
}

/// Turns an arbitrary value into a single safe path component.
///
/// Short values made of ASCII letters, digits, `-`, `_` and `.` keep their
/// spelling; anything else is stored hex-encoded behind a `~` prefix.
pub fn path_component(raw: &str) -> String {
    let plain = !raw.is_empty()
        && raw.len() <= MAX_PLAIN_NAME
        && !raw.starts_with('.')
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.');
    if plain {
        raw.to_string()
    } else {
        format!("{}{}", HEX_PREFIX, hex::encode(raw.as_bytes()))
    }
}

fn read_code(path: &Path) -> Result<u64> {
    let contents = fs::read_to_string(path)?;
    contents.trim().parse::<u64>().map_err(|_| {
        CedarError::Internal(format!(
            "dictionary entry {} holds '{}', not a code",
            path.display(),
            contents.trim()
        ))
    })
}
