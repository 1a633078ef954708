//! Synthetic file metadata
//!
//! Buckets have no directories. A directory is either a "common prefix"
//! row of a delimited listing or a zero-byte marker object whose key ends
//! with the delimiter. [`SyntheticFileInfo`] turns backend attributes into
//! the file entries an SFTP client expects, deciding directory-ness once at
//! construction.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::storage::{ObjectAttributes, DELIMITER};

/// POSIX-style mode bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    pub const TYPE_DIR: u32 = 0o040000;
    pub const TYPE_FILE: u32 = 0o100000;
    pub const PERMISSIONS: u32 = 0o777;

    /// `directory | rwxrwxrwx`
    pub fn directory() -> Self {
        Self(Self::TYPE_DIR | Self::PERMISSIONS)
    }

    /// Regular file, `rwxrwxrwx`
    pub fn file() -> Self {
        Self(Self::TYPE_FILE | Self::PERMISSIONS)
    }

    /// Raw mode bits including the file type
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Permission bits only
    pub fn permissions(&self) -> u32 {
        self.0 & Self::PERMISSIONS
    }

    pub fn is_dir(&self) -> bool {
        self.0 & Self::TYPE_DIR != 0
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_dir() { 'd' } else { '-' };
        let perms = self.permissions();
        let mut out = String::with_capacity(10);
        out.push(kind);
        for shift in [6, 3, 0] {
            let bits = (perms >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        f.write_str(&out)
    }
}

/// File entry derived from one set of object attributes
#[derive(Debug, Clone)]
pub struct SyntheticFileInfo {
    attrs: ObjectAttributes,
    prefix: String,
    is_dir: bool,
}

impl SyntheticFileInfo {
    /// Build an entry from attributes obtained by listing (or looking up)
    /// under `prefix`
    pub fn new(prefix: impl Into<String>, attrs: ObjectAttributes) -> Self {
        let is_dir = !attrs.prefix.is_empty()
            || (attrs.name.ends_with(DELIMITER) && attrs.size == 0);

        Self {
            attrs,
            prefix: prefix.into(),
            is_dir,
        }
    }

    /// The bucket root, synthesized without any backend lookup
    pub fn root() -> Self {
        Self {
            attrs: ObjectAttributes::common_prefix(DELIMITER),
            prefix: String::new(),
            is_dir: true,
        }
    }

    /// Display name relative to the listing prefix
    pub fn name(&self) -> &str {
        if self.attrs.prefix == DELIMITER && self.prefix.is_empty() {
            return DELIMITER;
        }

        let full = if self.attrs.prefix.is_empty() {
            &self.attrs.name
        } else {
            &self.attrs.prefix
        };
        let relative = full.strip_prefix(self.prefix.as_str()).unwrap_or(full);

        if self.is_dir {
            relative.strip_suffix(DELIMITER).unwrap_or(relative)
        } else {
            relative
        }
    }

    /// Size in bytes as reported by the backend; meaningless for directories
    pub fn size(&self) -> u64 {
        self.attrs.size
    }

    pub fn mode(&self) -> FileMode {
        if self.is_dir {
            FileMode::directory()
        } else {
            FileMode::file()
        }
    }

    /// Last modification time; directories report the current time
    pub fn mod_time(&self) -> DateTime<Utc> {
        if self.is_dir {
            Utc::now()
        } else {
            self.attrs.updated
        }
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }
}

/// Materialized directory listing with random access
#[derive(Debug, Clone, Default)]
pub struct Listing {
    entries: Vec<SyntheticFileInfo>,
}

impl Listing {
    pub fn new(entries: Vec<SyntheticFileInfo>) -> Self {
        Self { entries }
    }

    /// Listing holding exactly one entry, as returned by stat
    pub fn single(entry: SyntheticFileInfo) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    /// Up to `max` entries starting at `offset`.
    ///
    /// Fails with [`Error::EndOfData`] once `offset` is at or past the end;
    /// a short slice means the end has been reached.
    pub fn list_at(&self, offset: usize, max: usize) -> Result<&[SyntheticFileInfo]> {
        if offset >= self.entries.len() {
            return Err(Error::EndOfData);
        }
        let end = offset.saturating_add(max).min(self.entries.len());
        Ok(&self.entries[offset..end])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SyntheticFileInfo> {
        self.entries.iter()
    }

    /// First entry, if any
    pub fn first(&self) -> Option<&SyntheticFileInfo> {
        self.entries.first()
    }
}

impl IntoIterator for Listing {
    type Item = SyntheticFileInfo;
    type IntoIter = std::vec::IntoIter<SyntheticFileInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
