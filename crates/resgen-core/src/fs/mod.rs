//! Flat, name-addressed filesystems used as build source, staging area,
//! and destination.
//!
//! Every backend exposes a single directory-like root. Entry names are plain
//! file names; path separators and `..` are rejected.

use std::fmt;
use std::io::{self, Read, Write};

pub mod disk;
pub mod mem;

pub use disk::DiskFs;
pub use mem::MemFs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One top-level entry of a filesystem listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
}

impl Entry {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            kind: EntryKind::File,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

pub trait Fs: Send + Sync + fmt::Display {
    /// Lists the root, sorted by name.
    fn list(&self) -> io::Result<Vec<Entry>>;

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>>;

    /// Creates or truncates `name`. Contents become visible once the writer
    /// is flushed or dropped.
    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    fn remove(&self, name: &str) -> io::Result<()>;
}

/// Relocates `from_name` in `from` to `to_name` in `to`.
///
/// The entry is copied and then removed from `from`. A failure part-way can
/// leave a truncated `to_name` behind; `from_name` is only removed once the
/// copy has been flushed.
pub fn move_entry(from: &dyn Fs, to: &dyn Fs, from_name: &str, to_name: &str) -> io::Result<u64> {
    let mut reader = from.open(from_name)?;
    let mut writer = to.create(to_name)?;
    let copied = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    drop(writer);
    drop(reader);

    from.remove(from_name)?;
    Ok(copied)
}

pub(crate) fn validate_name(name: &str) -> io::Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if invalid {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid entry name '{name}'"),
        ));
    }
    Ok(())
}
