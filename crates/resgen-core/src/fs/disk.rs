use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::fs::{Entry, EntryKind, Fs, validate_name};

/// A directory on the local disk.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> io::Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl fmt::Display for DiskFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.display())
    }
}

impl Fs for DiskFs {
    fn list(&self) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            let Some(name) = dir_entry.file_name().to_str().map(str::to_owned) else {
                tracing::debug!(
                    path = %dir_entry.path().display(),
                    "skipping entry with non UTF-8 name"
                );
                continue;
            };
            let metadata = dir_entry.metadata()?;
            let kind = if metadata.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(Entry {
                name,
                size: metadata.len(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.path_of(name)?)?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let path = self.path_of(name)?;
        fs::create_dir_all(&self.root)?;
        let file = File::create(path)?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path_of(name)?)
    }
}
