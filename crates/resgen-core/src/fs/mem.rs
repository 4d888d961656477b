use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;

use crate::fs::{Entry, Fs, validate_name};

/// Thread-safe in-memory filesystem.
///
/// Clones share the same entries. Used as the per-run staging area and as a
/// test double for sources and destinations.
#[derive(Clone, Default)]
pub struct MemFs {
    entries: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `name`, replacing any previous contents.
    pub fn insert(&self, name: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(name.into(), data.into());
        }
    }

    pub fn get(&self, name: &str) -> Option<Bytes> {
        self.entries.read().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_guard(&self) -> io::Result<RwLockReadGuard<'_, BTreeMap<String, Bytes>>> {
        self.entries.read().map_err(|_| poisoned())
    }

    fn write_guard(&self) -> io::Result<RwLockWriteGuard<'_, BTreeMap<String, Bytes>>> {
        self.entries.write().map_err(|_| poisoned())
    }
}

impl fmt::Display for MemFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory ({} entries)", self.len())
    }
}

impl fmt::Debug for MemFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemFs")
            .field("names", &self.names())
            .finish()
    }
}

impl Fs for MemFs {
    fn list(&self) -> io::Result<Vec<Entry>> {
        Ok(self
            .read_guard()?
            .iter()
            .map(|(name, data)| Entry::file(name.clone(), data.len() as u64))
            .collect())
    }

    fn open(&self, name: &str) -> io::Result<Box<dyn Read + Send>> {
        let data = self.read_guard()?.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry named '{name}'"))
        })?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn create(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        validate_name(name)?;
        self.write_guard()?.insert(name.to_string(), Bytes::new());
        Ok(Box::new(MemWriter {
            fs: self.clone(),
            name: name.to_string(),
            buffer: Vec::new(),
            dirty: false,
        }))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        match self.write_guard()?.remove(name) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no entry named '{name}'"),
            )),
        }
    }
}

/// Buffers writes and publishes the whole entry on flush and on drop.
struct MemWriter {
    fs: MemFs,
    name: String,
    buffer: Vec<u8>,
    dirty: bool,
}

impl MemWriter {
    fn publish(&mut self) -> io::Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let snapshot = Bytes::copy_from_slice(&self.buffer);
        self.fs.write_guard()?.insert(self.name.clone(), snapshot);
        self.dirty = false;
        Ok(())
    }
}

impl Write for MemWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.publish()
    }
}

impl Drop for MemWriter {
    fn drop(&mut self) {
        let _ = self.publish();
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memory filesystem lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_entries_sorted_with_sizes() -> io::Result<()> {
        let fs = MemFs::new();
        fs.insert("b.txt", &b"bb"[..]);
        fs.insert("a.txt", &b"a"[..]);
        fs.insert("c.txt", &b""[..]);

        let entries = fs.list()?;
        assert_eq!(
            entries,
            vec![
                Entry::file("a.txt", 1),
                Entry::file("b.txt", 2),
                Entry::file("c.txt", 0),
            ]
        );
        Ok(())
    }

    #[test]
    fn writer_publishes_on_flush_and_drop() -> io::Result<()> {
        let fs = MemFs::new();
        let mut writer = fs.create("out.bin")?;
        assert_eq!(fs.get("out.bin").as_deref(), Some(&b""[..]));

        writer.write_all(b"first")?;
        writer.flush()?;
        assert_eq!(fs.get("out.bin").as_deref(), Some(&b"first"[..]));

        writer.write_all(b" second")?;
        drop(writer);
        assert_eq!(fs.get("out.bin").as_deref(), Some(&b"first second"[..]));
        Ok(())
    }

    #[test]
    fn open_reads_a_snapshot() -> io::Result<()> {
        let fs = MemFs::new();
        fs.insert("data", &b"original"[..]);
        let mut reader = fs.open("data")?;
        fs.insert("data", &b"replaced"[..]);

        let mut out = String::new();
        reader.read_to_string(&mut out)?;
        assert_eq!(out, "original");
        Ok(())
    }

    #[test]
    fn missing_entries_are_not_found() {
        let fs = MemFs::new();
        assert_eq!(
            fs.open("nope").err().map(|err| err.kind()),
            Some(io::ErrorKind::NotFound)
        );
        assert_eq!(
            fs.remove("nope").err().map(|err| err.kind()),
            Some(io::ErrorKind::NotFound)
        );
    }

    #[test]
    fn clones_share_entries() {
        let fs = MemFs::new();
        let other = fs.clone();
        other.insert("shared", &b"x"[..]);
        assert_eq!(fs.names(), vec!["shared".to_string()]);
    }
}
