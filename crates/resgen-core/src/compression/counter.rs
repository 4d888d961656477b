use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Write adapter that counts the bytes accepted by the inner writer.
///
/// The count lives behind an `Arc` so it stays readable while the writer
/// itself is owned by a codec session.
pub struct CountingWriter<W> {
    inner: W,
    written: Arc<AtomicU64>,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared handle to the running count.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.written)
    }

    pub fn count(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written.fetch_add(written as u64, Ordering::AcqRel);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts at most `limit` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for Trickle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let take = buf.len().min(self.limit);
            self.data.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn counts_only_accepted_bytes() {
        let mut writer = CountingWriter::new(Trickle {
            data: Vec::new(),
            limit: 3,
        });
        let written = writer.write(b"abcdefgh").unwrap();
        assert_eq!(written, 3);
        assert_eq!(writer.count(), 3);

        writer.write_all(b"defgh").unwrap();
        assert_eq!(writer.count(), 8);
        assert_eq!(writer.into_inner().data, b"abcdefgh");
    }

    #[test]
    fn shared_counter_tracks_writer() {
        let mut writer = CountingWriter::new(Vec::new());
        let counter = writer.counter();
        writer.write_all(&[0u8; 17]).unwrap();
        assert_eq!(counter.load(Ordering::Acquire), 17);
    }
}
