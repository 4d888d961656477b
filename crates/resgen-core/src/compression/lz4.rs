use std::io::{self, Write};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lz4::{Encoder, EncoderBuilder};

use crate::compression::{Compressor, CompressorFactory, CountingWriter, Level};

type Sink = CountingWriter<Box<dyn Write + Send>>;

enum Session {
    /// No sink bound yet.
    Detached,
    /// Sink bound, no frame open. `framed` records whether a frame has been
    /// completed since the last reset.
    Idle { sink: Sink, framed: bool },
    Open(Encoder<Sink>),
    /// Opening a frame failed and took the sink with it. Cleared by `reset`.
    Failed { kind: io::ErrorKind, message: String },
    Closed,
}

/// LZ4 frame compressor that can be reset onto a new sink and reused.
pub struct Lz4Compressor {
    level: Level,
    session: Session,
    written: Arc<AtomicU64>,
}

impl Lz4Compressor {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            session: Session::Detached,
            written: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts a frame on `sink`. The frame header is written immediately, so a
    /// failing sink is consumed and the session records the error.
    fn begin_frame(&mut self, sink: Sink) -> io::Result<Encoder<Sink>> {
        EncoderBuilder::new()
            .level(self.level.tuning())
            .build(sink)
            .inspect_err(|err| {
                self.session = Session::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                };
            })
    }

    /// Finishes `encoder` and leaves the sink idle, even when finishing fails.
    fn end_frame(&mut self, encoder: Encoder<Sink>) -> io::Result<()> {
        let (mut sink, finished) = encoder.finish();
        let result = finished.and_then(|()| sink.flush());
        self.session = Session::Idle { sink, framed: true };
        result
    }

    fn open_frame(&mut self) -> io::Result<&mut Encoder<Sink>> {
        let session = mem::replace(&mut self.session, Session::Detached);
        self.session = match session {
            Session::Idle { sink, .. } => Session::Open(self.begin_frame(sink)?),
            open @ Session::Open(_) => open,
            Session::Detached => return Err(detached()),
            unusable => {
                let err = unusable_error(&unusable);
                self.session = unusable;
                return Err(err);
            }
        };

        match &mut self.session {
            Session::Open(encoder) => Ok(encoder),
            _ => Err(io::Error::other("lz4 frame failed to open")),
        }
    }
}

impl Write for Lz4Compressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.open_frame()?.write(buf)
    }

    /// Terminates the current frame and flushes the sink.
    fn flush(&mut self) -> io::Result<()> {
        match mem::replace(&mut self.session, Session::Detached) {
            Session::Open(encoder) => self.end_frame(encoder),
            Session::Idle {
                sink,
                framed: false,
            } => {
                // Nothing was written since the reset; emit an empty frame so
                // the sink still holds a decodable stream.
                let encoder = self.begin_frame(sink)?;
                self.end_frame(encoder)
            }
            Session::Idle {
                mut sink,
                framed: true,
            } => {
                let result = sink.flush();
                self.session = Session::Idle { sink, framed: true };
                result
            }
            Session::Detached => Ok(()),
            Session::Closed => {
                self.session = Session::Closed;
                Ok(())
            }
            failed @ Session::Failed { .. } => {
                let err = unusable_error(&failed);
                self.session = failed;
                Err(err)
            }
        }
    }
}

impl Compressor for Lz4Compressor {
    fn reset(&mut self, sink: Box<dyn Write + Send>) {
        if matches!(self.session, Session::Closed) {
            return;
        }

        let sink = CountingWriter::new(sink);
        self.written = sink.counter();
        self.session = Session::Idle {
            sink,
            framed: false,
        };
    }

    fn close(&mut self) -> io::Result<()> {
        let result = self.flush();
        self.session = Session::Closed;
        result
    }

    fn is_closed(&self) -> bool {
        matches!(self.session, Session::Closed)
    }

    fn count(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    fn level(&self) -> Level {
        self.level
    }
}

fn detached() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotConnected,
        "compressor has no sink; reset it before writing",
    )
}

fn unusable_error(session: &Session) -> io::Error {
    match session {
        Session::Failed { kind, message } => {
            io::Error::new(*kind, format!("lz4 frame failed to open: {message}"))
        }
        Session::Closed => io::Error::new(io::ErrorKind::BrokenPipe, "compressor is closed"),
        _ => detached(),
    }
}

/// Makes [`Lz4Compressor`]s at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct Lz4Factory {
    level: Level,
}

impl Lz4Factory {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl CompressorFactory for Lz4Factory {
    fn make(&self) -> Box<dyn Compressor> {
        Box::new(Lz4Compressor::new(self.level))
    }

    fn level(&self) -> Level {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Vec<u8>>>);

    impl RecordingSink {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().expect("sink mutex poisoned").clone()
        }
    }

    impl Write for RecordingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .expect("sink mutex poisoned")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        b"resource payload with some repetition, "
            .iter()
            .copied()
            .cycle()
            .take(len)
            .collect()
    }

    fn decode(frame: &[u8]) -> Vec<u8> {
        let mut decoder = lz4::Decoder::new(frame).expect("decoder");
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).expect("decode");
        out
    }

    #[test]
    fn count_matches_bytes_reaching_the_sink() {
        for level in Level::ALL {
            let sink = RecordingSink::default();
            let mut compressor = Lz4Compressor::new(level);
            compressor.reset(Box::new(sink.clone()));
            compressor.write_all(&payload(64 * 1024)).unwrap();
            compressor.flush().unwrap();

            let recorded = sink.bytes();
            assert!(!recorded.is_empty());
            assert_eq!(compressor.count(), recorded.len() as u64, "{level}");
        }
    }

    #[test]
    fn reset_isolates_the_second_payload() {
        let first = payload(32 * 1024);
        let second = b"short and different".to_vec();

        let mut reused = Lz4Compressor::new(Level::High);
        reused.reset(Box::new(RecordingSink::default()));
        reused.write_all(&first).unwrap();
        reused.flush().unwrap();
        let first_count = reused.count();

        let second_sink = RecordingSink::default();
        reused.reset(Box::new(second_sink.clone()));
        assert_eq!(reused.count(), 0);
        reused.write_all(&second).unwrap();
        reused.flush().unwrap();

        let mut fresh = Lz4Compressor::new(Level::High);
        fresh.reset(Box::new(RecordingSink::default()));
        fresh.write_all(&second).unwrap();
        fresh.flush().unwrap();

        assert_eq!(reused.count(), second_sink.bytes().len() as u64);
        assert_eq!(reused.count(), fresh.count());
        assert_ne!(reused.count(), first_count);
        assert_eq!(decode(&second_sink.bytes()), second);
    }

    #[test]
    fn reset_abandons_an_open_frame() {
        let first_sink = RecordingSink::default();
        let mut compressor = Lz4Compressor::new(Level::Fastest);
        compressor.reset(Box::new(first_sink.clone()));
        compressor.write_all(&payload(1024)).unwrap();

        let second_sink = RecordingSink::default();
        compressor.reset(Box::new(second_sink.clone()));
        compressor.write_all(b"next").unwrap();
        compressor.flush().unwrap();

        assert_eq!(compressor.count(), second_sink.bytes().len() as u64);
        assert_eq!(decode(&second_sink.bytes()), b"next");
    }

    #[test]
    fn flushed_output_decodes_independently() {
        let data = payload(200_000);
        let sink = RecordingSink::default();
        let mut compressor = Lz4Compressor::new(Level::MaxCompression);
        compressor.reset(Box::new(sink.clone()));
        compressor.write_all(&data).unwrap();
        compressor.flush().unwrap();

        assert!(compressor.count() < data.len() as u64);
        assert_eq!(decode(&sink.bytes()), data);
    }

    #[test]
    fn empty_job_still_produces_a_frame() {
        let sink = RecordingSink::default();
        let mut compressor = Lz4Compressor::new(Level::Medium);
        compressor.reset(Box::new(sink.clone()));
        compressor.flush().unwrap();

        assert!(compressor.count() > 0);
        assert!(decode(&sink.bytes()).is_empty());
    }

    #[test]
    fn repeated_flush_does_not_emit_extra_frames() {
        let sink = RecordingSink::default();
        let mut compressor = Lz4Compressor::new(Level::Medium);
        compressor.reset(Box::new(sink.clone()));
        compressor.write_all(b"once").unwrap();
        compressor.flush().unwrap();
        let after_first = compressor.count();
        compressor.flush().unwrap();

        assert_eq!(compressor.count(), after_first);
    }

    #[test]
    fn write_without_sink_is_rejected() {
        let mut compressor = Lz4Compressor::new(Level::Medium);
        let err = compressor.write(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_frame_keeps_reporting_the_sink_error() {
        let mut compressor = Lz4Compressor::new(Level::Medium);
        compressor.reset(Box::new(FullDisk));

        let first = compressor.write(b"data").unwrap_err();
        assert_eq!(first.kind(), io::ErrorKind::StorageFull);

        let again = compressor.write(b"data").unwrap_err();
        assert_eq!(again.kind(), io::ErrorKind::StorageFull);
        assert!(again.to_string().contains("disk full"), "{again}");
        let flushed = compressor.flush().unwrap_err();
        assert_eq!(flushed.kind(), io::ErrorKind::StorageFull);
        assert!(!compressor.is_closed());

        let sink = RecordingSink::default();
        compressor.reset(Box::new(sink.clone()));
        compressor.write_all(b"recovered").unwrap();
        compressor.flush().unwrap();
        assert_eq!(decode(&sink.bytes()), b"recovered");
    }

    #[test]
    fn empty_flush_on_a_failing_sink_reports_the_error() {
        let mut compressor = Lz4Compressor::new(Level::Fastest);
        compressor.reset(Box::new(FullDisk));

        assert_eq!(compressor.flush().unwrap_err().kind(), io::ErrorKind::StorageFull);
        let err = compressor.write(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::StorageFull);
    }

    #[test]
    fn close_is_terminal() {
        let sink = RecordingSink::default();
        let mut compressor = Lz4Compressor::new(Level::Medium);
        compressor.reset(Box::new(sink.clone()));
        compressor.write_all(b"final words").unwrap();
        compressor.close().unwrap();
        assert!(compressor.is_closed());
        assert_eq!(decode(&sink.bytes()), b"final words");

        compressor.reset(Box::new(RecordingSink::default()));
        let err = compressor.write(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
