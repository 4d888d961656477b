use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ResgenError;

pub mod counter;
pub mod lz4;
pub mod pool;

pub use counter::CountingWriter;
pub use self::lz4::{Lz4Compressor, Lz4Factory};
pub use pool::{CompressorPool, PoolMetricsSnapshot, PooledCompressor};

/// Compression effort selected once per build run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Fastest,
    #[default]
    Medium,
    High,
    #[serde(alias = "max", alias = "lz4hc")]
    MaxCompression,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Fastest,
        Level::Medium,
        Level::High,
        Level::MaxCompression,
    ];

    /// Codec tuning parameter for this level.
    ///
    /// `MaxCompression` selects the high-compression LZ4 variant.
    pub fn tuning(self) -> u32 {
        match self {
            Level::Fastest => 0,
            Level::Medium => 3,
            Level::High => 5,
            Level::MaxCompression => 9,
        }
    }
}

/// Numeric levels outside 0..=3 fall back to [`Level::Medium`].
impl From<u8> for Level {
    fn from(raw: u8) -> Self {
        match raw {
            0 => Level::Fastest,
            1 => Level::Medium,
            2 => Level::High,
            3 => Level::MaxCompression,
            _ => Level::default(),
        }
    }
}

impl FromStr for Level {
    type Err = ResgenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if let Ok(raw) = trimmed.parse::<u8>() {
            return Ok(Level::from(raw));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "fastest" => Ok(Level::Fastest),
            "medium" => Ok(Level::Medium),
            "high" => Ok(Level::High),
            "max" | "max-compression" | "maxcompression" | "lz4hc" => Ok(Level::MaxCompression),
            other => Err(ResgenError::InvalidConfig(format!(
                "unknown compression level '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Fastest => "fastest",
            Level::Medium => "medium",
            Level::High => "high",
            Level::MaxCompression => "max-compression",
        };
        f.write_str(name)
    }
}

/// A streaming, resettable compression sink.
///
/// The lifecycle for each resource is `reset` → `write`* → `flush`. `flush`
/// ([`Write::flush`]) terminates the current compressed frame so the bytes
/// written to the sink decode on their own; the instance can then be reset
/// for the next resource. `close` is terminal.
///
/// An instance is owned by one job at a time and must not be shared between
/// concurrently running jobs.
pub trait Compressor: Write + Send {
    /// Binds a fresh sink and zeroes the byte counter.
    ///
    /// Any frame still open against the previous sink is abandoned. Nothing
    /// written to the previous sink is ever counted against the new one.
    fn reset(&mut self, sink: Box<dyn Write + Send>);

    /// Terminates any open frame and releases the sink.
    fn close(&mut self) -> io::Result<()>;

    /// Whether `close` has been called. A closed instance ignores `reset`.
    fn is_closed(&self) -> bool;

    /// Bytes written to the current sink since the last reset.
    fn count(&self) -> u64;

    fn level(&self) -> Level;
}

/// Builds compressor instances for one level.
pub trait CompressorFactory: Send + Sync {
    fn make(&self) -> Box<dyn Compressor>;

    fn level(&self) -> Level;
}

/// Selects the compressor implementation for `level`.
pub fn factory_for(level: Level) -> Arc<dyn CompressorFactory> {
    match level {
        Level::Fastest | Level::Medium | Level::High | Level::MaxCompression => {
            Arc::new(Lz4Factory::new(level))
        }
    }
}
