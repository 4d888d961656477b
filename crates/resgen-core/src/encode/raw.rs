use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::compression::CompressorPool;
use crate::encode::Encoder;
use crate::fs::Fs;
use crate::types::{Encoded, Result};

/// Stores each resource as a standalone LZ4 frame under its own name.
pub struct RawEncoder {
    target: Arc<dyn Fs>,
    compressors: CompressorPool,
}

impl RawEncoder {
    pub fn new(target: Arc<dyn Fs>, compressors: CompressorPool) -> Self {
        Self {
            target,
            compressors,
        }
    }
}

impl Encoder for RawEncoder {
    fn encode(&self, name: &str, input: &mut dyn Read) -> Result<Encoded> {
        let sink = self.target.create(name)?;
        let mut compressor = self.compressors.acquire(sink);
        let size = io::copy(input, &mut *compressor)?;
        compressor.flush()?;

        Ok(Encoded {
            size,
            compressed_size: compressor.count(),
        })
    }

    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}
