use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::encode::Encoder;
use crate::fs::Fs;
use crate::types::{Encoded, Result};

/// Stages resources byte for byte. Reports no compressed payload.
pub struct CopyEncoder {
    target: Arc<dyn Fs>,
}

impl CopyEncoder {
    pub fn new(target: Arc<dyn Fs>) -> Self {
        Self { target }
    }
}

impl Encoder for CopyEncoder {
    fn encode(&self, name: &str, input: &mut dyn Read) -> Result<Encoded> {
        let mut output = self.target.create(name)?;
        let size = io::copy(input, &mut output)?;
        output.flush()?;

        Ok(Encoded {
            size,
            compressed_size: 0,
        })
    }

    fn finalize(&self) -> Result<()> {
        Ok(())
    }
}
