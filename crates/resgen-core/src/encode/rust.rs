use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use crate::compression::CompressorPool;
use crate::encode::Encoder;
use crate::error::ResgenError;
use crate::fs::Fs;
use crate::telemetry::targets;
use crate::types::{Encoded, Result};

/// Name of the index module written by [`RustEncoder::finalize`].
pub const INDEX_MODULE: &str = "mod.rs";

const BYTES_PER_LINE: usize = 12;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

#[derive(Debug, Clone)]
struct ModuleEntry {
    name: String,
    encoded: Option<Encoded>,
}

/// Generates one Rust module per resource holding its LZ4-compressed bytes
/// as a `static` array, and a `mod.rs` index over all of them.
pub struct RustEncoder {
    target: Arc<dyn Fs>,
    compressors: CompressorPool,
    modules: Mutex<BTreeMap<String, ModuleEntry>>,
}

impl RustEncoder {
    pub fn new(target: Arc<dyn Fs>, compressors: CompressorPool) -> Self {
        Self {
            target,
            compressors,
            modules: Mutex::new(BTreeMap::new()),
        }
    }

    /// Reserves the module identifier for `name`, failing if another
    /// resource already maps to it.
    fn claim(&self, name: &str) -> Result<String> {
        let ident = module_ident(name);
        let mut modules = self.lock_modules()?;
        match modules.entry(ident.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(ModuleEntry {
                    name: name.to_string(),
                    encoded: None,
                });
                Ok(ident)
            }
            Entry::Occupied(existing) => Err(ResgenError::Encode(format!(
                "'{name}' and '{}' both map to module '{ident}'",
                existing.get().name
            ))),
        }
    }

    fn lock_modules(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ModuleEntry>>> {
        self.modules
            .lock()
            .map_err(|_| ResgenError::Encode("module table lock poisoned".to_string()))
    }
}

impl Encoder for RustEncoder {
    fn encode(&self, name: &str, input: &mut dyn Read) -> Result<Encoded> {
        let ident = self.claim(name)?;

        let buffer = SharedBuffer::default();
        let encoded = {
            let mut compressor = self.compressors.acquire(Box::new(buffer.clone()));
            let size = io::copy(input, &mut *compressor)?;
            compressor.flush()?;
            Encoded {
                size,
                compressed_size: compressor.count(),
            }
        };
        let compressed = buffer.take()?;

        let mut output = self.target.create(&format!("{ident}.rs"))?;
        write_resource_module(&mut output, name, encoded.size, &compressed)?;
        output.flush()?;

        if let Some(module) = self.lock_modules()?.get_mut(&ident) {
            module.encoded = Some(encoded);
        }
        Ok(encoded)
    }

    fn finalize(&self) -> Result<()> {
        let modules = self.lock_modules()?.clone();
        let mut resources: Vec<(&String, &ModuleEntry)> = modules
            .iter()
            .filter(|(_, module)| module.encoded.is_some())
            .collect();
        resources.sort_by(|(_, a), (_, b)| a.name.cmp(&b.name));

        let mut output = self.target.create(INDEX_MODULE)?;
        write_index_module(&mut output, &resources)?;
        output.flush()?;

        tracing::debug!(
            target: targets::ENCODE,
            modules = resources.len(),
            "wrote rust resource index"
        );
        Ok(())
    }
}

/// Maps a resource name to a Rust module identifier.
///
/// ASCII alphanumerics are lowercased, everything else becomes `_`. Names
/// starting with a digit or colliding with a keyword get an `r_` prefix.
pub fn module_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let needs_prefix = ident.is_empty()
        || ident == "_"
        || ident.starts_with(|ch: char| ch.is_ascii_digit())
        || KEYWORDS.contains(&ident.as_str());
    if needs_prefix {
        ident.insert_str(0, "r_");
    }
    ident
}

fn write_resource_module(
    out: &mut dyn Write,
    name: &str,
    size: u64,
    compressed: &[u8],
) -> io::Result<()> {
    writeln!(out, "// @generated by resgen from {name:?}. Do not edit.")?;
    writeln!(out)?;
    writeln!(out, "/// Original resource name.")?;
    writeln!(out, "pub const NAME: &str = {name:?};")?;
    writeln!(out, "/// Uncompressed size in bytes.")?;
    writeln!(out, "pub const SIZE: usize = {size};")?;
    writeln!(out, "/// LZ4 frame holding the resource contents.")?;
    writeln!(out, "pub static DATA: [u8; {}] = [", compressed.len())?;
    for line in compressed.chunks(BYTES_PER_LINE) {
        write!(out, "   ")?;
        for byte in line {
            write!(out, " 0x{byte:02x},")?;
        }
        writeln!(out)?;
    }
    writeln!(out, "];")
}

fn write_index_module(
    out: &mut dyn Write,
    resources: &[(&String, &ModuleEntry)],
) -> io::Result<()> {
    writeln!(out, "// @generated by resgen. Do not edit.")?;
    writeln!(out)?;

    let mut idents: Vec<&String> = resources.iter().map(|(ident, _)| *ident).collect();
    idents.sort();
    for ident in &idents {
        writeln!(out, "pub mod {ident};")?;
    }
    if !idents.is_empty() {
        writeln!(out)?;
    }

    writeln!(out, "/// A bundled, LZ4-compressed resource.")?;
    writeln!(out, "#[derive(Debug, Clone, Copy)]")?;
    writeln!(out, "pub struct Resource {{")?;
    writeln!(out, "    pub name: &'static str,")?;
    writeln!(out, "    pub size: usize,")?;
    writeln!(out, "    pub data: &'static [u8],")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "/// Every bundled resource, sorted by name.")?;
    writeln!(out, "pub static RESOURCES: &[Resource] = &[")?;
    for (ident, _) in resources {
        writeln!(
            out,
            "    Resource {{ name: {ident}::NAME, size: {ident}::SIZE, data: &{ident}::DATA }},"
        )?;
    }
    writeln!(out, "];")?;
    writeln!(out)?;
    writeln!(out, "/// Looks up a resource by its original name.")?;
    writeln!(out, "pub fn find(name: &str) -> Option<&'static Resource> {{")?;
    writeln!(out, "    RESOURCES")?;
    writeln!(out, "        .binary_search_by(|resource| resource.name.cmp(name))")?;
    writeln!(out, "        .ok()")?;
    writeln!(out, "        .map(|index| &RESOURCES[index])")?;
    writeln!(out, "}}")
}

/// Cloneable in-memory sink; the compressor owns one handle while the
/// encoder keeps another to collect the frame.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn take(&self) -> io::Result<Vec<u8>> {
        self.0
            .lock()
            .map(|mut bytes| std::mem::take(&mut *bytes))
            .map_err(|_| io::Error::other("compressed buffer lock poisoned"))
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut bytes = self
            .0
            .lock()
            .map_err(|_| io::Error::other("compressed buffer lock poisoned"))?;
        bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
