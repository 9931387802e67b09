//! Compact binary cache codec.
//!
//! File layout: the bincode-encoded [`CacheHeader`] immediately followed by
//! the bincode-encoded [`Extension`]. The header can be decoded on its own
//! without touching the rest of the file.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use bincode::Options;

use crate::components::Extension;
use crate::error::Result;
use crate::kinds::KindRegistry;

use super::{CacheCodec, CacheHeader};

/// Upper bound on the encoded header size.
const HEADER_LIMIT: u64 = 64 * 1024;

/// Bincode codec (`.bin` files).
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryCodec;

fn options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .allow_trailing_bytes()
        .with_limit(limit)
}

impl CacheCodec for BinaryCodec {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn file_extension(&self) -> &'static str {
        "bin"
    }

    fn layout_tag(&self) -> &'static str {
        "bin2"
    }

    fn encode(&self, header: &CacheHeader, extension: &Extension) -> Result<Vec<u8>> {
        let opts = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes();
        let mut bytes = opts.serialize(header)?;
        bytes.extend(opts.serialize(extension)?);
        Ok(bytes)
    }

    fn read_header(&self, path: &Path) -> Result<CacheHeader> {
        let reader = BufReader::new(fs::File::open(path)?);
        Ok(options(HEADER_LIMIT).deserialize_from(reader)?)
    }

    fn decode(&self, path: &Path, _registry: &KindRegistry) -> Result<Extension> {
        let bytes = fs::read(path)?;
        let limit = bytes.len() as u64;
        let mut reader = bytes.as_slice();
        let _header: CacheHeader = options(limit).deserialize_from(&mut reader)?;
        Ok(options(limit).deserialize_from(&mut reader)?)
    }
}
