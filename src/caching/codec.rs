//! Payload codec for the remote tier.
//!
//! Payloads are JSON arrays of records, optionally gzip-compressed. The first
//! byte marks the format so entries written before compression was toggled
//! remain readable.

use crate::core::error::{CacheError, CacheResult};
use crate::core::types::Record;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const PLAIN_MARKER: u8 = b'J';
const GZIP_MARKER: u8 = b'Z';

/// Encodes and decodes cached result lists
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    compression: bool,
    level: u32,
}

impl PayloadCodec {
    pub fn new(compression: bool) -> Self {
        Self { compression, level: 6 }
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression
    }

    /// Serialize records into a tagged payload
    pub fn encode(&self, records: &[Record]) -> CacheResult<Vec<u8>> {
        let json = serde_json::to_vec(records)?;

        if !self.compression {
            let mut payload = Vec::with_capacity(json.len() + 1);
            payload.push(PLAIN_MARKER);
            payload.extend_from_slice(&json);
            return Ok(payload);
        }

        let mut encoder = GzEncoder::new(vec![GZIP_MARKER], Compression::new(self.level));
        encoder
            .write_all(&json)
            .map_err(|e| CacheError::compression(format!("Failed to compress payload: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| CacheError::compression(format!("Failed to finish compression: {}", e)))
    }

    /// Decode a tagged payload back into records
    pub fn decode(&self, payload: &[u8]) -> CacheResult<Vec<Record>> {
        let (marker, body) = payload
            .split_first()
            .ok_or_else(|| CacheError::compression("Empty payload"))?;

        match *marker {
            PLAIN_MARKER => Ok(serde_json::from_slice(body)?),
            GZIP_MARKER => {
                let mut json = Vec::new();
                GzDecoder::new(body)
                    .read_to_end(&mut json)
                    .map_err(|e| CacheError::compression(format!("Failed to decompress payload: {}", e)))?;
                Ok(serde_json::from_slice(&json)?)
            }
            other => Err(CacheError::compression(format!(
                "Unknown payload marker: 0x{:02x}",
                other
            ))),
        }
    }
}
