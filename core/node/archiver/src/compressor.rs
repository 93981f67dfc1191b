use std::io::{Read as _, Write as _};

use flate2::{read::GzDecoder, Compression, GzBuilder};

use crate::error::{ArchiverError, ErrorContext};

/// gzip at a configurable level in [1, 9]. The header mtime is zeroed so the
/// same input at the same level yields byte-identical output, which is what
/// makes archive keys safely re-uploadable.
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: u32,
}

impl Default for Compressor {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl Compressor {
    pub fn new(level: u32) -> Result<Self, ArchiverError> {
        if !(1..=9).contains(&level) {
            return Err(ArchiverError::configuration(format!(
                "compression level must be between 1 and 9, got {level}"
            )));
        }
        Ok(Self { level })
    }

    /// Returns `(compressed, uncompressed_size, compressed_size)`.
    pub fn compress(&self, data: &[u8]) -> Result<(Vec<u8>, u64, u64), ArchiverError> {
        let uncompressed_size = data.len() as u64;
        let mut encoder = GzBuilder::new()
            .mtime(0)
            .write(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(data)
            .and_then(|()| encoder.finish())
            .map(|compressed| {
                let compressed_size = compressed.len() as u64;
                (compressed, uncompressed_size, compressed_size)
            })
            .map_err(|err| ArchiverError::Compression {
                message: format!("compression failed: {err}"),
                context: ErrorContext::from([(
                    "uncompressed_size".to_string(),
                    uncompressed_size.to_string(),
                )]),
            })
    }

    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>, ArchiverError> {
        let mut decoder = GzDecoder::new(compressed);
        let mut data = Vec::new();
        decoder
            .read_to_end(&mut data)
            .map_err(|err| ArchiverError::Compression {
                message: format!("decompression failed: {err}"),
                context: ErrorContext::from([(
                    "compressed_size".to_string(),
                    compressed.len().to_string(),
                )]),
            })?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn round_trip() {
        let compressor = Compressor::default();
        let payload = b"{\"id\":1}\n{\"id\":2}".repeat(100);
        let (compressed, raw_size, gz_size) = compressor.compress(&payload).unwrap();
        assert_eq!(raw_size, payload.len() as u64);
        assert_eq!(gz_size, compressed.len() as u64);
        assert!(gz_size < raw_size);
        assert_eq!(compressor.decompress(&compressed).unwrap(), payload);
    }

    #[test]
    fn output_is_deterministic_for_a_fixed_level() {
        let compressor = Compressor::new(6).unwrap();
        let payload = b"deterministic payload".repeat(50);
        let (a, _, _) = compressor.compress(&payload).unwrap();
        let (b, _, _) = compressor.compress(&payload).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_level_is_rejected() {
        assert_matches!(Compressor::new(0), Err(ArchiverError::Configuration { .. }));
        assert_matches!(Compressor::new(10), Err(ArchiverError::Configuration { .. }));
        assert!(Compressor::new(1).is_ok());
        assert!(Compressor::new(9).is_ok());
    }

    #[test]
    fn truncated_input_fails_decompression() {
        let compressor = Compressor::default();
        let (compressed, _, _) = compressor.compress(b"some payload worth compressing").unwrap();
        let truncated = &compressed[..compressed.len() / 2];
        assert_matches!(
            compressor.decompress(truncated),
            Err(ArchiverError::Compression { .. })
        );
    }

    #[test]
    fn corrupt_input_fails_decompression() {
        let compressor = Compressor::default();
        let (mut compressed, _, _) = compressor.compress(b"payload".as_slice()).unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xff;
        assert_matches!(
            compressor.decompress(&compressed),
            Err(ArchiverError::Compression { .. })
        );
    }

    #[test]
    fn empty_input_round_trips() {
        let compressor = Compressor::default();
        let (compressed, raw_size, _) = compressor.compress(b"").unwrap();
        assert_eq!(raw_size, 0);
        assert_eq!(compressor.decompress(&compressed).unwrap(), b"");
    }
}
