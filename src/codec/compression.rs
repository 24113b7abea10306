//! Compression strategies applied to encoded bodies.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use super::SerializationError;

const ZSTD_LEVEL: i32 = 0;
const BROTLI_QUALITY: i32 = 5;

/// Reversible byte-stream transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Compression {
    None,
    Gzip,
    Brotli,
    Zstd,
}

strategy_names!(Compression {
    None => "none",
    Gzip => "gzip",
    Brotli => "brotli",
    Zstd => "zstd",
});

impl Compression {
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>, SerializationError> {
        let result = match self {
            Compression::None => Ok(input.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(input).and_then(|_| encoder.finish())
            }
            Compression::Brotli => {
                let params = brotli::enc::BrotliEncoderParams {
                    quality: BROTLI_QUALITY,
                    ..Default::default()
                };
                let mut output = Vec::new();
                brotli::BrotliCompress(&mut &input[..], &mut output, &params).map(|_| output)
            }
            Compression::Zstd => zstd::encode_all(input, ZSTD_LEVEL),
        };
        result.map_err(|source| self.error(source))
    }

    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>, SerializationError> {
        let result = match self {
            Compression::None => Ok(input.to_vec()),
            Compression::Gzip => {
                let mut output = Vec::new();
                GzDecoder::new(input).read_to_end(&mut output).map(|_| output)
            }
            Compression::Brotli => {
                let mut output = Vec::new();
                brotli::BrotliDecompress(&mut &input[..], &mut output).map(|_| output)
            }
            Compression::Zstd => zstd::decode_all(input),
        };
        result.map_err(|source| self.error(source))
    }

    fn error(&self, source: std::io::Error) -> SerializationError {
        SerializationError::Compression {
            algorithm: self.name(),
            source,
        }
    }
}
