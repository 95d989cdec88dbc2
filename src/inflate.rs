//! zlib decompression to a caller-sized buffer.
//!
//! Every compressed payload in these formats (AAR's `ZLB` frames, QNT's
//! pixel and alpha planes) records its own uncompressed size up front, so
//! there's no streaming API here: decompress once, into a buffer of exactly
//! the expected size, or fail.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{ErrorKind, Result};

pub fn inflate(compressed: &[u8], expected_size: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(compressed);
    let mut out = Vec::with_capacity(expected_size);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ErrorKind::DecompressFailed(e.to_string()))?;

    if out.len() != expected_size {
        return Err(ErrorKind::SizeMismatch(expected_size, out.len()).into());
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn round_trips_exact_size() {
        let data = b"hello, hello, hello, hello".to_vec();
        let compressed = zlib_compress(&data);
        let out = inflate(&compressed, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn fails_on_size_mismatch() {
        let data = b"hello".to_vec();
        let compressed = zlib_compress(&data);
        let err = inflate(&compressed, data.len() + 1).unwrap_err();
        match err.0 {
            ErrorKind::SizeMismatch(expected, actual) => {
                assert_eq!(expected, 6);
                assert_eq!(actual, 5);
            }
            _ => panic!("expected SizeMismatch"),
        }
    }
}
