//! Transparent decompression of downloaded feed files.

use std::io::{BufRead, BufReader};

use flate2::bufread::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether `bytes` start with the gzip magic number.
#[must_use]
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Open a feed file as an XML byte stream, gunzipping it when needed.
///
/// Decompression is streamed; the inflated document is never held in memory
/// as a whole.
///
/// # Examples
/// ```
/// use std::io::Read;
/// use trafficflow_ingest::gzip::open_document;
///
/// let mut text = String::new();
/// open_document(b"<a/>").read_to_string(&mut text).unwrap();
/// assert_eq!(text, "<a/>");
/// ```
pub fn open_document(bytes: &[u8]) -> Box<dyn BufRead + '_> {
    if is_gzip(bytes) {
        Box::new(BufReader::new(MultiGzDecoder::new(bytes)))
    } else {
        Box::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_gzipped_document() {
        let compressed = gzip(b"<root><a>1</a></root>");
        assert!(is_gzip(&compressed));

        let mut text = String::new();
        open_document(&compressed).read_to_string(&mut text).unwrap();
        assert_eq!(text, "<root><a>1</a></root>");
    }

    #[test]
    fn test_plain_document_passes_through() {
        assert!(!is_gzip(b"<root/>"));
        assert!(!is_gzip(b""));
    }

    #[test]
    fn test_corrupt_gzip_is_io_error() {
        let mut compressed = gzip(b"<root/>");
        compressed.truncate(12);
        let mut text = String::new();
        assert!(open_document(&compressed).read_to_string(&mut text).is_err());
    }
}
