use std::fs::File;
use std::io::Read;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use flate2::read::GzDecoder;

use crate::error::{LogQueryError, Result};

/// File reader: whole-file text with encoding detection and gzip support.
#[derive(Clone)]
pub struct FileReader {
    pub buffer_size: usize,
}

impl Default for FileReader {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl FileReader {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size }
    }

    /// Read a file to text. `.gz` files are decompressed first.
    pub fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = self.read_bytes(path).map_err(|e| LogQueryError::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(decode(&bytes))
    }

    fn read_bytes(&self, path: &Path) -> std::io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut out = Vec::new();
        if is_gz(path) {
            let mut gz = GzDecoder::new(std::io::BufReader::with_capacity(self.buffer_size, file));
            gz.read_to_end(&mut out)?;
        } else {
            let mut reader = std::io::BufReader::with_capacity(self.buffer_size, file);
            reader.read_to_end(&mut out)?;
        }
        Ok(out)
    }
}

fn is_gz(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("gz"))
}

fn decode(bytes: &[u8]) -> String {
    let (encoding, bom_len) = detect_from_prefix(bytes);
    let (cow, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
    cow.into_owned()
}

fn detect_from_prefix(prefix: &[u8]) -> (&'static Encoding, usize) {
    if prefix.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return (encoding_rs::UTF_8, 3);
    }
    if prefix.starts_with(&[0xFF, 0xFE]) {
        return (encoding_rs::UTF_16LE, 2);
    }
    if prefix.starts_with(&[0xFE, 0xFF]) {
        return (encoding_rs::UTF_16BE, 2);
    }
    if std::str::from_utf8(prefix).is_ok() {
        return (encoding_rs::UTF_8, 0);
    }

    let sample = &prefix[..prefix.len().min(8192)];
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    (detector.guess(None, true), 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn read_utf8_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.log");
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let text = FileReader::default().read_text(&path).unwrap();
        assert_eq!(text, "first\nsecond\n");
    }

    #[test]
    fn read_gzip_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample.log.gz");
        {
            let file = std::fs::File::create(&path).unwrap();
            let mut enc = GzEncoder::new(file, Compression::default());
            enc.write_all(b"gz-line-1\ngz-line-2\n").unwrap();
            enc.finish().unwrap();
        }

        let text = FileReader::default().read_text(&path).unwrap();
        assert_eq!(text, "gz-line-1\ngz-line-2\n");
    }

    #[test]
    fn corrupt_gzip_is_unreadable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.log.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let err = FileReader::default().read_text(&path).unwrap_err();
        assert!(matches!(err, LogQueryError::FileUnreadable { .. }));
    }

    #[test]
    fn detect_utf16_with_bom() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("utf16.log");
        let content = "{\"message\":\"你好\"}\n";
        let mut bytes = vec![0xFF, 0xFE];
        for u in content.encode_utf16() {
            bytes.extend_from_slice(&u.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let text = FileReader::default().read_text(&path).unwrap();
        assert_eq!(text, content);
    }

    #[test]
    fn legacy_encoding_is_decoded() {
        let original = "{\"message\": \"错误: 连接失败, 请稍后重试\"}\n".repeat(5);
        let (bytes, _, _) = encoding_rs::GBK.encode(&original);
        assert!(std::str::from_utf8(&bytes).is_err());

        assert_eq!(decode(&bytes), original);
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bom.log");
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"{}\n");
        std::fs::write(&path, bytes).unwrap();

        assert_eq!(FileReader::default().read_text(&path).unwrap(), "{}\n");
    }
}
