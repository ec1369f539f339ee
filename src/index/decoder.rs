use crate::error::{BridgeError, Result};
use encoding_rs::Encoding;
use std::io::Read;
use std::path::Path;

/// Files above this size are read through a chunked loop instead of one
/// `fs::read` call
const LARGE_FILE_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Encoding choice inspects at most this many leading bytes
const DETECTION_PROBE_BYTES: usize = 8192;

const READ_CHUNK_BYTES: usize = 1024 * 1024;

/// Candidate encodings, tried in this order. GB2312 resolves through the
/// WHATWG label registry; Latin-1 text decodes via windows-1252.
fn candidate_encodings() -> [&'static Encoding; 4] {
    [
        encoding_rs::UTF_8,
        encoding_rs::GBK,
        Encoding::for_label(b"gb2312").unwrap_or(encoding_rs::GBK),
        encoding_rs::WINDOWS_1252,
    ]
}

/// Read a file and decode it to text.
///
/// Tries UTF-8, GBK, GB2312 and Latin-1 strictly, in that order, choosing by
/// a probe of the first 8 KiB and then decoding the whole file with the
/// chosen encoding. When no candidate decodes cleanly the bytes are decoded
/// as UTF-8 with malformed sequences replaced, and a warning is logged.
///
/// Only failing to open or read the file is an error.
pub fn decode_file(path: &Path) -> Result<String> {
    let bytes = read_bytes(path)?;
    Ok(decode_bytes(&bytes, &path.to_string_lossy()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    let file_read_err = |source: std::io::Error| BridgeError::FileRead {
        path: path.to_string_lossy().to_string(),
        source,
    };

    let size = std::fs::metadata(path).map_err(file_read_err)?.len();
    if size <= LARGE_FILE_THRESHOLD {
        return std::fs::read(path).map_err(file_read_err);
    }

    // Large file: bounded chunk reads, still accumulating one buffer since
    // the decoded result must be a single string
    let file = std::fs::File::open(path).map_err(file_read_err)?;
    let mut reader = std::io::BufReader::new(file);
    let mut bytes = Vec::with_capacity(size as usize);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = reader.read(&mut chunk).map_err(file_read_err)?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
    }
    Ok(bytes)
}

fn decode_bytes(bytes: &[u8], path_for_log: &str) -> String {
    let truncated = bytes.len() > DETECTION_PROBE_BYTES;
    let probe = &bytes[..bytes.len().min(DETECTION_PROBE_BYTES)];

    for encoding in candidate_encodings() {
        if !probe_decodes(encoding, probe, truncated) {
            continue;
        }
        // The probe only chose the candidate; the whole file must still
        // decode cleanly with it
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    log::warn!(
        "no supported encoding decodes {} cleanly, falling back to lossy UTF-8",
        path_for_log
    );
    String::from_utf8_lossy(bytes).into_owned()
}

/// Strict decode check over the probe window. When the probe is a prefix of
/// a larger file, a multi-byte sequence can straddle the window boundary, so
/// the tail is either trimmed or allowed to be incomplete.
fn probe_decodes(encoding: &'static Encoding, probe: &[u8], truncated: bool) -> bool {
    if encoding == encoding_rs::UTF_8 {
        return match std::str::from_utf8(probe) {
            Ok(_) => true,
            // error_len() of None means the only problem is an incomplete
            // sequence at the end of the window
            Err(e) => truncated && e.error_len().is_none(),
        };
    }

    let window = if truncated {
        &probe[..probe.len().saturating_sub(4)]
    } else {
        probe
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(window)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_decode_utf8() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.py");
        fs::write(&path, "def main():\n    return \"héllo\"\n").unwrap();

        let text = decode_file(&path).unwrap();
        assert!(text.contains("héllo"));
    }

    #[test]
    fn test_decode_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        fs::write(&path, b"").unwrap();
        assert_eq!(decode_file(&path).unwrap(), "");
    }

    #[test]
    fn test_decode_gbk() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cn.txt");
        // "你好" in GBK
        fs::write(&path, [0xC4u8, 0xE3, 0xBA, 0xC3]).unwrap();

        let text = decode_file(&path).unwrap();
        assert_eq!(text, "你好");
    }

    #[test]
    fn test_decode_latin1_after_gbk_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fr.txt");
        // "café" in latin-1: 0xE9 is invalid UTF-8; 0xE9 followed by ASCII-range
        // trail bytes is also invalid GBK, so detection lands on windows-1252
        fs::write(&path, [b'c', b'a', b'f', 0xE9, b'\n']).unwrap();

        let text = decode_file(&path).unwrap();
        assert_eq!(text, "café\n");
    }

    #[test]
    fn test_lossy_fallback_never_fails() {
        // 0x81 0x00: bare continuation byte in UTF-8, invalid GBK pair,
        // and 0x81 is undefined in windows-1252
        let text = decode_bytes(&[0x81, 0x00, b'o', b'k'], "x.bin");
        assert!(text.contains("ok"));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_probe_accepts_utf8_split_at_boundary() {
        // Multi-byte char straddling the probe window must not disqualify UTF-8
        let mut bytes = vec![b'a'; DETECTION_PROBE_BYTES - 1];
        bytes.extend("é".as_bytes()); // 2 bytes, second lands past the window
        bytes.extend(b" tail");
        let text = decode_bytes(&bytes, "straddle.txt");
        assert!(text.ends_with("é tail"));
    }

    #[test]
    fn test_missing_file_is_file_read_error() {
        let err = decode_file(Path::new("/no/such/file.py")).unwrap_err();
        assert!(matches!(err, BridgeError::FileRead { .. }));
    }
}
