//! Content inspection: binary sniffing, encoding detection, bounded reads.
//!
//! Files are read without following symlinks (O_NOFOLLOW where the platform
//! supports it) and rejected before scanning when they are binary, too
//! large, or undecodable.

use std::fs::OpenOptions;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from content inspection and bounded reads.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("binary content detected in {0}")]
    BinaryDetected(PathBuf),

    #[error("failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("symlink rejected: {0}")]
    SymlinkRejected(PathBuf),
}

/// Detected text encoding of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16Be,
    Utf16Le,
    Latin1,
    Binary,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Latin1 => "latin1",
            Encoding::Binary => "binary",
        }
    }
}

/// Classify the first 512 bytes as binary or text.
///
/// Empty content is text. Any NUL byte is binary. Otherwise a control-byte
/// ratio above 0.2 is binary.
pub fn is_binary_content(content: &[u8]) -> bool {
    if content.is_empty() {
        return false;
    }

    let window = &content[..content.len().min(512)];
    if window.contains(&0) {
        return true;
    }

    let control = window
        .iter()
        .filter(|&&b| b < 9 || (b > 13 && b < 32) || b == 127)
        .count();

    control as f64 / window.len() as f64 > 0.2
}

/// Detect the encoding of a buffer.
///
/// BOMs win outright. A NUL byte in the first 8 KiB means binary. Otherwise
/// high bytes are weighed against validated multi-byte UTF-8 sequences: when
/// invalid sequences dominate and high bytes are present the buffer is
/// treated as latin1, else utf-8.
pub fn detect_encoding(content: &[u8]) -> Encoding {
    if content.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return Encoding::Utf8;
    }
    if content.starts_with(&[0xFE, 0xFF]) {
        return Encoding::Utf16Be;
    }
    if content.starts_with(&[0xFF, 0xFE]) {
        return Encoding::Utf16Le;
    }

    let window = &content[..content.len().min(8192)];
    if window.contains(&0) {
        return Encoding::Binary;
    }

    let mut high_bytes = 0usize;
    let mut valid_sequences = 0usize;
    let mut invalid_sequences = 0usize;

    let mut i = 0;
    while i < window.len() {
        let b = window[i];
        if b < 0x80 {
            i += 1;
            continue;
        }
        high_bytes += 1;

        let len = if b & 0xE0 == 0xC0 {
            2
        } else if b & 0xF0 == 0xE0 {
            3
        } else if b & 0xF8 == 0xF0 {
            4
        } else {
            invalid_sequences += 1;
            i += 1;
            continue;
        };

        if i + len <= window.len()
            && window[i + 1..i + len].iter().all(|&c| c & 0xC0 == 0x80)
        {
            valid_sequences += 1;
            i += len;
        } else {
            invalid_sequences += 1;
            i += 1;
        }
    }

    if high_bytes > 0 && invalid_sequences > valid_sequences {
        Encoding::Latin1
    } else {
        Encoding::Utf8
    }
}

/// Read a file for scanning, enforcing the size limit and binary rejection.
///
/// Symlinks are refused at open time; callers run [`super::PathGuard`]
/// first, this is the second line of defense against a swap between check
/// and use.
pub fn read_scan_file(path: &Path, max_bytes: u64) -> Result<String, ContentError> {
    let metadata = std::fs::symlink_metadata(path).map_err(|e| ContentError::OpenFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.file_type().is_symlink() {
        return Err(ContentError::SymlinkRejected(path.to_path_buf()));
    }

    if metadata.len() > max_bytes {
        return Err(ContentError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_bytes,
        });
    }

    let mut opts = OpenOptions::new();
    opts.read(true);

    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_NOFOLLOW);
    }

    let file = opts.open(path).map_err(|e| ContentError::OpenFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    let mut reader = BufReader::new(file).take(max_bytes);
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| ContentError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if is_binary_content(&bytes) {
        return Err(ContentError::BinaryDetected(path.to_path_buf()));
    }

    match detect_encoding(&bytes) {
        Encoding::Binary => Err(ContentError::BinaryDetected(path.to_path_buf())),
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
