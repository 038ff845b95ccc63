//! Artifact Verification
//!
//! SHA256 checksums for downloaded artifacts, when the manifest publishes them.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use thiserror::Error;

/// Verification errors
#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Calculate SHA256 checksum of a file
pub fn calculate_sha256(path: &Path) -> Result<String, VerifyError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file's checksum (case-insensitive hex)
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), VerifyError> {
    let actual = calculate_sha256(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(VerifyError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_sha256_calculation() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        assert_eq!(calculate_sha256(file.path()).unwrap(), HELLO_SHA);
    }

    #[test]
    fn test_checksum_verification() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();
        file.flush().unwrap();

        assert!(verify_checksum(file.path(), &HELLO_SHA.to_uppercase()).is_ok());
        assert!(matches!(
            verify_checksum(file.path(), "wrongchecksum"),
            Err(VerifyError::ChecksumMismatch { .. })
        ));
    }
}
