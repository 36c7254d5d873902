use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::core::ToolupError;

const SHA256_HEX_LEN: usize = 64;

/// The expected digest for one artifact, read from its checksum sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Lowercase hex SHA-256.
    pub digest: String,
    pub artifact: PathBuf,
}

impl ChecksumRecord {
    /// Parse sidecar content.
    ///
    /// The first whitespace-delimited token is the digest; anything after it
    /// (such as a file name) is ignored. A `sha256:` prefix is accepted.
    pub fn parse(artifact: &Path, content: &str) -> Result<Self> {
        let malformed = |reason: &str| -> anyhow::Error {
            ToolupError::IntegrityError {
                artifact: artifact.display().to_string(),
                reason: reason.to_string(),
            }
            .into()
        };

        // Trailing tokens are `sha256sum` output's file name
        let token = content.split_whitespace().next().ok_or_else(|| malformed("checksum file is empty"))?;
        let token = token
            .get(..7)
            .filter(|prefix| prefix.eq_ignore_ascii_case("sha256:"))
            .map_or(token, |_| &token[7..]);

        if token.len() != SHA256_HEX_LEN || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(malformed(&format!("checksum file does not hold a SHA-256 digest: '{token}'")));
        }

        Ok(Self {
            digest: token.to_ascii_lowercase(),
            artifact: artifact.to_path_buf(),
        })
    }
}

/// Verifies downloaded artifacts against their SHA-256 sidecar.
///
/// Verification must complete before extraction starts; a mismatch, or a
/// sidecar that does not hold a digest, is an [`ToolupError::IntegrityError`].
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Lowercase hex SHA-256 of a file, read in fixed-size chunks.
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {}", file_path.display());

        let mut file = fs::File::open(file_path)
            .await
            .with_context(|| format!("Failed to read file: {}", file_path.display()))?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .with_context(|| format!("Failed to read file: {}", file_path.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    pub async fn verify(record: &ChecksumRecord) -> Result<()> {
        info!("Verifying checksum for: {}", record.artifact.display());

        let actual = Self::compute_sha256(&record.artifact).await?;
        if actual != record.digest {
            return Err(ToolupError::IntegrityError {
                artifact: record.artifact.display().to_string(),
                reason: format!("expected {}, got {actual}", record.digest),
            }
            .into());
        }

        info!("Checksum verification successful");
        Ok(())
    }

    /// Read `sidecar` and verify `artifact` against it.
    pub async fn verify_sidecar(artifact: &Path, sidecar: &Path) -> Result<()> {
        let bytes = fs::read(sidecar)
            .await
            .with_context(|| format!("Failed to read checksum file: {}", sidecar.display()))?;
        let content = std::str::from_utf8(&bytes).map_err(|_| ToolupError::IntegrityError {
            artifact: artifact.display().to_string(),
            reason: "checksum file is not text".to_string(),
        })?;
        let record = ChecksumRecord::parse(artifact, content)?;
        Self::verify(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HELLO_SHA: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    fn file_with(contents: &[u8]) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents).unwrap();
        temp_file
    }

    fn is_integrity_error(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<ToolupError>(), Some(ToolupError::IntegrityError { .. }))
    }

    #[tokio::test]
    async fn test_compute_sha256() {
        let temp_file = file_with(b"Hello, World!");
        let checksum = ChecksumVerifier::compute_sha256(temp_file.path()).await.unwrap();
        assert_eq!(checksum, HELLO_SHA);
    }

    #[tokio::test]
    async fn test_verify_success_case_insensitive() {
        let temp_file = file_with(b"Hello, World!");

        for sidecar in [
            HELLO_SHA.to_string(),
            HELLO_SHA.to_uppercase(),
            format!("sha256:{HELLO_SHA}\n"),
            format!("{HELLO_SHA}  toolup-1.3.0.zip\n"),
        ] {
            let record = ChecksumRecord::parse(temp_file.path(), &sidecar).unwrap();
            ChecksumVerifier::verify(&record).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_single_byte_difference_is_rejected() {
        let temp_file = file_with(b"Hello, World?");
        let record = ChecksumRecord::parse(temp_file.path(), HELLO_SHA).unwrap();

        let err = ChecksumVerifier::verify(&record).await.unwrap_err();
        assert!(is_integrity_error(&err));
    }

    #[test]
    fn test_malformed_sidecar() {
        let artifact = Path::new("toolup.zip");
        for content in ["", "   \n", "not-hex", &HELLO_SHA[..63], format!("{HELLO_SHA}0").as_str(), "md5:abc"] {
            let err = ChecksumRecord::parse(artifact, content).unwrap_err();
            assert!(is_integrity_error(&err), "accepted {content:?}");
        }
    }

    #[tokio::test]
    async fn test_verify_sidecar_file() {
        let artifact = file_with(b"Hello, World!");
        let sidecar = file_with(HELLO_SHA.as_bytes());
        ChecksumVerifier::verify_sidecar(artifact.path(), sidecar.path()).await.unwrap();

        let empty = file_with(b"");
        let err = ChecksumVerifier::verify_sidecar(artifact.path(), empty.path()).await.unwrap_err();
        assert!(is_integrity_error(&err));
    }

    #[tokio::test]
    async fn test_binary_sidecar_is_integrity_error() {
        let artifact = file_with(b"Hello, World!");
        let sidecar = file_with(&[0xff, 0xfe, 0x00, 0x41]);

        let err = ChecksumVerifier::verify_sidecar(artifact.path(), sidecar.path()).await.unwrap_err();
        assert!(is_integrity_error(&err));
        assert!(format!("{:?}", err.downcast_ref::<ToolupError>()).contains("not text"));
    }
}
