//! Resource extraction
//!
//! The OS loader can only open libraries from the file system, so the
//! embedded bytes are written to a scratch directory first. Every artifact
//! gets a fresh, unpredictable name created with exclusive-create semantics,
//! so nothing placed at a guessable path ahead of time can be picked up
//! instead of the real library.

use crate::blob::{sha256_hex, EmbeddedBlob};
use crate::error::{BridgeError, BridgeResult};
use nativelib_config::BridgeConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Number of random characters in every artifact name
const RANDOM_NAME_LEN: usize = 16;

/// An embedded library materialized on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedArtifact {
    path: PathBuf,
    len: u64,
    sha256: String,
}

impl ExtractedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hex-encoded SHA-256 of the bytes written
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Delete the artifact from disk
    pub fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }

    /// Read the file back and compare it against what was written
    pub fn verify(&self) -> BridgeResult<()> {
        let bytes = fs::read(&self.path).map_err(|e| BridgeError::extraction(&self.path, e))?;
        let actual_sha256 = sha256_hex(&bytes);
        let actual_len = bytes.len() as u64;

        if actual_len != self.len || actual_sha256 != self.sha256 {
            return Err(BridgeError::Integrity {
                path: self.path.clone(),
                expected_len: self.len,
                actual_len,
                expected_sha256: self.sha256.clone(),
                actual_sha256,
            });
        }
        Ok(())
    }
}

/// Writes embedded libraries to uniquely named files
#[derive(Debug, Clone)]
pub struct ResourceExtractor {
    scratch_dir: PathBuf,
    prefix: String,
    verify: bool,
}

impl ResourceExtractor {
    /// Create an extractor writing into `scratch_dir`
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            prefix: nativelib_config::DEFAULT_FILE_PREFIX.to_string(),
            verify: true,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir(),
            prefix: config.file_prefix().to_string(),
            verify: config.verify_artifact(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Toggle the post-write read-back check
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Materialize `blob` as a new file and return where it landed
    ///
    /// The file name is `<prefix><blob name>-<random><platform suffix>`. On a
    /// write or verification failure no file is left behind.
    pub fn extract(&self, blob: &EmbeddedBlob) -> BridgeResult<ExtractedArtifact> {
        fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| BridgeError::extraction(&self.scratch_dir, e))?;

        let stem = format!("{}{}-", self.prefix, blob.name());
        let mut file = tempfile::Builder::new()
            .prefix(&stem)
            .suffix(blob.platform_suffix())
            .rand_bytes(RANDOM_NAME_LEN)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| BridgeError::extraction(&self.scratch_dir, e))?;

        // Until `keep`, dropping `file` deletes it, so early returns clean up
        file.write_all(blob.bytes())
            .and_then(|_| file.as_file().sync_all())
            .map_err(|e| BridgeError::extraction(file.path(), e))?;

        let (handle, path) = file
            .keep()
            .map_err(|e| BridgeError::extraction(e.file.path().to_path_buf(), e.error))?;
        drop(handle);

        let artifact = ExtractedArtifact {
            path,
            len: blob.len() as u64,
            sha256: blob.sha256_hex(),
        };

        if self.verify {
            if let Err(e) = artifact.verify() {
                let _ = artifact.remove();
                return Err(e);
            }
        }

        debug!(
            library = %blob.platform_file_name(),
            path = %artifact.path.display(),
            bytes = artifact.len,
            "Extracted embedded library"
        );
        Ok(artifact)
    }
}
