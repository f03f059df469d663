// ==============================================================================
// validator.rs - Input File Validation
// ==============================================================================
// Description: Validates single-cell VCF inputs (size, type, format) and
//              fingerprints them for the run summary
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-09
// Version: 2.0.0
// Security: Allowlist-only file types, magic number verification
// ==============================================================================

use anyhow::{Context, Result};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024 * 1024; // 20 GB

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

#[derive(Debug, Clone, Serialize)]
pub struct ValidatedFile {
    pub original_name: String,
    pub extension: String,
    pub size: u64,
    pub hash_sha256: String,
    pub validated_at: chrono::DateTime<chrono::Utc>,
}

pub struct FileValidator {
    max_file_size: u64,
    allowed_types: HashMap<&'static str, &'static [u8]>,
}

impl FileValidator {
    pub fn new() -> Self {
        let mut allowed_types: HashMap<&'static str, &'static [u8]> = HashMap::new();

        // Plain text VCF (no magic number)
        allowed_types.insert("vcf", &[]);

        // Gzip / BGZF compressed VCF
        allowed_types.insert("vcf.gz", &GZIP_MAGIC);
        allowed_types.insert("vcf.bgz", &GZIP_MAGIC);

        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_types,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Validate a VCF input before ingestion
    ///
    /// # Returns
    /// File fingerprint (name, size, SHA-256) used in the run summary
    pub fn validate_vcf(&self, file_path: &Path) -> Result<ValidatedFile> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file path"))?
            .to_string_lossy()
            .to_string();

        info!("Validating file: {}", file_name);

        // 1. Size check
        let metadata = std::fs::metadata(file_path)
            .with_context(|| format!("Failed to get file metadata for {}", file_path.display()))?;
        let size = metadata.len();

        if size > self.max_file_size {
            anyhow::bail!(
                "File too large: {} bytes (max: {} bytes)",
                size,
                self.max_file_size
            );
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Extension check (allowlist)
        let ext = self.get_extension(&file_name)?;
        let expected_magic = self
            .allowed_types
            .get(ext.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file type: {}", ext))?;
        debug!("Extension check passed: {}", ext);

        // 3. Magic number verification
        let compressed = !expected_magic.is_empty();
        if compressed {
            let actual_magic = self.read_magic_number(file_path)?;
            if !self.verify_magic_number(expected_magic, &actual_magic) {
                anyhow::bail!("Magic number mismatch for .{} file", ext);
            }
            debug!("Magic number check passed");
        }

        // 4. Content validation (header line)
        self.validate_vcf_format(file_path, compressed)?;
        debug!("Content validation passed");

        // 5. Compute SHA-256 hash
        let hash = self.compute_sha256(file_path)?;
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            original_name: file_name,
            extension: ext,
            size,
            hash_sha256: hash,
            validated_at: chrono::Utc::now(),
        })
    }

    fn get_extension(&self, filename: &str) -> Result<String> {
        let lower = filename.to_lowercase();

        // Handle compound extensions like .vcf.gz
        for compound in ["vcf.gz", "vcf.bgz"] {
            if lower.ends_with(&format!(".{}", compound)) {
                return Ok(compound.to_string());
            }
        }

        // Single extension
        lower
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .ok_or_else(|| anyhow::anyhow!("No file extension found"))
    }

    fn read_magic_number(&self, path: &Path) -> Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut buffer = Vec::with_capacity(4);
        file.take(4).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn verify_magic_number(&self, expected: &[u8], actual: &[u8]) -> bool {
        expected.len() <= actual.len()
            && expected.iter().zip(actual.iter()).all(|(e, a)| e == a)
    }

    fn validate_vcf_format(&self, path: &Path, compressed: bool) -> Result<()> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead> = if compressed {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        let mut lines = reader.lines();

        // First line should be ##fileformat=VCFv4.x
        let first_line = lines
            .next()
            .ok_or_else(|| anyhow::anyhow!("VCF file is empty"))??;

        if !first_line.starts_with("##fileformat=VCFv4.") {
            anyhow::bail!("Invalid VCF format: missing fileformat header");
        }

        Ok(())
    }

    fn compute_sha256(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let n = file.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new()
    }
}
