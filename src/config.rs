// ==============================================================================
// config.rs - Pipeline Parameters
// ==============================================================================
// Description: Thresholds for ingestion, filtering and ROH detection, loadable
//              from a JSON parameter file
// Author: Matt Barham
// Created: 2026-09-26
// Modified: 2026-10-10
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::filter::{CellFilterParam, GlobalFilterParam};
use crate::roh::RohParams;

/// Default minimum QUAL for a locus to be ingested
pub const DEFAULT_VCF_QUAL: f64 = 100.0;

/// Parameter errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read parameter file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid parameter file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Parameter {name} = {value} is out of range ({expected})")]
    OutOfRange {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
}

/// Every threshold used by one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    pub min_vcf_qual: f64,
    pub cell_filter: CellFilterParam,
    pub global_filter: GlobalFilterParam,
    pub roh: RohParams,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            min_vcf_qual: DEFAULT_VCF_QUAL,
            cell_filter: CellFilterParam::default(),
            global_filter: GlobalFilterParam::default(),
            roh: RohParams::default(),
        }
    }
}

impl PipelineParams {
    /// Load parameters from JSON; absent fields keep their defaults
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let params: Self = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded parameters from {}: {:?}", path.display(), params);

        params.validate()?;
        Ok(params)
    }

    /// Check that fractions lie in [0, 1] and run length is positive
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fractions = [
            ("cell_filter.min_read_af", self.cell_filter.min_read_af),
            ("global_filter.min_genotyped_frac", self.global_filter.min_genotyped_frac),
            ("global_filter.min_genotypes_present", self.global_filter.min_genotypes_present),
            ("global_filter.min_cell_af", self.global_filter.min_cell_af),
        ];

        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    name,
                    value,
                    expected: "0.0 to 1.0",
                });
            }
        }

        if !self.min_vcf_qual.is_finite() {
            return Err(ConfigError::OutOfRange {
                name: "min_vcf_qual",
                value: self.min_vcf_qual,
                expected: "a finite number",
            });
        }

        if self.roh.min_vars == 0 {
            return Err(ConfigError::OutOfRange {
                name: "roh.min_vars",
                value: 0.0,
                expected: ">= 1",
            });
        }

        Ok(())
    }
}
