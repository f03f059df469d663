// ==============================================================================
// processor.rs - Core Genotype Processing Logic
// ==============================================================================
// Description: Validates a single-cell VCF, ingests it into the Cell/Variant
//              model and applies the global filter
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-16
// Version: 3.0.0
// ==============================================================================

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::PipelineParams;
use crate::filter::FilterReport;
use crate::ingest::{ingest, IngestStats};
use crate::models::Data;
use crate::output::RunSummary;
use crate::parsers::VcfLocusReader;
use crate::validator::{FileValidator, ValidatedFile};

/// Filtered data plus everything the run summary reports about it
#[derive(Debug)]
pub struct ProcessedData {
    pub data: Data,
    pub validated: ValidatedFile,
    pub ingest: IngestStats,
    pub filter: FilterReport,
}

pub struct GenotypeProcessor {
    input: PathBuf,
    params: PipelineParams,
    validator: FileValidator,
}

impl GenotypeProcessor {
    pub fn new(input: impl Into<PathBuf>, params: PipelineParams) -> Self {
        Self {
            input: input.into(),
            params,
            validator: FileValidator::new(),
        }
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Main processing pipeline
    pub fn process(&self) -> Result<ProcessedData> {
        info!("Starting single-cell genotype processing: {}", self.input.display());
        debug!("Parameters: {:?}", self.params);

        self.params.validate().context("Invalid pipeline parameters")?;

        // 1. Validate input file
        let validated = self
            .validator
            .validate_vcf(&self.input)
            .context("Input validation failed")?;

        // 2. Ingest loci into the Cell/Variant model
        let (mut data, ingest) = self.read_vcf()?;

        // 3. Iterative global filter
        info!(
            "Applying global filter to {} cells x {} variants",
            data.cells.len(),
            data.variants.len()
        );
        let filter = self.params.global_filter.apply(&mut data);

        info!(
            "Processing complete: {} cells, {} variants ({} cells and {} variants removed in {} passes)",
            data.cells.len(),
            data.variants.len(),
            filter.cells_removed,
            filter.variants_removed,
            filter.passes
        );

        Ok(ProcessedData {
            data,
            validated,
            ingest,
            filter,
        })
    }

    fn read_vcf(&self) -> Result<(Data, IngestStats)> {
        let mut reader = VcfLocusReader::open(&self.input)
            .with_context(|| format!("Failed to open VCF {}", self.input.display()))?;

        let cell_names = reader.sample_names();
        info!("Parsing VCF with {} cells", cell_names.len());

        ingest(
            cell_names,
            reader.records(),
            self.params.cell_filter,
            self.params.min_vcf_qual,
        )
        .with_context(|| format!("Failed to ingest {}", self.input.display()))
    }

    /// Summary skeleton for one processed run; callers attach ROH totals and outputs
    pub fn summary(&self, processed: &ProcessedData, command: &str) -> RunSummary {
        RunSummary {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            command: command.to_string(),
            processing_date: chrono::Utc::now().to_rfc3339(),
            input: processed.validated.clone(),
            params: self.params,
            ingest: processed.ingest,
            filter: processed.filter,
            total_cells: processed.data.cells.len(),
            total_variants: processed.data.variants.len(),
            roh: None,
            outputs: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::GlobalFilterParam;
    use crate::models::Zygosity;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SMALL_VCF: &str = "\
##fileformat=VCFv4.2
##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=AD,Number=R,Type=Integer,Description=\"Allelic depths\">
##FORMAT=<ID=DP,Number=1,Type=Integer,Description=\"Read depth\">
##FORMAT=<ID=GQ,Number=1,Type=Integer,Description=\"Genotype quality\">
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tcell1\tcell2\tcell3
chr1\t1\t.\tG\tA\t50\tPASS\t.\tGT:AD:DP:GQ\t0/1:50,50:100:99\t1/1:0,100:100:99\t0/0:100,0:100:99
chr1\t2\t.\tA\tC,G\t1000\tPASS\t.\tGT:AD:DP:GQ\t0/0:100,0,0:100:99\t0/1:50,50,0:100:99\t1/2:0,50,50:100:99
chr1\t3\t.\tT\tC,A\t1500\tPASS\t.\tGT:AD:DP:GQ\t0/0:98,2,0:100:99\t1/1:5,95,0:100:99\t0/2:50,0,50:100:99
";

    fn write_vcf(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".vcf").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn write_gzipped_vcf(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".vcf.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(&mut file, Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
        file.flush().unwrap();
        file
    }

    fn small_params() -> PipelineParams {
        PipelineParams {
            global_filter: GlobalFilterParam {
                min_genotyped_frac: 0.5,
                min_genotypes_present: 0.5,
                min_cell_af: 0.01,
            },
            ..PipelineParams::default()
        }
    }

    #[test]
    fn test_small_vcf_end_to_end() {
        let file = write_vcf(SMALL_VCF);
        let processor = GenotypeProcessor::new(file.path(), small_params());

        let processed = processor.process().unwrap();
        let data = &processed.data;

        // Quality 50 locus dropped; two loci split into four variants
        assert_eq!(processed.ingest.loci_read, 3);
        assert_eq!(processed.ingest.loci_below_quality, 1);
        assert_eq!(data.variants.len(), 4);
        assert_eq!(data.cells.len(), 3);

        for variant in &data.variants {
            assert_eq!(variant.cells_genotyped, vec![0, 1, 2]);
        }
        assert!(data.is_consistent());

        let labels: Vec<String> = data.variants.iter().map(|v| v.to_string()).collect();
        assert_eq!(labels, vec!["chr1:1:A:C", "chr1:1:A:G", "chr1:2:T:C", "chr1:2:T:A"]);

        assert_eq!(data.variants[0].cells_mutated, vec![1, 2]);
        assert_eq!(data.variants[1].cells_mutated, vec![2]);
        assert_eq!(data.variants[2].cells_mutated, vec![1]);
        assert_eq!(data.variants[3].cells_mutated, vec![2]);

        assert_eq!(data.cells[1].genotypes[2].genotype, Zygosity::Homozygous);
        assert_eq!(data.cells[0].name, "cell1");
        assert_eq!(processed.filter.passes, 0);
    }

    #[test]
    fn test_gzipped_vcf_end_to_end() {
        let plain = write_vcf(SMALL_VCF);
        let gzipped = write_gzipped_vcf(SMALL_VCF);

        let expected = GenotypeProcessor::new(plain.path(), small_params())
            .process()
            .unwrap();
        let processed = GenotypeProcessor::new(gzipped.path(), small_params())
            .process()
            .unwrap();

        assert_eq!(processed.ingest.loci_read, 3);
        assert_eq!(processed.data.variants.len(), 4);
        assert_eq!(processed.data, expected.data);
        assert_ne!(processed.validated.hash_sha256, expected.validated.hash_sha256);
    }

    #[test]
    fn test_filtering_is_idempotent_after_process() {
        let file = write_vcf(SMALL_VCF);
        let processor = GenotypeProcessor::new(file.path(), small_params());

        let mut processed = processor.process().unwrap();
        let before = processed.data.clone();
        let report = processor.params().global_filter.apply(&mut processed.data);

        assert_eq!(report, FilterReport::default());
        assert_eq!(processed.data, before);
    }

    #[test]
    fn test_summary() {
        let file = write_vcf(SMALL_VCF);
        let processor = GenotypeProcessor::new(file.path(), small_params());
        let processed = processor.process().unwrap();

        let summary = processor.summary(&processed, "table");

        assert_eq!(summary.command, "table");
        assert_eq!(summary.total_cells, 3);
        assert_eq!(summary.total_variants, 4);
        assert_eq!(summary.input.hash_sha256.len(), 64);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["params"]["global_filter"]["min_cell_af"], 0.01);
        assert!(json.get("roh").is_none());
    }

    #[test]
    fn test_empty_allele_change_aborts() {
        let bad = SMALL_VCF.replace("chr1\t3\t.\tT\tC,A", "chr1\t3\t.\tT\tC,T");
        let file = write_vcf(&bad);
        let processor = GenotypeProcessor::new(file.path(), small_params());

        let err = processor.process().unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed allele pair at chr1:3"));
    }

    #[test]
    fn test_rejects_invalid_params() {
        let file = write_vcf(SMALL_VCF);
        let mut params = small_params();
        params.global_filter.min_genotyped_frac = 2.0;

        let result = GenotypeProcessor::new(file.path(), params).process();
        assert!(result.is_err());
    }
}
