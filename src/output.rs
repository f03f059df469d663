// ==============================================================================
// output.rs - Report Generation
// ==============================================================================
// Description: Writes genotype tables, variant tables, ROH reports,
//              allele-frequency matrices and the JSON run summary
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-16
// Version: 2.0.0
// ==============================================================================
// Files written next to the output prefix:
//   <prefix>.genotypes.tsv   Chr, Pos, Ref, Alt, one genotype code per cell
//   <prefix>.var.csv         variant id table
//   <prefix>.roh.csv         recurrent ROH haplotypes
//   <prefix>.roh_cells.csv   every run per cell (1-based, inclusive)
//   <prefix>.af.csv          cell x variant read allele frequency
//   <prefix>.summary.json    run metadata
// ==============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::PipelineParams;
use crate::filter::FilterReport;
use crate::ingest::IngestStats;
use crate::models::{Data, Zygosity};
use crate::roh::RohAnalysis;
use crate::validator::ValidatedFile;

/// AF written for cells without a passing call
pub const MISSING_AF: f64 = -0.5;

/// Placeholder for an empty (indel) allele
const EMPTY_ALLELE: &str = "-";

fn allele_str(bases: &str) -> &str {
    if bases.is_empty() {
        EMPTY_ALLELE
    } else {
        bases
    }
}

/// Run metadata written as JSON
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub tool_version: String,
    pub command: String,
    pub processing_date: String,
    pub input: ValidatedFile,
    pub params: PipelineParams,
    pub ingest: IngestStats,
    pub filter: FilterReport,
    pub total_cells: usize,
    pub total_variants: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roh: Option<RohSummary>,
    pub outputs: Vec<PathBuf>,
}

/// ROH totals for the run summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RohSummary {
    pub informative_loci: usize,
    pub runs: usize,
    pub regions: usize,
    pub recurrent_haplotypes: usize,
}

impl RohSummary {
    pub fn new(analysis: &RohAnalysis, min_counts: usize) -> Self {
        Self {
            informative_loci: analysis.informative_loci.len(),
            runs: analysis.run_count(),
            regions: analysis.haplotypes.len(),
            recurrent_haplotypes: analysis.recurrent(min_counts).count(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct VariantRow<'a> {
    id: usize,
    chr: &'a str,
    pos: u64,
    #[serde(rename = "Ref")]
    ref_allele: &'a str,
    #[serde(rename = "Alt")]
    alt_allele: &'a str,
    genotyped: usize,
    mutated: usize,
    genotyped_frac: f64,
    cell_af: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct HaplotypeRow<'a> {
    chr: &'a str,
    start: u64,
    end: u64,
    length: u64,
    variants: String,
    zygosity: String,
    count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CellRunRow<'a> {
    cell: &'a str,
    chromosome: &'a str,
    start: u64,
    end: u64,
}

/// Report writer rooted at one output prefix
pub struct OutputGenerator {
    prefix: PathBuf,
}

impl OutputGenerator {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `<prefix><suffix>`
    pub fn path_for(&self, suffix: &str) -> PathBuf {
        let mut path = self.prefix.clone().into_os_string();
        path.push(suffix);
        PathBuf::from(path)
    }

    fn csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<std::fs::File>> {
        csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .with_context(|| format!("Failed to create output file {}", path.display()))
    }

    /// Cell x variant genotype code table (TSV)
    ///
    /// Codes: NA=-1, WT=0, Het=1, Hom=2, Hemi=3. Calls that did not pass the
    /// per-call filter are written as NA.
    pub fn write_genotype_table(&self, data: &Data) -> Result<PathBuf> {
        let path = self.path_for(".genotypes.tsv");
        let mut writer = Self::csv_writer(&path, b'\t')?;

        let mut header = vec!["Chr".to_string(), "Pos".to_string(), "Ref".to_string(), "Alt".to_string()];
        header.extend(data.cells.iter().map(|cell| cell.name.clone()));
        writer.write_record(&header)?;

        for variant in &data.variants {
            let mut record = vec![
                variant.chr.clone(),
                variant.pos.to_string(),
                allele_str(&variant.ref_allele).to_string(),
                allele_str(&variant.alt_allele).to_string(),
            ];
            record.extend(data.cells.iter().map(|cell| {
                cell.genotype(variant.id)
                    .map(|call| call.called_genotype())
                    .unwrap_or(Zygosity::NoGenotype)
                    .code()
                    .to_string()
            }));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!(
            "Genotype table written: {} variants x {} cells -> {}",
            data.variants.len(),
            data.cells.len(),
            path.display()
        );
        Ok(path)
    }

    /// Variant id table (CSV)
    pub fn write_variant_table(&self, data: &Data) -> Result<PathBuf> {
        let path = self.path_for(".var.csv");
        let mut writer = Self::csv_writer(&path, b',')?;

        for variant in &data.variants {
            writer.serialize(VariantRow {
                id: variant.id,
                chr: &variant.chr,
                pos: variant.pos,
                ref_allele: allele_str(&variant.ref_allele),
                alt_allele: allele_str(&variant.alt_allele),
                genotyped: variant.cells_genotyped.len(),
                mutated: variant.cells_mutated.len(),
                genotyped_frac: variant.genotyped_frac,
                cell_af: variant.cell_af,
            })?;
        }

        writer.flush()?;
        info!("Variant table written: {} variants -> {}", data.variants.len(), path.display());
        Ok(path)
    }

    /// Haplotypes carried by at least `min_counts` cells (CSV, region order)
    pub fn write_roh_haplotypes(&self, analysis: &RohAnalysis, min_counts: usize) -> Result<PathBuf> {
        let path = self.path_for(".roh.csv");
        let mut writer = Self::csv_writer(&path, b',')?;

        let mut rows = 0;
        for (region, hap) in analysis.recurrent(min_counts) {
            writer.serialize(HaplotypeRow {
                chr: &region.chr,
                start: region.start,
                end: region.end,
                length: region.span(),
                variants: hap.haplotype.variants_label(),
                zygosity: hap.haplotype.genotypes_label(),
                count: hap.count(),
            })?;
            rows += 1;
        }

        writer.flush()?;
        info!("ROH haplotypes written: {} rows -> {}", rows, path.display());
        Ok(path)
    }

    /// Every run of every cell (CSV, 1-based inclusive coordinates)
    pub fn write_cell_runs(&self, data: &Data, analysis: &RohAnalysis) -> Result<PathBuf> {
        let path = self.path_for(".roh_cells.csv");
        let mut writer = Self::csv_writer(&path, b',')?;

        for (cell, runs) in data.cells.iter().zip(&analysis.runs) {
            for run in runs {
                let Some(region) = run.region(&data.variants) else {
                    continue;
                };
                writer.serialize(CellRunRow {
                    cell: &cell.name,
                    chromosome: &region.chr,
                    start: region.start + 1,
                    end: region.end,
                })?;
            }
        }

        writer.flush()?;
        info!("Per-cell runs written: {} runs -> {}", analysis.run_count(), path.display());
        Ok(path)
    }

    /// Cell x variant read allele frequency matrix (CSV)
    pub fn write_af_matrix(&self, data: &Data) -> Result<PathBuf> {
        let path = self.path_for(".af.csv");
        let mut writer = Self::csv_writer(&path, b',')?;

        let mut header = vec!["Cell".to_string()];
        header.extend(data.variants.iter().map(|variant| variant.to_string()));
        writer.write_record(&header)?;

        for cell in &data.cells {
            let mut record = Vec::with_capacity(data.variants.len() + 1);
            record.push(cell.name.clone());
            record.extend(data.variants.iter().map(|variant| {
                let af = match cell.genotype(variant.id) {
                    Some(call) if call.passed => call.af,
                    _ => MISSING_AF,
                };
                af.to_string()
            }));
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!(
            "AF matrix written: {} cells x {} variants -> {}",
            data.cells.len(),
            data.variants.len(),
            path.display()
        );
        Ok(path)
    }

    /// Run summary (pretty JSON)
    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let path = self.path_for(".summary.json");

        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create summary file {}", path.display()))?;

        serde_json::to_writer_pretty(file, summary).context("Failed to write run summary")?;

        info!("Run summary written: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CellVar, Variant};
    use crate::roh::RohParams;

    /// Two cells, three informative loci; both cells homozygous across all three
    fn sample_data() -> Data {
        let mut data = Data::with_cells(["AAAC", "GGTT"]);

        for (vid, pos) in [10u64, 20, 30].into_iter().enumerate() {
            let mut variant = Variant::new(vid, "chr1", pos, "A", if vid == 2 { "" } else { "G" });
            variant.cells_genotyped = vec![0, 1];
            variant.cells_mutated = vec![0];
            data.variants.push(variant);
        }

        for cell in &mut data.cells {
            for vid in 0..3 {
                cell.genotypes.push(CellVar {
                    vid,
                    genotype: Zygosity::Homozygous,
                    genotype_quality: 99,
                    read_depth: 40,
                    alt_reads: 40,
                    af: 1.0,
                    passed: true,
                });
            }
        }
        data.cells[1].genotypes[1].passed = false;

        data.recompute_fractions();
        data
    }

    fn read(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_path_for() {
        let output = OutputGenerator::new("/tmp/run1");
        assert_eq!(output.path_for(".var.csv"), PathBuf::from("/tmp/run1.var.csv"));
    }

    #[test]
    fn test_genotype_table() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputGenerator::new(dir.path().join("run"));

        let path = output.write_genotype_table(&sample_data()).unwrap();
        let lines = read(&path);

        assert_eq!(lines[0], "Chr\tPos\tRef\tAlt\tAAAC\tGGTT");
        assert_eq!(lines[1], "chr1\t10\tA\tG\t2\t2");
        // Failed call written as NA
        assert_eq!(lines[2], "chr1\t20\tA\tG\t2\t-1");
        assert_eq!(lines[3], "chr1\t30\tA\t-\t2\t2");
    }

    #[test]
    fn test_variant_table() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputGenerator::new(dir.path().join("run"));

        let path = output.write_variant_table(&sample_data()).unwrap();
        let lines = read(&path);

        assert_eq!(lines[0], "Id,Chr,Pos,Ref,Alt,Genotyped,Mutated,GenotypedFrac,CellAf");
        assert_eq!(lines[1], "0,chr1,10,A,G,2,1,1.0,0.5");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_af_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputGenerator::new(dir.path().join("run"));

        let path = output.write_af_matrix(&sample_data()).unwrap();
        let lines = read(&path);

        assert_eq!(lines[0], "Cell,chr1:10:A:G,chr1:20:A:G,chr1:30:A:");
        assert_eq!(lines[1], "AAAC,1,1,1");
        assert_eq!(lines[2], "GGTT,1,-0.5,1");
    }

    #[test]
    fn test_roh_reports() {
        let mut data = sample_data();
        data.cells[1].genotypes[1].passed = true;
        // All loci informative
        for variant in &mut data.variants {
            variant.cell_af = 0.5;
        }
        let analysis = RohAnalysis::run(&data, &RohParams { min_vars: 2, min_counts: 2 });

        let dir = tempfile::tempdir().unwrap();
        let output = OutputGenerator::new(dir.path().join("run"));

        let lines = read(&output.write_roh_haplotypes(&analysis, 2).unwrap());
        assert_eq!(lines[0], "Chr,Start,End,Length,Variants,Zygosity,Count");
        assert_eq!(lines[1], "chr1,10,31,21,0-1-2,Hom-Hom-Hom,2");

        // Nothing is shared by three cells
        let lines = read(&output.write_roh_haplotypes(&analysis, 3).unwrap());
        assert!(lines.len() <= 1);

        let lines = read(&output.write_cell_runs(&data, &analysis).unwrap());
        assert_eq!(lines[0], "Cell,Chromosome,Start,End");
        assert_eq!(lines[1], "AAAC,chr1,11,31");
        assert_eq!(lines[2], "GGTT,chr1,11,31");
    }
}
