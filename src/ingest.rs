// ==============================================================================
// ingest.rs - Locus Records to Cell/Variant Model
// ==============================================================================
// Description: Builds the Data aggregate from streamed VCF loci: quality gate,
//              allele normalization, zygosity classification, per-call filter
// Author: Matt Barham
// Created: 2026-09-23
// Modified: 2026-10-15
// Version: 1.1.0
// ==============================================================================
// Per (locus, alternate allele):
//   1. QUAL <= min_vcf_qual (or missing)  → locus discarded
//   2. REF/ALT upper-cased, shared leading bases trimmed, POS shifted
//   3. Every sample classified and passed through CellFilterParam
//   4. Variant kept only when at least one cell is mutated
// ==============================================================================

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::filter::CellFilterParam;
use crate::genotype_converter::{classify_zygosity, trim_matching_bases, GenotypeConversionError};
use crate::models::{CellVar, Data, Variant, Zygosity};
use crate::parsers::{LocusRecord, SampleCall, VcfParseError};

/// Errors that abort ingestion
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed allele pair at {chrom}:{position}")]
    EmptyAlleleChange {
        chrom: String,
        position: u64,
        #[source]
        source: GenotypeConversionError,
    },

    #[error("Locus {chrom}:{position} has {found} samples, expected {expected}")]
    SampleCountMismatch {
        chrom: String,
        position: u64,
        found: usize,
        expected: usize,
    },

    #[error(transparent)]
    Vcf(#[from] VcfParseError),
}

/// Ingestion counters (reported in the run summary)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub loci_read: usize,
    pub loci_below_quality: usize,
    pub candidate_variants: usize,
    pub variants_without_mutation: usize,
    pub variants_retained: usize,
}

/// Incremental builder of `Data`, one locus at a time
pub struct Ingestor {
    data: Data,
    cell_filter: CellFilterParam,
    min_vcf_qual: f64,
    stats: IngestStats,
}

impl Ingestor {
    /// Create an ingestor with one cell per sample name
    pub fn new(cell_names: Vec<String>, cell_filter: CellFilterParam, min_vcf_qual: f64) -> Self {
        Self {
            data: Data::with_cells(cell_names),
            cell_filter,
            min_vcf_qual,
            stats: IngestStats::default(),
        }
    }

    /// Add every alternate allele of one locus
    ///
    /// # Returns
    /// * `Ok(())` - Locus consumed (possibly discarded by the quality gate)
    /// * `Err(IngestError)` - Malformed allele pair or sample count mismatch
    pub fn add_locus(&mut self, locus: &LocusRecord) -> Result<(), IngestError> {
        self.stats.loci_read += 1;

        if locus.quality.unwrap_or(0.0) <= self.min_vcf_qual {
            self.stats.loci_below_quality += 1;
            return Ok(());
        }

        if locus.samples.len() != self.data.cells.len() {
            return Err(IngestError::SampleCountMismatch {
                chrom: locus.chrom.clone(),
                position: locus.position,
                found: locus.samples.len(),
                expected: self.data.cells.len(),
            });
        }

        let reference = locus.reference.to_uppercase();

        for (alt_offset, alternate) in locus.alternates.iter().enumerate() {
            let alt_index = alt_offset + 1;
            let alternate = alternate.to_uppercase();

            let (ref_allele, alt_allele, trimmed) = trim_matching_bases(&reference, &alternate)
                .map_err(|source| IngestError::EmptyAlleleChange {
                    chrom: locus.chrom.clone(),
                    position: locus.position,
                    source,
                })?;

            let vid = self.data.variants.len();
            let pos = locus.position.saturating_sub(1) + trimmed as u64;
            let mut variant = Variant::new(vid, locus.chrom.as_str(), pos, ref_allele, alt_allele);
            let mut calls = Vec::with_capacity(locus.samples.len());

            for (cell_id, sample) in locus.samples.iter().enumerate() {
                let mut call = cell_var(vid, sample, alt_index);
                let status = self.cell_filter.apply(&mut call);

                if status.is_genotyped() {
                    variant.cells_genotyped.push(cell_id);
                }
                if status.is_mutated() {
                    variant.cells_mutated.push(cell_id);
                }
                calls.push(call);
            }

            self.stats.candidate_variants += 1;

            if variant.cells_mutated.is_empty() {
                self.stats.variants_without_mutation += 1;
                debug!("Dropping {}: no mutated cells", variant);
                continue;
            }

            for (cell, call) in self.data.cells.iter_mut().zip(calls) {
                cell.genotypes.push(call);
            }
            self.data.variants.push(variant);
            self.stats.variants_retained += 1;
        }

        Ok(())
    }

    /// Finalize derived fractions against the unfiltered totals
    pub fn finish(mut self) -> (Data, IngestStats) {
        self.data.recompute_fractions();

        info!(
            "Ingested {} loci ({} below quality): {} of {} candidate variants retained across {} cells",
            self.stats.loci_read,
            self.stats.loci_below_quality,
            self.stats.variants_retained,
            self.stats.candidate_variants,
            self.data.cells.len()
        );

        (self.data, self.stats)
    }
}

/// Build the model from a stream of loci
///
/// # Arguments
/// * `cell_names` - Sample names from the VCF header
/// * `records` - Locus stream (e.g., `VcfLocusReader::records`)
/// * `cell_filter` - Per-call thresholds
/// * `min_vcf_qual` - Loci at or below this QUAL are discarded
///
/// # Returns
/// The populated `Data` (not yet globally filtered) and ingestion counters
pub fn ingest<I>(
    cell_names: Vec<String>,
    records: I,
    cell_filter: CellFilterParam,
    min_vcf_qual: f64,
) -> Result<(Data, IngestStats), IngestError>
where
    I: IntoIterator<Item = Result<LocusRecord, VcfParseError>>,
{
    let mut ingestor = Ingestor::new(cell_names, cell_filter, min_vcf_qual);

    for record in records {
        ingestor.add_locus(&record?)?;
    }

    Ok(ingestor.finish())
}

/// Classify one sample against one alternate allele
fn cell_var(vid: usize, sample: &SampleCall, alt_index: usize) -> CellVar {
    let genotype = classify_zygosity(sample.alleles, alt_index);
    if genotype == Zygosity::NoGenotype {
        return CellVar::no_call(vid);
    }

    let read_depth = sample.read_depth;
    let alt_reads = sample.allele_depth(alt_index);
    let af = if read_depth == 0 {
        0.0
    } else {
        alt_reads as f64 / read_depth as f64
    };

    CellVar {
        vid,
        genotype,
        genotype_quality: sample.genotype_quality,
        read_depth,
        alt_reads,
        af,
        passed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::vcf::{parse_genotype, parse_samples};

    fn sample(gt: &str, ad: &[u32], dp: u32, gq: u32) -> SampleCall {
        SampleCall {
            alleles: parse_genotype(gt),
            genotype_quality: gq,
            read_depth: dp,
            allele_depths: ad.to_vec(),
        }
    }

    fn locus(position: u64, reference: &str, alternates: &[&str], quality: Option<f64>, samples: Vec<SampleCall>) -> LocusRecord {
        LocusRecord {
            chrom: "chr1".to_string(),
            position,
            reference: reference.to_string(),
            alternates: alternates.iter().map(|a| a.to_string()).collect(),
            quality,
            samples,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("cell{}", i)).collect()
    }

    #[test]
    fn test_quality_gate() {
        let mut ingestor = Ingestor::new(names(1), CellFilterParam::default(), 100.0);
        let samples = vec![sample("1/1", &[0, 100], 100, 99)];

        ingestor.add_locus(&locus(1, "A", &["G"], Some(100.0), samples.clone())).unwrap();
        ingestor.add_locus(&locus(2, "A", &["G"], None, samples.clone())).unwrap();
        ingestor.add_locus(&locus(3, "A", &["G"], Some(100.5), samples)).unwrap();

        let (data, stats) = ingestor.finish();

        // At-threshold and missing QUAL are both discarded
        assert_eq!(stats.loci_read, 3);
        assert_eq!(stats.loci_below_quality, 2);
        assert_eq!(data.variants.len(), 1);
        assert_eq!(data.variants[0].pos, 2);
    }

    #[test]
    fn test_allele_normalization() {
        let mut ingestor = Ingestor::new(names(1), CellFilterParam::default(), 0.0);
        let samples = vec![sample("1/1", &[0, 80], 80, 99)];

        ingestor.add_locus(&locus(10, "gatc", &["GATG"], Some(500.0), samples)).unwrap();
        let (data, _) = ingestor.finish();

        let variant = &data.variants[0];
        assert_eq!(variant.ref_allele, "C");
        assert_eq!(variant.alt_allele, "G");
        // 1-based 10 → 0-based 9, plus three trimmed bases
        assert_eq!(variant.pos, 12);
    }

    #[test]
    fn test_empty_allele_change_is_fatal() {
        let mut ingestor = Ingestor::new(names(1), CellFilterParam::default(), 0.0);
        let samples = vec![sample("1/1", &[0, 80], 80, 99)];

        let err = ingestor
            .add_locus(&locus(10, "AC", &["ac"], Some(500.0), samples))
            .unwrap_err();

        assert!(matches!(err, IngestError::EmptyAlleleChange { position: 10, .. }));
    }

    #[test]
    fn test_sample_count_mismatch() {
        let mut ingestor = Ingestor::new(names(2), CellFilterParam::default(), 0.0);
        let err = ingestor
            .add_locus(&locus(1, "A", &["G"], Some(500.0), vec![SampleCall::default()]))
            .unwrap_err();

        assert!(matches!(err, IngestError::SampleCountMismatch { found: 1, expected: 2, .. }));
    }

    #[test]
    fn test_alt_reads_follow_allele_index() {
        let samples = vec![sample("0/2", &[40, 10, 50], 100, 99)];
        let call = cell_var(0, &samples[0], 2);

        assert_eq!(call.genotype, Zygosity::Heterozygous);
        assert_eq!(call.alt_reads, 50);
        assert_eq!(call.af, 0.5);
    }

    #[test]
    fn test_zero_depth_af() {
        let call = cell_var(0, &sample("1/1", &[], 0, 99), 1);
        assert_eq!(call.af, 0.0);
        assert!(call.af.is_finite());
    }

    #[test]
    fn test_no_call_fields_unpopulated() {
        let call = cell_var(4, &sample("./.", &[3, 7], 10, 50), 1);
        assert_eq!(call, CellVar::no_call(4));
    }

    #[test]
    fn test_unmutated_variants_dropped() {
        let samples = parse_samples("GT:AD:DP:GQ\t0/0:60,0,0:60:99\t0/2:30,0,30:60:99", 2).unwrap();
        let mut ingestor = Ingestor::new(names(2), CellFilterParam::default(), 0.0);

        ingestor.add_locus(&locus(7, "A", &["C", "T"], Some(900.0), samples)).unwrap();
        let (data, stats) = ingestor.finish();

        // ALT C has no mutated cell
        assert_eq!(stats.candidate_variants, 2);
        assert_eq!(stats.variants_without_mutation, 1);
        assert_eq!(data.variants.len(), 1);
        assert_eq!(data.variants[0].alt_allele, "T");
        assert_eq!(data.variants[0].cells_genotyped, vec![0, 1]);
        assert_eq!(data.variants[0].cells_mutated, vec![1]);

        // Cells hold exactly one call per retained variant
        for cell in &data.cells {
            assert_eq!(cell.genotypes.len(), 1);
            assert_eq!(cell.genotypes[0].vid, 0);
        }
        assert!(data.is_consistent());
    }

    #[test]
    fn test_low_af_call_coerced_but_recorded() {
        let samples = vec![
            sample("0/1", &[90, 10], 100, 99),
            sample("1/1", &[0, 100], 100, 99),
            sample("0/1", &[50, 50], 100, 10),
        ];
        let (data, _) = ingest(
            names(3),
            vec![Ok(locus(1, "A", &["G"], Some(500.0), samples))],
            CellFilterParam::default(),
            100.0,
        )
        .unwrap();

        let variant = &data.variants[0];
        assert_eq!(variant.cells_genotyped, vec![0, 1]);
        assert_eq!(variant.cells_mutated, vec![1]);
        assert_eq!(data.cells[0].genotypes[0].genotype, Zygosity::WildType);

        // Low GQ call is kept against the cell but not genotyped
        assert!(!data.cells[2].genotypes[0].passed);
        assert_eq!(data.cells[2].genotypes[0].called_genotype(), Zygosity::NoGenotype);

        assert!((variant.genotyped_frac - 2.0 / 3.0).abs() < 1e-12);
        assert!((variant.cell_af - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ingest_propagates_reader_errors() {
        let records = vec![Err(VcfParseError::MissingField("position".to_string()))];
        let result = ingest(names(1), records, CellFilterParam::default(), 0.0);
        assert!(matches!(result, Err(IngestError::Vcf(_))));
    }
}
