// ==============================================================================
// roh.rs - Run-of-Homozygosity Detection
// ==============================================================================
// Description: Segments each cell's calls at informative heterozygous loci into
//              runs of homozygosity and counts identical runs across cells
// Author: Matt Barham
// Created: 2026-09-25
// Modified: 2026-10-15
// Version: 1.1.0
// ==============================================================================
// Segmentation (loci sorted by genomic coordinate):
//   - chromosome change      → close current run
//   - Heterozygous           → close current run
//   - Homozygous / WildType  → extend current run
//   - NoGenotype / Hemizygous→ skip (neither closes nor extends)
//   A closed run is emitted only when it holds at least `min_vars` loci.
// ==============================================================================

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use crate::models::{Cell, Data, Region, Variant, Zygosity};
use crate::variants::{find_heterozygous, sort_ids_by_coord};

/// ROH detection and reporting thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RohParams {
    /// Minimum number of informative loci in an emitted run
    pub min_vars: usize,

    /// Minimum number of cells sharing a haplotype for it to be reported
    pub min_counts: usize,
}

impl Default for RohParams {
    fn default() -> Self {
        Self {
            min_vars: 5,
            min_counts: 2,
        }
    }
}

/// Contiguous homozygous stretch in one cell (variant ids in genomic order)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct RunOfHomozygosity {
    pub variant_ids: Vec<usize>,
}

impl RunOfHomozygosity {
    pub fn len(&self) -> usize {
        self.variant_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variant_ids.is_empty()
    }

    /// Half-open region from the first locus to one past the last locus
    pub fn region(&self, variants: &[Variant]) -> Option<Region> {
        let first = &variants[*self.variant_ids.first()?];
        let last = &variants[*self.variant_ids.last()?];

        Some(Region {
            chr: first.chr.clone(),
            start: first.pos,
            end: last.pos + 1,
        })
    }
}

/// Loci of one run plus the zygosity a cell showed at each
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Haplotype {
    pub variant_ids: Vec<usize>,
    pub genotypes: Vec<Zygosity>,
}

impl Haplotype {
    /// Variant ids joined with '-' (e.g., "0-3-7")
    pub fn variants_label(&self) -> String {
        self.variant_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Zygosities joined with '-' (e.g., "Hom-WT-Hom")
    pub fn genotypes_label(&self) -> String {
        self.genotypes
            .iter()
            .map(|z| z.as_str())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for Haplotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.variants_label(), self.genotypes_label())
    }
}

/// One distinct haplotype and the cells carrying it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HaplotypeCount {
    pub haplotype: Haplotype,
    pub cell_ids: Vec<usize>,
}

impl HaplotypeCount {
    pub fn count(&self) -> usize {
        self.cell_ids.len()
    }
}

/// Distinct haplotypes observed over one region
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RohHaplotypes {
    pub haplotypes: Vec<HaplotypeCount>,
}

impl RohHaplotypes {
    /// Count `cell_id` toward `haplotype`, matching on loci and zygosity exactly
    pub fn add(&mut self, haplotype: Haplotype, cell_id: usize) {
        match self.haplotypes.iter_mut().find(|h| h.haplotype == haplotype) {
            Some(existing) => existing.cell_ids.push(cell_id),
            None => self.haplotypes.push(HaplotypeCount {
                haplotype,
                cell_ids: vec![cell_id],
            }),
        }
    }
}

/// Zygosity used for segmentation (failed calls read as missing)
fn zygosity_at(cell: &Cell, vid: usize) -> Zygosity {
    cell.genotype(vid)
        .map(|call| call.called_genotype())
        .unwrap_or(Zygosity::NoGenotype)
}

fn close_run(current: &mut Vec<usize>, runs: &mut Vec<RunOfHomozygosity>, min_vars: usize) {
    let variant_ids = std::mem::take(current);
    if !variant_ids.is_empty() && variant_ids.len() >= min_vars {
        runs.push(RunOfHomozygosity { variant_ids });
    }
}

/// Informative loci: population-heterozygous variants in genomic order
pub fn informative_loci(variants: &[Variant]) -> Vec<usize> {
    let mut ids = find_heterozygous(variants);
    sort_ids_by_coord(&mut ids, variants);
    ids
}

/// Segment one cell's calls into runs of homozygosity
///
/// # Arguments
/// * `cell` - Cell to scan
/// * `het_ids` - Informative loci sorted with `sort_ids_by_coord`
/// * `variants` - Variant population the ids refer to
/// * `min_vars` - Minimum run length to emit
pub fn find_runs_of_homozygosity(
    cell: &Cell,
    het_ids: &[usize],
    variants: &[Variant],
    min_vars: usize,
) -> Vec<RunOfHomozygosity> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    let mut prev_chr: Option<&str> = None;

    for &vid in het_ids {
        let chr = variants[vid].chr.as_str();
        if prev_chr.is_some_and(|prev| prev != chr) {
            close_run(&mut current, &mut runs, min_vars);
        }
        prev_chr = Some(chr);

        match zygosity_at(cell, vid) {
            Zygosity::Heterozygous => close_run(&mut current, &mut runs, min_vars),
            Zygosity::Homozygous | Zygosity::WildType => current.push(vid),
            Zygosity::NoGenotype | Zygosity::Hemizygous => {}
        }
    }

    close_run(&mut current, &mut runs, min_vars);
    runs
}

/// Runs for every cell; `result[i]` belongs to the cell with id `i`
pub fn find_all_runs_of_homozygosity(data: &Data, min_vars: usize) -> Vec<Vec<RunOfHomozygosity>> {
    let het_ids = informative_loci(&data.variants);
    scan_cells(data, &het_ids, min_vars)
}

fn scan_cells(data: &Data, het_ids: &[usize], min_vars: usize) -> Vec<Vec<RunOfHomozygosity>> {
    data.cells
        .par_iter()
        .map(|cell| find_runs_of_homozygosity(cell, het_ids, &data.variants, min_vars))
        .collect()
}

/// Group runs by region and count identical haplotypes across cells
pub fn count_roh_haplotypes(
    runs: &[Vec<RunOfHomozygosity>],
    data: &Data,
) -> BTreeMap<Region, RohHaplotypes> {
    let mut counts: BTreeMap<Region, RohHaplotypes> = BTreeMap::new();

    for (cell_id, cell_runs) in runs.iter().enumerate() {
        let cell = &data.cells[cell_id];

        for run in cell_runs {
            let Some(region) = run.region(&data.variants) else {
                continue;
            };

            let haplotype = Haplotype {
                variant_ids: run.variant_ids.clone(),
                genotypes: run
                    .variant_ids
                    .iter()
                    .map(|&vid| zygosity_at(cell, vid))
                    .collect(),
            };

            counts.entry(region).or_default().add(haplotype, cell_id);
        }
    }

    counts
}

/// Complete ROH result for one filtered data set
#[derive(Debug, Clone, Default)]
pub struct RohAnalysis {
    pub informative_loci: Vec<usize>,
    pub runs: Vec<Vec<RunOfHomozygosity>>,
    pub haplotypes: BTreeMap<Region, RohHaplotypes>,
}

impl RohAnalysis {
    pub fn run(data: &Data, params: &RohParams) -> Self {
        let informative_loci = informative_loci(&data.variants);
        info!(
            "Selected {} informative heterozygous loci of {} variants",
            informative_loci.len(),
            data.variants.len()
        );

        let runs = scan_cells(data, &informative_loci, params.min_vars);
        let haplotypes = count_roh_haplotypes(&runs, data);

        let analysis = Self {
            informative_loci,
            runs,
            haplotypes,
        };

        info!(
            "Found {} runs of homozygosity over {} regions ({} haplotypes in >= {} cells)",
            analysis.run_count(),
            analysis.haplotypes.len(),
            analysis.recurrent(params.min_counts).count(),
            params.min_counts
        );

        analysis
    }

    pub fn run_count(&self) -> usize {
        self.runs.iter().map(Vec::len).sum()
    }

    /// Haplotypes carried by at least `min_counts` cells, in region order
    pub fn recurrent(&self, min_counts: usize) -> impl Iterator<Item = (&Region, &HaplotypeCount)> {
        self.haplotypes.iter().flat_map(move |(region, haps)| {
            haps.haplotypes
                .iter()
                .filter(move |h| h.count() >= min_counts)
                .map(move |h| (region, h))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellVar;
    use crate::models::Zygosity::{
        Hemizygous as HEMI, Heterozygous as HET, Homozygous as HOM, NoGenotype as NA, WildType as WT,
    };

    /// Data with the given loci (chr, pos) and one row of calls per cell
    fn build(loci: &[(&str, u64)], grid: &[&[Zygosity]]) -> Data {
        let mut data = Data::with_cells((0..grid.len()).map(|i| format!("cell{}", i)));

        for (vid, (chr, pos)) in loci.iter().enumerate() {
            let mut variant = Variant::new(vid, *chr, *pos, "A", "G");
            variant.cell_af = 0.5;
            data.variants.push(variant);
        }

        for (cell, row) in data.cells.iter_mut().zip(grid) {
            cell.genotypes = row
                .iter()
                .enumerate()
                .map(|(vid, &genotype)| CellVar {
                    vid,
                    genotype,
                    passed: genotype != NA,
                    ..CellVar::default()
                })
                .collect();
        }

        data
    }

    fn ids(runs: &[RunOfHomozygosity]) -> Vec<Vec<usize>> {
        runs.iter().map(|r| r.variant_ids.clone()).collect()
    }

    const CHR1_5: [(&str, u64); 5] = [("chr1", 10), ("chr1", 20), ("chr1", 30), ("chr1", 40), ("chr1", 50)];

    #[test]
    fn test_heterozygous_call_splits_runs() {
        let data = build(&CHR1_5, &[&[HOM, HOM, HET, HOM, HOM]]);
        let het_ids = vec![0, 1, 2, 3, 4];

        let runs = find_runs_of_homozygosity(&data.cells[0], &het_ids, &data.variants, 2);

        assert_eq!(ids(&runs), vec![vec![0, 1], vec![3, 4]]);
    }

    #[test]
    fn test_chromosome_boundary_splits_runs() {
        let loci = [("chr1", 10), ("chr1", 20), ("chr2", 5), ("chr2", 6)];
        let data = build(&loci, &[&[HOM, WT, HOM, HOM]]);

        let runs = find_runs_of_homozygosity(&data.cells[0], &[0, 1, 2, 3], &data.variants, 2);

        assert_eq!(ids(&runs), vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_missing_calls_neither_break_nor_extend() {
        let data = build(&CHR1_5, &[&[HOM, NA, WT, HEMI, HOM]]);

        let runs = find_runs_of_homozygosity(&data.cells[0], &[0, 1, 2, 3, 4], &data.variants, 3);

        assert_eq!(ids(&runs), vec![vec![0, 2, 4]]);
    }

    #[test]
    fn test_failed_calls_read_as_missing() {
        let mut data = build(&CHR1_5, &[&[HOM, HOM, HET, HOM, HOM]]);
        // A heterozygous call that failed the per-call filter must not split the run
        data.cells[0].genotypes[2].passed = false;

        let runs = find_runs_of_homozygosity(&data.cells[0], &[0, 1, 2, 3, 4], &data.variants, 2);

        assert_eq!(ids(&runs), vec![vec![0, 1, 3, 4]]);
    }

    #[test]
    fn test_short_runs_discarded() {
        let data = build(&CHR1_5, &[&[HOM, HET, HOM, HOM, HET]]);

        let runs = find_runs_of_homozygosity(&data.cells[0], &[0, 1, 2, 3, 4], &data.variants, 2);

        assert_eq!(ids(&runs), vec![vec![2, 3]]);
    }

    #[test]
    fn test_find_all_selects_and_sorts_loci() {
        // Loci stored out of genomic order; variant 2 is not heterozygous
        let loci = [("chr1", 30), ("chr1", 10), ("chr1", 20), ("chr1", 40)];
        let mut data = build(&loci, &[&[HOM, HOM, HET, HOM], &[HET, HOM, HOM, HOM]]);
        data.variants[2].cell_af = 0.9;

        let runs = find_all_runs_of_homozygosity(&data, 2);

        assert_eq!(runs.len(), 2);
        assert_eq!(ids(&runs[0]), vec![vec![1, 0, 3]]);
        // Het at pos 30 splits cell 1
        assert!(runs[1].is_empty());
        assert_eq!(informative_loci(&data.variants), vec![1, 0, 3]);
    }

    #[test]
    fn test_count_haplotypes() {
        let data = build(
            &CHR1_5,
            &[
                &[HOM, HOM, HOM, HET, HET],
                &[HOM, HOM, HOM, HET, HET],
                &[HOM, WT, HOM, HET, HET],
                &[HET, HOM, HOM, HET, HET],
            ],
        );
        let params = RohParams {
            min_vars: 2,
            min_counts: 2,
        };

        let analysis = RohAnalysis::run(&data, &params);

        assert_eq!(analysis.run_count(), 4);
        assert_eq!(analysis.haplotypes.len(), 2);

        let region = Region {
            chr: "chr1".to_string(),
            start: 10,
            end: 31,
        };
        let haps = &analysis.haplotypes[&region];
        assert_eq!(haps.haplotypes.len(), 2);
        assert_eq!(haps.haplotypes[0].cell_ids, vec![0, 1]);
        assert_eq!(haps.haplotypes[0].haplotype.to_string(), "0-1-2:Hom-Hom-Hom");
        assert_eq!(haps.haplotypes[1].cell_ids, vec![2]);
        assert_eq!(haps.haplotypes[1].haplotype.to_string(), "0-1-2:Hom-WT-Hom");

        let recurrent: Vec<_> = analysis.recurrent(2).collect();
        assert_eq!(recurrent.len(), 1);
        assert_eq!(recurrent[0].1.count(), 2);
    }

    #[test]
    fn test_run_region_is_half_open() {
        let data = build(&CHR1_5, &[&[HOM; 5]]);
        let run = RunOfHomozygosity {
            variant_ids: vec![1, 3],
        };

        let region = run.region(&data.variants).unwrap();

        assert_eq!(region.start, 20);
        assert_eq!(region.end, 41);
        assert!(RunOfHomozygosity::default().region(&data.variants).is_none());
    }
}
