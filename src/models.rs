// ==============================================================================
// models.rs - Single-Cell Genotype Data Model
// ==============================================================================
// Description: Cell, Variant and per-cell genotype call structures
// Author: Matt Barham
// Created: 2026-09-21
// Modified: 2026-10-14
// Version: 1.1.0
// ==============================================================================
// Invariants:
//   - Cell/Variant ids are dense (0..n) and equal their index in `Data`
//   - Variant.cells_mutated is a subset of Variant.cells_genotyped
//   - Cell.genotypes is ordered by variant id and only references live variants
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Zygosity of one cell's call at one variant
///
/// The declaration order is the total order used when comparing calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Zygosity {
    /// No call was made (both alleles missing)
    #[default]
    NoGenotype,
    /// Neither called allele is the alternate allele
    WildType,
    /// One called allele is the alternate allele, the other is called and differs
    Heterozygous,
    /// Both called alleles are the alternate allele
    Homozygous,
    /// Only one allele could be called and it is the alternate allele
    Hemizygous,
}

impl Zygosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zygosity::NoGenotype => "NA",
            Zygosity::WildType => "WT",
            Zygosity::Heterozygous => "Het",
            Zygosity::Homozygous => "Hom",
            Zygosity::Hemizygous => "Hemi",
        }
    }

    /// Integer code written to genotype tables
    pub fn code(&self) -> i8 {
        match self {
            Zygosity::NoGenotype => -1,
            Zygosity::WildType => 0,
            Zygosity::Heterozygous => 1,
            Zygosity::Homozygous => 2,
            Zygosity::Hemizygous => 3,
        }
    }

    /// True for every call carrying the alternate allele
    pub fn is_mutated(&self) -> bool {
        match self {
            Zygosity::NoGenotype | Zygosity::WildType => false,
            Zygosity::Heterozygous | Zygosity::Homozygous | Zygosity::Hemizygous => true,
        }
    }
}

impl fmt::Display for Zygosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One distinct allele change at one genomic position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    /// Position in `Data::variants` (reassigned by every filter pass)
    pub id: usize,

    /// Chromosome name as written in the VCF (e.g., "chr1")
    pub chr: String,

    /// Zero-based position of the first trimmed base
    pub pos: u64,

    /// Reference bases after trimming shared leading bases (may be empty)
    pub ref_allele: String,

    /// Alternate bases after trimming shared leading bases (may be empty)
    pub alt_allele: String,

    /// Ids of cells with a passing call at this variant (ascending)
    pub cells_genotyped: Vec<usize>,

    /// Ids of cells whose passing call carries the alternate allele (ascending)
    pub cells_mutated: Vec<usize>,

    /// cells_genotyped / total cells
    pub genotyped_frac: f64,

    /// cells_mutated / total cells
    pub cell_af: f64,
}

impl Variant {
    pub fn new(
        id: usize,
        chr: impl Into<String>,
        pos: u64,
        ref_allele: impl Into<String>,
        alt_allele: impl Into<String>,
    ) -> Self {
        Self {
            id,
            chr: chr.into(),
            pos,
            ref_allele: ref_allele.into(),
            alt_allele: alt_allele.into(),
            cells_genotyped: Vec::new(),
            cells_mutated: Vec::new(),
            genotyped_frac: 0.0,
            cell_af: 0.0,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.chr, self.pos, self.ref_allele, self.alt_allele)
    }
}

/// Genotype call of one cell at one variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CellVar {
    /// Owning variant id (equivalent to Variant.id)
    pub vid: usize,

    pub genotype: Zygosity,

    /// GQ
    pub genotype_quality: u32,

    /// DP
    pub read_depth: u32,

    /// AD of the candidate alternate allele
    pub alt_reads: u32,

    /// Allele frequency by read count (alt_reads / read_depth)
    pub af: f64,

    /// Whether the call passed the per-call filter and counts as genotyped
    pub passed: bool,
}

impl CellVar {
    /// Call recorded for a sample with both alleles missing
    pub fn no_call(vid: usize) -> Self {
        Self {
            vid,
            ..Self::default()
        }
    }

    /// Zygosity as seen by downstream consumers.
    /// Calls that did not pass the per-call filter read as `NoGenotype`.
    pub fn called_genotype(&self) -> Zygosity {
        if self.passed {
            self.genotype
        } else {
            Zygosity::NoGenotype
        }
    }
}

/// One sequenced single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Position in `Data::cells` (reassigned by every filter pass)
    pub id: usize,

    /// Sample name from the VCF header (cell barcode)
    pub name: String,

    /// One call per live variant, ordered by variant id
    pub genotypes: Vec<CellVar>,

    /// Fraction of live variants with a passing call in this cell
    pub genotypes_present: f64,
}

impl Cell {
    pub fn new(id: usize, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            genotypes: Vec::new(),
            genotypes_present: 0.0,
        }
    }

    /// Look up this cell's call at a variant
    pub fn genotype(&self, vid: usize) -> Option<&CellVar> {
        // Calls are normally one-per-variant, so the index is a direct hit
        match self.genotypes.get(vid) {
            Some(call) if call.vid == vid => Some(call),
            _ => self
                .genotypes
                .binary_search_by_key(&vid, |call| call.vid)
                .ok()
                .map(|idx| &self.genotypes[idx]),
        }
    }

    /// Number of calls that passed the per-call filter
    pub fn passing_calls(&self) -> usize {
        self.genotypes.iter().filter(|call| call.passed).count()
    }
}

/// Root aggregate: every cell and variant of one sample sheet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub cells: Vec<Cell>,
    pub variants: Vec<Variant>,
}

impl Data {
    /// Create an empty data set with one cell per sample name
    pub fn with_cells<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let cells = names
            .into_iter()
            .enumerate()
            .map(|(id, name)| Cell::new(id, name))
            .collect();

        Self {
            cells,
            variants: Vec::new(),
        }
    }

    /// Recompute every derived fraction from the current totals
    pub fn recompute_fractions(&mut self) {
        let total_cells = self.cells.len();
        let total_variants = self.variants.len();

        for variant in &mut self.variants {
            variant.genotyped_frac = fraction(variant.cells_genotyped.len(), total_cells);
            variant.cell_af = fraction(variant.cells_mutated.len(), total_cells);
        }

        for cell in &mut self.cells {
            cell.genotypes_present = fraction(cell.passing_calls(), total_variants);
        }
    }

    /// Check the id and cross-reference invariants of the aggregate
    pub fn is_consistent(&self) -> bool {
        let cells_ok = self.cells.iter().enumerate().all(|(idx, cell)| {
            cell.id == idx
                && cell.genotypes.windows(2).all(|w| w[0].vid < w[1].vid)
                && cell.genotypes.iter().all(|call| call.vid < self.variants.len())
        });

        let variants_ok = self.variants.iter().enumerate().all(|(idx, variant)| {
            variant.id == idx
                && variant.cells_genotyped.windows(2).all(|w| w[0] < w[1])
                && variant.cells_genotyped.iter().all(|&c| c < self.cells.len())
                && variant
                    .cells_mutated
                    .iter()
                    .all(|c| variant.cells_genotyped.binary_search(c).is_ok())
        });

        cells_ok && variants_ok
    }
}

/// Half-open genomic interval [start, end) on one chromosome
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Region {
    pub chr: String,
    /// Zero-based, inclusive
    pub start: u64,
    /// Exclusive
    pub end: u64,
}

impl Region {
    /// Number of bases spanned
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chr, self.start, self.end)
    }
}

/// `count / total`, defined as 0 for an empty population
pub(crate) fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}
