// ==============================================================================
// filter.rs - Two-Stage Genotype Filter Engine
// ==============================================================================
// Description: Per-call quality filter applied during ingestion and the
//              iterative global filter that prunes cells and variants
// Author: Matt Barham
// Created: 2026-09-22
// Modified: 2026-10-18
// Version: 1.2.1
// ==============================================================================
// Global filter stages (all marks are computed before anything is removed):
//   1. Variant: |CellsGenotyped| / totalCells        < MinGenotypedFrac
//   2. Cell:    passing calls / unmarked variants     < MinGenotypesPresent
//   3. Variant: |CellsMutated ∩ unmarked cells| / unmarked cells < MinCellAf
//   A zero denominator always passes. Stages repeat until nothing is removed.
//   Stage 3 counts only mutated cells left unmarked by stage 2 in the
//   numerator, not every mutated cell.
// ==============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{fraction, Cell, CellVar, Data, Variant, Zygosity};

/// Per-call thresholds (strict: a value equal to the threshold fails)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellFilterParam {
    pub min_genotype_quality: u32,
    pub min_genotype_depth: u32,
    pub min_read_af: f64,
}

impl Default for CellFilterParam {
    fn default() -> Self {
        Self {
            min_genotype_quality: 30,
            min_genotype_depth: 10,
            min_read_af: 0.2,
        }
    }
}

/// Outcome of the per-call filter for one CellVar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// No call was made
    Missing,
    /// Genotype quality or read depth at/below threshold
    LowQuality,
    /// Passing wild-type call
    WildType,
    /// Passing call whose read AF was too low; recorded as WildType
    Coerced,
    /// Passing call carrying the alternate allele
    Mutated,
}

impl CallStatus {
    /// Whether the call counts toward `Variant::cells_genotyped`
    pub fn is_genotyped(&self) -> bool {
        matches!(self, CallStatus::WildType | CallStatus::Coerced | CallStatus::Mutated)
    }

    /// Whether the call counts toward `Variant::cells_mutated`
    pub fn is_mutated(&self) -> bool {
        matches!(self, CallStatus::Mutated)
    }
}

impl CellFilterParam {
    /// Strict three-way test: GQ, DP and read AF all above threshold
    pub fn passes(&self, call: &CellVar) -> bool {
        call.genotype_quality > self.min_genotype_quality
            && call.read_depth > self.min_genotype_depth
            && call.af > self.min_read_af
    }

    /// Apply the per-call filter in place
    ///
    /// Sets `call.passed` and coerces low-AF alternate calls to `WildType`.
    /// The call itself is never dropped.
    ///
    /// # Returns
    /// The `CallStatus` used to build the per-variant cell lists
    pub fn apply(&self, call: &mut CellVar) -> CallStatus {
        if call.genotype == Zygosity::NoGenotype {
            call.passed = false;
            return CallStatus::Missing;
        }

        if call.genotype_quality <= self.min_genotype_quality
            || call.read_depth <= self.min_genotype_depth
        {
            call.passed = false;
            return CallStatus::LowQuality;
        }

        call.passed = true;

        if call.genotype == Zygosity::WildType {
            return CallStatus::WildType;
        }

        if call.af <= self.min_read_af {
            call.genotype = Zygosity::WildType;
            return CallStatus::Coerced;
        }

        CallStatus::Mutated
    }
}

/// Population-level thresholds (fractions)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalFilterParam {
    pub min_genotyped_frac: f64,
    pub min_genotypes_present: f64,
    pub min_cell_af: f64,
}

impl Default for GlobalFilterParam {
    fn default() -> Self {
        Self {
            min_genotyped_frac: 0.5,
            min_genotypes_present: 0.5,
            min_cell_af: 0.1,
        }
    }
}

/// Totals of a global filter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    /// Passes that removed at least one cell or variant
    pub passes: usize,
    pub cells_removed: usize,
    pub variants_removed: usize,
}

/// Removal marks for one pass
#[derive(Debug)]
struct RemovalMarks {
    cells: Vec<bool>,
    variants: Vec<bool>,
}

impl RemovalMarks {
    fn cell_count(&self) -> usize {
        self.cells.iter().filter(|m| **m).count()
    }

    fn variant_count(&self) -> usize {
        self.variants.iter().filter(|m| **m).count()
    }

    fn is_empty(&self) -> bool {
        self.cell_count() == 0 && self.variant_count() == 0
    }
}

impl GlobalFilterParam {
    /// Prune cells and variants until a pass removes nothing
    ///
    /// # Arguments
    /// * `data` - Ingested data; compacted in place, ids renumbered densely
    ///
    /// # Returns
    /// Counts of removed cells and variants across all passes
    pub fn apply(&self, data: &mut Data) -> FilterReport {
        let mut report = FilterReport::default();

        loop {
            let marks = self.mark(data);
            if marks.is_empty() {
                break;
            }

            let cells_removed = marks.cell_count();
            let variants_removed = marks.variant_count();

            compact(data, &marks);

            report.passes += 1;
            report.cells_removed += cells_removed;
            report.variants_removed += variants_removed;

            info!(
                "Global filter pass {}: removed {} cells and {} variants ({} cells, {} variants remain)",
                report.passes,
                cells_removed,
                variants_removed,
                data.cells.len(),
                data.variants.len()
            );
        }

        // Fractions reflect the final totals even when nothing was removed
        data.recompute_fractions();

        report
    }

    fn mark(&self, data: &Data) -> RemovalMarks {
        let total_cells = data.cells.len();

        // Stage 1: genotyping rate per variant
        let mut variants: Vec<bool> = data
            .variants
            .iter()
            .map(|variant| {
                total_cells > 0
                    && fraction(variant.cells_genotyped.len(), total_cells) < self.min_genotyped_frac
            })
            .collect();

        // Stage 2: genotyping rate per cell over the variants kept by stage 1
        let live_variants = variants.iter().filter(|m| !**m).count();
        let cells: Vec<bool> = data
            .cells
            .iter()
            .map(|cell| {
                let present = cell
                    .genotypes
                    .iter()
                    .filter(|call| call.passed && !variants[call.vid])
                    .count();
                live_variants > 0 && fraction(present, live_variants) < self.min_genotypes_present
            })
            .collect();

        // Stage 3: cell-level allele frequency over the cells kept by stage 2
        let live_cells = cells.iter().filter(|m| !**m).count();
        if live_cells > 0 {
            for (variant, marked) in data.variants.iter().zip(variants.iter_mut()) {
                if *marked {
                    continue;
                }
                let mutated = variant
                    .cells_mutated
                    .iter()
                    .filter(|&&cell_id| !cells[cell_id])
                    .count();
                if fraction(mutated, live_cells) < self.min_cell_af {
                    *marked = true;
                }
            }
        }

        debug!(
            "Marked {} of {} cells and {} of {} variants",
            cells.iter().filter(|m| **m).count(),
            cells.len(),
            variants.iter().filter(|m| **m).count(),
            variants.len()
        );

        RemovalMarks { cells, variants }
    }
}

/// Old id -> new id for every survivor, `None` for removed entries
fn dense_ids(removed: &[bool]) -> Vec<Option<usize>> {
    let mut next = 0;
    removed
        .iter()
        .map(|&gone| {
            if gone {
                None
            } else {
                next += 1;
                Some(next - 1)
            }
        })
        .collect()
}

/// Rebuild cells and variants without the marked entries and swap them in
fn compact(data: &mut Data, marks: &RemovalMarks) {
    let cell_ids = dense_ids(&marks.cells);
    let variant_ids = dense_ids(&marks.variants);

    let remap_cells = |ids: &[usize]| -> Vec<usize> {
        ids.iter().filter_map(|&old| cell_ids[old]).collect()
    };

    let variants: Vec<Variant> = data
        .variants
        .iter()
        .enumerate()
        .filter_map(|(old, variant)| {
            variant_ids[old].map(|id| Variant {
                id,
                chr: variant.chr.clone(),
                pos: variant.pos,
                ref_allele: variant.ref_allele.clone(),
                alt_allele: variant.alt_allele.clone(),
                cells_genotyped: remap_cells(&variant.cells_genotyped),
                cells_mutated: remap_cells(&variant.cells_mutated),
                genotyped_frac: 0.0,
                cell_af: 0.0,
            })
        })
        .collect();

    let cells: Vec<Cell> = data
        .cells
        .iter()
        .enumerate()
        .filter_map(|(old, cell)| {
            cell_ids[old].map(|id| Cell {
                id,
                name: cell.name.clone(),
                genotypes: cell
                    .genotypes
                    .iter()
                    .filter_map(|call| {
                        variant_ids[call.vid].map(|vid| CellVar { vid, ..*call })
                    })
                    .collect(),
                genotypes_present: 0.0,
            })
        })
        .collect();

    data.cells = cells;
    data.variants = variants;
    data.recompute_fractions();

    debug_assert!(data.is_consistent());
}
