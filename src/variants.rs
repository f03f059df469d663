// ==============================================================================
// variants.rs - Variant Selection and Ordering
// ==============================================================================
// Description: Population allele-frequency selection and genomic ordering of
//              variant ids
// Author: Matt Barham
// Created: 2026-09-24
// Modified: 2026-10-02
// Version: 1.0.0
// ==============================================================================

use std::cmp::Ordering;

use crate::models::Variant;

/// Cell AF band of a constitutionally heterozygous site (exclusive)
pub const HETEROZYGOUS_AF_RANGE: (f64, f64) = (0.2, 0.8);

/// Ids of variants likely heterozygous in constitutional DNA
pub fn find_heterozygous(variants: &[Variant]) -> Vec<usize> {
    let (min_af, max_af) = HETEROZYGOUS_AF_RANGE;
    find_variants_in_af_range(variants, min_af, max_af)
}

/// Ids of variants with `min_af < cell_af < max_af`
pub fn find_variants_in_af_range(variants: &[Variant], min_af: f64, max_af: f64) -> Vec<usize> {
    variants
        .iter()
        .filter(|v| v.cell_af > min_af && v.cell_af < max_af)
        .map(|v| v.id)
        .collect()
}

/// Genomic order: chromosome, position, ALT length, ALT sequence
pub fn compare_by_coord(a: &Variant, b: &Variant) -> Ordering {
    a.chr
        .cmp(&b.chr)
        .then(a.pos.cmp(&b.pos))
        .then(a.alt_allele.len().cmp(&b.alt_allele.len()))
        .then_with(|| a.alt_allele.cmp(&b.alt_allele))
}

/// Sort variant ids in genomic order without reordering `variants`
pub fn sort_ids_by_coord(ids: &mut [usize], variants: &[Variant]) {
    ids.sort_by(|&a, &b| compare_by_coord(&variants[a], &variants[b]));
}
