// ==============================================================================
// genotype_converter.rs - Allele Pair to Zygosity Conversion
// ==============================================================================
// Description: Classifies diploid/haploid allele calls against one candidate
//              alternate allele and normalizes REF/ALT representations
// Author: Matt Barham
// Created: 2026-09-21
// Modified: 2026-10-12
// Version: 1.1.0
// ==============================================================================
// Algorithm:
//   Given the two called allele indices and the candidate ALT index:
//   - ./. (no call)                      → NoGenotype
//   - neither allele is ALT (e.g., 0/2)  → WildType
//   - one allele is ALT, other called    → Heterozygous
//   - one allele is ALT, other missing   → Hemizygous
//   - both alleles are ALT               → Homozygous
// ==============================================================================

use crate::models::Zygosity;
use thiserror::Error;

/// Errors that can occur while normalizing alleles
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeConversionError {
    #[error("REF '{ref_allele}' and ALT '{alt_allele}' describe no allele change")]
    NoAlleleChange {
        ref_allele: String,
        alt_allele: String,
    },
}

/// Classify one cell's call relative to a candidate alternate allele
///
/// # Arguments
/// * `alleles` - Called allele indices (`None` = missing, 0 = REF, k = k-th ALT)
/// * `alt_index` - 1-based index of the candidate alternate allele
///
/// # Returns
/// The call's `Zygosity` for this alternate allele
///
/// # Examples
/// ```
/// use cellgeno::genotype_converter::classify_zygosity;
/// use cellgeno::models::Zygosity;
///
/// assert_eq!(classify_zygosity([Some(0), Some(1)], 1), Zygosity::Heterozygous);
/// assert_eq!(classify_zygosity([Some(0), Some(1)], 2), Zygosity::WildType);
/// ```
pub fn classify_zygosity(alleles: [Option<usize>; 2], alt_index: usize) -> Zygosity {
    if alleles.iter().all(Option::is_none) {
        return Zygosity::NoGenotype;
    }

    let matches = alleles.iter().filter(|a| **a == Some(alt_index)).count();
    let missing = alleles.iter().any(Option::is_none);

    match (matches, missing) {
        (0, _) => Zygosity::WildType,
        (1, true) => Zygosity::Hemizygous,
        (1, false) => Zygosity::Heterozygous,
        (2, _) => Zygosity::Homozygous,
        _ => unreachable!("a diploid call has at most two alleles"),
    }
}

/// Remove the leading bases shared by REF and ALT
///
/// # Arguments
/// * `ref_allele` - Reference bases (already uppercased)
/// * `alt_allele` - Alternate bases (already uppercased)
///
/// # Returns
/// * `Ok((ref, alt, offset))` - Trimmed alleles and the number of bases removed
/// * `Err(GenotypeConversionError::NoAlleleChange)` - REF and ALT are identical
///
/// # Examples
/// ```
/// use cellgeno::genotype_converter::trim_matching_bases;
///
/// assert_eq!(trim_matching_bases("GATC", "GATG").unwrap(), ("C", "G", 3));
/// assert_eq!(trim_matching_bases("GA", "G").unwrap(), ("A", "", 1));
/// ```
pub fn trim_matching_bases<'a>(
    ref_allele: &'a str,
    alt_allele: &'a str,
) -> Result<(&'a str, &'a str, usize), GenotypeConversionError> {
    let shared = ref_allele
        .bytes()
        .zip(alt_allele.bytes())
        .take_while(|(r, a)| r == a)
        .count();

    // ASCII bases only, so byte offsets are char boundaries
    let trimmed_ref = ref_allele.get(shared..).unwrap_or("");
    let trimmed_alt = alt_allele.get(shared..).unwrap_or("");

    if trimmed_ref.is_empty() && trimmed_alt.is_empty() {
        return Err(GenotypeConversionError::NoAlleleChange {
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
        });
    }

    Ok((trimmed_ref, trimmed_alt, shared))
}
