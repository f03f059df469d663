// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for single-cell genotype file formats
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================

pub mod vcf;

pub use vcf::{LocusRecord, SampleCall, VcfLocusReader, VcfParseError};
