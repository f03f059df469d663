// ==============================================================================
// lib.rs - cellgeno Library
// ==============================================================================
// Description: Library interface for single-cell genotype filtering and
//              run-of-homozygosity detection
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-16
// Version: 2.0.0
// ==============================================================================

pub mod config;
pub mod filter;
pub mod genotype_converter;
pub mod ingest;
pub mod models;
pub mod output;
pub mod parsers;
pub mod processor;
pub mod roh;
pub mod validator;
pub mod variants;
