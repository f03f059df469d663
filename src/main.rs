// ==============================================================================
// main.rs - cellgeno Entry Point
// ==============================================================================
// Description: Command line entry point: genotype tables, runs of
//              homozygosity and allele-frequency matrices from single-cell VCFs
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-16
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cellgeno::config::{PipelineParams, DEFAULT_VCF_QUAL};
use cellgeno::filter::{CellFilterParam, GlobalFilterParam};
use cellgeno::output::{OutputGenerator, RohSummary};
use cellgeno::processor::GenotypeProcessor;
use cellgeno::roh::{RohAnalysis, RohParams};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the filtered cell x variant genotype table and variant table
    Table {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Find runs of homozygosity and count haplotypes shared across cells
    Roh {
        #[command(flatten)]
        input: InputArgs,

        /// Minimum number of adjacent homozygous loci in a run
        #[arg(long, default_value_t = 5, env = "CELLGENO_MIN_RUN_LENGTH")]
        min_run_length: usize,

        /// Minimum number of cells sharing a run for it to be reported
        #[arg(long, default_value_t = 2, env = "CELLGENO_MIN_COUNTS")]
        min_counts: usize,
    },

    /// Write the cell x variant read allele-frequency matrix
    AfMatrix {
        #[command(flatten)]
        input: InputArgs,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input VCF file (may be .vcf.gz)
    #[arg(short, long)]
    input: PathBuf,

    /// Output prefix (default: input path without .gz/.vcf)
    #[arg(short, long)]
    output_prefix: Option<PathBuf>,

    /// JSON parameter file (replaces all threshold flags)
    #[arg(short, long, env = "CELLGENO_PARAMS")]
    params: Option<PathBuf>,

    /// Loci with QUAL at or below this value are discarded
    #[arg(long, default_value_t = DEFAULT_VCF_QUAL, env = "CELLGENO_MIN_VCF_QUAL")]
    min_vcf_qual: f64,

    /// Minimum genotype quality (GQ) of a passing call
    #[arg(long, default_value_t = 30, env = "CELLGENO_MIN_GQ")]
    min_genotype_quality: u32,

    /// Minimum read depth (DP) of a passing call
    #[arg(long, default_value_t = 10, env = "CELLGENO_MIN_DP")]
    min_genotype_depth: u32,

    /// Minimum read allele frequency for a mutated call
    #[arg(long, default_value_t = 0.2, env = "CELLGENO_MIN_READ_AF")]
    min_read_af: f64,

    /// Minimum fraction of cells genotyped at a variant
    #[arg(long, default_value_t = 0.5, env = "CELLGENO_MIN_GENOTYPED_FRAC")]
    min_genotyped_frac: f64,

    /// Minimum fraction of variants genotyped in a cell
    #[arg(long, default_value_t = 0.5, env = "CELLGENO_MIN_GENOTYPES_PRESENT")]
    min_genotypes_present: f64,

    /// Minimum fraction of cells mutated at a variant
    #[arg(long, default_value_t = 0.1, env = "CELLGENO_MIN_CELL_AF")]
    min_cell_af: f64,
}

impl InputArgs {
    fn pipeline_params(&self, roh: RohParams) -> Result<PipelineParams> {
        if let Some(path) = &self.params {
            info!("Loading parameters from {}", path.display());
            return PipelineParams::load_from_file(path).context("Failed to load parameter file");
        }

        Ok(PipelineParams {
            min_vcf_qual: self.min_vcf_qual,
            cell_filter: CellFilterParam {
                min_genotype_quality: self.min_genotype_quality,
                min_genotype_depth: self.min_genotype_depth,
                min_read_af: self.min_read_af,
            },
            global_filter: GlobalFilterParam {
                min_genotyped_frac: self.min_genotyped_frac,
                min_genotypes_present: self.min_genotypes_present,
                min_cell_af: self.min_cell_af,
            },
            roh,
        })
    }

    fn output_prefix(&self) -> PathBuf {
        self.output_prefix
            .clone()
            .unwrap_or_else(|| default_prefix(&self.input))
    }
}

/// Input path with a trailing ".gz" and then ".vcf" removed
fn default_prefix(input: &Path) -> PathBuf {
    let mut prefix = input.to_path_buf();
    for suffix in ["gz", "vcf"] {
        if prefix.extension() == Some(OsStr::new(suffix)) {
            prefix.set_extension("");
        }
    }
    prefix
}

fn run_table(args: &InputArgs) -> Result<()> {
    let processor = GenotypeProcessor::new(&args.input, args.pipeline_params(RohParams::default())?);
    let processed = processor.process()?;
    let output = OutputGenerator::new(args.output_prefix());

    let mut summary = processor.summary(&processed, "table");
    summary.outputs.push(output.write_genotype_table(&processed.data)?);
    summary.outputs.push(output.write_variant_table(&processed.data)?);
    output.write_summary(&summary)?;

    Ok(())
}

fn run_roh(args: &InputArgs, roh: RohParams) -> Result<()> {
    let processor = GenotypeProcessor::new(&args.input, args.pipeline_params(roh)?);
    let processed = processor.process()?;
    let roh = processor.params().roh;

    info!(
        "Finding runs of homozygosity (min run length {}, min cells {})",
        roh.min_vars, roh.min_counts
    );
    let analysis = RohAnalysis::run(&processed.data, &roh);
    let output = OutputGenerator::new(args.output_prefix());

    let mut summary = processor.summary(&processed, "roh");
    summary.roh = Some(RohSummary::new(&analysis, roh.min_counts));
    summary.outputs.push(output.write_roh_haplotypes(&analysis, roh.min_counts)?);
    summary.outputs.push(output.write_cell_runs(&processed.data, &analysis)?);
    summary.outputs.push(output.write_variant_table(&processed.data)?);
    output.write_summary(&summary)?;

    Ok(())
}

fn run_af_matrix(args: &InputArgs) -> Result<()> {
    let processor = GenotypeProcessor::new(&args.input, args.pipeline_params(RohParams::default())?);
    let processed = processor.process()?;
    let output = OutputGenerator::new(args.output_prefix());

    let mut summary = processor.summary(&processed, "af-matrix");
    summary.outputs.push(output.write_af_matrix(&processed.data)?);
    output.write_summary(&summary)?;

    Ok(())
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cellgeno=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command line arguments
    let cli = Cli::parse();

    info!("cellgeno {} starting...", env!("CARGO_PKG_VERSION"));

    let result = match &cli.command {
        Command::Table { input } => run_table(input),
        Command::Roh {
            input,
            min_run_length,
            min_counts,
        } => run_roh(
            input,
            RohParams {
                min_vars: *min_run_length,
                min_counts: *min_counts,
            },
        ),
        Command::AfMatrix { input } => run_af_matrix(input),
    };

    if let Err(e) = &result {
        warn!("Processing failed: {:#}", e);
    }

    result
}
