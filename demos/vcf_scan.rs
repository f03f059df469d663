// ==============================================================================
// demos/vcf_scan.rs - Single-Cell VCF Scan
// ==============================================================================
// Description: Test harness for the locus reader and ingestion stage
// Author: Matthew Barham
// Created: 2026-09-27
// ==============================================================================
// Usage:
//   cargo run --example vcf_scan -- /path/to/cells.vcf.gz
// ==============================================================================

use cellgeno::filter::CellFilterParam;
use cellgeno::ingest::Ingestor;
use cellgeno::parsers::VcfLocusReader;
use cellgeno::roh::informative_loci;
use std::env;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <vcf_file>", args[0]);
        eprintln!("\nExample:");
        eprintln!("  cargo run --example vcf_scan -- /path/to/cells.vcf.gz");
        std::process::exit(1);
    }

    let vcf_path = &args[1];

    println!("{}", "=".repeat(80));
    println!("Single-Cell VCF Scan");
    println!("{}", "=".repeat(80));
    println!("File: {}", vcf_path);
    println!();

    let mut reader = VcfLocusReader::open(vcf_path)?;
    let cell_names = reader.sample_names();
    println!("Cells in header: {}", cell_names.len());

    let cell_filter = CellFilterParam::default();
    let mut ingestor = Ingestor::new(cell_names, cell_filter, 100.0);

    let start = std::time::Instant::now();
    let mut shown = 0;

    for locus in reader.records() {
        let locus = locus?;

        if shown < 10 {
            println!(
                "  {:<8} {:<12} {:<6} {:<12} QUAL={}",
                locus.chrom,
                locus.position,
                locus.reference,
                locus.alternates.join(","),
                locus
                    .quality
                    .map(|q| format!("{:.1}", q))
                    .unwrap_or_else(|| ".".to_string())
            );
            shown += 1;
        }

        ingestor.add_locus(&locus)?;
    }

    let (data, stats) = ingestor.finish();
    let elapsed = start.elapsed();

    println!();
    println!("Statistics:");
    println!("  - Loci read: {}", stats.loci_read);
    println!("  - Loci below QUAL: {}", stats.loci_below_quality);
    println!("  - Candidate variants: {}", stats.candidate_variants);
    println!("  - Variants retained: {}", stats.variants_retained);
    println!("  - Informative heterozygous loci: {}", informative_loci(&data.variants).len());
    println!("  - Scan time: {:.2}s", elapsed.as_secs_f64());

    Ok(())
}
