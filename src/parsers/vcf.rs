// ==============================================================================
// parsers/vcf.rs - Single-cell VCF locus reader
// ==============================================================================
// Description: Streams per-locus, per-cell genotype records from a multi-sample
//              VCF (one sample column per cell barcode) using noodles-vcf
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// - noodles-vcf: https://docs.rs/noodles-vcf/0.81.0/noodles_vcf/
// ==============================================================================

use flate2::read::MultiGzDecoder;
use noodles_vcf as vcf;
use noodles_vcf::variant::record::AlternateBases;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// One VCF data line with the fields the genotype model needs
#[derive(Debug, Clone, PartialEq)]
pub struct LocusRecord {
    /// Chromosome name (e.g., "chr1")
    pub chrom: String,

    /// 1-based position of the first REF base
    pub position: u64,

    /// Reference bases as written
    pub reference: String,

    /// Alternate alleles in column order (allele index = position + 1)
    pub alternates: Vec<String>,

    /// QUAL column; `None` for "."
    pub quality: Option<f64>,

    /// One call per header sample, in header order
    pub samples: Vec<SampleCall>,
}

/// FORMAT fields of one sample column
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleCall {
    /// GT allele indices (`None` = "." or absent)
    pub alleles: [Option<usize>; 2],

    /// GQ (0 when missing or unparseable)
    pub genotype_quality: u32,

    /// DP (0 when missing or unparseable)
    pub read_depth: u32,

    /// AD, one count per allele starting with REF (entries default to 0)
    pub allele_depths: Vec<u32>,
}

impl SampleCall {
    /// Read count supporting the allele at `allele_index` (0 = REF)
    pub fn allele_depth(&self, allele_index: usize) -> u32 {
        self.allele_depths.get(allele_index).copied().unwrap_or(0)
    }
}

/// VCF parsing errors
#[derive(Error, Debug)]
pub enum VcfParseError {
    #[error("Failed to open VCF file: {0}")]
    FileOpenError(String),

    #[error("Failed to read VCF header: {0}")]
    HeaderError(String),

    #[error("Failed to parse VCF record: {0}")]
    RecordError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_HEADER_LEN: u64 = 12;
const GZIP_FLAG_EXTRA: u8 = 0x04;

/// Container format detected from the leading bytes of the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCompression {
    None,
    Gzip,
    /// Gzip members carrying the BGZF "BC" extra subfield
    Bgzf,
}

/// Sniff the gzip header of `file` and rewind it
fn detect_compression(file: &mut File) -> io::Result<InputCompression> {
    let mut header = Vec::with_capacity(GZIP_HEADER_LEN as usize);
    file.by_ref().take(GZIP_HEADER_LEN).read_to_end(&mut header)?;

    let compression = if header.len() < 2 || header[..2] != GZIP_MAGIC {
        InputCompression::None
    } else if header.len() < GZIP_HEADER_LEN as usize || header[3] & GZIP_FLAG_EXTRA == 0 {
        InputCompression::Gzip
    } else {
        let xlen = u16::from_le_bytes([header[10], header[11]]) as u64;
        let mut extra = Vec::with_capacity(xlen as usize);
        file.by_ref().take(xlen).read_to_end(&mut extra)?;

        if has_bgzf_subfield(&extra) {
            InputCompression::Bgzf
        } else {
            InputCompression::Gzip
        }
    };

    file.rewind()?;
    Ok(compression)
}

/// Walk the SI1/SI2/LEN subfields of a gzip extra field looking for "BC"
fn has_bgzf_subfield(extra: &[u8]) -> bool {
    let mut rest = extra;

    while rest.len() >= 4 {
        if rest[0] == b'B' && rest[1] == b'C' {
            return true;
        }
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        rest = rest.get(4 + len..).unwrap_or(&[]);
    }

    false
}

fn has_gzip_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("gz") | Some("bgz")
    )
}

/// Streaming reader over the loci of one single-cell VCF
pub struct VcfLocusReader {
    reader: vcf::io::Reader<Box<dyn BufRead>>,
    header: vcf::Header,
}

impl VcfLocusReader {
    /// Open a VCF (plain, gzip or bgzip) and read its header
    ///
    /// # Arguments
    /// * `path` - Path to VCF file (can be .vcf or .vcf.gz)
    ///
    /// # Example
    /// ```no_run
    /// use cellgeno::parsers::VcfLocusReader;
    ///
    /// let mut reader = VcfLocusReader::open("run.cells.vcf.gz")?;
    /// let cells = reader.sample_names();
    /// for locus in reader.records() {
    ///     let locus = locus?;
    ///     assert_eq!(locus.samples.len(), cells.len());
    /// }
    /// # Ok::<(), cellgeno::parsers::VcfParseError>(())
    /// ```
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VcfParseError> {
        let path = path.as_ref();

        let open_error = |e: io::Error| VcfParseError::FileOpenError(format!("{}: {}", path.display(), e));

        let mut file = File::open(path).map_err(open_error)?;
        let compression = detect_compression(&mut file).map_err(open_error)?;
        debug!("Detected {:?} input for {}", compression, path.display());

        // noodles picks its BGZF reader from the extension; plain gzip goes
        // through a multi-member decoder
        let mut reader = match compression {
            InputCompression::Bgzf if has_gzip_extension(path) => {
                vcf::io::reader::Builder::default()
                    .build_from_path(path)
                    .map_err(open_error)?
            }
            InputCompression::None => {
                let inner: Box<dyn BufRead> = Box::new(BufReader::new(file));
                vcf::io::Reader::new(inner)
            }
            InputCompression::Gzip | InputCompression::Bgzf => {
                let inner: Box<dyn BufRead> = Box::new(BufReader::new(MultiGzDecoder::new(file)));
                vcf::io::Reader::new(inner)
            }
        };

        let header = reader
            .read_header()
            .map_err(|e| VcfParseError::HeaderError(format!("{}", e)))?;

        debug!(
            "Opened {} with {} sample columns",
            path.display(),
            header.sample_names().len()
        );

        Ok(Self { reader, header })
    }

    /// Sample (cell) names in column order
    pub fn sample_names(&self) -> Vec<String> {
        self.header.sample_names().iter().cloned().collect()
    }

    pub fn sample_count(&self) -> usize {
        self.header.sample_names().len()
    }

    /// Iterate over the remaining loci
    pub fn records(&mut self) -> impl Iterator<Item = Result<LocusRecord, VcfParseError>> + '_ {
        let sample_count = self.sample_count();

        self.reader
            .records()
            .enumerate()
            .map(move |(record_num, result)| {
                let record = result.map_err(|e| {
                    VcfParseError::RecordError(format!("record {}: {}", record_num + 1, e))
                })?;
                parse_record(&record, sample_count)
            })
    }
}

/// Convert one noodles record into a `LocusRecord`
fn parse_record(record: &vcf::Record, sample_count: usize) -> Result<LocusRecord, VcfParseError> {
    let chrom = record.reference_sequence_name().to_string();

    let position = match record.variant_start() {
        Some(Ok(pos)) => pos.get() as u64,
        Some(Err(e)) => {
            return Err(VcfParseError::RecordError(format!(
                "{}: failed to get position: {}",
                chrom, e
            )))
        }
        None => return Err(VcfParseError::MissingField(format!("{}: position", chrom))),
    };

    let reference = record.reference_bases().to_string();

    let alternates = record
        .alternate_bases()
        .iter()
        .map(|allele| allele.map(String::from))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| {
            VcfParseError::RecordError(format!("{}:{}: failed to get ALT: {}", chrom, position, e))
        })?;

    let quality = record
        .quality_score()
        .transpose()
        .map_err(|e| {
            VcfParseError::RecordError(format!("{}:{}: invalid QUAL: {}", chrom, position, e))
        })?
        .map(f64::from);

    let samples = parse_samples(record.samples().as_ref(), sample_count)
        .map_err(|e| VcfParseError::RecordError(format!("{}:{}: {}", chrom, position, e)))?;

    Ok(LocusRecord {
        chrom,
        position,
        reference,
        alternates,
        quality,
        samples,
    })
}

/// Parse the FORMAT column and every sample column of one record
///
/// Fields are located by FORMAT key, so column order does not matter.
/// Samples absent from the line are returned as no-calls.
///
/// # Arguments
/// * `raw` - "FORMAT\tsample1\tsample2..." exactly as on the data line
/// * `sample_count` - Number of samples declared in the header
pub fn parse_samples(raw: &str, sample_count: usize) -> Result<Vec<SampleCall>, String> {
    let mut columns = raw.split('\t');

    let format = match columns.next() {
        Some(format) if !format.is_empty() && format != "." => format,
        _ => return Ok(vec![SampleCall::default(); sample_count]),
    };

    let keys: Vec<&str> = format.split(':').collect();
    let key_index = |key: &str| keys.iter().position(|k| *k == key);
    let gt = key_index("GT");
    let gq = key_index("GQ");
    let dp = key_index("DP");
    let ad = key_index("AD");

    let mut calls = Vec::with_capacity(sample_count);

    for column in columns {
        let values: Vec<&str> = column.split(':').collect();
        let value = |idx: Option<usize>| idx.and_then(|i| values.get(i).copied()).unwrap_or("");

        let allele_depths = match value(ad) {
            "" => Vec::new(),
            depths => depths.split(',').map(parse_count).collect(),
        };

        calls.push(SampleCall {
            alleles: parse_genotype(value(gt)),
            genotype_quality: parse_count(value(gq)),
            read_depth: parse_count(value(dp)),
            allele_depths,
        });
    }

    if calls.len() > sample_count {
        return Err(format!(
            "{} sample columns but header declares {}",
            calls.len(),
            sample_count
        ));
    }

    calls.resize(sample_count, SampleCall::default());
    Ok(calls)
}

/// Parse a GT value ("0/1", "1|1", "./1", "1") into two allele indices
pub fn parse_genotype(gt: &str) -> [Option<usize>; 2] {
    let mut alleles = gt
        .split(|c| c == '/' || c == '|')
        .map(|allele| allele.trim().parse::<usize>().ok());

    [alleles.next().flatten(), alleles.next().flatten()]
}

/// Lenient integer FORMAT value: missing or malformed reads as 0
fn parse_count(value: &str) -> u32 {
    value.trim().parse().unwrap_or(0)
}
