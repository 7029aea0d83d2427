//! Tabix-style (TBI) binning index: construction, serialization, and
//! region queries.
//!
//! A TBI index maps genomic regions to the BGZF file ranges that contain
//! them, so a reader can answer "which bytes hold records overlapping
//! `[start, end)` on this contig?" without scanning the file.
//!
//! # Layout
//!
//! Little-endian binary, magic `TBI\x01`, followed by a header (reference
//! count, column configuration, comment character, skip count,
//! concatenated reference names) and per-reference index data:
//!
//! - **Binning index**: hierarchical bins (37,450 bins covering 512 Mbp,
//!   six levels from one 512 Mbp bin down to 32,768 bins of 16 Kbp),
//!   each holding chunks of virtual offsets.
//! - **Linear index**: the lowest virtual offset of any record whose
//!   start falls in each 16 Kbp window, used to prune candidate chunks.
//!
//! The sidecar on disk is gzip-compressed; plain files are accepted too.
//!
//! # Column convention
//!
//! Indexes built here use the generic preset with 0-based columns
//! (sequence name in column 0, start in 1, end in 2, `#` comments, no
//! skipped lines).

use crate::error::{AnnotrackError, Result};
use crate::io::bgzf::{Chunk, VirtualOffset};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// TBI file magic
const TBI_MAGIC: &[u8; 4] = b"TBI\x01";

/// Exclusive upper bound on indexable positions (512 Mbp binning ceiling).
pub const MAX_POSITION: u64 = 1 << 29;

/// Width of one linear-index window (16 Kbp).
const LINEAR_SHIFT: u32 = 14;

/// A bin in the hierarchical binning index.
#[derive(Debug, Clone)]
pub struct TbiBin {
    /// Bin number (0-37449)
    pub id: u32,
    /// File ranges holding this bin's records
    pub chunks: Vec<Chunk>,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone)]
pub struct TbiReference {
    /// Reference sequence name
    pub name: String,
    /// Binning index, ordered by bin id
    pub bins: Vec<TbiBin>,
    /// Linear index: lowest offset per 16 Kbp window
    pub intervals: Vec<VirtualOffset>,
}

/// A tabix-style index over a BGZF-compressed, tab-delimited file.
#[derive(Debug, Clone)]
pub struct TbiIndex {
    /// Column of the sequence name (0-based)
    col_seq: i32,
    /// Column of the start position (0-based)
    col_beg: i32,
    /// Column of the end position (0-based)
    col_end: i32,
    /// Comment character for header lines
    meta_char: char,
    /// Leading lines to skip
    skip_lines: i32,
    /// Per-reference index data
    references: Vec<TbiReference>,
    /// Reference name to index mapping
    ref_map: HashMap<String, usize>,
}

impl TbiIndex {
    /// Load an index from a `.tbi` sidecar, gzip-compressed or plain.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let mut magic = [0u8; 2];
        file.read_exact(&mut magic)?;
        let file = File::open(path.as_ref())?;

        if magic == [0x1f, 0x8b] {
            let mut reader = BufReader::new(MultiGzDecoder::new(file));
            Self::from_reader(&mut reader)
        } else {
            let mut reader = BufReader::new(file);
            Self::from_reader(&mut reader)
        }
    }

    /// Parse an index from an uncompressed byte stream.
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != TBI_MAGIC {
            return Err(AnnotrackError::InvalidInput {
                msg: format!("invalid TBI magic: expected {:?}, got {:?}", TBI_MAGIC, magic),
            });
        }

        let n_ref = read_i32(reader)?;
        let _format = read_i32(reader)?;
        let col_seq = read_i32(reader)?;
        let col_beg = read_i32(reader)?;
        let col_end = read_i32(reader)?;
        let meta = read_i32(reader)?;
        let skip = read_i32(reader)?;
        let l_nm = read_i32(reader)?;

        let mut names_buf = vec![0u8; l_nm as usize];
        reader.read_exact(&mut names_buf)?;
        let names = parse_reference_names(&names_buf)?;
        if names.len() != n_ref as usize {
            return Err(AnnotrackError::InvalidInput {
                msg: format!(
                    "TBI header claims {} references but carries {} names",
                    n_ref,
                    names.len()
                ),
            });
        }

        let mut references = Vec::with_capacity(names.len());
        let mut ref_map = HashMap::new();

        for (idx, name) in names.into_iter().enumerate() {
            let n_bin = read_i32(reader)?;
            let mut bins = Vec::with_capacity(n_bin as usize);
            for _ in 0..n_bin {
                let id = read_u32(reader)?;
                let n_chunk = read_i32(reader)?;
                let mut chunks = Vec::with_capacity(n_chunk as usize);
                for _ in 0..n_chunk {
                    let start = VirtualOffset::from_raw(read_u64(reader)?);
                    let end = VirtualOffset::from_raw(read_u64(reader)?);
                    chunks.push(Chunk::new(start, end));
                }
                bins.push(TbiBin { id, chunks });
            }

            let n_intv = read_i32(reader)?;
            let mut intervals = Vec::with_capacity(n_intv as usize);
            for _ in 0..n_intv {
                intervals.push(VirtualOffset::from_raw(read_u64(reader)?));
            }

            ref_map.insert(name.clone(), idx);
            references.push(TbiReference {
                name,
                bins,
                intervals,
            });
        }

        Ok(TbiIndex {
            col_seq,
            col_beg,
            col_end,
            meta_char: meta as u8 as char,
            skip_lines: skip,
            references,
            ref_map,
        })
    }

    /// Serialize to the uncompressed TBI layout.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(TBI_MAGIC)?;
        write_i32(writer, self.references.len() as i32)?;
        write_i32(writer, 0)?; // generic format
        write_i32(writer, self.col_seq)?;
        write_i32(writer, self.col_beg)?;
        write_i32(writer, self.col_end)?;
        write_i32(writer, self.meta_char as i32)?;
        write_i32(writer, self.skip_lines)?;

        let mut names = Vec::new();
        for reference in &self.references {
            names.extend_from_slice(reference.name.as_bytes());
            names.push(0);
        }
        write_i32(writer, names.len() as i32)?;
        writer.write_all(&names)?;

        for reference in &self.references {
            write_i32(writer, reference.bins.len() as i32)?;
            for bin in &reference.bins {
                writer.write_all(&bin.id.to_le_bytes())?;
                write_i32(writer, bin.chunks.len() as i32)?;
                for chunk in &bin.chunks {
                    writer.write_all(&chunk.start.as_raw().to_le_bytes())?;
                    writer.write_all(&chunk.end.as_raw().to_le_bytes())?;
                }
            }
            write_i32(writer, reference.intervals.len() as i32)?;
            for interval in &reference.intervals {
                writer.write_all(&interval.as_raw().to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Write the index to a gzip-compressed sidecar file.
    pub fn to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        self.write_to(&mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(())
    }

    /// Comment character for header lines.
    pub fn meta_char(&self) -> char {
        self.meta_char
    }

    /// All references, in file order.
    pub fn references(&self) -> &[TbiReference] {
        &self.references
    }

    /// Reference names, in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.name.as_str())
    }

    /// Whether the index knows `name`.
    pub fn has_reference(&self, name: &str) -> bool {
        self.ref_map.contains_key(name)
    }

    /// Look up a reference by name.
    pub fn get_reference(&self, name: &str) -> Option<&TbiReference> {
        self.ref_map.get(name).map(|&idx| &self.references[idx])
    }

    /// File chunks that may hold records overlapping `[start, end)`.
    ///
    /// Candidate bins come from the binning scheme; the linear index prunes
    /// chunks that end before the first record of the query window;
    /// surviving chunks are sorted and merged. A degenerate window
    /// (`start >= end`) or one entirely past the indexable ceiling
    /// yields no chunks.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotrackError::InvalidInput`] if `name` is not in the
    /// index; callers that treat unknown contigs as empty must check
    /// [`TbiIndex::has_reference`] first.
    pub fn query(&self, name: &str, start: u64, end: u64) -> Result<Vec<Chunk>> {
        let reference = self
            .get_reference(name)
            .ok_or_else(|| AnnotrackError::InvalidInput {
                msg: format!("reference '{}' not found in index", name),
            })?;

        let end = end.min(MAX_POSITION);
        if start >= end {
            return Ok(Vec::new());
        }
        let (start, end) = (start as u32, end as u32);

        let mut chunks = Vec::new();
        for bin_id in reg2bins(start, end) {
            if let Some(bin) = reference.bins.iter().find(|b| b.id == bin_id) {
                chunks.extend_from_slice(&bin.chunks);
            }
        }

        let min_offset = linear_min_offset(&reference.intervals, start);
        chunks.retain(|chunk| chunk.end > min_offset);

        chunks.sort_by_key(|c| c.start);
        Ok(merge_chunks(&chunks))
    }
}

/// Streaming TBI construction.
///
/// Records must arrive in file order: grouped by reference, with
/// non-decreasing start positions within each reference. Violations are
/// reported as errors, which is how unsorted input is caught during
/// index preparation.
#[derive(Debug, Default)]
pub struct TbiBuilder {
    references: Vec<BuilderReference>,
    ref_map: HashMap<String, usize>,
}

#[derive(Debug)]
struct BuilderReference {
    name: String,
    bins: HashMap<u32, Vec<Chunk>>,
    intervals: Vec<Option<VirtualOffset>>,
    last_start: u64,
}

impl TbiBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        TbiBuilder::default()
    }

    /// Add one record: its reference, `[start, end)` coordinates, and the
    /// virtual-offset range of its line in the BGZF file.
    pub fn add_record(&mut self, reference: &str, start: u64, end: u64, chunk: Chunk) -> Result<()> {
        // Zero-length records still occupy a point on the axis
        let end = end.max(start + 1);
        if end > MAX_POSITION {
            return Err(AnnotrackError::InvalidRange(format!(
                "{}:{}-{} extends past the {} bp indexing ceiling",
                reference, start, end, MAX_POSITION
            )));
        }

        let current = match self.references.last() {
            Some(r) if r.name == reference => self.references.len() - 1,
            _ => {
                if self.ref_map.contains_key(reference) {
                    return Err(AnnotrackError::InvalidInput {
                        msg: format!(
                            "records for reference '{}' are not contiguous; input is not sorted",
                            reference
                        ),
                    });
                }
                self.ref_map.insert(reference.to_string(), self.references.len());
                self.references.push(BuilderReference {
                    name: reference.to_string(),
                    bins: HashMap::new(),
                    intervals: Vec::new(),
                    last_start: 0,
                });
                self.references.len() - 1
            }
        };
        let reference = &mut self.references[current];

        if start < reference.last_start {
            return Err(AnnotrackError::InvalidInput {
                msg: format!(
                    "start {} after {} on '{}'; input is not position-sorted",
                    start, reference.last_start, reference.name
                ),
            });
        }
        reference.last_start = start;

        // Binning index: drop the chunk into the record's bin, coalescing
        // with the previous chunk when they touch
        let bin = reg2bin(start as u32, end as u32);
        let chunks = reference.bins.entry(bin).or_default();
        let coalesced = match chunks.last_mut() {
            Some(last) if chunk.start <= last.end => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
                true
            }
            _ => false,
        };
        if !coalesced {
            chunks.push(chunk);
        }

        // Linear index: every 16 Kbp window the record touches keeps the
        // earliest offset seen for it
        let first_window = (start >> LINEAR_SHIFT) as usize;
        let last_window = ((end - 1) >> LINEAR_SHIFT) as usize;
        if reference.intervals.len() <= last_window {
            reference.intervals.resize(last_window + 1, None);
        }
        for window in first_window..=last_window {
            if reference.intervals[window].is_none() {
                reference.intervals[window] = Some(chunk.start);
            }
        }

        Ok(())
    }

    /// Finalize into a queryable index using the generic BED column
    /// preset (`#` comments, columns 0/1/2).
    pub fn finish(self) -> TbiIndex {
        let mut references = Vec::with_capacity(self.references.len());
        let mut ref_map = HashMap::new();

        for (idx, builder_ref) in self.references.into_iter().enumerate() {
            let mut bins: Vec<TbiBin> = builder_ref
                .bins
                .into_iter()
                .map(|(id, chunks)| TbiBin { id, chunks })
                .collect();
            bins.sort_by_key(|b| b.id);

            let intervals = builder_ref
                .intervals
                .into_iter()
                .map(|offset| offset.unwrap_or_else(|| VirtualOffset::from_raw(0)))
                .collect();

            ref_map.insert(builder_ref.name.clone(), idx);
            references.push(TbiReference {
                name: builder_ref.name,
                bins,
                intervals,
            });
        }

        TbiIndex {
            col_seq: 0,
            col_beg: 1,
            col_end: 2,
            meta_char: '#',
            skip_lines: 0,
            references,
            ref_map,
        }
    }
}

/// Bin holding a record spanning `[beg, end)` (smallest containing bin).
fn reg2bin(beg: u32, end: u32) -> u32 {
    let end = end - 1;
    if beg >> 14 == end >> 14 {
        return ((1 << 15) - 1) / 7 + (beg >> 14);
    }
    if beg >> 17 == end >> 17 {
        return ((1 << 12) - 1) / 7 + (beg >> 17);
    }
    if beg >> 20 == end >> 20 {
        return ((1 << 9) - 1) / 7 + (beg >> 20);
    }
    if beg >> 23 == end >> 23 {
        return ((1 << 6) - 1) / 7 + (beg >> 23);
    }
    if beg >> 26 == end >> 26 {
        return ((1 << 3) - 1) / 7 + (beg >> 26);
    }
    0
}

/// Bin ids that may overlap a region `[beg, end)`.
fn reg2bins(beg: u32, end: u32) -> Vec<u32> {
    let mut bins = vec![0]; // level 0: the whole axis
    let end = end - 1;

    for level in 1..=5u32 {
        let offset = ((1 << (3 * level)) - 1) / 7;
        let shift = 29 - 3 * level;
        let first = offset + (beg >> shift);
        let last = offset + (end >> shift);
        for bin in first..=last {
            bins.push(bin);
        }
    }

    bins
}

/// Lowest virtual offset a query starting at `beg` can need.
fn linear_min_offset(intervals: &[VirtualOffset], beg: u32) -> VirtualOffset {
    let window = (beg >> LINEAR_SHIFT) as usize;
    if window < intervals.len() {
        intervals[window]
    } else {
        VirtualOffset::from_raw(0)
    }
}

/// Merge overlapping or touching chunks (input must be sorted by start).
fn merge_chunks(chunks: &[Chunk]) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::new();
    for &chunk in chunks {
        let absorbed = match merged.last_mut() {
            Some(last) if chunk.start <= last.end => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
                true
            }
            _ => false,
        };
        if !absorbed {
            merged.push(chunk);
        }
    }
    merged
}

/// Split null-terminated reference names.
fn parse_reference_names(buf: &[u8]) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut start = 0;
    for (i, &byte) in buf.iter().enumerate() {
        if byte == 0 {
            if i > start {
                let name = std::str::from_utf8(&buf[start..i])
                    .map_err(|e| AnnotrackError::InvalidInput {
                        msg: format!("invalid UTF-8 in reference name: {}", e),
                    })?
                    .to_string();
                names.push(name);
            }
            start = i + 1;
        }
    }
    Ok(names)
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}
