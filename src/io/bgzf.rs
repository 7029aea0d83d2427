//! BGZF block codec with virtual-offset random access.
//!
//! BGZF (Blocked GNU Zip Format) is the compression layer underneath
//! coordinate-indexed genomics files. A BGZF file is a sequence of
//! independent gzip members, each carrying a `BC` extra subfield with
//! `BSIZE` (total block size - 1), and each decompressing to at most
//! 64 KB. Because blocks are independent, a reader can jump straight to
//! any block and decompress only what it needs.
//!
//! # Virtual Offsets
//!
//! Positions inside a BGZF file are addressed with 64-bit virtual
//! offsets:
//! - High 48 bits: compressed offset of the containing block
//! - Low 16 bits: offset within the decompressed block
//!
//! Virtual offsets compare correctly as plain integers, which is what
//! makes them usable as index keys.
//!
//! # Example
//!
//! ```
//! use annotrack::io::bgzf::{BgzfReader, BgzfWriter};
//! use std::io::Cursor;
//!
//! # fn main() -> annotrack::Result<()> {
//! let mut writer = BgzfWriter::new(Vec::new());
//! writer.write_all(b"chr1\t100\t200\n")?;
//! let compressed = writer.finish()?;
//!
//! let mut reader = BgzfReader::new(Cursor::new(compressed));
//! let mut line = String::new();
//! reader.read_line(&mut line)?;
//! assert_eq!(line, "chr1\t100\t200\n");
//! # Ok(())
//! # }
//! ```

use crate::error::{AnnotrackError, Result};
use flate2::read::GzDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Maximum decompressed size of a single BGZF block (format guarantee).
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Uncompressed payload per block.
///
/// Kept below [`MAX_BLOCK_SIZE`] so the compressed block stays under the
/// 64 KB `BSIZE` ceiling even for incompressible input.
const BLOCK_PAYLOAD_SIZE: usize = 60 * 1024;

/// Number of blocks compressed in one parallel batch.
const PARALLEL_BLOCK_COUNT: usize = 8;

/// Standard 28-byte BGZF EOF marker (an empty block).
const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // gzip header
    6, 0, 66, 67, 2, 0, 27, 0, // extra field with BSIZE=27
    3, 0, // empty deflate stream
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE
];

/// A position inside a BGZF file.
///
/// Packs the compressed offset of a block (high 48 bits) with an offset
/// into that block's decompressed data (low 16 bits). Ordering on the
/// raw integer matches file order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Pack a compressed block offset and an intra-block offset.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        VirtualOffset((compressed << 16) | u64::from(uncompressed))
    }

    /// Reconstruct from a raw 64-bit value.
    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    /// The raw 64-bit value.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Compressed offset of the containing block.
    pub fn compressed(&self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block.
    pub fn uncompressed(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl fmt::Display for VirtualOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.compressed(), self.uncompressed())
    }
}

/// A half-open range `[start, end)` of virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First virtual offset covered by the chunk.
    pub start: VirtualOffset,
    /// Virtual offset just past the chunk.
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { start, end }
    }
}

/// Compress one payload into a complete BGZF block.
///
/// Raw deflate wrapped in a gzip member whose extra field carries the
/// `BC` subfield with `BSIZE = total block size - 1`.
fn compress_block(data: &[u8]) -> Result<Vec<u8>> {
    let mut deflate = DeflateEncoder::new(Vec::new(), Compression::default());
    deflate.write_all(data)?;
    let deflated = deflate.finish()?;

    let crc = crc32fast::hash(data);
    let isize = data.len() as u32;

    let mut block = Vec::with_capacity(deflated.len() + 26);
    block.push(31); // ID1
    block.push(139); // ID2
    block.push(8); // CM (deflate)
    block.push(4); // FLG (FEXTRA)
    block.extend_from_slice(&[0, 0, 0, 0]); // MTIME
    block.push(0); // XFL
    block.push(255); // OS (unknown)
    block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    block.push(66); // SI1='B'
    block.push(67); // SI2='C'
    block.extend_from_slice(&2u16.to_le_bytes()); // SLEN

    let bsize_pos = block.len();
    block.extend_from_slice(&0u16.to_le_bytes()); // BSIZE placeholder

    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.to_le_bytes());
    block.extend_from_slice(&isize.to_le_bytes());

    let total_size = block.len();
    if total_size > MAX_BLOCK_SIZE {
        return Err(AnnotrackError::Compression(format!(
            "compressed block size {} exceeds BGZF limit",
            total_size
        )));
    }
    let bsize = (total_size - 1) as u16;
    block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());

    Ok(block)
}

/// Streaming BGZF writer.
///
/// Buffers up to eight payloads and compresses them as a parallel
/// batch, keeping memory bounded (~1 MB) regardless of
/// output size. Call [`BgzfWriter::finish`] to flush remaining data and
/// write the EOF marker; dropping the writer without finishing produces
/// a truncated file.
pub struct BgzfWriter<W: Write> {
    inner: W,
    /// Filled payloads awaiting parallel compression
    pending: Vec<Vec<u8>>,
    /// Payload currently being filled
    block: Vec<u8>,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer over any byte sink.
    pub fn new(inner: W) -> Self {
        BgzfWriter {
            inner,
            pending: Vec::with_capacity(PARALLEL_BLOCK_COUNT),
            block: Vec::with_capacity(BLOCK_PAYLOAD_SIZE),
        }
    }

    /// Compress and write all pending payloads.
    fn flush_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let compressed: Vec<Vec<u8>> = self
            .pending
            .par_iter()
            .map(|payload| compress_block(payload))
            .collect::<Result<Vec<_>>>()?;

        for block in compressed {
            self.inner.write_all(&block)?;
        }
        self.pending.clear();
        Ok(())
    }

    /// Append bytes, rolling to a new block whenever the payload fills.
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let space = BLOCK_PAYLOAD_SIZE - self.block.len();
            let take = buf.len().min(space);
            self.block.extend_from_slice(&buf[..take]);
            buf = &buf[take..];

            if self.block.len() >= BLOCK_PAYLOAD_SIZE {
                let full = std::mem::replace(
                    &mut self.block,
                    Vec::with_capacity(BLOCK_PAYLOAD_SIZE),
                );
                self.pending.push(full);
                if self.pending.len() >= PARALLEL_BLOCK_COUNT {
                    self.flush_pending()?;
                }
            }
        }
        Ok(())
    }

    /// Flush remaining payloads, write the EOF marker, and return the sink.
    pub fn finish(mut self) -> Result<W> {
        if !self.block.is_empty() {
            let last = std::mem::take(&mut self.block);
            self.pending.push(last);
        }
        self.flush_pending()?;
        self.inner.write_all(&BGZF_EOF)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Read one complete BGZF block from a reader positioned at a block start.
///
/// Returns `Ok(None)` at a clean end of file, otherwise the compressed
/// block size and the decompressed payload.
fn read_block<R: Read>(reader: &mut R) -> Result<Option<(u64, Vec<u8>)>> {
    // Fixed gzip header (10 bytes) + XLEN (2 bytes)
    let mut fixed = [0u8; 12];
    match reader.read_exact(&mut fixed) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    if fixed[0] != 31 || fixed[1] != 139 {
        return Err(AnnotrackError::Compression(format!(
            "invalid gzip magic: [{}, {}]",
            fixed[0], fixed[1]
        )));
    }
    if fixed[3] & 0x04 == 0 {
        return Err(AnnotrackError::Compression(
            "gzip member has no extra field; plain gzip cannot be random-accessed".to_string(),
        ));
    }

    let xlen = u16::from_le_bytes([fixed[10], fixed[11]]) as usize;
    let mut extra = vec![0u8; xlen];
    reader.read_exact(&mut extra)?;

    // Locate the BC subfield carrying BSIZE
    let mut bsize: Option<u16> = None;
    let mut pos = 0;
    while pos + 4 <= xlen {
        let si1 = extra[pos];
        let si2 = extra[pos + 1];
        let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        if si1 == 66 && si2 == 67 && slen == 2 {
            if pos + 6 > xlen {
                return Err(AnnotrackError::Compression(
                    "incomplete BSIZE field".to_string(),
                ));
            }
            bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
            break;
        }
        pos += 4 + slen;
    }

    let block_size = match bsize {
        Some(bs) => bs as usize + 1,
        None => {
            return Err(AnnotrackError::Compression(
                "gzip member has no BC subfield; not a BGZF block".to_string(),
            ))
        }
    };

    // Remaining bytes: deflate payload + CRC32 + ISIZE
    let consumed = 12 + xlen;
    if block_size < consumed + 8 {
        return Err(AnnotrackError::Compression(format!(
            "invalid BSIZE: block size {} smaller than its header",
            block_size
        )));
    }
    let mut member = Vec::with_capacity(block_size);
    member.extend_from_slice(&fixed);
    member.extend_from_slice(&extra);
    let mut rest = vec![0u8; block_size - consumed];
    reader.read_exact(&mut rest)?;
    member.extend_from_slice(&rest);

    let mut decoder = GzDecoder::new(&member[..]);
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    if data.len() > MAX_BLOCK_SIZE {
        return Err(AnnotrackError::Compression(format!(
            "block decompressed to {} bytes, exceeding the 64 KB limit",
            data.len()
        )));
    }

    Ok(Some((block_size as u64, data)))
}

/// Random-access BGZF reader.
///
/// Holds one decompressed block at a time. Reading past the end of the
/// current block loads the next one; [`BgzfReader::seek_virtual`] jumps
/// to an arbitrary virtual offset.
#[derive(Debug)]
pub struct BgzfReader<R: Read + Seek> {
    inner: R,
    /// Decompressed payload of the current block
    block: Vec<u8>,
    /// Read cursor within the current block
    pos: usize,
    /// Compressed offset of the current block
    block_coffset: u64,
    /// Compressed size of the current block (0 = nothing loaded)
    block_csize: u64,
}

impl BgzfReader<File> {
    /// Open a BGZF file from a path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(file))
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Create a reader; no data is read until the first access.
    pub fn new(inner: R) -> Self {
        BgzfReader {
            inner,
            block: Vec::new(),
            pos: 0,
            block_coffset: 0,
            block_csize: 0,
        }
    }

    /// Current position as a virtual offset.
    ///
    /// When the current block is exhausted this reports the start of the
    /// next block, so offsets recorded at record boundaries compare
    /// consistently no matter where the boundary falls.
    pub fn virtual_position(&self) -> VirtualOffset {
        if self.pos >= self.block.len() && self.block_csize != 0 {
            VirtualOffset::new(self.block_coffset + self.block_csize, 0)
        } else {
            VirtualOffset::new(self.block_coffset, self.pos as u16)
        }
    }

    /// Load the block starting at `coffset`. Returns `false` at EOF.
    fn load_block_at(&mut self, coffset: u64) -> Result<bool> {
        self.inner.seek(SeekFrom::Start(coffset))?;
        match read_block(&mut self.inner)? {
            Some((csize, data)) => {
                self.block = data;
                self.pos = 0;
                self.block_coffset = coffset;
                self.block_csize = csize;
                Ok(true)
            }
            None => {
                self.block.clear();
                self.pos = 0;
                self.block_coffset = coffset;
                self.block_csize = 0;
                Ok(false)
            }
        }
    }

    /// Advance to the block following the current one.
    fn next_block(&mut self) -> Result<bool> {
        let next = self.block_coffset + self.block_csize;
        self.load_block_at(next)
    }

    /// Position the reader at a virtual offset.
    pub fn seek_virtual(&mut self, offset: VirtualOffset) -> Result<()> {
        let coffset = offset.compressed();
        if self.block_csize == 0 || coffset != self.block_coffset {
            // Seeking to EOF is legal; reads from there just return nothing.
            self.load_block_at(coffset)?;
        }
        let within = offset.uncompressed() as usize;
        if within > self.block.len() {
            return Err(AnnotrackError::InvalidInput {
                msg: format!(
                    "virtual offset {} points beyond its block ({} bytes)",
                    offset,
                    self.block.len()
                ),
            });
        }
        self.pos = within;
        Ok(())
    }

    /// Read one line (through `\n`, inclusive) into `line`, crossing
    /// block boundaries as needed. Returns the number of bytes read,
    /// 0 at end of file.
    pub fn read_line(&mut self, line: &mut String) -> Result<usize> {
        let mut bytes: Vec<u8> = Vec::new();
        loop {
            if self.pos >= self.block.len() {
                if !self.next_block()? {
                    break;
                }
                continue;
            }
            let rest = &self.block[self.pos..];
            match rest.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    bytes.extend_from_slice(&rest[..=i]);
                    self.pos += i + 1;
                    break;
                }
                None => {
                    bytes.extend_from_slice(rest);
                    self.pos = self.block.len();
                }
            }
        }

        if bytes.is_empty() {
            return Ok(0);
        }
        let text = std::str::from_utf8(&bytes).map_err(|e| AnnotrackError::InvalidInput {
            msg: format!("annotation data is not valid UTF-8: {}", e),
        })?;
        line.push_str(text);
        Ok(bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut writer = BgzfWriter::new(Vec::new());
        writer.write_all(data).unwrap();
        writer.finish().unwrap()
    }

    fn read_all_lines(compressed: Vec<u8>) -> Vec<String> {
        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_virtual_offset_packing() {
        let offset = VirtualOffset::new(5, 7);
        assert_eq!(offset.as_raw(), (5 << 16) | 7);
        assert_eq!(offset.compressed(), 5);
        assert_eq!(offset.uncompressed(), 7);
        assert_eq!(VirtualOffset::from_raw(offset.as_raw()), offset);
    }

    #[test]
    fn test_virtual_offset_ordering_matches_file_order() {
        let a = VirtualOffset::new(0, 100);
        let b = VirtualOffset::new(0, 200);
        let c = VirtualOffset::new(1, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_round_trip_small() {
        let data = b"chr1\t100\t200\tgeneA\t0\t+\nchr1\t150\t250\tgeneB\t0\t-\n";
        let lines = read_all_lines(compress(data));
        assert_eq!(
            lines,
            vec![
                "chr1\t100\t200\tgeneA\t0\t+\n".to_string(),
                "chr1\t150\t250\tgeneB\t0\t-\n".to_string(),
            ]
        );
    }

    #[test]
    fn test_output_ends_with_eof_marker() {
        let compressed = compress(b"chr1\t1\t2\tx\t0\t+\n");
        assert!(compressed.len() >= BGZF_EOF.len());
        assert_eq!(&compressed[compressed.len() - BGZF_EOF.len()..], &BGZF_EOF);
    }

    #[test]
    fn test_empty_input_still_readable() {
        let compressed = compress(b"");
        assert_eq!(read_all_lines(compressed), Vec::<String>::new());
    }

    #[test]
    fn test_round_trip_multiple_blocks() {
        // Enough lines to span several 60 KB blocks
        let mut data = String::new();
        for i in 0..10_000 {
            data.push_str(&format!("chr1\t{}\t{}\tfeat{}\t0\t+\n", i * 10, i * 10 + 5, i));
        }
        let lines = read_all_lines(compress(data.as_bytes()));
        assert_eq!(lines.len(), 10_000);
        assert_eq!(lines[0], "chr1\t0\t5\tfeat0\t0\t+\n");
        assert_eq!(lines[9_999], "chr1\t99990\t99995\tfeat9999\t0\t+\n");
    }

    #[test]
    fn test_line_spanning_block_boundary() {
        // A single line longer than one block payload
        let mut data = vec![b'A'; BLOCK_PAYLOAD_SIZE + 1024];
        data.push(b'\n');
        let lines = read_all_lines(compress(&data));
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), BLOCK_PAYLOAD_SIZE + 1025);
    }

    #[test]
    fn test_final_line_without_newline() {
        let lines = read_all_lines(compress(b"chr1\t1\t2\tx\t0\t+"));
        assert_eq!(lines, vec!["chr1\t1\t2\tx\t0\t+".to_string()]);
    }

    #[test]
    fn test_seek_virtual_returns_to_recorded_position() {
        let mut data = String::new();
        for i in 0..5_000 {
            data.push_str(&format!("chr1\t{}\t{}\trec{}\t0\t+\n", i, i + 1, i));
        }
        let compressed = compress(data.as_bytes());

        // First pass: record the virtual offset of every line
        let mut reader = BgzfReader::new(Cursor::new(compressed));
        let mut offsets = Vec::new();
        let mut lines = Vec::new();
        loop {
            let offset = reader.virtual_position();
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 {
                break;
            }
            offsets.push(offset);
            lines.push(line);
        }
        assert_eq!(lines.len(), 5_000);

        // Jump back to a few positions and confirm we read the same line
        for &i in &[0usize, 1, 2_500, 4_999] {
            reader.seek_virtual(offsets[i]).unwrap();
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, lines[i], "line {} after seek", i);
        }
    }

    #[test]
    fn test_read_rejects_plain_gzip() {
        use flate2::write::GzEncoder;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"chr1\t1\t2\n").unwrap();
        let gz = encoder.finish().unwrap();

        let mut reader = BgzfReader::new(Cursor::new(gz));
        let mut line = String::new();
        let err = reader.read_line(&mut line).unwrap_err();
        assert!(matches!(err, AnnotrackError::Compression(_)));
    }

    #[test]
    fn test_read_rejects_garbage() {
        let mut reader = BgzfReader::new(Cursor::new(b"not a bgzf file at all".to_vec()));
        let mut line = String::new();
        assert!(reader.read_line(&mut line).is_err());
    }
}
