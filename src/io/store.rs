//! Indexed store over a sorted annotation track.
//!
//! [`IndexedBed`] bundles the pieces random access needs: the
//! BGZF-compressed track, its tabix-style sidecar index, and a seekable
//! block reader. It exposes the four store primitives the annotation
//! layer is written against:
//!
//! - [`IndexedBed::compress`]: plain text → BGZF sibling
//! - [`IndexedBed::build_index`]: BGZF track → `.tbi` sidecar
//! - [`IndexedBed::contigs`] / [`IndexedBed::has_contig`]
//! - [`IndexedBed::fetch`]: raw lines overlapping a region, in file order
//!
//! The handle is not thread-safe: fetches seek the shared reader, so
//! concurrent use from multiple threads needs external synchronization.

use crate::error::{AnnotrackError, Result};
use crate::formats::index::{TbiBuilder, TbiIndex};
use crate::io::bgzf::{BgzfReader, BgzfWriter, Chunk};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};

/// Append a suffix to a path without touching its existing extension
/// (`track.bed` → `track.bed.gz`, not `track.gz`).
pub(crate) fn path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Parse the leading `{contig, start, end}` columns of a data line.
fn parse_interval(line: &str) -> Result<(&str, u64, u64)> {
    let mut fields = line.splitn(4, '\t');
    let contig = fields.next().unwrap_or("");
    let start = fields.next();
    let end = fields.next();
    match (start, end) {
        (Some(start), Some(end)) => {
            let start = start.parse().map_err(|_| AnnotrackError::Schema {
                msg: format!("start column is not an integer: '{}'", start),
            })?;
            let end = end.parse().map_err(|_| AnnotrackError::Schema {
                msg: format!("end column is not an integer: '{}'", end),
            })?;
            Ok((contig, start, end))
        }
        _ => Err(AnnotrackError::Schema {
            msg: format!(
                "data line needs at least 3 tab-delimited fields: '{}'",
                line
            ),
        }),
    }
}

/// A handle to a compressed, indexed annotation track.
#[derive(Debug)]
pub struct IndexedBed {
    index: TbiIndex,
    reader: BgzfReader<File>,
}

impl IndexedBed {
    /// BGZF-compress a plain-text track into `dst`.
    pub fn compress<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> Result<()> {
        let mut reader = BufReader::new(File::open(src)?);
        let mut writer = BgzfWriter::new(BufWriter::new(File::create(dst)?));

        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
        }
        writer.finish()?;
        Ok(())
    }

    /// Build the `.tbi` sidecar for a BGZF-compressed track.
    ///
    /// Reads the whole file once, tracking the virtual-offset range of
    /// every data line. Comment (`#`) and blank lines are skipped.
    /// Records must be grouped by contig with non-decreasing starts;
    /// unsorted or malformed input fails with
    /// [`AnnotrackError::IndexBuild`].
    pub fn build_index<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let index_build = |reason: String| AnnotrackError::IndexBuild {
            path: path.display().to_string(),
            reason,
        };

        let mut reader = BgzfReader::from_path(path)?;
        let mut builder = TbiBuilder::new();
        let mut line = String::new();
        loop {
            let start_offset = reader.virtual_position();
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let end_offset = reader.virtual_position();

            let trimmed = line.trim_end();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (contig, start, end) =
                parse_interval(trimmed).map_err(|e| index_build(e.to_string()))?;
            builder
                .add_record(contig, start, end, Chunk::new(start_offset, end_offset))
                .map_err(|e| index_build(e.to_string()))?;
        }

        let sidecar = path_with_suffix(path, ".tbi");
        builder.finish().to_path(&sidecar)?;
        Ok(sidecar)
    }

    /// Open a prepared track (its `.tbi` sidecar must already exist).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let index = TbiIndex::from_path(path_with_suffix(path, ".tbi"))?;
        let reader = BgzfReader::from_path(path)?;
        Ok(IndexedBed { index, reader })
    }

    /// Contig names known to the index, in file order.
    pub fn contigs(&self) -> Vec<String> {
        self.index.names().map(|name| name.to_string()).collect()
    }

    /// Whether the index knows `contig`.
    pub fn has_contig(&self, contig: &str) -> bool {
        self.index.has_reference(contig)
    }

    /// Raw data lines overlapping `[start, end)` on `contig`, trimmed,
    /// in ascending file order.
    ///
    /// # Errors
    ///
    /// Unknown contigs are an error at this level
    /// ([`AnnotrackError::InvalidInput`]); callers that want the
    /// empty-result behavior check [`IndexedBed::has_contig`] first.
    /// A data line with unparseable coordinates is an
    /// [`AnnotrackError::Schema`] failure.
    pub fn fetch(&mut self, contig: &str, start: u64, end: u64) -> Result<Vec<String>> {
        let chunks = self.index.query(contig, start, end)?;
        let meta = self.index.meta_char();

        let mut records = Vec::new();
        let mut line = String::new();
        'chunks: for chunk in chunks {
            self.reader.seek_virtual(chunk.start)?;
            while self.reader.virtual_position() < chunk.end {
                line.clear();
                if self.reader.read_line(&mut line)? == 0 {
                    break;
                }
                let trimmed = line.trim_end();
                if trimmed.is_empty() || trimmed.starts_with(meta) {
                    continue;
                }
                let (row_contig, row_start, row_end) = parse_interval(trimmed)?;
                if row_contig != contig {
                    continue;
                }
                // Starts are sorted within a contig, so nothing past the
                // window can overlap it
                if row_start >= end {
                    break 'chunks;
                }
                if row_end > start {
                    records.push(trimmed.to_string());
                }
            }
        }
        Ok(records)
    }

    /// Iterate every line of the track from the beginning.
    ///
    /// Blank lines are skipped; comment lines are yielded (callers that
    /// sample leading records filter them).
    pub fn lines(&mut self) -> Result<Lines<'_>> {
        self.reader
            .seek_virtual(crate::io::bgzf::VirtualOffset::from_raw(0))?;
        Ok(Lines {
            reader: &mut self.reader,
        })
    }
}

/// Iterator over the lines of an indexed track, created by
/// [`IndexedBed::lines`].
pub struct Lines<'a> {
    reader: &'a mut BgzfReader<File>,
}

impl Iterator for Lines<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    return Some(Ok(trimmed.to_string()));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
