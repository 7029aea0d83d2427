//! BED-style annotation records.
//!
//! Annotation tracks are tab-delimited with at least six columns:
//! chrom, start, end, name, score (unused), strand. Coordinates are
//! **0-based, half-open** `[start, end)`. Lines beginning with `#` are
//! comments.
//!
//! # Examples
//!
//! ```
//! use annotrack::formats::bed::{Annotation, Strand};
//!
//! # fn main() -> annotrack::Result<()> {
//! let anno = Annotation::from_line("chr1\t100\t200\tgeneA\t0\t+")?;
//! assert_eq!(anno.chrom, "chr1");
//! assert_eq!(anno.start, 100);
//! assert_eq!(anno.end, 200);
//! assert_eq!(anno.name, "geneA");
//! assert_eq!(anno.strand, Strand::Forward);
//! assert!(anno.info.is_empty());
//! assert!(anno.thick_segments.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::error::{AnnotrackError, Result};
use std::collections::HashMap;
use std::fmt;

/// DNA strand orientation.
///
/// Any symbol other than `+` or `-` (e.g. `.`) maps to
/// [`Strand::Unknown`]; annotation tracks in the wild are not strict
/// about this column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    /// Plus strand (+)
    Forward,
    /// Minus strand (-)
    Reverse,
    /// Anything else
    Unknown,
}

impl Strand {
    /// Interpret a strand column value.
    pub fn from_symbol(symbol: &str) -> Strand {
        match symbol {
            "+" => Strand::Forward,
            "-" => Strand::Reverse,
            _ => Strand::Unknown,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
            Strand::Unknown => write!(f, "."),
        }
    }
}

/// A thick sub-interval of an annotation (e.g. a coding-exon span).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThickSegment {
    /// Start position (0-based, inclusive)
    pub start: u64,
    /// End position (exclusive)
    pub end: u64,
}

/// One annotation returned from a region query.
///
/// Instances are created fresh per query and owned by the caller; the
/// store never touches one after returning it. `chrom` is the name as
/// written in the file, not translated back to the caller's naming
/// convention.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Chromosome/contig name as read from the file
    pub chrom: String,
    /// Start position (0-based, inclusive)
    pub start: u64,
    /// End position (exclusive)
    pub end: u64,
    /// Strand orientation
    pub strand: Strand,
    /// Feature label
    pub name: String,
    /// Auxiliary key-value pairs, empty by default
    pub info: HashMap<String, String>,
    /// Ordered thick sub-intervals, empty by default
    pub thick_segments: Vec<ThickSegment>,
}

impl Annotation {
    /// Create an annotation with explicit auxiliary data.
    pub fn new(
        chrom: String,
        start: u64,
        end: u64,
        strand: Strand,
        name: String,
        info: HashMap<String, String>,
        thick_segments: Vec<ThickSegment>,
    ) -> Self {
        Annotation {
            chrom,
            start,
            end,
            strand,
            name,
            info,
            thick_segments,
        }
    }

    /// Parse one tab-delimited annotation line.
    ///
    /// Uses the first six columns `{chrom, start, end, name, score,
    /// strand}`; the score column and anything past column six are
    /// ignored, so BED12-style rows parse but their thick blocks are
    /// not materialized.
    ///
    /// # Errors
    ///
    /// Returns [`AnnotrackError::Schema`] if the line has fewer than six
    /// tab-delimited fields or its coordinates are not integers.
    pub fn from_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 6 {
            return Err(AnnotrackError::Schema {
                msg: format!(
                    "annotation records need at least 6 tab-delimited fields \
                     (chrom, start, end, name, score, strand); got {}",
                    fields.len()
                ),
            });
        }

        let start = parse_position(fields[1], "start")?;
        let end = parse_position(fields[2], "end")?;

        Ok(Annotation {
            chrom: fields[0].to_string(),
            start,
            end,
            strand: Strand::from_symbol(fields[5]),
            name: fields[3].to_string(),
            info: HashMap::new(),
            thick_segments: Vec::new(),
        })
    }

    /// Length of the annotation in base pairs.
    pub fn length(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Truncate the annotation to fit inside `[window_start, window_end)`.
    pub fn clip_to(&mut self, window_start: u64, window_end: u64) {
        self.start = self.start.max(window_start);
        self.end = self.end.min(window_end);
    }
}

fn parse_position(value: &str, field: &str) -> Result<u64> {
    value.parse().map_err(|_| AnnotrackError::Schema {
        msg: format!("{} column is not an integer: '{}'", field, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_line_basic() {
        let anno = Annotation::from_line("chr1\t100\t200\tgeneA\t0\t+").unwrap();
        assert_eq!(anno.chrom, "chr1");
        assert_eq!(anno.start, 100);
        assert_eq!(anno.end, 200);
        assert_eq!(anno.name, "geneA");
        assert_eq!(anno.strand, Strand::Forward);
        assert!(anno.info.is_empty());
        assert!(anno.thick_segments.is_empty());
    }

    #[test]
    fn test_from_line_reverse_and_unknown_strand() {
        let anno = Annotation::from_line("chr2\t5\t10\tx\t0\t-").unwrap();
        assert_eq!(anno.strand, Strand::Reverse);
        let anno = Annotation::from_line("chr2\t5\t10\tx\t0\t.").unwrap();
        assert_eq!(anno.strand, Strand::Unknown);
    }

    #[test]
    fn test_from_line_ignores_extra_columns() {
        // BED12-style row: extra columns parse but are not materialized
        let line = "chr1\t100\t200\tgeneA\t0\t+\t120\t180\t0\t2\t10,20\t0,80";
        let anno = Annotation::from_line(line).unwrap();
        assert_eq!(anno.name, "geneA");
        assert!(anno.thick_segments.is_empty());
    }

    #[test]
    fn test_from_line_too_few_fields() {
        let err = Annotation::from_line("chr1\t100\t200").unwrap_err();
        assert!(matches!(err, AnnotrackError::Schema { .. }));
    }

    #[test]
    fn test_from_line_bad_coordinate() {
        let err = Annotation::from_line("chr1\tabc\t200\tgeneA\t0\t+").unwrap_err();
        assert!(matches!(err, AnnotrackError::Schema { .. }));
    }

    #[test]
    fn test_length() {
        let anno = Annotation::from_line("chr1\t100\t250\tgeneA\t0\t+").unwrap();
        assert_eq!(anno.length(), 150);
    }

    #[test]
    fn test_clip_to() {
        let mut anno = Annotation::from_line("chr1\t10\t100\tgeneA\t0\t+").unwrap();
        anno.clip_to(50, 80);
        assert_eq!(anno.start, 50);
        assert_eq!(anno.end, 80);
    }

    #[test]
    fn test_clip_to_inside_window_is_untouched() {
        let mut anno = Annotation::from_line("chr1\t60\t70\tgeneA\t0\t+").unwrap();
        anno.clip_to(50, 80);
        assert_eq!(anno.start, 60);
        assert_eq!(anno.end, 70);
    }

    #[test]
    fn test_strand_display() {
        assert_eq!(Strand::Forward.to_string(), "+");
        assert_eq!(Strand::Reverse.to_string(), "-");
        assert_eq!(Strand::Unknown.to_string(), ".");
    }
}
