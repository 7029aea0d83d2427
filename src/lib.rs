//! annotrack: random-access lookup of genomic interval annotations.
//!
//! # Overview
//!
//! annotrack serves repeated "what overlaps `[start, end)` on chromosome
//! C?" queries against large, sorted, BED-style annotation tracks
//! without loading them into memory. The first open of a track prepares
//! it (BGZF compression, a tabix-style binning index, a schema check)
//! and every later open reuses those artifacts.
//!
//! ## Key Features
//!
//! - **Prepare once, query forever**: preparation is idempotent and
//!   artifacts live next to the source file
//! - **Naming tolerant**: `"1"` and `"chr1"` both resolve, whichever
//!   convention the file uses
//! - **Ordered results**: annotations come back in genome order, clipped
//!   to the query window on request
//! - **Constant memory**: block-level random access decompresses only
//!   what a query touches
//!
//! ## Quick Start
//!
//! ```no_run
//! use annotrack::AnnotationSet;
//!
//! # fn main() -> annotrack::Result<()> {
//! // Prepares genes.bed (writes genes.bed.gz + genes.bed.gz.tbi)
//! let mut genes = AnnotationSet::new("genes.bed")?;
//!
//! // Overlap query, clipped to the window
//! for anno in genes.get_annotations("chr1", 1_000_000, 2_000_000, true)? {
//!     println!("{}\t{}:{}-{}\t{}", anno.name, anno.chrom, anno.start, anno.end, anno.strand);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`annotations`]: preparation, naming detection, and the query API
//! - [`formats`]: BED records and the tabix-style index
//! - [`io`]: BGZF block codec and the indexed-store handle
//! - [`diag`]: injectable progress reporting for preparation
//! - [`error`]: crate error type

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod annotations;
pub mod diag;
pub mod error;
pub mod formats;
pub mod io;

// Re-export commonly used types
pub use annotations::{detect_chrom_prefix, ensure_indexed, AnnotationSet};
pub use diag::{DiagnosticsSink, LogSink, NoopSink};
pub use error::{AnnotrackError, Result};
pub use formats::bed::{Annotation, Strand, ThickSegment};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
