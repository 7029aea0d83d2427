//! Annotation file formats and indexes.
//!
//! - [`bed`]: BED-style tab-delimited annotation records
//! - [`index`]: tabix-style binning index over BGZF-compressed tracks

pub mod bed;
pub mod index;

pub use bed::{Annotation, Strand, ThickSegment};
pub use index::{TbiBuilder, TbiIndex};
