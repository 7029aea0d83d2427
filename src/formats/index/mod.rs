//! Index structures for random access into annotation files.

pub mod tbi;

pub use tbi::{TbiBuilder, TbiIndex, MAX_POSITION};
