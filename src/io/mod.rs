//! I/O: BGZF block codec and the indexed-store handle.

pub mod bgzf;
pub mod store;

pub use bgzf::{BgzfReader, BgzfWriter, Chunk, VirtualOffset};
pub use store::IndexedBed;
