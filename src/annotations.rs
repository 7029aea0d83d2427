//! Annotation sets: preparation, naming detection, and region queries.
//!
//! An [`AnnotationSet`] wraps one sorted annotation track and answers
//! "which annotations overlap `[start, end)` on chromosome C?" without
//! loading the file into memory. Three cooperating pieces make that
//! correct:
//!
//! 1. **Preparation** ([`ensure_indexed`]): guarantees a BGZF-compressed,
//!    indexed, schema-checked artifact exists before any query runs.
//!    Idempotent; existing artifacts are never rebuilt.
//! 2. **Naming detection** ([`detect_chrom_prefix`]): samples the leading
//!    records to learn whether the file writes chromosomes as `chr1` or
//!    `1`, so callers can use either convention.
//! 3. **The query** ([`AnnotationSet::get_annotations`]): normalizes the
//!    caller's chromosome name, fetches overlapping raw records through
//!    the index, parses them into typed [`Annotation`]s, and optionally
//!    clips them to the query window.
//!
//! # Concurrency
//!
//! Everything here is synchronous, blocking I/O. The store handle seeks
//! a shared reader, so one `AnnotationSet` must not be queried from
//! multiple threads without external locking. Preparation uses a
//! check-then-build pattern: running it concurrently for the same path
//! from several processes can corrupt the artifacts, so callers must
//! serialize preparation per path.

use crate::diag::{DiagnosticsSink, NoopSink};
use crate::error::{AnnotrackError, Result};
use crate::formats::bed::Annotation;
use crate::io::store::{path_with_suffix, IndexedBed};
use std::path::{Path, PathBuf};

/// Number of leading data records sampled by naming detection.
const NAMING_SAMPLE_SIZE: usize = 11;

/// Fraction of sampled records that must carry the `chr` prefix before
/// the whole file is treated as prefixed. Strictly greater-than.
const NAMING_PREFIX_THRESHOLD: f64 = 0.8;

/// Prepare an annotation track for random access.
///
/// Starting from a sorted, tab-delimited file:
///
/// 1. If `path` does not already end in `.gz`, BGZF-compress it to a
///    `.gz` sibling (skipped when the sibling exists).
/// 2. If the `.tbi` sidecar is missing, build it.
/// 3. Validate the schema: the first data record must carry at least
///    six tab-delimited fields (chrom, start, end, name, score,
///    strand; score is unused).
///
/// Returns the prepared (compressed, indexed) path. Progress messages
/// for the slow steps go to `diagnostics`.
///
/// # Errors
///
/// [`AnnotrackError::IndexBuild`] when compression or index
/// construction fails or leaves no artifact (unsorted input, unwritable
/// directory); [`AnnotrackError::Schema`] when the first data record
/// has fewer than six fields or the file has no data records at all.
pub fn ensure_indexed<P: AsRef<Path>>(
    path: P,
    diagnostics: &dyn DiagnosticsSink,
) -> Result<PathBuf> {
    let path = path.as_ref();

    let prepared = if path.extension().map_or(false, |ext| ext == "gz") {
        path.to_path_buf()
    } else {
        let compressed = path_with_suffix(path, ".gz");
        if !compressed.exists() {
            diagnostics.info(&format!("bgzf compressing {}", path.display()));
            IndexedBed::compress(path, &compressed).map_err(|e| AnnotrackError::IndexBuild {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            if !compressed.exists() {
                return Err(AnnotrackError::IndexBuild {
                    path: path.display().to_string(),
                    reason: "compressed file was not created; make sure the track is \
                             sorted and the directory is writeable"
                        .to_string(),
                });
            }
        }
        compressed
    };

    let sidecar = path_with_suffix(&prepared, ".tbi");
    if !sidecar.exists() {
        diagnostics.info(&format!("creating index for {}", prepared.display()));
        IndexedBed::build_index(&prepared)?;
        if !sidecar.exists() {
            return Err(AnnotrackError::IndexBuild {
                path: prepared.display().to_string(),
                reason: "index file was not created; make sure the track is sorted \
                         and the directory is writeable"
                    .to_string(),
            });
        }
    }

    validate_schema(&prepared)?;
    Ok(prepared)
}

/// Check the first data record of a prepared track for the six required
/// columns.
fn validate_schema(prepared: &Path) -> Result<()> {
    let mut store = IndexedBed::open(prepared)?;
    for line in store.lines()? {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        if line.split('\t').count() < 6 {
            return Err(AnnotrackError::Schema {
                msg: "annotation tracks need at least 6 tab-delimited fields \
                      (chrom, start, end, name, score, strand; score is unused)"
                    .to_string(),
            });
        }
        return Ok(());
    }
    Err(AnnotrackError::Schema {
        msg: "annotation track has no data records".to_string(),
    })
}

/// Infer whether a track's chromosome names carry the `chr` prefix.
///
/// Samples up to 11 leading data records (comments skipped) and counts
/// how many start with `chr`. The file counts as prefixed when the
/// fraction exceeds 0.8. A file yielding no records is treated as
/// unprefixed rather than dividing by zero.
pub fn detect_chrom_prefix(store: &mut IndexedBed) -> Result<bool> {
    let mut examined = 0usize;
    let mut prefixed = 0usize;
    for line in store.lines()? {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        if line.starts_with("chr") {
            prefixed += 1;
        }
        examined += 1;
        if examined == NAMING_SAMPLE_SIZE {
            break;
        }
    }

    if examined == 0 {
        return Ok(false);
    }
    Ok(prefixed as f64 / examined as f64 > NAMING_PREFIX_THRESHOLD)
}

/// Translate a caller's chromosome name into the file's convention.
fn normalize_chrom(chrom: &str, uses_chr_prefix: bool) -> String {
    if uses_chr_prefix && !chrom.starts_with("chr") {
        format!("chr{}", chrom)
    } else if !uses_chr_prefix && chrom.starts_with("chr") {
        // Removes every occurrence of "chr", not just the leading one,
        // matching the normalizer this replaces. A contig with "chr"
        // elsewhere in its name is altered too and will simply miss.
        chrom.replace("chr", "")
    } else {
        chrom.to_string()
    }
}

/// A prepared annotation track plus everything needed to query it.
///
/// Construction prepares the file (compress, index, schema check) and
/// detects its chromosome-naming convention; both are fixed for the
/// lifetime of the set. The underlying store handle is created on first
/// use and cached.
#[derive(Debug)]
pub struct AnnotationSet {
    /// Prepared (compressed, indexed) path
    path: PathBuf,
    /// Store handle, created lazily
    store: Option<IndexedBed>,
    /// Whether the file's chromosome names start with "chr"
    uses_chr_prefix: bool,
}

impl AnnotationSet {
    /// Open an annotation track, preparing it if needed. Diagnostics are
    /// discarded; use [`AnnotationSet::with_diagnostics`] to see them.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_diagnostics(path, &NoopSink)
    }

    /// Open an annotation track, reporting preparation progress to
    /// `diagnostics`.
    pub fn with_diagnostics<P: AsRef<Path>>(
        path: P,
        diagnostics: &dyn DiagnosticsSink,
    ) -> Result<Self> {
        let prepared = ensure_indexed(path, diagnostics)?;
        let mut set = AnnotationSet {
            path: prepared,
            store: None,
            uses_chr_prefix: false,
        };
        set.uses_chr_prefix = detect_chrom_prefix(set.store()?)?;
        Ok(set)
    }

    /// The prepared path this set reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file's chromosome names carry the `chr` prefix.
    pub fn uses_chr_prefix(&self) -> bool {
        self.uses_chr_prefix
    }

    /// The cached store handle, created on first use.
    fn store(&mut self) -> Result<&mut IndexedBed> {
        if self.store.is_none() {
            self.store = Some(IndexedBed::open(&self.path)?);
        }
        Ok(self.store.as_mut().expect("handle initialized above"))
    }

    /// Annotations overlapping `[start, end)` on `chrom`, in genome order.
    ///
    /// The chromosome name is translated to the file's naming convention
    /// first, so `"1"` and `"chr1"` both work regardless of how the file
    /// spells it. A chromosome the file does not contain yields an empty
    /// result, not an error, as does a degenerate window
    /// (`start >= end`).
    ///
    /// With `clip` set, each returned annotation's coordinates are
    /// truncated to the query window.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use annotrack::AnnotationSet;
    ///
    /// # fn main() -> annotrack::Result<()> {
    /// let mut genes = AnnotationSet::new("genes.bed")?;
    /// for anno in genes.get_annotations("chr1", 120, 180, false)? {
    ///     println!("{} {}:{}-{}", anno.name, anno.chrom, anno.start, anno.end);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn get_annotations(
        &mut self,
        chrom: &str,
        start: u64,
        end: u64,
        clip: bool,
    ) -> Result<Vec<Annotation>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let contig = normalize_chrom(chrom, self.uses_chr_prefix);
        let store = self.store()?;
        if !store.has_contig(&contig) {
            return Ok(Vec::new());
        }

        let mut annotations = Vec::new();
        for line in store.fetch(&contig, start, end)? {
            let mut annotation = Annotation::from_line(&line)?;
            if clip {
                annotation.clip_to(start, end);
            }
            annotations.push(annotation);
        }
        Ok(annotations)
    }
}
