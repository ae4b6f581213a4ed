//! Reference index collaborator: turns a seed into a suffix-array range and a
//! suffix-array row into a reference offset.

pub mod suffix_array;

pub use suffix_array::SuffixArrayIndex;

/// Read-only index shared by every worker.
pub trait SeedIndex: Sync {
    /// Half-open suffix-array range `[top, bot)` of the rows whose suffixes
    /// start with `codes` (2-bit codes), or `None` if there is no occurrence
    /// or `codes` holds an ambiguous base.
    fn sa_range(&self, codes: &[u8]) -> Option<(u32, u32)>;

    /// Reference offset of suffix-array row `row`.
    fn sa_offset(&self, row: u32) -> u32;
}
