//! Packed nucleotide keys and the payload records of the two cache multimaps.
//!
//! Bases use the 2-bit code A=0, C=1, G=2, T=3; code 4 (N) is ambiguous.

use std::cmp::Ordering;
use std::fmt;

/// Longest substring that fits in a packed key.
pub const MAX_KEY_LEN: usize = 32;

/// Length value marking a key that could not be packed.
const UNCACHEABLE: u32 = 0xffff_ffff;

/// Sentinel marking an invalid QVal / SAVal.
pub const INVALID: u32 = 0xffff_ffff;

/// Map an ASCII base to its 2-bit code; anything but ACGT becomes 4.
#[inline]
pub fn nt4(base: u8) -> u8 {
    match base {
        b'A' | b'a' => 0,
        b'C' | b'c' => 1,
        b'G' | b'g' => 2,
        b'T' | b't' => 3,
        _ => 4,
    }
}

/// Encode an ASCII sequence into 2-bit codes.
pub fn encode_ascii(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| nt4(b)).collect()
}

/// Reverse complement of a 2-bit coded sequence (ambiguous stays ambiguous).
pub fn reverse_complement(codes: &[u8]) -> Vec<u8> {
    codes
        .iter()
        .rev()
        .map(|&c| if c < 4 { 3 - c } else { 4 })
        .collect()
}

/// Read substring packed 2 bits per base, rightmost base in the least
/// significant pair.
///
/// Because there is no terminator bit, "A" and "AA" share the packed value 0;
/// equality and ordering always include the length.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QKey {
    seq: u64,
    len: u32,
}

/// Reference substring key; same layout as [`QKey`].
pub type SAKey = QKey;

impl QKey {
    /// Key built from 2-bit codes; check [`cacheable`](Self::cacheable).
    pub fn new(codes: &[u8]) -> Self {
        let mut k = Self::default();
        k.init(codes);
        k
    }

    pub fn from_ascii(seq: &[u8]) -> Self {
        Self::new(&encode_ascii(seq))
    }

    /// Key from an already packed value. `len` must be at most 32; bits above
    /// the last base are dropped.
    pub fn from_packed(seq: u64, len: u32) -> Self {
        assert!(len as usize <= MAX_KEY_LEN);
        let mask = 1u64.checked_shl(2 * len).map_or(u64::MAX, |b| b - 1);
        Self {
            seq: seq & mask,
            len,
        }
    }

    /// Pack `codes`. Returns false, leaving the key uncacheable, if the
    /// substring is longer than 32 bases or holds an ambiguous base.
    pub fn init(&mut self, codes: &[u8]) -> bool {
        self.seq = 0;
        if codes.len() > MAX_KEY_LEN {
            self.len = UNCACHEABLE;
            return false;
        }
        for &c in codes {
            if c > 3 {
                self.len = UNCACHEABLE;
                return false;
            }
            self.seq = (self.seq << 2) | c as u64;
        }
        self.len = codes.len() as u32;
        true
    }

    #[inline]
    pub fn cacheable(&self) -> bool {
        self.len != UNCACHEABLE
    }

    #[inline]
    pub fn packed(&self) -> u64 {
        self.seq
    }

    /// Number of bases, or `None` for an uncacheable key.
    #[inline]
    pub fn len(&self) -> Option<usize> {
        self.cacheable().then_some(self.len as usize)
    }

    pub fn reset(&mut self) {
        self.seq = 0;
        self.len = UNCACHEABLE;
    }

    /// Unpack into 2-bit codes. Empty for an uncacheable key.
    pub fn to_codes(&self) -> Vec<u8> {
        let Some(len) = self.len() else {
            return Vec::new();
        };
        let mut out = vec![0u8; len];
        let mut sq = self.seq;
        for c in out.iter_mut().rev() {
            *c = (sq & 3) as u8;
            sq >>= 2;
        }
        out
    }
}

impl Default for QKey {
    /// An uncacheable key.
    fn default() -> Self {
        Self {
            seq: 0,
            len: UNCACHEABLE,
        }
    }
}

impl Ord for QKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.len.cmp(&other.len))
    }
}

impl PartialOrd for QKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for QKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.cacheable() {
            return f.write_str("<uncacheable>");
        }
        for c in self.to_codes() {
            write!(f, "{}", b"ACGT"[c as usize] as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for QKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QKey({})", self)
    }
}

/// Payload of the seed multimap: a range `[offset, offset + num_ranges)` of
/// the reference-substring list, plus the total element count of those ranges.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct QVal {
    i: u32,
    rangen: u32,
    eltn: u32,
}

impl QVal {
    pub fn new(offset: u32, ranges: u32, elts: u32) -> Self {
        Self {
            i: offset,
            rangen: ranges,
            eltn: elts,
        }
    }

    /// Index of the first reference substring in the list.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.i
    }

    #[inline]
    pub fn num_ranges(&self) -> u32 {
        debug_assert!(self.valid());
        self.rangen
    }

    #[inline]
    pub fn num_elts(&self) -> u32 {
        debug_assert!(self.valid());
        self.eltn
    }

    /// True iff no reference substring is associated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_ranges() == 0
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.rangen != INVALID
    }

    pub fn reset(&mut self) {
        self.i = 0;
        self.rangen = INVALID;
        self.eltn = INVALID;
    }

    pub fn init(&mut self, offset: u32, ranges: u32, elts: u32) {
        self.i = offset;
        self.rangen = ranges;
        self.eltn = elts;
    }

    /// Tally one more range holding `num_elts` elements.
    pub fn add_range(&mut self, num_elts: u32) {
        debug_assert!(self.valid());
        self.rangen += 1;
        self.eltn += num_elts;
    }
}

impl Default for QVal {
    /// An invalid QVal.
    fn default() -> Self {
        Self {
            i: 0,
            rangen: INVALID,
            eltn: INVALID,
        }
    }
}

/// Payload of the suffix-array multimap: BWT `top` and the element range
/// `[i, i + len)` holding materialized reference offsets.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SAVal {
    pub top: u32,
    pub i: u32,
    pub len: u32,
}

impl SAVal {
    pub fn new(top: u32, i: u32, len: u32) -> Self {
        Self { top, i, len }
    }

    #[inline]
    pub fn valid(&self) -> bool {
        self.len != INVALID
    }
}

impl Default for SAVal {
    fn default() -> Self {
        Self {
            top: 0,
            i: 0,
            len: INVALID,
        }
    }
}
