//! Cell keys.
//!
//! A cell is addressed by the identity of the segment instance that created
//! it plus a discriminator chosen by the data function, so one segment can
//! own several cells. Segment identity is a hash of the path pattern and the
//! resolved params, computed with SHA-256 so that the server build and the
//! client build agree on it.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::route::Params;

/// Stable identity of a matched segment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u64);

impl SegmentId {
    /// Derive the identity of `pattern` matched with `params`.
    ///
    /// Param order does not matter.
    pub fn derive(pattern: &str, params: &Params) -> Self {
        let mut pairs: Vec<(&str, &str)> = params.iter().collect();
        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(pattern.as_bytes());
        hasher.update([0x00]);
        for (name, value) in pairs {
            hasher.update(name.as_bytes());
            hasher.update([0x1f]);
            hasher.update(value.as_bytes());
            hasher.update([0x1e]);
        }
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        Self(u64::from_be_bytes(head))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    fn parse(hex: &str) -> Option<Self> {
        if hex.len() != 16 {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(Self)
    }
}

impl From<u64> for SegmentId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Address of a Resource Cell in the store and in snapshots.
///
/// The string form is `"<segment>:<discriminator>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellKey {
    segment: SegmentId,
    discriminator: Arc<str>,
}

impl CellKey {
    /// Key for the cell `discriminator` within `segment`.
    pub fn new(segment: SegmentId, discriminator: impl AsRef<str>) -> Self {
        Self {
            segment,
            discriminator: Arc::from(discriminator.as_ref()),
        }
    }

    /// Segment that owns the cell.
    pub fn segment(&self) -> SegmentId {
        self.segment
    }

    /// Name of the cell within its segment.
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    /// Parse the string form produced by `Display`.
    pub fn parse(key: &str) -> Option<Self> {
        let (segment, discriminator) = key.split_once(':')?;
        Some(Self::new(SegmentId::parse(segment)?, discriminator))
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.discriminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().copied().collect()
    }

    #[test]
    fn derive_is_deterministic() {
        let a = SegmentId::derive("[house]", &params(&[("house", "gryffindor")]));
        let b = SegmentId::derive("[house]", &params(&[("house", "gryffindor")]));
        assert_eq!(a, b);
    }

    #[test]
    fn derive_ignores_param_order() {
        let a = SegmentId::derive("[house]/[year]", &params(&[("house", "h"), ("year", "1")]));
        let b = SegmentId::derive("[house]/[year]", &params(&[("year", "1"), ("house", "h")]));
        assert_eq!(a, b);
    }

    #[test]
    fn derive_separates_pattern_and_params() {
        let gryffindor = SegmentId::derive("[house]", &params(&[("house", "gryffindor")]));
        let slytherin = SegmentId::derive("[house]", &params(&[("house", "slytherin")]));
        let other = SegmentId::derive("[house]/staff", &params(&[("house", "gryffindor")]));
        assert_ne!(gryffindor, slytherin);
        assert_ne!(gryffindor, other);

        // Separator bytes keep concatenations apart.
        let ab = SegmentId::derive("x", &params(&[("a", "bc")]));
        let abc = SegmentId::derive("x", &params(&[("ab", "c")]));
        assert_ne!(ab, abc);
    }

    #[test]
    fn key_string_form_parses_back() {
        let key = CellKey::new(SegmentId::from(0xdead_beef), "students:all");
        let text = key.to_string();
        assert_eq!(text, "00000000deadbeef:students:all");
        assert_eq!(CellKey::parse(&text), Some(key));
        assert_eq!(CellKey::parse("nothex:x"), None);
    }
}
