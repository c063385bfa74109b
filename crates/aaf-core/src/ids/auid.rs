use std::fmt;

use crate::errors::{AafError, Result};
use crate::random::RandomSource;

/// A 16-byte class/type/instance identifier, stored in canonical big-endian
/// order — the same byte order its UUID string form prints in. See
/// `crate::ids::byteorder` for the other two forms this system touches
/// (MobID little-endian, MXF half-swapped DataDef references); an `Auid`
/// is never implicitly one of those.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Auid(pub [u8; 16]);

impl Auid {
    pub const fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Auid(bytes)
    }

    pub fn as_be_bytes(&self) -> [u8; 16] {
        self.0
    }

    /// Parses a canonical UUID string (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`).
    pub fn parse_canonical(s: &str) -> Result<Self> {
        let uuid = uuid::Uuid::parse_str(s)
            .map_err(|e| AafError::bad_format(format!("invalid AUID '{s}': {e}")))?;
        Ok(Auid(*uuid.as_bytes()))
    }

    /// Renders as a canonical UUID string, per spec §6 "AUIDs render as UUID
    /// canonical form".
    pub fn to_canonical_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).hyphenated().to_string()
    }

    /// Generates a fresh random instance identifier via the injected random
    /// source (spec §6 `fill_random` collaborator).
    pub fn new_instance(rng: &mut dyn RandomSource) -> Self {
        let mut bytes = [0u8; 16];
        rng.fill_random(&mut bytes);
        // RFC4122 version/variant bits, matching uuid::Uuid::new_v4 layout,
        // so instance ids also parse as valid v4 UUIDs.
        bytes[6] = (bytes[6] & 0x0f) | 0x40;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Auid(bytes)
    }
}

impl fmt::Display for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl fmt::Debug for Auid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Auid({})", self.to_canonical_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_round_trip() {
        let s = "0d010101-0101-1a00-060e-2b3402060101";
        let auid = Auid::parse_canonical(s).unwrap();
        assert_eq!(auid.to_canonical_string(), s);
    }

    #[test]
    fn equality_and_hash_are_byte_based() {
        let a = Auid::from_be_bytes([1; 16]);
        let b = Auid::from_be_bytes([1; 16]);
        let c = Auid::from_be_bytes([2; 16]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
