//! Operational pattern classification (spec §4.6 "Operational pattern
//! classification").

use aaf_core::ids::Auid;

const PREFIXES: [[u8; 12]; 3] = [
    [0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0d, 0x01, 0x02, 0x01],
    [0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x02, 0x0d, 0x01, 0x02, 0x01],
    [0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x03, 0x0d, 0x01, 0x02, 0x01],
];

/// Classifies an operational pattern AUID as `OP<n><letter>`, `OPAtom`, or
/// `None` if the prefix doesn't match any registered SMPTE variant or the
/// complexity byte falls outside both the numbered and atom ranges.
pub fn classify_operational_pattern(auid: &Auid) -> Option<String> {
    let bytes = auid.as_be_bytes();
    if !PREFIXES.iter().any(|prefix| bytes[..12] == *prefix) {
        return None;
    }

    let complexity = bytes[12];
    let package_complexity = bytes[13];

    if (1..=3).contains(&complexity) {
        let letter = match package_complexity {
            1 => 'a',
            2 => 'b',
            3 => 'c',
            _ => return None,
        };
        return Some(format!("OP{complexity}{letter}"));
    }

    if complexity == 0x10 {
        return Some("OPAtom".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op_auid(complexity: u8, package_complexity: u8) -> Auid {
        let mut full = [0u8; 16];
        full[..12].copy_from_slice(&PREFIXES[0]);
        full[12] = complexity;
        full[13] = package_complexity;
        Auid::from_be_bytes(full)
    }

    #[test]
    fn classifies_op1a() {
        assert_eq!(classify_operational_pattern(&op_auid(1, 1)), Some("OP1a".to_string()));
    }

    #[test]
    fn classifies_op2b() {
        assert_eq!(classify_operational_pattern(&op_auid(2, 2)), Some("OP2b".to_string()));
    }

    #[test]
    fn classifies_opatom() {
        assert_eq!(classify_operational_pattern(&op_auid(0x10, 0)), Some("OPAtom".to_string()));
    }

    #[test]
    fn unrecognized_prefix_byte_is_unclassified() {
        let mut full = [0u8; 16];
        full[..12].copy_from_slice(&PREFIXES[0]);
        full[7] = 0x04;
        assert_eq!(classify_operational_pattern(&Auid::from_be_bytes(full)), None);
    }

    #[test]
    fn complexity_in_reserved_range_is_unclassified() {
        assert_eq!(classify_operational_pattern(&op_auid(0x20, 0)), None);
    }

    #[test]
    fn all_three_prefix_variants_accept() {
        for (i, prefix) in PREFIXES.iter().enumerate() {
            let mut full = [0u8; 16];
            full[..12].copy_from_slice(prefix);
            full[12] = 1;
            full[13] = 1;
            assert!(
                classify_operational_pattern(&Auid::from_be_bytes(full)).is_some(),
                "prefix variant {i} should classify"
            );
        }
    }
}
