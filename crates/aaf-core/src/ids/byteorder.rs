//! Named conversions between the UUID-shaped byte forms this system touches.
//!
//! Design note (spec §9): "UUIDs appear in at least three forms: canonical
//! big-endian (AUIDs), little-endian (MobID `bytes_le`), and half-swapped
//! (MXF DataDef references). Centralize all three conversions in one module
//! with explicit, named functions; never accept a 'UUID' without declaring
//! the form." Every function here is named after the conversion it performs,
//! not just "to_bytes"/"from_bytes".

/// Reverses a 16-byte buffer end-to-end. Used for MobID's `bytes_le` form,
/// which this port defines as the whole-buffer reversal of the canonical
/// big-endian 16 (or, for the material UUID half of a MobID, 16-of-32) bytes.
pub fn reverse_bytes_16(input: [u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = input[15 - i];
    }
    out
}

/// Reverses a 32-byte buffer end-to-end (MobID `bytes_le()` / `from_bytes_le`).
pub fn reverse_bytes_32(input: [u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = input[31 - i];
    }
    out
}

/// Swaps the two 8-byte halves of a 16-byte AUID.
///
/// MXF stores data-definition references with their halves swapped relative
/// to the AUID's canonical big-endian form (`reverse_uuid` in the original
/// Python source: `new = data.hex[16:] + data.hex[:16]`). Applying this
/// function twice returns the original bytes.
pub fn half_swap_16(input: [u8; 16]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&input[8..]);
    out[8..].copy_from_slice(&input[..8]);
    out
}
