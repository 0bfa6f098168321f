//! Reversible byte-shift transform for stored files
//!
//! Layout: `OBFS|m0-m1-...-m31|<payload>` where every payload byte is shifted
//! up by `m[i % 32]` (wrapping). A fresh random mask is drawn per write. This
//! keeps casual users from hand-editing files; it is not encryption.

use rand::Rng;

/// Prefix that marks a transformed file.
pub const MARKER: &[u8] = b"OBFS|";

/// Number of entries in a shift mask.
pub const MASK_LEN: usize = 32;

/// Whether `bytes` carry the transform marker.
pub fn is_obfuscated(bytes: &[u8]) -> bool {
    bytes.starts_with(MARKER)
}

/// Apply the transform with a random mask.
pub fn obfuscate(plain: &[u8]) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let mut mask = [0u8; MASK_LEN];
    rng.fill(&mut mask[..]);
    obfuscate_with_mask(plain, &mask)
}

fn obfuscate_with_mask(plain: &[u8], mask: &[u8; MASK_LEN]) -> Vec<u8> {
    let header = mask.iter().map(u8::to_string).collect::<Vec<_>>().join("-");

    let mut out = Vec::with_capacity(MARKER.len() + header.len() + 1 + plain.len());
    out.extend_from_slice(MARKER);
    out.extend_from_slice(header.as_bytes());
    out.push(b'|');
    out.extend(plain.iter().enumerate().map(|(i, b)| b.wrapping_add(mask[i % MASK_LEN])));
    out
}

/// Undo the transform. Returns a description of the problem when the header
/// is malformed.
pub fn unobfuscate(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let rest = bytes
        .strip_prefix(MARKER)
        .ok_or_else(|| "missing OBFS marker".to_string())?;
    let header_end = rest
        .iter()
        .position(|&b| b == b'|')
        .ok_or_else(|| "unterminated shift mask".to_string())?;

    let header = std::str::from_utf8(&rest[..header_end])
        .map_err(|_| "shift mask is not text".to_string())?;
    let mut mask = [0u8; MASK_LEN];
    let mut count = 0;
    for part in header.split('-') {
        if count == MASK_LEN {
            return Err(format!("shift mask has more than {} entries", MASK_LEN));
        }
        mask[count] = part
            .parse::<u8>()
            .map_err(|_| format!("bad shift mask entry \"{}\"", part))?;
        count += 1;
    }
    if count != MASK_LEN {
        return Err(format!("shift mask has {} entries, expected {}", count, MASK_LEN));
    }

    let payload = &rest[header_end + 1..];
    Ok(payload
        .iter()
        .enumerate()
        .map(|(i, b)| b.wrapping_sub(mask[i % MASK_LEN]))
        .collect())
}
