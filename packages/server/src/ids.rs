//! Legacy integer IDs mapped to UUID-shaped strings.
//!
//! Older integer-keyed business tables share one key type with the UUID
//! world via a deterministic, reversible hex-padding transform. Purely
//! cosmetic compatibility - two different integers never collide.

use uuid::Uuid;

/// Integers above 48 bits do not fit the padded node segment.
const MAX_LEGACY_ID: u64 = 0xFFFF_FFFF_FFFF;

/// Embed a legacy integer ID in the final 12 hex digits of a zeroed UUID.
pub fn uuid_from_legacy_id(id: u64) -> Option<Uuid> {
    if id > MAX_LEGACY_ID {
        return None;
    }
    let mut bytes = [0u8; 16];
    bytes[10..16].copy_from_slice(&id.to_be_bytes()[2..8]);
    Some(Uuid::from_bytes(bytes))
}

/// Recover the legacy integer from a padded UUID.
///
/// Returns `None` for UUIDs that were not produced by
/// [`uuid_from_legacy_id`] (any nonzero byte outside the node segment).
pub fn legacy_id_from_uuid(id: &Uuid) -> Option<u64> {
    let bytes = id.as_bytes();
    if bytes[..10].iter().any(|b| *b != 0) {
        return None;
    }
    let mut raw = [0u8; 8];
    raw[2..8].copy_from_slice(&bytes[10..16]);
    Some(u64::from_be_bytes(raw))
}
