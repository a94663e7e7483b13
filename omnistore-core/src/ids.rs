//! Time-ordered UUIDv7 identifiers.
//!
//! Layout: 48-bit unix-millisecond timestamp, 4-bit version (`0111`), 12
//! random bits, 2-bit variant (`10`), 62 random bits, rendered in canonical
//! hyphenated form. Ids generated in consecutive milliseconds sort
//! lexicographically by time.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generate a UUIDv7 string.
pub fn uuid7() -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    let mut rng = rand::thread_rng();
    let version_and_random: u16 = 0x7000 | rng.gen_range(0..0x1000);
    let variant_and_random: u8 = 0x80 | rng.gen_range(0..0x40);
    let clock_seq_low: u8 = rng.gen();
    let node: u64 = rng.gen_range(0..(1u64 << 48));

    let timestamp_hex = format!("{:012x}", timestamp_ms & 0xFFFF_FFFF_FFFF);
    format!(
        "{}-{}-{:04x}-{:02x}{:02x}-{:012x}",
        &timestamp_hex[..8],
        &timestamp_hex[8..12],
        version_and_random,
        variant_and_random,
        clock_seq_low,
        node,
    )
}

/// Generate a prefixed UUIDv7 of the form `{tag}_{uuid}`.
pub fn uuid7_prefixed(tag: &str) -> String {
    format!("{tag}_{}", uuid7())
}

/// Strip an optional `{tag}_` prefix.
fn strip_prefix(value: &str) -> &str {
    match value.split_once('_') {
        Some((_, rest)) => rest,
        None => value,
    }
}

/// Check whether a string (optionally prefixed) is a valid UUIDv7.
pub fn is_uuid7(value: &str) -> bool {
    match uuid::Uuid::parse_str(strip_prefix(value)) {
        Ok(parsed) => parsed.get_version_num() == 7,
        Err(_) => false,
    }
}

/// Extract the embedded unix-millisecond timestamp from a UUIDv7.
///
/// Returns `None` when the value does not parse as a UUID.
pub fn extract_timestamp_ms(value: &str) -> Option<u64> {
    let parsed = uuid::Uuid::parse_str(strip_prefix(value)).ok()?;
    Some(((parsed.as_u128() >> 80) & 0xFFFF_FFFF_FFFF) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    #[test]
    fn generates_valid_v7() {
        let id = uuid7();
        assert!(is_uuid7(&id), "not a v7 uuid: {id}");
        assert_eq!(id.len(), 36);
    }

    #[test]
    fn timestamp_is_close_to_wall_clock() {
        let before = now_ms();
        let id = uuid7();
        let after = now_ms();
        let embedded = extract_timestamp_ms(&id).unwrap();
        assert!(embedded >= before && embedded <= after + 1000);
    }

    #[test]
    fn ids_in_later_millis_sort_after() {
        let a = uuid7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = uuid7();
        assert!(a < b, "expected {a} < {b}");
    }

    #[test]
    fn prefix_is_stripped_for_validation() {
        let id = uuid7_prefixed("event");
        assert!(id.starts_with("event_"));
        assert!(is_uuid7(&id));
        assert!(extract_timestamp_ms(&id).is_some());
    }

    #[test]
    fn rejects_non_v7() {
        assert!(!is_uuid7("b54adc00-67f9-11d9-9669-0800200c9a66"));
        assert!(!is_uuid7("not-a-uuid"));
        assert!(extract_timestamp_ms("not-a-uuid").is_none());
    }
}
