//! Key to hash-slot mapping for Redis Cluster.
//!
//! A key's slot is `CRC16-XMODEM(tag) mod 16384`, where `tag` is the key's
//! hash tag if it has one, otherwise the whole key.

/// Slots in a Redis Cluster keyspace.
pub const SLOT_COUNT: u16 = 16384;

/// Lookup table for polynomial 0x1021, built at compile time.
static TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut n = 0;
    while n < 256 {
        let mut crc = (n as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[n] = crc;
        n += 1;
    }
    table
}

/// CRC16-XMODEM of `data`.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc << 8) ^ TABLE[((crc >> 8) as u8 ^ b) as usize]
    })
}

/// The part of `key` that decides its slot.
///
/// Text between the first `{` and the next `}` counts only when non-empty.
pub fn extract_hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = memchr::memchr(b'{', key) else {
        return key;
    };
    let rest = &key[open + 1..];
    match memchr::memchr(b'}', rest) {
        Some(close) if close > 0 => &rest[..close],
        _ => key,
    }
}

/// Cluster slot owning `key`.
pub fn hash_slot(key: &[u8]) -> u16 {
    crc16(extract_hash_tag(key)) % SLOT_COUNT
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value() {
        assert_eq!(crc16(b""), 0);
        assert_eq!(crc16(b"123456789"), 0x31C3);
    }

    #[test]
    fn known_slots() {
        // Values checked against `CLUSTER KEYSLOT`.
        assert_eq!(hash_slot(b"foo"), 12182);
        assert_eq!(hash_slot(b"bar"), 5061);
        assert_eq!(hash_slot(b"123456789"), 12739);
    }

    #[test]
    fn tags() {
        assert_eq!(extract_hash_tag(b"{user:1000}.following"), b"user:1000");
        assert_eq!(extract_hash_tag(b"plain"), b"plain");
        assert_eq!(extract_hash_tag(b"{}empty"), b"{}empty");
        assert_eq!(extract_hash_tag(b"{open"), b"{open");
        assert_eq!(extract_hash_tag(b"{a}{b}"), b"a");
        assert_eq!(extract_hash_tag(b"{{nested}}"), b"{nested");
        assert_eq!(extract_hash_tag(b"}x{tag}"), b"tag");
    }

    #[test]
    fn tagged_keys_share_a_slot() {
        assert_eq!(
            hash_slot(b"{session:42}:data"),
            hash_slot(b"{session:42}:meta")
        );
        assert_eq!(hash_slot(b"x{foo}y"), hash_slot(b"foo"));
    }

    #[test]
    fn slots_in_range() {
        for key in [&b""[..], b"a", b"key:12345", b"{}"] {
            assert!(hash_slot(key) < SLOT_COUNT);
        }
    }
}
