use rand::rngs::OsRng;
use rand::RngCore;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generates a 16-character, base-32-over-80-random-bits session id from a
/// cryptographically secure source. Used as the server's `sessionId` when a
/// `welcome()` caller does not supply one (§6).
pub fn random_session_id() -> String {
    let mut bits = [0u8; 10]; // 80 bits
    OsRng.fill_bytes(&mut bits);
    base32_encode(&bits)
}

/// Plain 5-bits-per-character RFC4648 base32, no padding. `bits` must be a
/// multiple of 5 bits long in total (10 bytes -> 16 chars, as used above).
fn base32_encode(bits: &[u8]) -> String {
    let mut out = String::with_capacity(bits.len() * 8 / 5);
    let mut buffer: u32 = 0;
    let mut buffer_bits = 0u32;
    for &byte in bits {
        buffer = (buffer << 8) | u32::from(byte);
        buffer_bits += 8;
        while buffer_bits >= 5 {
            buffer_bits -= 5;
            let index = ((buffer >> buffer_bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }
    if buffer_bits > 0 {
        let index = ((buffer << (5 - buffer_bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[index] as char);
    }
    out
}

/// Millisecond-resolution wall clock stamp, used as the last component of a
/// `callId` (`sessionId ":" counter ":" epochMillis`, §3).
pub fn epoch_millis() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_id_is_sixteen_chars() {
        let id = random_session_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| BASE32_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn session_ids_are_not_constant() {
        assert_ne!(random_session_id(), random_session_id());
    }
}
