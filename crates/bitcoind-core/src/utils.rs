//! Small helpers shared by engine adapters.

/// Reverse the byte order of a hex string (internal ↔ display order).
///
/// Works on 2-character groups; a trailing odd nibble is kept as its own group.
pub fn rev_hex(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    for chunk in bytes.chunks(2).rev() {
        // chunks of an ASCII hex string are always valid UTF-8
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rev_hex_swaps_bytes() {
        assert_eq!(rev_hex("0011aabb"), "bbaa1100");
        assert_eq!(rev_hex(""), "");
    }

    #[test]
    fn rev_hex_is_an_involution() {
        let hash = "6fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000";
        assert_eq!(rev_hex(&rev_hex(hash)), hash);
        assert!(rev_hex(hash).starts_with("000000000019d6"));
    }
}
