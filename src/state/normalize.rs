use sha1::{Digest, Sha1};

/// Combine the natural-language parts of an element into one whitespace
/// normalized string. Blank parts are skipped.
pub fn combined_text(parts: &[&str]) -> String {
    parts
        .iter()
        .flat_map(|p| p.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text used for identity: digits are dropped (counters, clocks, prices) unless
/// that would leave nothing but whitespace.
pub fn identity_text(text: &str) -> Option<String> {
    let normalized = combined_text(&[text]);
    if normalized.is_empty() {
        return None;
    }

    let without_digits = combined_text(&[&normalized
        .chars()
        .filter(|c| !c.is_ascii_digit())
        .collect::<String>()]);

    if without_digits.is_empty() {
        Some(normalized)
    } else {
        Some(without_digits)
    }
}

/// First 128 bits of the SHA-1 digest of `bytes`.
pub fn fingerprint_bytes(bytes: &[u8]) -> u128 {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let digest = hasher.finalize();

    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(head)
}

pub fn text_fingerprint(text: &str) -> u128 {
    fingerprint_bytes(text.trim().as_bytes())
}
