use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

/// The size of the OAuth state value in bytes.
const STATE_SIZE: usize = 32;

/// Generates a new random OAuth `state` value.
///
/// # Returns
///
/// A URL-safe base64-encoded state value.
pub fn generate_state() -> String {
    let mut state = [0u8; STATE_SIZE];
    OsRng.fill_bytes(&mut state);

    general_purpose::URL_SAFE_NO_PAD.encode(state)
}

/// Compares two state values in constant time.
pub fn state_matches(expected: &str, received: &str) -> bool {
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_unique_and_url_safe() {
        let a = generate_state();
        let b = generate_state();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn matching_is_exact() {
        assert!(state_matches("abc", "abc"));
        assert!(!state_matches("abc", "abd"));
        assert!(!state_matches("abc", "abcd"));
    }
}
