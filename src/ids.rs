//! Unguessable identifiers for sessions and share tokens.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;

pub const SESSION_ID_BYTES: usize = 24;
pub const TOKEN_ID_BYTES: usize = 16;

/// Returns `bytes` bytes of OS randomness, base64url encoded without padding.
pub fn random_id(bytes: usize) -> String {
    let mut raw = vec![0u8; bytes];
    OsRng.fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_url_safe_and_sized() {
        let id = random_id(SESSION_ID_BYTES);
        assert_eq!(id.len(), 32);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(id, random_id(SESSION_ID_BYTES));
    }
}
