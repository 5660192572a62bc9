use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_ENGINE;
use base64::Engine as _;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

const TOKEN_BYTES: usize = 32;

/// Freshly minted instance identifier: 128 random bits, canonical
/// hyphenated form.
pub fn mint_id() -> String {
    Uuid::new_v4().to_string()
}

/// Freshly minted instance token: 256 bits from the thread-local CSPRNG,
/// URL-safe base64 without padding.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64_ENGINE.encode(bytes)
}

/// Constant-time comparison for credentials.
#[inline]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Holds the process-wide registration secret and the id→token bindings.
///
/// Tokens never leave this vault except through `register`'s return value.
/// They are not stored on instance records and must not be logged.
pub struct CredentialVault {
    registration_key: String,
    tokens: RwLock<HashMap<String, String>>,
}

impl CredentialVault {
    pub fn new(registration_key: impl Into<String>) -> Self {
        Self {
            registration_key: registration_key.into(),
            tokens: RwLock::new(HashMap::new()),
        }
    }

    pub fn verify_registration_key(&self, presented: &str) -> bool {
        constant_time_eq(self.registration_key.as_bytes(), presented.as_bytes())
    }

    pub fn bind(&self, id: &str, token: &str) {
        let mut guard = self.tokens.write().expect("credential vault lock poisoned");
        guard.insert(id.to_string(), token.to_string());
    }

    pub fn revoke(&self, id: &str) {
        let mut guard = self.tokens.write().expect("credential vault lock poisoned");
        guard.remove(id);
    }

    pub fn clear(&self) {
        let mut guard = self.tokens.write().expect("credential vault lock poisoned");
        guard.clear();
    }

    /// True iff a token is bound to `id` and matches, constant-time.
    pub fn validate(&self, id: &str, presented: &str) -> bool {
        let guard = self.tokens.read().expect("credential vault lock poisoned");
        match guard.get(id) {
            Some(token) => constant_time_eq(token.as_bytes(), presented.as_bytes()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_are_distinct_and_long_enough() {
        let a = mint_token();
        let b = mint_token();
        assert_ne!(a, b);
        // 32 bytes of entropy encode to 43 base64 characters.
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn vault_binds_and_revokes() {
        let vault = CredentialVault::new("abc123");
        assert!(vault.verify_registration_key("abc123"));
        assert!(!vault.verify_registration_key("abc12"));

        vault.bind("id-1", "token-1");
        assert!(vault.validate("id-1", "token-1"));
        assert!(!vault.validate("id-1", "token-2"));
        assert!(!vault.validate("id-2", "token-1"));

        vault.revoke("id-1");
        assert!(!vault.validate("id-1", "token-1"));
    }
}
