//! PKCE and request-binding secrets for the authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

/// Only `S256` is ever sent.
pub const CHALLENGE_METHOD: &str = "S256";

/// Per-login secrets: PKCE verifier/challenge plus `state` and `nonce`.
#[derive(Debug, Clone)]
pub struct PkceSecrets {
    /// Opaque value echoed back by the authority; keys the pending record.
    pub state: String,
    /// Bound into the ID token to tie it to this request.
    pub nonce: String,
    /// PKCE code verifier (64 URL-safe characters).
    pub code_verifier: String,
    /// `BASE64URL(SHA256(code_verifier))`.
    pub code_challenge: String,
}

impl PkceSecrets {
    /// Generate fresh secrets.
    pub fn generate() -> Self {
        let code_verifier = random_url_safe(48);
        let code_challenge = code_challenge(&code_verifier);
        Self {
            state: random_hex(16),
            nonce: random_hex(16),
            code_verifier,
            code_challenge,
        }
    }
}

/// Compute the S256 code challenge for a verifier.
pub fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    getrandom::getrandom(&mut bytes).expect("Failed to generate random bytes");
    bytes
}

fn random_url_safe(len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(len))
}

fn random_hex(len: usize) -> String {
    random_bytes(len).iter().map(|b| format!("{b:02x}")).collect()
}
