//! CSPRNG-backed slug and token generation.
//!
//! Slugs and token origins are drawn by rejection sampling over
//! `rand::rngs::OsRng` rather than a modulo reduction, which would bias the
//! low end of the alphabet. Client tokens are a bcrypt challenge/response
//! over the origin, ported onto the `bcrypt` crate the way `vaultrs-core::token`
//! reaches for `sha2`/`hex` for its own one-way token hash.

use rand::RngCore;

use crate::error::EngineError;

const SLUG_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

const SLUG_LEN: usize = 6;
const TOKEN_ORIGIN_LEN: usize = 32;

/// Draw a random string of `len` characters from `alphabet` using rejection
/// sampling against `rand::rngs::OsRng`, so every character is uniformly
/// distributed regardless of `alphabet.len()` not being a power of two.
fn secure_random_string(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rngs::OsRng;
    let bound = alphabet.len();
    let mut out = Vec::with_capacity(len);
    let mut buf = [0u8; 1];
    while out.len() < len {
        rng.fill_bytes(&mut buf);
        let idx = buf[0] as usize;
        // Reject draws that would bias the distribution toward the low end
        // of `alphabet` — accept only the largest multiple of `bound` that
        // fits in a byte.
        let limit = (256 / bound) * bound;
        if idx < limit {
            out.push(alphabet[idx % bound]);
        }
    }
    // SAFETY-free: both alphabets are ASCII, so this is always valid UTF-8.
    String::from_utf8(out).unwrap_or_default()
}

/// Draw a fresh 6-character lowercase-alphanumeric slug candidate.
#[must_use]
pub fn generate_slug() -> String {
    secure_random_string(SLUG_ALPHABET, SLUG_LEN)
}

/// Draw a fresh 32-character mixed-case-alphanumeric token origin. Stored
/// server-side; never handed to a client directly (see [`client_token`]).
#[must_use]
pub fn generate_token_origin() -> String {
    secure_random_string(TOKEN_ALPHABET, TOKEN_ORIGIN_LEN)
}

/// bcrypt's lowest valid work factor. The per-name challenge is a fixed-length
/// hash recomputed on every mutating call from a low-value, server-generated
/// secret, not a user password — the legitimate client resubmits its token on
/// every request, so there is nothing gained by paying a higher cost here.
const BCRYPT_MIN_COST: u32 = 4;

/// Derive the bearer credential handed to a client from a stored `origin`:
/// `base64(bcrypt(origin))`.
///
/// # Errors
///
/// Returns [`EngineError::Internal`] if bcrypt hashing fails.
pub fn client_token(origin: &str) -> Result<String, EngineError> {
    let hash = bcrypt::hash(origin, BCRYPT_MIN_COST)
        .map_err(|err| EngineError::Internal(err.to_string()))?;
    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        hash.as_bytes(),
    ))
}

/// Verify a client-presented bearer token against the stored `origin`.
///
/// Decodes the base64 token back to a bcrypt hash string and runs
/// `bcrypt::verify`, which itself compares in constant time.
#[must_use]
pub fn verify_token(origin: &str, presented: &str) -> bool {
    let Ok(hash_bytes) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, presented) else {
        return false;
    };
    let Ok(hash) = String::from_utf8(hash_bytes) else {
        return false;
    };
    bcrypt::verify(origin, &hash).unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn slug_has_expected_length_and_alphabet() {
        let slug = generate_slug();
        assert_eq!(slug.len(), SLUG_LEN);
        assert!(slug.bytes().all(|b| SLUG_ALPHABET.contains(&b)));
    }

    #[test]
    fn token_origin_has_expected_length_and_alphabet() {
        let origin = generate_token_origin();
        assert_eq!(origin.len(), TOKEN_ORIGIN_LEN);
        assert!(origin.bytes().all(|b| TOKEN_ALPHABET.contains(&b)));
    }

    #[test]
    fn client_token_round_trips() {
        let origin = generate_token_origin();
        let token = client_token(&origin).expect("hash should succeed");
        assert!(verify_token(&origin, &token));
        assert!(!verify_token("wrong-origin", &token));
    }
}
