//! Access token expiry decoding.
//!
//! Access tokens are JWTs. Only the payload's `exp` claim is inspected; the
//! signature is the server's business. Anything that cannot be decoded is
//! reported as "unknown expiry" (0) rather than as an error, in which case the
//! token is never refreshed proactively and a 401 is the only refresh trigger.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::Utc;

/// Refresh the token if it expires within this many seconds.
///
/// This only needs to beat ordinary request latency. It does not account for
/// clock skew between client and server, so a client whose clock runs far
/// behind will still send expired tokens and rely on the 401 path.
pub const TOKEN_EXPIRATION_BUFFER_SECS: i64 = 5;

/// base64url, accepting payloads with or without trailing padding
const TOKEN_PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Returns the token's `exp` claim in seconds since the epoch, or 0 if the
/// token is empty, malformed, or carries no numeric `exp`.
pub fn expiry_of(token: &str) -> i64 {
    if token.is_empty() {
        return 0;
    }

    let Some(payload) = token.split('.').nth(1) else {
        return 0;
    };
    let Ok(bytes) = TOKEN_PAYLOAD_ENGINE.decode(payload) else {
        return 0;
    };
    let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        return 0;
    };

    match claims.get("exp") {
        Some(exp) => exp
            .as_i64()
            .or_else(|| exp.as_f64().map(|secs| secs as i64))
            .unwrap_or(0),
        None => 0,
    }
}

/// True if the token's expiry is known and less than `buffer_secs` away
/// (including tokens that have already expired).
pub fn is_expiring_soon(token: &str, buffer_secs: i64) -> bool {
    is_expiring_soon_at(token, buffer_secs, Utc::now().timestamp())
}

fn is_expiring_soon_at(token: &str, buffer_secs: i64, now: i64) -> bool {
    let exp = expiry_of(token);
    if exp == 0 {
        return false;
    }
    // exp comes from the token and may sit at either end of the i64 range
    exp.saturating_sub(now) < buffer_secs
}
