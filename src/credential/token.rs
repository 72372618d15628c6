// Expiry decoding for the audio services' bearer tokens
//
// Tokens are JWTs: three `.`-separated base64url segments, the second being a
// JSON claims object carrying `exp` in seconds since the epoch.

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: f64,
}

/// Decode the `exp` claim of a token, in whole seconds since the epoch
pub fn decode_expiry(token: &str) -> Option<i64> {
    decode_expiry_ms(token).map(|ms| ms.div_euclid(1000))
}

/// Decode the `exp` claim of a token, in milliseconds since the epoch
///
/// Fractional seconds are kept. Returns `None` for anything that is not a
/// three-segment token with a decodable JSON payload carrying a numeric `exp`.
pub fn decode_expiry_ms(token: &str) -> Option<i64> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        debug!("Invalid JWT token ({} segments)", segments.len());
        return None;
    }

    let payload = match decode_segment(segments[1]) {
        Some(payload) => payload,
        None => {
            debug!("JWT payload is not valid base64");
            return None;
        }
    };

    match serde_json::from_slice::<Claims>(&payload) {
        Ok(claims) if claims.exp.is_finite() => Some((claims.exp * 1000.0) as i64),
        Ok(_) => None,
        Err(e) => {
            debug!("JWT payload has no usable exp claim: {}", e);
            None
        }
    }
}

/// Check a raw token against the clock
///
/// Valid only when the decoded expiry is strictly in the future:
/// `exp * 1000 > now_ms`.
pub fn credential_is_valid(token: &str, now_ms: i64) -> bool {
    decode_expiry_ms(token).is_some_and(|exp_ms| exp_ms > now_ms)
}

fn decode_segment(segment: &str) -> Option<Vec<u8>> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    const NOW_MS: i64 = 1_700_000_000_000;

    #[test]
    fn test_rejects_wrong_segment_count() {
        for token in ["", "abc", "a.b", "a.b.c.d", "not-a-jwt-at-all"] {
            assert!(!credential_is_valid(token, NOW_MS), "{:?} should be invalid", token);
        }
    }

    #[test]
    fn test_rejects_undecodable_payload() {
        assert!(!credential_is_valid("header.!!!.sig", NOW_MS));
        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(!credential_is_valid(&not_json, NOW_MS));
        let no_exp = token_with_payload(r#"{"region":"westus"}"#);
        assert!(!credential_is_valid(&no_exp, NOW_MS));
    }

    #[test]
    fn test_expired_token_is_invalid() {
        let exp = NOW_MS / 1000 - 60;
        let token = token_with_payload(&format!(r#"{{"exp":{}}}"#, exp));
        assert!(!credential_is_valid(&token, NOW_MS));
    }

    #[test]
    fn test_token_expiring_now_is_invalid() {
        let token = token_with_payload(&format!(r#"{{"exp":{}}}"#, NOW_MS / 1000));
        assert!(!credential_is_valid(&token, NOW_MS));
    }

    #[test]
    fn test_future_token_is_valid() {
        let exp = NOW_MS / 1000 + 1;
        let token = token_with_payload(&format!(r#"{{"exp":{}}}"#, exp));
        assert!(credential_is_valid(&token, NOW_MS));
        assert_eq!(decode_expiry(&token), Some(exp));
    }

    #[test]
    fn test_fractional_expiry_is_not_rounded_down() {
        // Half a second left
        let token = token_with_payload(&format!(r#"{{"exp":{}.5}}"#, NOW_MS / 1000));
        assert!(credential_is_valid(&token, NOW_MS + 499));
        assert!(!credential_is_valid(&token, NOW_MS + 500));
        assert_eq!(decode_expiry_ms(&token), Some(NOW_MS + 500));
        assert_eq!(decode_expiry(&token), Some(NOW_MS / 1000));
    }

    #[test]
    fn test_padded_standard_base64_payload() {
        let payload = STANDARD_NO_PAD.encode(r#"{"exp":1700000600,"scope":"speech"}"#);
        let token = format!("h.{}==.s", payload);
        assert_eq!(decode_expiry(&token), Some(1_700_000_600));
    }
}
