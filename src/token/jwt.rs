use anyhow::{anyhow, Result};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ExpClaim {
    exp: i64,
}

fn decode_jwt_claims(token: &str) -> Result<ExpClaim> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("invalid JWT format"));
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| anyhow!("base64 decode error: {}", e))?;

    serde_json::from_slice::<ExpClaim>(&decoded).map_err(|e| anyhow!("invalid JWT payload: {}", e))
}

/// Expiration embedded in an access token, if it has one.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    match decode_jwt_claims(token) {
        Ok(claims) => DateTime::from_timestamp(claims.exp, 0),
        Err(e) => {
            debug!(error = %e, "access token carries no readable exp claim");
            None
        }
    }
}

/// A token is usable only while `now < exp - buffer`. Tokens without a readable exp are stale.
pub fn is_usable(token: &str, now: DateTime<Utc>, buffer: Duration) -> bool {
    token_expiry(token)
        .and_then(|exp| exp.checked_sub_signed(buffer))
        .is_some_and(|usable_until| now < usable_until)
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(exp: i64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = engine.encode(format!(r#"{{"sub":"gateway","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}
