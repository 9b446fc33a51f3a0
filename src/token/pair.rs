use serde::{Deserialize, Serialize};

/// The current bearer credential and the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Pair produced by a refresh. The old refresh token survives when upstream omits a new one.
    pub fn rotated(&self, refreshed: RefreshResponse) -> Self {
        let refresh_token = refreshed
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.refresh_token.clone());
        Self {
            access_token: refreshed.access_token,
            refresh_token,
        }
    }
}

/// Body of the token refresh call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Token refresh endpoint reply.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
