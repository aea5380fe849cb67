//! Session credentials held in transport-only cookies.
//!
//! The access token, refresh token and session id travel as a unit: they are
//! set, rotated and cleared together. `Credentials` cannot be built with a
//! missing member and `CredentialStore` only exposes whole-triple writes.

mod cookie;
mod store;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePolicy, InvalidCookieValue, REFRESH_COOKIE_NAME,
    SESSION_COOKIE_NAME, get_cookie,
};
pub use store::CredentialStore;

use serde::{Deserialize, Serialize};

/// The full credential triple for one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Short-lived bearer token sent on every authenticated backend call
    pub access_token: String,
    /// Longer-lived token used only to mint a new access token
    pub refresh_token: String,
    /// Correlates this browser session with backend session bookkeeping
    pub session_id: String,
}

/// Credentials returned by the backend refresh endpoint.
///
/// Rotation of the refresh token and session id is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotatedCredentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            session_id: session_id.into(),
        }
    }

    /// Read the triple from request cookies.
    /// Returns None unless all three cookies are present and non-empty.
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Option<Self> {
        let access = get_cookie(headers, ACCESS_COOKIE_NAME)?;
        let refresh = get_cookie(headers, REFRESH_COOKIE_NAME)?;
        let session = get_cookie(headers, SESSION_COOKIE_NAME)?;
        Some(Self::new(access, refresh, session))
    }

    /// Apply a refresh response, keeping members the backend did not rotate.
    pub fn rotate(&self, rotated: RotatedCredentials) -> Self {
        Self {
            access_token: rotated.access_token,
            refresh_token: rotated
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| self.refresh_token.clone()),
            session_id: rotated
                .session_id
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.session_id.clone()),
        }
    }

    /// Whether every member carries a value.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && !self.session_id.is_empty()
    }
}
