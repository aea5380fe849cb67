//! Cookie parsing and Set-Cookie rendering for the credential triple.

use std::fmt;

use axum::http::{HeaderMap, HeaderValue, header};

use super::Credentials;

/// Cookie name for the access token (short-lived, minutes).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh token (long-lived).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the backend session identifier.
pub const SESSION_COOKIE_NAME: &str = "session_id";

/// Default lifetime of the access token cookie (15 minutes).
const DEFAULT_ACCESS_MAX_AGE: u64 = 15 * 60;

/// Default lifetime of the refresh token and session id cookies (2 weeks).
const DEFAULT_REFRESH_MAX_AGE: u64 = 14 * 24 * 60 * 60;

/// Extract a cookie value from the Cookie header.
/// Empty values are treated as absent.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                let value = value.trim();
                return (!value.is_empty()).then_some(value);
            }
        }
    }
    None
}

/// Attributes applied to every credential cookie.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    /// Whether to set the Secure flag (should be true in production with HTTPS)
    pub secure: bool,
    /// Max-Age of the access token cookie, in seconds
    pub access_max_age: u64,
    /// Max-Age of the refresh token and session id cookies, in seconds
    pub refresh_max_age: u64,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self {
            secure: false,
            access_max_age: DEFAULT_ACCESS_MAX_AGE,
            refresh_max_age: DEFAULT_REFRESH_MAX_AGE,
        }
    }
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self {
            secure,
            ..Self::default()
        }
    }

    fn render(&self, name: &str, value: &str, max_age: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
            name, value, max_age, secure
        )
    }

    /// Set-Cookie values writing the whole triple.
    pub fn set_cookies(&self, creds: &Credentials) -> [String; 3] {
        [
            self.render(ACCESS_COOKIE_NAME, &creds.access_token, self.access_max_age),
            self.render(REFRESH_COOKIE_NAME, &creds.refresh_token, self.refresh_max_age),
            self.render(SESSION_COOKIE_NAME, &creds.session_id, self.refresh_max_age),
        ]
    }

    /// Set-Cookie values expiring the whole triple immediately.
    pub fn clear_cookies(&self) -> [String; 3] {
        [
            self.render(ACCESS_COOKIE_NAME, "", 0),
            self.render(REFRESH_COOKIE_NAME, "", 0),
            self.render(SESSION_COOKIE_NAME, "", 0),
        ]
    }

    /// Append the triple to a response's headers. Nothing is written unless
    /// every value is a valid cookie value.
    pub fn append_set(
        &self,
        headers: &mut HeaderMap,
        creds: &Credentials,
    ) -> Result<(), InvalidCookieValue> {
        for (name, value) in [
            (ACCESS_COOKIE_NAME, &creds.access_token),
            (REFRESH_COOKIE_NAME, &creds.refresh_token),
            (SESSION_COOKIE_NAME, &creds.session_id),
        ] {
            if !is_cookie_value(value) {
                return Err(InvalidCookieValue { name });
            }
        }
        append_all(headers, self.set_cookies(creds));
        Ok(())
    }

    /// Append clearing cookies for the triple to a response's headers.
    pub fn append_clear(&self, headers: &mut HeaderMap) {
        append_all(headers, self.clear_cookies());
    }
}

/// A credential could not be carried in a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCookieValue {
    pub name: &'static str,
}

impl fmt::Display for InvalidCookieValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "value for cookie {} contains invalid characters", self.name)
    }
}

impl std::error::Error for InvalidCookieValue {}

/// RFC 6265 cookie-octets: visible ASCII except `"`, `,`, `;` and `\`.
fn is_cookie_value(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E))
}

fn append_all(headers: &mut HeaderMap, cookies: [String; 3]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Invalid Set-Cookie header"),
        }
    }
}
