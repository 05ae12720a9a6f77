//! HTTP Basic credential gate.
//!
//! Stateless: every admin request carries the operator's credentials and is checked against the
//! configured pair. Both halves are always compared, in constant time, so a mismatch leaks
//! neither which half was wrong nor how much of it matched.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;

use super::AppState;
use crate::config::AdminCredentials;
use crate::error::{ConsoleError, Result};

/// Challenge sent with every 401 so browsers prompt for credentials.
pub const BASIC_CHALLENGE: &str = "Basic realm=\"grant-console\"";

#[derive(Clone)]
pub struct CredentialGate {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl CredentialGate {
    pub fn new(admin: &AdminCredentials) -> Self {
        Self {
            username: admin.username.as_bytes().to_vec(),
            password: admin.password.as_bytes().to_vec(),
        }
    }

    pub fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = self.username.as_slice().ct_eq(username.as_bytes());
        let password_ok = self.password.as_slice().ct_eq(password.as_bytes());
        (username_ok & password_ok).into()
    }

    /// Check the `Authorization` header of a request.
    ///
    /// # Errors
    /// [`ConsoleError::Unauthorized`] when the header is missing, malformed or wrong.
    pub fn check(&self, headers: &HeaderMap) -> Result<()> {
        let (username, password) =
            basic_credentials(headers).ok_or(ConsoleError::Unauthorized)?;
        if self.verify(&username, &password) {
            Ok(())
        } else {
            Err(ConsoleError::Unauthorized)
        }
    }
}

/// Decode `Authorization: Basic <base64(user:pass)>`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware guarding the admin routes.
pub async fn require_operator(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match state.gate.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected admin request without valid credentials"
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn gate() -> CredentialGate {
        CredentialGate::new(&AdminCredentials {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        })
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(user_pass: &str) -> HeaderMap {
        headers(&format!("Basic {}", STANDARD.encode(user_pass)))
    }

    #[test]
    fn test_accepts_configured_pair() {
        assert!(gate().check(&basic("admin:hunter2")).is_ok());
        // Scheme is case-insensitive
        assert!(
            gate()
                .check(&headers(&format!("basic {}", STANDARD.encode("admin:hunter2"))))
                .is_ok()
        );
    }

    #[test]
    fn test_password_may_contain_colons() {
        let gate = CredentialGate::new(&AdminCredentials {
            username: "admin".to_string(),
            password: "a:b:c".to_string(),
        });
        assert!(gate.check(&basic("admin:a:b:c")).is_ok());
    }

    #[test]
    fn test_rejects_wrong_or_malformed_credentials() {
        let gate = gate();
        for headers in [
            HeaderMap::new(),
            basic("admin:hunter3"),
            basic("root:hunter2"),
            basic("admin:hunter2x"),
            basic("admin"),
            basic(":"),
            headers("Bearer abc"),
            headers("Basic !!!not-base64"),
        ] {
            assert!(matches!(
                gate.check(&headers),
                Err(ConsoleError::Unauthorized)
            ));
        }
    }
}
