//! Editor authentication.
//!
//! Users are identified by an [`Authenticator`]; the editor routes sit behind
//! [`require_editor`], which sends anonymous requests to `/login`.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

use crate::api::found;
use crate::core::config::{AuthConfig, AuthMode};
use crate::core::AppState;

/// Signed-in user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Identity as reported by the authenticator (usually an email)
    pub email: String,
}

/// Source of user identity
pub trait Authenticator: Send + Sync {
    /// User making the request, if any
    fn current_user(&self, headers: &HeaderMap) -> Option<User>;

    /// Where to send an anonymous user; `dest` is the return path
    fn login_url(&self, dest: &str) -> String;

    /// Where to send a signed-in user to sign out
    fn logout_url(&self, dest: &str) -> String;
}

/// Trusts a user header set by an authenticating reverse proxy
#[derive(Debug, Clone)]
pub struct TrustedHeaderAuth {
    header: String,
    login_url: String,
    logout_url: String,
}

impl TrustedHeaderAuth {
    /// Authenticator reading `config.user_header`
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            header: config.user_header.to_ascii_lowercase(),
            login_url: config.login_url.clone(),
            logout_url: config.logout_url.clone(),
        }
    }
}

fn with_redirect(base: &str, dest: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}rd={}", urlencoding::encode(dest))
}

impl Authenticator for TrustedHeaderAuth {
    fn current_user(&self, headers: &HeaderMap) -> Option<User> {
        let email = headers.get(self.header.as_str())?.to_str().ok()?.trim();
        if email.is_empty() {
            return None;
        }
        Some(User {
            email: email.to_string(),
        })
    }

    fn login_url(&self, dest: &str) -> String {
        with_redirect(&self.login_url, dest)
    }

    fn logout_url(&self, dest: &str) -> String {
        with_redirect(&self.logout_url, dest)
    }
}

/// Everyone is an editor
#[derive(Debug, Clone, Default)]
pub struct OpenAuth;

impl Authenticator for OpenAuth {
    fn current_user(&self, _headers: &HeaderMap) -> Option<User> {
        Some(User {
            email: "anonymous@localhost".to_string(),
        })
    }

    fn login_url(&self, dest: &str) -> String {
        dest.to_string()
    }

    fn logout_url(&self, dest: &str) -> String {
        dest.to_string()
    }
}

/// Authenticator for the configured mode
pub fn authenticator(config: &AuthConfig) -> Arc<dyn Authenticator> {
    match config.mode {
        AuthMode::Header => Arc::new(TrustedHeaderAuth::new(config)),
        AuthMode::Open => Arc::new(OpenAuth),
    }
}

/// Middleware for editor routes: anonymous requests go to `/login`
pub async fn require_editor(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match state.auth.current_user(request.headers()) {
        Some(user) => {
            debug!("Editor request by {}", user.email);
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => found("/login").into_response(),
    }
}

/// `GET /login`
pub async fn login(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match state.auth.current_user(&headers) {
        None => found(&state.auth.login_url("/")).into_response(),
        Some(_) => found("/").into_response(),
    }
}

/// `GET /logout`
pub async fn logout(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    match state.auth.current_user(&headers) {
        None => found("/").into_response(),
        Some(_) => found(&state.auth.logout_url("/")).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_auth_reads_user() {
        let auth = TrustedHeaderAuth::new(&AuthConfig::default());
        let mut headers = HeaderMap::new();
        assert!(auth.current_user(&headers).is_none());

        headers.insert("x-forwarded-email", HeaderValue::from_static("ed@example.com"));
        assert_eq!(auth.current_user(&headers).unwrap().email, "ed@example.com");

        headers.insert("x-forwarded-email", HeaderValue::from_static("  "));
        assert!(auth.current_user(&headers).is_none());
    }

    #[test]
    fn test_login_url_carries_destination() {
        let auth = TrustedHeaderAuth::new(&AuthConfig::default());
        assert_eq!(auth.login_url("/"), "/oauth2/sign_in?rd=%2F");
        assert_eq!(with_redirect("/out?x=1", "/a b"), "/out?x=1&rd=%2Fa%20b");
    }

    #[test]
    fn test_open_auth_always_signed_in() {
        assert!(OpenAuth.current_user(&HeaderMap::new()).is_some());
    }
}
