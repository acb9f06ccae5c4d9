//! HTTP Basic authentication against a static credential table.
//!
//! Passwords never live in the config file: each `[[auth.users]]` entry
//! names the environment variable holding that user's password, and the
//! table is built once at startup.
//!
//! ```toml
//! [[auth.users]]
//! username = "admin"
//! password_env = "ADMIN_PASSWORD"
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::config::AuthConfig;

/// Authenticated principal. Drives the authorization filter on search and
/// is recorded on every access grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("malformed authorization header")]
    Malformed,
    #[error("invalid username or password")]
    Invalid,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut resp =
            crate::server::error_response(StatusCode::UNAUTHORIZED, "unauthorized", self.to_string());
        resp.headers_mut().insert(
            WWW_AUTHENTICATE,
            axum::http::HeaderValue::from_static("Basic realm=\"docmark\""),
        );
        resp
    }
}

/// Usernames mapped to password digests.
#[derive(Debug, Default, Clone)]
pub struct CredentialTable {
    users: HashMap<String, [u8; 32]>,
}

fn digest(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}

impl CredentialTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: impl Into<String>, password: &str) -> Self {
        self.users.insert(username.into(), digest(password));
        self
    }

    /// Build the table, resolving each user's password from the environment.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let mut table = Self::new();
        for user in &config.users {
            let password = match std::env::var(&user.password_env) {
                Ok(p) if !p.is_empty() => p,
                _ => bail!(
                    "password for user '{}' not set (environment variable {})",
                    user.username,
                    user.password_env
                ),
            };
            table = table.with_user(user.username.clone(), &password);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        match self.users.get(username) {
            Some(expected) if *expected == digest(password) => Ok(Identity::new(username)),
            _ => Err(AuthError::Invalid),
        }
    }

    /// Checks an `Authorization: Basic …` header value.
    pub fn verify_header(&self, header: &str) -> Result<Identity, AuthError> {
        let encoded = header
            .strip_prefix("Basic ")
            .or_else(|| header.strip_prefix("basic "))
            .ok_or(AuthError::Malformed)?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AuthError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
        let (user, pass) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
        self.verify(user, pass)
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    Arc<CredentialTable>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let table = Arc::<CredentialTable>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::Missing)?
            .to_str()
            .map_err(|_| AuthError::Malformed)?;
        let result = table.verify_header(header);
        if let Err(ref e) = result {
            tracing::warn!(error = %e, path = %parts.uri.path(), "rejected request");
        }
        result
    }
}
