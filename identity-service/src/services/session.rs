//! Session lifecycle on top of the token codec and a session store.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration, Utc};
use service_core::error::AppError;
use std::sync::Arc;

use crate::models::SessionRecord;
use crate::services::secret::SecretProvider;
use crate::services::session_store::SessionStore;
use crate::services::token::{hash_token, TokenCodec};

pub const SESSION_COOKIE: &str = "tessaro_session";

/// A validated session together with the raw token that proved it.
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub token: String,
    pub record: SessionRecord,
}

/// Issues, validates, renews, and revokes sessions. Cheap to clone; all
/// state is behind `Arc`s.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    secrets: SecretProvider,
    codec: TokenCodec,
    default_ttl: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        secrets: SecretProvider,
        default_ttl: Duration,
        secure_cookies: bool,
    ) -> Self {
        Self {
            store,
            secrets,
            codec: TokenCodec,
            default_ttl,
            secure_cookies,
        }
    }

    /// Mint a token and persist the matching record. Returns the raw token
    /// (for the cookie) and the stored record. `ttl` overrides the
    /// configured default for this session only.
    pub async fn create_session(
        &self,
        user_id: &str,
        organization_id: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<(String, SessionRecord), AppError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let secret = self.secrets.load().await;
        let token = self.codec.generate(&secret, ttl);
        let record = SessionRecord::new(
            hash_token(&token),
            user_id.to_string(),
            organization_id,
            ttl,
        );
        self.store.create(&record).await?;
        Ok((token, record))
    }

    /// Resolve a raw token to a live session record. Tokens that fail
    /// cryptographic checks never reach the store; records past expiry are
    /// purged on sight.
    pub async fn validate_token(&self, token: &str) -> Result<Option<SessionRecord>, AppError> {
        let secret = self.secrets.load().await;
        if !self.codec.verify(token, &secret) {
            return Ok(None);
        }

        let token_hash = hash_token(token);
        let Some(record) = self.store.get(&token_hash).await? else {
            return Ok(None);
        };

        if record.is_expired() {
            self.store.delete(&token_hash).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Extend a live session, by the default ttl unless overridden. The
    /// token string, and so the client cookie value, stays the same; only
    /// the stored window moves.
    pub async fn renew_session(
        &self,
        token: &str,
        ttl: Option<Duration>,
    ) -> Result<Option<SessionRecord>, AppError> {
        let Some(record) = self.validate_token(token).await? else {
            return Ok(None);
        };
        let renewed = record.renewed(ttl.unwrap_or(self.default_ttl));
        self.store.replace(&renewed).await?;
        Ok(Some(renewed))
    }

    /// Revoke regardless of token validity; logout must always succeed.
    pub async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        self.store.delete(&hash_token(token)).await
    }

    /// Pull the session cookie from request headers and validate it.
    pub async fn authenticated_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<AuthenticatedSession>, AppError> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };
        let Some(record) = self.validate_token(&token).await? else {
            return Ok(None);
        };
        Ok(Some(AuthenticatedSession { token, record }))
    }

    /// `Set-Cookie` value binding `token` until `expires_at`.
    pub fn session_cookie(&self, token: &str, expires_at: DateTime<Utc>) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Expires={}",
            SESSION_COOKIE,
            urlencoding::encode(token),
            http_date(expires_at),
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// `Set-Cookie` value that removes the session cookie.
    pub fn clear_cookie(&self) -> String {
        let mut cookie = format!(
            "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            SESSION_COOKIE,
        );
        if self.secure_cookies {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Raw session token from the request cookies, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    let value = jar.get(SESSION_COOKIE)?.value().to_string();
    let decoded = urlencoding::decode(&value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(value);
    (!decoded.is_empty()).then_some(decoded)
}

fn http_date(moment: DateTime<Utc>) -> String {
    moment.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
