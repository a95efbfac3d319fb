use crate::auth::sha256_hex;
use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{AccountStatus, SessionRow, UserRecord};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "daybook_session";

/// Issues and resolves session tokens. Only the SHA-256 of a token is
/// stored; the raw token exists in the client's cookie and nowhere else.
#[derive(Clone)]
pub struct SessionManager {
    db: Arc<Database>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(db: Arc<Database>, ttl_seconds: i64) -> Self {
        Self {
            db,
            ttl: Duration::seconds(ttl_seconds),
        }
    }

    /// Creates a session for the user and returns the raw token.
    pub fn issue(&self, user_id: &str) -> AppResult<String> {
        let token = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.db.insert_session(&SessionRow {
            token_hash: sha256_hex(token.as_bytes()),
            user_id: user_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        })?;
        Ok(token)
    }

    /// Resolves a raw token to its principal. Expired sessions are
    /// removed on the spot; sessions of non-active accounts resolve to
    /// nothing so a suspension takes effect immediately.
    pub fn resolve(&self, token: &str) -> AppResult<Option<UserRecord>> {
        let token_hash = sha256_hex(token.as_bytes());
        let Some(session) = self.db.get_session(&token_hash)? else {
            return Ok(None);
        };
        if session.expires_at <= Utc::now() {
            self.db.delete_session(&token_hash)?;
            return Ok(None);
        }
        let Some(user) = self.db.get_user(&session.user_id)? else {
            self.db.delete_session(&token_hash)?;
            return Ok(None);
        };
        if user.status != AccountStatus::Active {
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub fn revoke(&self, token: &str) -> AppResult<()> {
        self.db.delete_session(&sha256_hex(token.as_bytes()))?;
        Ok(())
    }

    /// Revokes every session of the user except, optionally, the one
    /// behind `keep_token` (used after a password change).
    pub fn revoke_all_for_user(&self, user_id: &str, keep_token: Option<&str>) -> AppResult<u64> {
        let keep_hash = keep_token.map(|token| sha256_hex(token.as_bytes()));
        self.db.delete_sessions_for_user(user_id, keep_hash.as_deref())
    }

    pub fn purge_expired(&self) -> AppResult<u64> {
        self.db.purge_expired_sessions(Utc::now())
    }
}
