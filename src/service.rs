use crate::auth::{generate_salt, hash_password, verify_password};
use crate::config::Config;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AccountStatus, CollectionResponse, CreateEntryPayload, CreateJournalPayload, DeleteResponse,
    Entry, EntryQuery, Journal, JournalQuery, LoginPayload, Privilege, RegisterPayload,
    UpdateEntryPayload, UpdateJournalPayload, UpdateUserPayload, UserChanges, UserQuery,
    UserRecord,
};
use crate::session::SessionManager;
use crate::validate::Validator;
use std::sync::Arc;
use tracing::{info, warn};

/// Successful login: the raw session token plus the account it belongs to.
#[derive(Debug)]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserRecord,
}

/// Orchestrates one operation end to end: validate, hit the store,
/// wrap the result in its envelope. All mutation flows through here.
#[derive(Clone)]
pub struct AppCore {
    pub db: Arc<Database>,
    pub validator: Validator,
    pub sessions: SessionManager,
}

impl AppCore {
    pub fn new(db: Arc<Database>, config: &Config) -> Self {
        let validator = Validator::new(Arc::clone(&db));
        let sessions = SessionManager::new(Arc::clone(&db), config.session_ttl_seconds);
        Self {
            db,
            validator,
            sessions,
        }
    }

    /// Creates the configured admin account on first boot. A no-op when
    /// an admin already exists or no credentials are configured.
    pub fn ensure_bootstrap_admin(&self, config: &Config) -> AppResult<()> {
        let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password)
        else {
            return Ok(());
        };
        if self.db.admin_exists()? {
            return Ok(());
        }
        let salt = generate_salt();
        let hash = hash_password(password, &salt);
        let user = self.db.insert_user(
            username,
            &hash,
            &salt,
            Privilege::Admin,
            AccountStatus::Active,
        )?;
        info!(username = %user.username, "bootstrapped admin account");
        Ok(())
    }

    // ─── Auth ───────────────────────────────────────────────────────────────

    pub fn register(&self, payload: &RegisterPayload) -> AppResult<CollectionResponse<UserRecord>> {
        let (username, password) = self.validator.register(payload)?;
        let salt = generate_salt();
        let hash = hash_password(&password, &salt);
        let user = self.db.insert_user(
            &username,
            &hash,
            &salt,
            Privilege::Member,
            AccountStatus::Active,
        )?;
        info!(username = %user.username, "registered user");
        Ok(CollectionResponse::created(vec![user]))
    }

    pub fn login(&self, payload: &LoginPayload) -> AppResult<LoginOutcome> {
        let (username, password) = self.validator.login(payload)?;
        let Some(auth) = self.db.get_user_auth(&username)? else {
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        };
        if !verify_password(&password, &auth.salt, &auth.password_hash) {
            warn!(username = %username, "rejected login attempt");
            return Err(AppError::Unauthorized("invalid credentials".to_string()));
        }
        if auth.status != AccountStatus::Active {
            return Err(AppError::Forbidden("account is not active".to_string()));
        }
        let user = self
            .db
            .get_user(&auth.id)?
            .ok_or_else(|| AppError::Internal("authenticated user row vanished".to_string()))?;
        let token = self.sessions.issue(&user.id)?;
        info!(username = %user.username, "logged in");
        Ok(LoginOutcome { token, user })
    }

    pub fn logout(&self, token: &str) -> AppResult<()> {
        self.sessions.revoke(token)
    }

    // ─── Journals ───────────────────────────────────────────────────────────

    pub fn create_journal(
        &self,
        principal: Option<&UserRecord>,
        payload: &CreateJournalPayload,
    ) -> AppResult<CollectionResponse<Journal>> {
        let name = self.validator.create_journal(principal, payload)?;
        let author = principal_id(principal)?;
        let journal = self.db.insert_journal(&name, author)?;
        Ok(CollectionResponse::created(vec![journal]))
    }

    pub fn get_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
    ) -> AppResult<CollectionResponse<Journal>> {
        let journal = self.validator.get_journal(principal, journal_id)?;
        Ok(CollectionResponse::ok(vec![journal]))
    }

    pub fn list_journals(
        &self,
        principal: Option<&UserRecord>,
        query: &JournalQuery,
    ) -> AppResult<CollectionResponse<Journal>> {
        let (filter, scope) = self.validator.list_journals(principal, query)?;
        let journals = self.db.list_journals(&filter, scope.as_deref())?;
        Ok(CollectionResponse::ok(journals))
    }

    pub fn update_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
        payload: &UpdateJournalPayload,
    ) -> AppResult<CollectionResponse<Journal>> {
        let (journal, name) = self.validator.update_journal(principal, journal_id, payload)?;
        let updated = self
            .db
            .update_journal(&journal.id, Some(&name))?
            .ok_or_else(|| {
                AppError::NotFound(format!("journal '{}' does not exist", journal_id))
            })?;
        Ok(CollectionResponse::ok(vec![updated]))
    }

    /// Removes a journal and everything inside it. The entries go
    /// first; if the journal delete then fails the request errors and
    /// a retry resumes from a consistent state.
    pub fn delete_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
    ) -> AppResult<DeleteResponse> {
        let journal = self.validator.delete_journal(principal, journal_id)?;
        let entries_removed = self.db.delete_entries_by_journal(&journal.id)?;
        let journals_removed = self.db.delete_journal(&journal.id).map_err(|err| {
            AppError::Internal(format!(
                "journal '{}' delete failed after removing {} entries: {}",
                journal.id,
                entries_removed,
                err.message()
            ))
        })?;
        info!(journal = %journal.id, entries = entries_removed, "deleted journal");
        Ok(DeleteResponse::ok(journals_removed + entries_removed))
    }

    // ─── Entries ────────────────────────────────────────────────────────────

    pub fn create_entry(
        &self,
        principal: Option<&UserRecord>,
        payload: &CreateEntryPayload,
    ) -> AppResult<CollectionResponse<Entry>> {
        let (title, body, journal) = self.validator.create_entry(principal, payload)?;
        let entry = self.db.insert_entry(title.as_deref(), &body, &journal.id)?;
        Ok(CollectionResponse::created(vec![entry]))
    }

    pub fn get_entry(
        &self,
        principal: Option<&UserRecord>,
        entry_id: &str,
    ) -> AppResult<CollectionResponse<Entry>> {
        let entry = self.validator.get_entry(principal, entry_id)?;
        Ok(CollectionResponse::ok(vec![entry]))
    }

    pub fn list_entries(
        &self,
        principal: Option<&UserRecord>,
        query: &EntryQuery,
    ) -> AppResult<CollectionResponse<Entry>> {
        let (filter, scope) = self.validator.list_entries(principal, query)?;
        let entries = self.db.list_entries(&filter, scope.as_deref())?;
        Ok(CollectionResponse::ok(entries))
    }

    pub fn update_entry(
        &self,
        principal: Option<&UserRecord>,
        entry_id: &str,
        payload: &UpdateEntryPayload,
    ) -> AppResult<CollectionResponse<Entry>> {
        let entry = self.validator.update_entry(principal, entry_id, payload)?;
        let updated = self
            .db
            .update_entry(&entry.id, payload.title.as_deref(), payload.body.as_deref())?
            .ok_or_else(|| AppError::NotFound(format!("entry '{}' does not exist", entry_id)))?;
        Ok(CollectionResponse::ok(vec![updated]))
    }

    pub fn delete_entry(
        &self,
        principal: Option<&UserRecord>,
        entry_id: &str,
    ) -> AppResult<DeleteResponse> {
        let entry = self.validator.delete_entry(principal, entry_id)?;
        let removed = self.db.delete_entry(&entry.id)?;
        Ok(DeleteResponse::ok(removed))
    }

    pub fn bulk_delete_entries(
        &self,
        principal: Option<&UserRecord>,
        query: &EntryQuery,
    ) -> AppResult<DeleteResponse> {
        let filter = self.validator.bulk_delete_entries(principal, query)?;
        let removed = self.db.delete_entries(&filter)?;
        info!(count = removed, "bulk deleted entries");
        Ok(DeleteResponse::ok(removed))
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub fn get_user(
        &self,
        principal: Option<&UserRecord>,
        username: &str,
    ) -> AppResult<CollectionResponse<UserRecord>> {
        let user = self.validator.get_user(principal, username)?;
        Ok(CollectionResponse::ok(vec![user]))
    }

    pub fn list_users(
        &self,
        principal: Option<&UserRecord>,
        query: &UserQuery,
    ) -> AppResult<CollectionResponse<UserRecord>> {
        let filter = self.validator.list_users(principal, query)?;
        let users = self.db.list_users(&filter)?;
        Ok(CollectionResponse::ok(users))
    }

    /// `current_token`, when present, survives a password change so
    /// the caller is not logged out of their own session.
    pub fn update_user(
        &self,
        principal: Option<&UserRecord>,
        username: &str,
        payload: &UpdateUserPayload,
        current_token: Option<&str>,
    ) -> AppResult<CollectionResponse<UserRecord>> {
        let (target, update) = self.validator.update_user(principal, username, payload)?;

        let password_changed = update.password.is_some();
        let changes = UserChanges {
            username: update.username,
            credential: update.password.map(|password| {
                let salt = generate_salt();
                let hash = hash_password(&password, &salt);
                (hash, salt)
            }),
            privilege: update.privilege,
            status: update.status,
        };
        let updated = self
            .db
            .update_user(&target.id, &changes)?
            .ok_or_else(|| AppError::NotFound(format!("user '{}' does not exist", username)))?;

        if password_changed {
            let revoked = self.sessions.revoke_all_for_user(&target.id, current_token)?;
            info!(username = %updated.username, revoked, "password changed, revoked other sessions");
        }
        Ok(CollectionResponse::ok(vec![updated]))
    }
}

fn principal_id(principal: Option<&UserRecord>) -> AppResult<&str> {
    principal
        .map(|user| user.id.as_str())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}
