use crate::auth::{MIN_PASSWORD_LEN, MIN_USERNAME_LEN};
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::filter::{self, FilterDescriptor};
use crate::models::{
    AccountStatus, CreateEntryPayload, CreateJournalPayload, Entry, EntryQuery, Journal,
    JournalQuery, LoginPayload, Privilege, RegisterPayload, UpdateEntryPayload,
    UpdateJournalPayload, UpdateUserPayload, UserQuery, UserRecord,
};
use crate::ownership::{resolve_owned_entry, resolve_owned_journal};
use std::sync::Arc;

/// Parsed user update, ready for the service to apply.
#[derive(Debug, Clone, Default)]
pub struct ValidatedUserUpdate {
    pub username: Option<String>,
    pub password: Option<String>,
    pub privilege: Option<Privilege>,
    pub status: Option<AccountStatus>,
}

/// Per-operation rule chains. Each method runs its checks in a fixed
/// order and returns the first failure; nothing is written here, only
/// read. The principal check always comes first so an unauthenticated
/// request never touches the store.
#[derive(Clone)]
pub struct Validator {
    db: Arc<Database>,
}

impl Validator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    // ─── Auth ───────────────────────────────────────────────────────────────

    pub fn register(&self, payload: &RegisterPayload) -> AppResult<(String, String)> {
        let username = require_field(&payload.username, "username")?;
        let password = require_field(&payload.password, "password")?;
        check_username_length(username)?;
        check_password_length(password)?;
        Ok((username.to_string(), password.to_string()))
    }

    pub fn login(&self, payload: &LoginPayload) -> AppResult<(String, String)> {
        let username = require_field(&payload.username, "username")?;
        let password = require_field(&payload.password, "password")?;
        Ok((username.to_string(), password.to_string()))
    }

    // ─── Journals ───────────────────────────────────────────────────────────

    pub fn create_journal(
        &self,
        principal: Option<&UserRecord>,
        payload: &CreateJournalPayload,
    ) -> AppResult<String> {
        require_principal(principal)?;
        let name = require_field(&payload.name, "name")?;
        Ok(name.to_string())
    }

    pub fn get_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
    ) -> AppResult<Journal> {
        let principal = require_principal(principal)?;
        resolve_owned_journal(&self.db, principal, journal_id)
    }

    /// Returns the filter plus the author scope the listing must be
    /// narrowed to (non-admins only ever see their own journals).
    pub fn list_journals(
        &self,
        principal: Option<&UserRecord>,
        query: &JournalQuery,
    ) -> AppResult<(FilterDescriptor, Option<String>)> {
        let principal = require_principal(principal)?;
        let scope = if principal.is_admin() {
            None
        } else {
            if let Some(author) = &query.author {
                if author != &principal.id {
                    return Err(AppError::Forbidden(
                        "cannot list journals of another author".to_string(),
                    ));
                }
            }
            if query.author_regex.is_some() {
                return Err(AppError::Forbidden(
                    "author patterns require admin privilege".to_string(),
                ));
            }
            Some(principal.id.clone())
        };
        let descriptor = filter::journal_filter(query)?;
        Ok((descriptor, scope))
    }

    pub fn update_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
        payload: &UpdateJournalPayload,
    ) -> AppResult<(Journal, String)> {
        let principal = require_principal(principal)?;
        let journal = resolve_owned_journal(&self.db, principal, journal_id)?;
        let Some(name) = &payload.name else {
            return Err(AppError::BadRequest(
                "update requires at least one mutable field".to_string(),
            ));
        };
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("'name' must be non-empty".to_string()));
        }
        Ok((journal, name.clone()))
    }

    pub fn delete_journal(
        &self,
        principal: Option<&UserRecord>,
        journal_id: &str,
    ) -> AppResult<Journal> {
        let principal = require_principal(principal)?;
        resolve_owned_journal(&self.db, principal, journal_id)
    }

    // ─── Entries ────────────────────────────────────────────────────────────

    pub fn create_entry(
        &self,
        principal: Option<&UserRecord>,
        payload: &CreateEntryPayload,
    ) -> AppResult<(Option<String>, String, Journal)> {
        let principal = require_principal(principal)?;
        let body = require_field(&payload.body, "body")?;
        let journal_id = require_field(&payload.journal, "journal")?;
        let journal = resolve_owned_journal(&self.db, principal, journal_id)?;
        Ok((payload.title.clone(), body.to_string(), journal))
    }

    pub fn get_entry(&self, principal: Option<&UserRecord>, entry_id: &str) -> AppResult<Entry> {
        let principal = require_principal(principal)?;
        resolve_owned_entry(&self.db, principal, entry_id)
    }

    pub fn list_entries(
        &self,
        principal: Option<&UserRecord>,
        query: &EntryQuery,
    ) -> AppResult<(FilterDescriptor, Option<String>)> {
        let principal = require_principal(principal)?;
        if let Some(journal_id) = &query.journal {
            resolve_owned_journal(&self.db, principal, journal_id)?;
        }
        let scope = if principal.is_admin() {
            None
        } else {
            Some(principal.id.clone())
        };
        let descriptor = filter::entry_filter(query)?;
        Ok((descriptor, scope))
    }

    pub fn update_entry(
        &self,
        principal: Option<&UserRecord>,
        entry_id: &str,
        payload: &UpdateEntryPayload,
    ) -> AppResult<Entry> {
        let principal = require_principal(principal)?;
        let entry = resolve_owned_entry(&self.db, principal, entry_id)?;
        if payload.title.is_none() && payload.body.is_none() {
            return Err(AppError::BadRequest(
                "update requires at least one mutable field".to_string(),
            ));
        }
        if let Some(body) = &payload.body {
            if body.trim().is_empty() {
                return Err(AppError::BadRequest("'body' must be non-empty".to_string()));
            }
        }
        Ok(entry)
    }

    pub fn delete_entry(&self, principal: Option<&UserRecord>, entry_id: &str) -> AppResult<Entry> {
        let principal = require_principal(principal)?;
        resolve_owned_entry(&self.db, principal, entry_id)
    }

    /// Bulk delete must name a journal scope; the other entry filters
    /// then narrow the deletion inside it.
    pub fn bulk_delete_entries(
        &self,
        principal: Option<&UserRecord>,
        query: &EntryQuery,
    ) -> AppResult<FilterDescriptor> {
        let principal = require_principal(principal)?;
        let journal_id = query.journal.as_deref().ok_or_else(|| {
            AppError::BadRequest("'journal' is required for bulk deletes".to_string())
        })?;
        resolve_owned_journal(&self.db, principal, journal_id)?;
        filter::entry_scope_filter(query)
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub fn get_user(
        &self,
        principal: Option<&UserRecord>,
        username: &str,
    ) -> AppResult<UserRecord> {
        let principal = require_principal(principal)?;
        let target = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::NotFound(format!("user '{}' does not exist", username)))?;
        if !principal.is_admin() && principal.id != target.id {
            return Err(AppError::Forbidden(
                "cannot read another user's account".to_string(),
            ));
        }
        Ok(target)
    }

    pub fn list_users(
        &self,
        principal: Option<&UserRecord>,
        query: &UserQuery,
    ) -> AppResult<FilterDescriptor> {
        let principal = require_principal(principal)?;
        if !principal.is_admin() {
            return Err(AppError::Forbidden(
                "listing users requires admin privilege".to_string(),
            ));
        }
        filter::user_filter(query)
    }

    pub fn update_user(
        &self,
        principal: Option<&UserRecord>,
        username: &str,
        payload: &UpdateUserPayload,
    ) -> AppResult<(UserRecord, ValidatedUserUpdate)> {
        let principal = require_principal(principal)?;
        let target = self
            .db
            .get_user_by_username(username)?
            .ok_or_else(|| AppError::NotFound(format!("user '{}' does not exist", username)))?;
        if !principal.is_admin() && principal.id != target.id {
            return Err(AppError::Forbidden(
                "cannot update another user's account".to_string(),
            ));
        }

        if payload.username.is_none()
            && payload.password.is_none()
            && payload.privilege.is_none()
            && payload.status.is_none()
        {
            return Err(AppError::BadRequest(
                "update requires at least one mutable field".to_string(),
            ));
        }

        let mut update = ValidatedUserUpdate::default();
        if let Some(new_username) = &payload.username {
            check_username_length(new_username)?;
            update.username = Some(new_username.clone());
        }
        if let Some(new_password) = &payload.password {
            check_password_length(new_password)?;
            update.password = Some(new_password.clone());
        }
        if let Some(privilege) = &payload.privilege {
            if !principal.is_admin() {
                return Err(AppError::Forbidden(
                    "changing privilege requires admin privilege".to_string(),
                ));
            }
            update.privilege = Some(Privilege::parse(privilege).ok_or_else(|| {
                AppError::BadRequest(format!("'{}' is not a valid privilege", privilege))
            })?);
        }
        if let Some(status) = &payload.status {
            if !principal.is_admin() {
                return Err(AppError::Forbidden(
                    "changing account status requires admin privilege".to_string(),
                ));
            }
            update.status = Some(AccountStatus::parse(status).ok_or_else(|| {
                AppError::BadRequest(format!("'{}' is not a valid account status", status))
            })?);
        }
        Ok((target, update))
    }
}

fn require_principal(principal: Option<&UserRecord>) -> AppResult<&UserRecord> {
    principal.ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))
}

fn require_field<'a>(value: &'a Option<String>, name: &str) -> AppResult<&'a str> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::BadRequest(format!("'{}' is required", name))),
    }
}

fn check_username_length(username: &str) -> AppResult<()> {
    if username.trim().len() < MIN_USERNAME_LEN {
        return Err(AppError::BadRequest(format!(
            "'username' must be at least {} characters",
            MIN_USERNAME_LEN
        )));
    }
    Ok(())
}

fn check_password_length(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "'password' must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        validator: Validator,
        alice: UserRecord,
        bob: UserRecord,
        admin: UserRecord,
        journal: Journal,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Arc::new(Database::new(&dir.path().join("test.db")).expect("db"));
        let alice = db
            .insert_user("alice", "h", "s", Privilege::Member, AccountStatus::Active)
            .expect("alice");
        let bob = db
            .insert_user("bob", "h", "s", Privilege::Member, AccountStatus::Active)
            .expect("bob");
        let admin = db
            .insert_user("root", "h", "s", Privilege::Admin, AccountStatus::Active)
            .expect("admin");
        let journal = db.insert_journal("Diary", &alice.id).expect("journal");
        let validator = Validator::new(db);
        Fixture {
            _dir: dir,
            validator,
            alice,
            bob,
            admin,
            journal,
        }
    }

    #[test]
    fn missing_principal_is_unauthorized_for_every_gated_operation() {
        let fx = fixture();
        let create = fx
            .validator
            .create_journal(None, &CreateJournalPayload::default())
            .expect_err("unauthorized");
        assert!(matches!(create, AppError::Unauthorized(_)));

        let get = fx
            .validator
            .get_journal(None, &fx.journal.id)
            .expect_err("unauthorized");
        assert!(matches!(get, AppError::Unauthorized(_)));

        let list = fx
            .validator
            .list_entries(None, &EntryQuery::default())
            .expect_err("unauthorized");
        assert!(matches!(list, AppError::Unauthorized(_)));
    }

    #[test]
    fn create_journal_requires_a_name() {
        let fx = fixture();
        let error = fx
            .validator
            .create_journal(Some(&fx.alice), &CreateJournalPayload { name: None })
            .expect_err("missing name");
        assert!(matches!(error, AppError::BadRequest(_)));
        assert!(error.message().contains("name"));

        let blank = fx
            .validator
            .create_journal(
                Some(&fx.alice),
                &CreateJournalPayload {
                    name: Some("   ".to_string()),
                },
            )
            .expect_err("blank name");
        assert!(matches!(blank, AppError::BadRequest(_)));
    }

    #[test]
    fn cross_user_journal_access_is_forbidden() {
        let fx = fixture();
        let error = fx
            .validator
            .get_journal(Some(&fx.bob), &fx.journal.id)
            .expect_err("forbidden");
        assert!(matches!(error, AppError::Forbidden(_)));

        assert!(fx.validator.get_journal(Some(&fx.alice), &fx.journal.id).is_ok());
        assert!(fx.validator.get_journal(Some(&fx.admin), &fx.journal.id).is_ok());
    }

    #[test]
    fn create_entry_resolves_the_parent_journal_first() {
        let fx = fixture();
        let missing_parent = fx
            .validator
            .create_entry(
                Some(&fx.alice),
                &CreateEntryPayload {
                    title: None,
                    body: Some("text".to_string()),
                    journal: Some("no-such-journal".to_string()),
                },
            )
            .expect_err("missing parent");
        assert!(matches!(missing_parent, AppError::NotFound(_)));

        let foreign_parent = fx
            .validator
            .create_entry(
                Some(&fx.bob),
                &CreateEntryPayload {
                    title: None,
                    body: Some("text".to_string()),
                    journal: Some(fx.journal.id.clone()),
                },
            )
            .expect_err("foreign parent");
        assert!(matches!(foreign_parent, AppError::Forbidden(_)));
    }

    #[test]
    fn empty_update_is_a_bad_request() {
        let fx = fixture();
        let journal = fx
            .validator
            .update_journal(
                Some(&fx.alice),
                &fx.journal.id,
                &UpdateJournalPayload::default(),
            )
            .expect_err("empty update");
        assert!(matches!(journal, AppError::BadRequest(_)));

        let user = fx
            .validator
            .update_user(Some(&fx.alice), "alice", &UpdateUserPayload::default())
            .expect_err("empty update");
        assert!(matches!(user, AppError::BadRequest(_)));
    }

    #[test]
    fn ownership_failure_wins_over_filter_problems_when_listing() {
        let fx = fixture();
        // Both an unauthorized scope and broken pagination: the scope
        // check fires first, per the fixed check order.
        let query = JournalQuery {
            author: Some(fx.alice.id.clone()),
            ..JournalQuery::default()
        };
        let error = fx
            .validator
            .list_journals(Some(&fx.bob), &query)
            .expect_err("forbidden");
        assert!(matches!(error, AppError::Forbidden(_)));
    }

    #[test]
    fn non_admin_listing_is_scoped_to_self() {
        let fx = fixture();
        let query = JournalQuery {
            index: Some(0),
            limit: Some(10),
            ..JournalQuery::default()
        };
        let (_, scope) = fx
            .validator
            .list_journals(Some(&fx.alice), &query)
            .expect("list");
        assert_eq!(scope.as_deref(), Some(fx.alice.id.as_str()));

        let (_, scope) = fx
            .validator
            .list_journals(Some(&fx.admin), &query)
            .expect("list");
        assert!(scope.is_none());
    }

    #[test]
    fn privilege_and_status_changes_are_admin_only() {
        let fx = fixture();
        let payload = UpdateUserPayload {
            privilege: Some("admin".to_string()),
            ..UpdateUserPayload::default()
        };
        let error = fx
            .validator
            .update_user(Some(&fx.alice), "alice", &payload)
            .expect_err("forbidden");
        assert!(matches!(error, AppError::Forbidden(_)));

        let (_, update) = fx
            .validator
            .update_user(Some(&fx.admin), "alice", &payload)
            .expect("admin update");
        assert_eq!(update.privilege, Some(Privilege::Admin));

        let bogus = UpdateUserPayload {
            status: Some("vaporized".to_string()),
            ..UpdateUserPayload::default()
        };
        let error = fx
            .validator
            .update_user(Some(&fx.admin), "alice", &bogus)
            .expect_err("bad enum");
        assert!(matches!(error, AppError::BadRequest(_)));
    }

    #[test]
    fn short_credentials_are_rejected() {
        let fx = fixture();
        let error = fx
            .validator
            .register(&RegisterPayload {
                username: Some("al".to_string()),
                password: Some("password1".to_string()),
            })
            .expect_err("short username");
        assert!(error.message().contains("username"));

        let error = fx
            .validator
            .register(&RegisterPayload {
                username: Some("alice".to_string()),
                password: Some("short".to_string()),
            })
            .expect_err("short password");
        assert!(error.message().contains("password"));
    }

    #[test]
    fn bulk_entry_delete_requires_a_journal_scope() {
        let fx = fixture();
        let error = fx
            .validator
            .bulk_delete_entries(Some(&fx.alice), &EntryQuery::default())
            .expect_err("missing scope");
        assert!(matches!(error, AppError::BadRequest(_)));

        let query = EntryQuery {
            journal: Some(fx.journal.id.clone()),
            ..EntryQuery::default()
        };
        assert!(fx.validator.bulk_delete_entries(Some(&fx.bob), &query).is_err());
        assert!(fx.validator.bulk_delete_entries(Some(&fx.alice), &query).is_ok());
    }

    #[test]
    fn user_reads_are_self_or_admin() {
        let fx = fixture();
        assert!(fx.validator.get_user(Some(&fx.alice), "alice").is_ok());
        assert!(fx.validator.get_user(Some(&fx.admin), "alice").is_ok());

        let error = fx
            .validator
            .get_user(Some(&fx.bob), "alice")
            .expect_err("forbidden");
        assert!(matches!(error, AppError::Forbidden(_)));

        let error = fx
            .validator
            .get_user(Some(&fx.admin), "nobody")
            .expect_err("not found");
        assert!(matches!(error, AppError::NotFound(_)));
    }

    #[test]
    fn admin_only_user_listing() {
        let fx = fixture();
        let query = UserQuery {
            index: Some(0),
            limit: Some(10),
            ..UserQuery::default()
        };
        assert!(fx.validator.list_users(Some(&fx.admin), &query).is_ok());
        let error = fx
            .validator
            .list_users(Some(&fx.alice), &query)
            .expect_err("forbidden");
        assert!(matches!(error, AppError::Forbidden(_)));
    }

    #[test]
    fn unknown_entry_parent_listing_scope_is_not_found() {
        let fx = fixture();
        let query = EntryQuery {
            journal: Some("no-such-journal".to_string()),
            index: Some(0),
            limit: Some(10),
            ..EntryQuery::default()
        };
        let error = fx
            .validator
            .list_entries(Some(&fx.alice), &query)
            .expect_err("not found");
        assert!(matches!(error, AppError::NotFound(_)));
    }
}
