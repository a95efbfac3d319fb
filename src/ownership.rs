use crate::db::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Entry, Journal, UserRecord};

/// Resources with exactly one owning user.
pub trait Owned {
    fn owner_id(&self) -> &str;

    fn is_owned_by(&self, user: &UserRecord) -> bool {
        self.owner_id() == user.id
    }
}

impl Owned for Journal {
    fn owner_id(&self) -> &str {
        &self.author
    }
}

/// Answers "does this principal own that resource", resolving entry
/// ownership transitively through the parent journal. Read-only; an
/// admin principal passes every check.
pub fn assert_owns_journal(principal: &UserRecord, journal: &Journal) -> AppResult<()> {
    if principal.is_admin() || journal.is_owned_by(principal) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "journal '{}' belongs to another user",
        journal.id
    )))
}

pub fn assert_owns_entry(db: &Database, principal: &UserRecord, entry: &Entry) -> AppResult<()> {
    if principal.is_admin() {
        return Ok(());
    }
    let journal = db.get_journal(&entry.journal)?.ok_or_else(|| {
        AppError::NotFound(format!(
            "journal '{}' for entry '{}' does not exist",
            entry.journal, entry.id
        ))
    })?;
    if journal.is_owned_by(principal) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "entry '{}' belongs to another user",
        entry.id
    )))
}

/// Looks up a journal and checks ownership in one step.
pub fn resolve_owned_journal(
    db: &Database,
    principal: &UserRecord,
    journal_id: &str,
) -> AppResult<Journal> {
    let journal = db
        .get_journal(journal_id)?
        .ok_or_else(|| AppError::NotFound(format!("journal '{}' does not exist", journal_id)))?;
    assert_owns_journal(principal, &journal)?;
    Ok(journal)
}

pub fn resolve_owned_entry(
    db: &Database,
    principal: &UserRecord,
    entry_id: &str,
) -> AppResult<Entry> {
    let entry = db
        .get_entry(entry_id)?
        .ok_or_else(|| AppError::NotFound(format!("entry '{}' does not exist", entry_id)))?;
    assert_owns_entry(db, principal, &entry)?;
    Ok(entry)
}
