use crate::errors::{AppError, AppResult};
use crate::filter::{Bound, DateRange, FieldMatch, FilterDescriptor};
use crate::models::{
    AccountStatus, Entry, Journal, Privilege, SessionRow, UserAuthRow, UserChanges, UserRecord,
};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        register_regexp(&conn).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        salt: &str,
        privilege: Privilege,
        status: AccountStatus,
    ) -> AppResult<UserRecord> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, username, password_hash, salt, privilege, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                id,
                username,
                password_hash,
                salt,
                privilege.as_str(),
                status.as_str(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|error| match AppError::from(error) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("username '{}' is already taken", username))
            }
            other => other,
        })?;

        Ok(UserRecord {
            id,
            username: username.to_string(),
            privilege,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_user(&self, user_id: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, username, privilege, status, created_at, updated_at
             FROM users WHERE id = ?1",
            [user_id],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_user_by_username(&self, username: &str) -> AppResult<Option<UserRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, username, privilege, status, created_at, updated_at
             FROM users WHERE username = ?1",
            [username],
            parse_user_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_user_auth(&self, username: &str) -> AppResult<Option<UserAuthRow>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, username, password_hash, salt, status FROM users WHERE username = ?1",
            [username],
            |row| {
                Ok(UserAuthRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    salt: row.get(3)?,
                    status: parse_status(&row.get::<_, String>(4)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn list_users(&self, filter: &FilterDescriptor) -> AppResult<Vec<UserRecord>> {
        let conn = self.lock()?;
        let mut query = String::from(
            "SELECT id, username, privilege, status, created_at, updated_at
             FROM users WHERE 1 = 1",
        );
        let mut params_vec: Vec<String> = Vec::new();
        apply_predicates(&mut query, &mut params_vec, filter, "");
        apply_sort(&mut query, filter, "");

        let (limit, offset) = page_bounds(filter);
        let mut statement = conn.prepare(&query)?;
        let mut dyn_params: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|param| param as &dyn rusqlite::ToSql)
            .collect();
        if filter.page.is_some() {
            dyn_params.push(&limit);
            dyn_params.push(&offset);
        }

        let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), parse_user_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn update_user(&self, user_id: &str, changes: &UserChanges) -> AppResult<Option<UserRecord>> {
        let now = Utc::now().to_rfc3339();
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut params_vec: Vec<String> = vec![now];

        if let Some(username) = &changes.username {
            sets.push("username = ?".to_string());
            params_vec.push(username.clone());
        }
        if let Some((hash, salt)) = &changes.credential {
            sets.push("password_hash = ?".to_string());
            params_vec.push(hash.clone());
            sets.push("salt = ?".to_string());
            params_vec.push(salt.clone());
        }
        if let Some(privilege) = changes.privilege {
            sets.push("privilege = ?".to_string());
            params_vec.push(privilege.as_str().to_string());
        }
        if let Some(status) = changes.status {
            sets.push("status = ?".to_string());
            params_vec.push(status.as_str().to_string());
        }
        params_vec.push(user_id.to_string());

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        let changed = conn
            .execute(&sql, rusqlite::params_from_iter(params_vec.iter()))
            .map_err(|error| match AppError::from(error) {
                AppError::Conflict(_) => {
                    AppError::Conflict("username is already taken".to_string())
                }
                other => other,
            })?;
        if changed == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_user(user_id)
    }

    pub fn admin_exists(&self) -> AppResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM users WHERE privilege = 'admin'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ─── Journals ───────────────────────────────────────────────────────────

    pub fn insert_journal(&self, name: &str, author: &str) -> AppResult<Journal> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO journals (id, name, author, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, name, author, now.to_rfc3339()],
        )?;

        Ok(Journal {
            id,
            name: name.to_string(),
            author: author.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_journal(&self, journal_id: &str) -> AppResult<Option<Journal>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, name, author, created_at, updated_at FROM journals WHERE id = ?1",
            [journal_id],
            parse_journal_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// `scope_author` restricts the listing to one owner's journals on
    /// top of whatever the filter asks for.
    pub fn list_journals(
        &self,
        filter: &FilterDescriptor,
        scope_author: Option<&str>,
    ) -> AppResult<Vec<Journal>> {
        let conn = self.lock()?;
        let mut query = String::from(
            "SELECT id, name, author, created_at, updated_at FROM journals WHERE 1 = 1",
        );
        let mut params_vec: Vec<String> = Vec::new();

        if let Some(author) = scope_author {
            query.push_str(" AND author = ?");
            params_vec.push(author.to_string());
        }
        apply_predicates(&mut query, &mut params_vec, filter, "");
        apply_sort(&mut query, filter, "");

        let (limit, offset) = page_bounds(filter);
        let mut statement = conn.prepare(&query)?;
        let mut dyn_params: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|param| param as &dyn rusqlite::ToSql)
            .collect();
        if filter.page.is_some() {
            dyn_params.push(&limit);
            dyn_params.push(&offset);
        }

        let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), parse_journal_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn update_journal(&self, journal_id: &str, name: Option<&str>) -> AppResult<Option<Journal>> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        let changed = match name {
            Some(name) => conn.execute(
                "UPDATE journals SET name = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, journal_id],
            )?,
            None => conn.execute(
                "UPDATE journals SET updated_at = ?1 WHERE id = ?2",
                params![now, journal_id],
            )?,
        };
        if changed == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_journal(journal_id)
    }

    pub fn delete_journal(&self, journal_id: &str) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM journals WHERE id = ?1", [journal_id])?;
        Ok(deleted as u64)
    }

    // ─── Entries ────────────────────────────────────────────────────────────

    pub fn insert_entry(
        &self,
        title: Option<&str>,
        body: &str,
        journal: &str,
    ) -> AppResult<Entry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries (id, title, body, journal, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, title, body, journal, now.to_rfc3339()],
        )?;

        Ok(Entry {
            id,
            title: title.map(ToString::to_string),
            body: body.to_string(),
            journal: journal.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_entry(&self, entry_id: &str) -> AppResult<Option<Entry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, title, body, journal, created_at, updated_at FROM entries WHERE id = ?1",
            [entry_id],
            parse_entry_row,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// `scope_author` narrows the listing to entries whose parent
    /// journal belongs to that owner (transitive ownership).
    pub fn list_entries(
        &self,
        filter: &FilterDescriptor,
        scope_author: Option<&str>,
    ) -> AppResult<Vec<Entry>> {
        let conn = self.lock()?;
        let mut params_vec: Vec<String> = Vec::new();
        let mut query = match scope_author {
            Some(author) => {
                params_vec.push(author.to_string());
                String::from(
                    "SELECT e.id, e.title, e.body, e.journal, e.created_at, e.updated_at
                     FROM entries e JOIN journals j ON j.id = e.journal
                     WHERE j.author = ?",
                )
            }
            None => String::from(
                "SELECT e.id, e.title, e.body, e.journal, e.created_at, e.updated_at
                 FROM entries e WHERE 1 = 1",
            ),
        };
        apply_predicates(&mut query, &mut params_vec, filter, "e.");
        apply_sort(&mut query, filter, "e.");

        let (limit, offset) = page_bounds(filter);
        let mut statement = conn.prepare(&query)?;
        let mut dyn_params: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|param| param as &dyn rusqlite::ToSql)
            .collect();
        if filter.page.is_some() {
            dyn_params.push(&limit);
            dyn_params.push(&offset);
        }

        let rows = statement.query_map(rusqlite::params_from_iter(dyn_params), parse_entry_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn update_entry(
        &self,
        entry_id: &str,
        title: Option<&str>,
        body: Option<&str>,
    ) -> AppResult<Option<Entry>> {
        let now = Utc::now().to_rfc3339();
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut params_vec: Vec<String> = vec![now];

        if let Some(title) = title {
            sets.push("title = ?".to_string());
            params_vec.push(title.to_string());
        }
        if let Some(body) = body {
            sets.push("body = ?".to_string());
            params_vec.push(body.to_string());
        }
        params_vec.push(entry_id.to_string());

        let sql = format!("UPDATE entries SET {} WHERE id = ?", sets.join(", "));
        let conn = self.lock()?;
        let changed = conn.execute(&sql, rusqlite::params_from_iter(params_vec.iter()))?;
        if changed == 0 {
            return Ok(None);
        }
        drop(conn);
        self.get_entry(entry_id)
    }

    pub fn delete_entry(&self, entry_id: &str) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM entries WHERE id = ?1", [entry_id])?;
        Ok(deleted as u64)
    }

    pub fn delete_entries(&self, filter: &FilterDescriptor) -> AppResult<u64> {
        let conn = self.lock()?;
        let mut query = String::from("DELETE FROM entries WHERE 1 = 1");
        let mut params_vec: Vec<String> = Vec::new();
        apply_predicates(&mut query, &mut params_vec, filter, "");

        let deleted = conn.execute(&query, rusqlite::params_from_iter(params_vec.iter()))?;
        Ok(deleted as u64)
    }

    pub fn delete_entries_by_journal(&self, journal_id: &str) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM entries WHERE journal = ?1", [journal_id])?;
        Ok(deleted as u64)
    }

    pub fn count_entries_by_journal(&self, journal_id: &str) -> AppResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(1) FROM entries WHERE journal = ?1",
            [journal_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ─── Sessions ───────────────────────────────────────────────────────────

    pub fn insert_session(&self, session: &SessionRow) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.token_hash,
                session.user_id,
                session.created_at.to_rfc3339(),
                session.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token_hash: &str) -> AppResult<Option<SessionRow>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions WHERE token_hash = ?1",
            [token_hash],
            |row| {
                Ok(SessionRow {
                    token_hash: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: parse_time(&row.get::<_, String>(2)?)?,
                    expires_at: parse_time(&row.get::<_, String>(3)?)?,
                })
            },
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn delete_session(&self, token_hash: &str) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?;
        Ok(deleted as u64)
    }

    pub fn delete_sessions_for_user(
        &self,
        user_id: &str,
        keep_token_hash: Option<&str>,
    ) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = match keep_token_hash {
            Some(keep) => conn.execute(
                "DELETE FROM sessions WHERE user_id = ?1 AND token_hash != ?2",
                params![user_id, keep],
            )?,
            None => conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?,
        };
        Ok(deleted as u64)
    }

    pub fn purge_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            [now.to_rfc3339()],
        )?;
        Ok(deleted as u64)
    }
}

// ─── Filter SQL assembly ───────────────────────────────────────────────────

fn apply_predicates(
    query: &mut String,
    params_vec: &mut Vec<String>,
    filter: &FilterDescriptor,
    prefix: &str,
) {
    for (column, matcher) in &filter.matches {
        match matcher {
            FieldMatch::Exact(value) => {
                query.push_str(&format!(" AND {}{} = ?", prefix, column));
                params_vec.push(value.clone());
            }
            FieldMatch::Pattern(pattern) => {
                query.push_str(&format!(" AND {}{} REGEXP ?", prefix, column));
                params_vec.push(pattern.clone());
            }
        }
    }
    apply_range(query, params_vec, "created_at", &filter.created_at, prefix);
    apply_range(query, params_vec, "updated_at", &filter.updated_at, prefix);
}

fn apply_range(
    query: &mut String,
    params_vec: &mut Vec<String>,
    column: &str,
    range: &Option<DateRange>,
    prefix: &str,
) {
    let Some(range) = range else {
        return;
    };
    if let Some(lower) = range.lower {
        let op = match lower.bound {
            Bound::Inclusive => ">=",
            Bound::Exclusive => ">",
        };
        query.push_str(&format!(" AND {}{} {} ?", prefix, column, op));
        params_vec.push(lower.at.to_rfc3339());
    }
    if let Some(upper) = range.upper {
        let op = match upper.bound {
            Bound::Inclusive => "<=",
            Bound::Exclusive => "<",
        };
        query.push_str(&format!(" AND {}{} {} ?", prefix, column, op));
        params_vec.push(upper.at.to_rfc3339());
    }
}

fn apply_sort(query: &mut String, filter: &FilterDescriptor, prefix: &str) {
    match filter.sort {
        Some((column, order)) => {
            query.push_str(&format!(" ORDER BY {}{} {}", prefix, column, order.as_sql()));
        }
        None => {
            query.push_str(&format!(" ORDER BY {}created_at DESC", prefix));
        }
    }
    if filter.page.is_some() {
        query.push_str(" LIMIT ? OFFSET ?");
    }
}

fn page_bounds(filter: &FilterDescriptor) -> (i64, i64) {
    match filter.page {
        Some(page) => (page.limit, page.offset()),
        None => (0, 0),
    }
}

fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let haystack = ctx.get::<Option<String>>(1)?;
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|error| rusqlite::Error::UserFunctionError(Box::new(error)))?;
            Ok(haystack.map(|value| re.is_match(&value)).unwrap_or(false))
        },
    )
}

// ─── Row parsers ───────────────────────────────────────────────────────────

fn parse_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        privilege: parse_privilege(&row.get::<_, String>(2)?)?,
        status: parse_status(&row.get::<_, String>(3)?)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_journal_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Journal> {
    Ok(Journal {
        id: row.get(0)?,
        name: row.get(1)?,
        author: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
        updated_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entry> {
    Ok(Entry {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        journal: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
        updated_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn parse_privilege(raw: &str) -> rusqlite::Result<Privilege> {
    Privilege::parse(raw).ok_or_else(|| conversion_error(format!("Unknown privilege '{}'", raw)))
}

fn parse_status(raw: &str) -> rusqlite::Result<AccountStatus> {
    AccountStatus::parse(raw)
        .ok_or_else(|| conversion_error(format!("Unknown account status '{}'", raw)))
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| conversion_error(error.to_string()))
}

fn conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::filter::{entry_filter, journal_filter, FilterDescriptor};
    use crate::models::{
        AccountStatus, EntryQuery, JournalQuery, Privilege, SessionRow, UserChanges,
    };
    use chrono::{Duration, Utc};

    fn open_db(dir: &tempfile::TempDir) -> Database {
        Database::new(&dir.path().join("test.db")).expect("db")
    }

    fn seed_user(db: &Database, username: &str) -> crate::models::UserRecord {
        db.insert_user(username, "hash", "salt", Privilege::Member, AccountStatus::Active)
            .expect("insert user")
    }

    fn paged_journal_query() -> JournalQuery {
        JournalQuery {
            index: Some(0),
            limit: Some(50),
            ..JournalQuery::default()
        }
    }

    #[test]
    fn duplicate_username_is_a_conflict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        seed_user(&db, "alice");

        let error = db
            .insert_user("alice", "h", "s", Privilege::Member, AccountStatus::Active)
            .expect_err("duplicate");
        assert!(matches!(error, crate::errors::AppError::Conflict(_)));
    }

    #[test]
    fn journal_listing_applies_exact_and_regex_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");

        db.insert_journal("Diary", &alice.id).expect("insert");
        db.insert_journal("Work Log", &alice.id).expect("insert");

        let exact = JournalQuery {
            name: Some("Diary".to_string()),
            ..paged_journal_query()
        };
        let filter = journal_filter(&exact).expect("filter");
        let found = db.list_journals(&filter, None).expect("list");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Diary");

        // Regex filters are case-insensitive pattern matches.
        let pattern = JournalQuery {
            name_regex: Some("work".to_string()),
            ..paged_journal_query()
        };
        let filter = journal_filter(&pattern).expect("filter");
        let found = db.list_journals(&filter, None).expect("list");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Work Log");
    }

    #[test]
    fn author_scope_restricts_journal_listing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");

        db.insert_journal("Alice Diary", &alice.id).expect("insert");
        db.insert_journal("Bob Diary", &bob.id).expect("insert");

        let filter = journal_filter(&paged_journal_query()).expect("filter");
        let scoped = db.list_journals(&filter, Some(&alice.id)).expect("list");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].author, alice.id);
    }

    #[test]
    fn one_sided_date_bound_excludes_the_boundary_row() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let journal = db.insert_journal("Diary", &alice.id).expect("insert");

        let boundary = journal.created_at.to_rfc3339();

        // Only `start`: strict lower bound, the row itself is excluded.
        let start_only = JournalQuery {
            created_at_start: Some(boundary.clone()),
            ..paged_journal_query()
        };
        let filter = journal_filter(&start_only).expect("filter");
        assert!(db.list_journals(&filter, None).expect("list").is_empty());

        // Both bounds: inclusive, the boundary row comes back.
        let both = JournalQuery {
            created_at_start: Some(boundary.clone()),
            created_at_end: Some(boundary),
            ..paged_journal_query()
        };
        let filter = journal_filter(&both).expect("filter");
        assert_eq!(db.list_journals(&filter, None).expect("list").len(), 1);
    }

    #[test]
    fn entry_listing_scopes_by_parent_journal_owner() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let alice_journal = db.insert_journal("Alice Diary", &alice.id).expect("insert");
        let bob_journal = db.insert_journal("Bob Diary", &bob.id).expect("insert");

        db.insert_entry(Some("first"), "alice text", &alice_journal.id)
            .expect("insert");
        db.insert_entry(None, "bob text", &bob_journal.id).expect("insert");

        let query = EntryQuery {
            index: Some(0),
            limit: Some(10),
            ..EntryQuery::default()
        };
        let filter = entry_filter(&query).expect("filter");

        let all = db.list_entries(&filter, None).expect("list");
        assert_eq!(all.len(), 2);

        let scoped = db.list_entries(&filter, Some(&alice.id)).expect("list");
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].body, "alice text");
    }

    #[test]
    fn update_refreshes_updated_at_even_without_field_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let journal = db.insert_journal("Diary", &alice.id).expect("insert");

        let updated = db
            .update_journal(&journal.id, Some("Diary"))
            .expect("update")
            .expect("exists");
        assert!(updated.updated_at >= journal.updated_at);
        assert_eq!(updated.created_at, journal.created_at);
    }

    #[test]
    fn cascade_steps_remove_entries_then_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let journal = db.insert_journal("Diary", &alice.id).expect("insert");
        for n in 0..3 {
            db.insert_entry(None, &format!("entry {}", n), &journal.id)
                .expect("insert");
        }

        assert_eq!(db.delete_entries_by_journal(&journal.id).expect("delete"), 3);
        assert_eq!(db.count_entries_by_journal(&journal.id).expect("count"), 0);
        assert_eq!(db.delete_journal(&journal.id).expect("delete"), 1);
        assert!(db.get_journal(&journal.id).expect("get").is_none());
    }

    #[test]
    fn bulk_entry_delete_honors_filter_predicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        let journal = db.insert_journal("Diary", &alice.id).expect("insert");
        let other = db.insert_journal("Other", &alice.id).expect("insert");
        db.insert_entry(None, "keep", &other.id).expect("insert");
        db.insert_entry(None, "drop 1", &journal.id).expect("insert");
        db.insert_entry(None, "drop 2", &journal.id).expect("insert");

        let query = EntryQuery {
            journal: Some(journal.id.clone()),
            ..EntryQuery::default()
        };
        let filter = crate::filter::entry_scope_filter(&query).expect("filter");
        assert_eq!(db.delete_entries(&filter).expect("delete"), 2);
        assert_eq!(db.count_entries_by_journal(&other.id).expect("count"), 1);
    }

    #[test]
    fn session_round_trip_and_expiry_purge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");

        let now = Utc::now();
        let live = SessionRow {
            token_hash: "live-hash".to_string(),
            user_id: alice.id.clone(),
            created_at: now,
            expires_at: now + Duration::hours(1),
        };
        let stale = SessionRow {
            token_hash: "stale-hash".to_string(),
            user_id: alice.id.clone(),
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
        };
        db.insert_session(&live).expect("insert");
        db.insert_session(&stale).expect("insert");

        assert_eq!(db.purge_expired_sessions(now).expect("purge"), 1);
        assert!(db.get_session("stale-hash").expect("get").is_none());
        assert!(db.get_session("live-hash").expect("get").is_some());
    }

    #[test]
    fn user_update_applies_only_present_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");

        let changes = UserChanges {
            status: Some(AccountStatus::Suspended),
            ..UserChanges::default()
        };
        let updated = db
            .update_user(&alice.id, &changes)
            .expect("update")
            .expect("exists");
        assert_eq!(updated.status, AccountStatus::Suspended);
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.privilege, Privilege::Member);
    }

    #[test]
    fn listing_without_page_returns_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open_db(&dir);
        let alice = seed_user(&db, "alice");
        db.insert_journal("One", &alice.id).expect("insert");
        db.insert_journal("Two", &alice.id).expect("insert");

        let found = db
            .list_journals(&FilterDescriptor::default(), None)
            .expect("list");
        assert_eq!(found.len(), 2);
    }
}
