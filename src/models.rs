use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    Member,
    Admin,
}

impl Privilege {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

impl AccountStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub privilege: Privilege,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_admin(&self) -> bool {
        self.privilege == Privilege::Admin
    }
}

/// Credential row for login checks. Never serialized to the wire.
#[derive(Debug, Clone)]
pub struct UserAuthRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    pub status: AccountStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Journal {
    pub id: String,
    pub name: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub title: Option<String>,
    pub body: String,
    pub journal: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ─── Request payloads ───────────────────────────────────────────────────────
//
// Required fields stay `Option` so the validator can report the missing
// field by name instead of the deserializer rejecting the body outright.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJournalPayload {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateJournalPayload {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub journal: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryPayload {
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserPayload {
    pub username: Option<String>,
    pub password: Option<String>,
    pub privilege: Option<String>,
    pub status: Option<String>,
}

/// Validated user changes as the repository applies them.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub credential: Option<(String, String)>,
    pub privilege: Option<Privilege>,
    pub status: Option<AccountStatus>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.credential.is_none()
            && self.privilege.is_none()
            && self.status.is_none()
    }
}

// ─── Raw list-query parameters ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalQuery {
    pub name: Option<String>,
    pub name_regex: Option<String>,
    pub author: Option<String>,
    pub author_regex: Option<String>,
    pub created_at_start: Option<String>,
    pub created_at_end: Option<String>,
    pub updated_at_start: Option<String>,
    pub updated_at_end: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub index: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryQuery {
    pub title: Option<String>,
    pub title_regex: Option<String>,
    pub body: Option<String>,
    pub body_regex: Option<String>,
    pub journal: Option<String>,
    pub created_at_start: Option<String>,
    pub created_at_end: Option<String>,
    pub updated_at_start: Option<String>,
    pub updated_at_end: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub index: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    pub username: Option<String>,
    pub username_regex: Option<String>,
    pub privilege: Option<String>,
    pub status: Option<String>,
    pub created_at_start: Option<String>,
    pub created_at_end: Option<String>,
    pub updated_at_start: Option<String>,
    pub updated_at_end: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub index: Option<i64>,
    pub limit: Option<i64>,
}

// ─── Response envelopes ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse<T> {
    pub status: u16,
    pub collection: Vec<T>,
    pub count: usize,
}

impl<T> CollectionResponse<T> {
    pub fn ok(collection: Vec<T>) -> Self {
        let count = collection.len();
        Self {
            status: 200,
            collection,
            count,
        }
    }

    pub fn created(collection: Vec<T>) -> Self {
        let count = collection.len();
        Self {
            status: 201,
            collection,
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub status: u16,
    pub count: u64,
}

impl DeleteResponse {
    pub fn ok(count: u64) -> Self {
        Self { status: 200, count }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedResponse {
    pub status: u16,
    pub username: String,
}
