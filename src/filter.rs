use crate::errors::{AppError, AppResult};
use crate::models::{EntryQuery, JournalQuery, SortOrder, UserQuery};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    Exact(String),
    /// Case-insensitive regex, validated at build time.
    Pattern(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBound {
    pub at: DateTime<Utc>,
    pub bound: Bound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub lower: Option<DateBound>,
    pub upper: Option<DateBound>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub index: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(self) -> i64 {
        self.index * self.limit
    }
}

/// Normalized list-query descriptor. Column names come from the
/// per-resource whitelists below, never from client input.
#[derive(Debug, Clone, Default)]
pub struct FilterDescriptor {
    pub matches: Vec<(&'static str, FieldMatch)>,
    pub created_at: Option<DateRange>,
    pub updated_at: Option<DateRange>,
    pub sort: Option<(&'static str, SortOrder)>,
    pub page: Option<Page>,
}

const JOURNAL_SORT_KEYS: &[(&str, &'static str)] = &[
    ("id", "id"),
    ("name", "name"),
    ("author", "author"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

const ENTRY_SORT_KEYS: &[(&str, &'static str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("body", "body"),
    ("journal", "journal"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

const USER_SORT_KEYS: &[(&str, &'static str)] = &[
    ("id", "id"),
    ("username", "username"),
    ("privilege", "privilege"),
    ("status", "status"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

pub fn journal_filter(query: &JournalQuery) -> AppResult<FilterDescriptor> {
    let mut matches = Vec::new();
    push_text_match(&mut matches, "name", &query.name, &query.name_regex, "name")?;
    push_text_match(
        &mut matches,
        "author",
        &query.author,
        &query.author_regex,
        "author",
    )?;

    Ok(FilterDescriptor {
        matches,
        created_at: date_range(
            &query.created_at_start,
            &query.created_at_end,
            "createdAtStart",
            "createdAtEnd",
        )?,
        updated_at: date_range(
            &query.updated_at_start,
            &query.updated_at_end,
            "updatedAtStart",
            "updatedAtEnd",
        )?,
        sort: sort_pair(&query.sort_by, &query.order, JOURNAL_SORT_KEYS)?,
        page: Some(page(query.index, query.limit)?),
    })
}

pub fn entry_filter(query: &EntryQuery) -> AppResult<FilterDescriptor> {
    let mut descriptor = entry_scope_filter(query)?;
    descriptor.sort = sort_pair(&query.sort_by, &query.order, ENTRY_SORT_KEYS)?;
    descriptor.page = Some(page(query.index, query.limit)?);
    Ok(descriptor)
}

/// Entry predicates without sort/pagination, for bulk deletes.
pub fn entry_scope_filter(query: &EntryQuery) -> AppResult<FilterDescriptor> {
    let mut matches = Vec::new();
    push_text_match(&mut matches, "title", &query.title, &query.title_regex, "title")?;
    push_text_match(&mut matches, "body", &query.body, &query.body_regex, "body")?;
    if let Some(journal) = &query.journal {
        matches.push(("journal", FieldMatch::Exact(journal.clone())));
    }

    Ok(FilterDescriptor {
        matches,
        created_at: date_range(
            &query.created_at_start,
            &query.created_at_end,
            "createdAtStart",
            "createdAtEnd",
        )?,
        updated_at: date_range(
            &query.updated_at_start,
            &query.updated_at_end,
            "updatedAtStart",
            "updatedAtEnd",
        )?,
        sort: None,
        page: None,
    })
}

pub fn user_filter(query: &UserQuery) -> AppResult<FilterDescriptor> {
    let mut matches = Vec::new();
    push_text_match(
        &mut matches,
        "username",
        &query.username,
        &query.username_regex,
        "username",
    )?;
    if let Some(privilege) = &query.privilege {
        let parsed = crate::models::Privilege::parse(privilege).ok_or_else(|| {
            AppError::BadRequest(format!("'{}' is not a valid privilege", privilege))
        })?;
        matches.push(("privilege", FieldMatch::Exact(parsed.as_str().to_string())));
    }
    if let Some(status) = &query.status {
        let parsed = crate::models::AccountStatus::parse(status).ok_or_else(|| {
            AppError::BadRequest(format!("'{}' is not a valid account status", status))
        })?;
        matches.push(("status", FieldMatch::Exact(parsed.as_str().to_string())));
    }

    Ok(FilterDescriptor {
        matches,
        created_at: date_range(
            &query.created_at_start,
            &query.created_at_end,
            "createdAtStart",
            "createdAtEnd",
        )?,
        updated_at: date_range(
            &query.updated_at_start,
            &query.updated_at_end,
            "updatedAtStart",
            "updatedAtEnd",
        )?,
        sort: sort_pair(&query.sort_by, &query.order, USER_SORT_KEYS)?,
        page: Some(page(query.index, query.limit)?),
    })
}

fn push_text_match(
    matches: &mut Vec<(&'static str, FieldMatch)>,
    column: &'static str,
    exact: &Option<String>,
    pattern: &Option<String>,
    param: &str,
) -> AppResult<()> {
    match (exact, pattern) {
        (Some(_), Some(_)) => Err(AppError::BadRequest(format!(
            "'{}' and '{}Regex' are mutually exclusive",
            param, param
        ))),
        (Some(value), None) => {
            matches.push((column, FieldMatch::Exact(value.clone())));
            Ok(())
        }
        (None, Some(raw)) => {
            regex::RegexBuilder::new(raw)
                .case_insensitive(true)
                .build()
                .map_err(|error| {
                    AppError::BadRequest(format!(
                        "invalid regular expression for '{}Regex': {}",
                        param, error
                    ))
                })?;
            matches.push((column, FieldMatch::Pattern(raw.clone())));
            Ok(())
        }
        (None, None) => Ok(()),
    }
}

// A one-sided range is a strict bound; both sides together are
// inclusive on both ends. Matches the historical behavior and is
// pinned by tests below.
fn date_range(
    start: &Option<String>,
    end: &Option<String>,
    start_param: &str,
    end_param: &str,
) -> AppResult<Option<DateRange>> {
    let start = start
        .as_ref()
        .map(|raw| parse_date(raw, start_param))
        .transpose()?;
    let end = end
        .as_ref()
        .map(|raw| parse_date(raw, end_param))
        .transpose()?;

    Ok(match (start, end) {
        (None, None) => None,
        (Some(lower), Some(upper)) => Some(DateRange {
            lower: Some(DateBound {
                at: lower,
                bound: Bound::Inclusive,
            }),
            upper: Some(DateBound {
                at: upper,
                bound: Bound::Inclusive,
            }),
        }),
        (Some(lower), None) => Some(DateRange {
            lower: Some(DateBound {
                at: lower,
                bound: Bound::Exclusive,
            }),
            upper: None,
        }),
        (None, Some(upper)) => Some(DateRange {
            lower: None,
            upper: Some(DateBound {
                at: upper,
                bound: Bound::Exclusive,
            }),
        }),
    })
}

fn parse_date(raw: &str, param: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            AppError::BadRequest(format!("'{}' is not a valid ISO-8601 date: {}", param, raw))
        })
}

fn sort_pair(
    sort_by: &Option<String>,
    order: &Option<String>,
    allowed: &[(&str, &'static str)],
) -> AppResult<Option<(&'static str, SortOrder)>> {
    match (sort_by, order) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(AppError::BadRequest(
            "'sortBy' requires a matching 'order'".to_string(),
        )),
        (None, Some(_)) => Err(AppError::BadRequest(
            "'order' requires a matching 'sortBy'".to_string(),
        )),
        (Some(key), Some(direction)) => {
            let column = allowed
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, column)| *column)
                .ok_or_else(|| {
                    AppError::BadRequest(format!("'{}' is not a sortable field", key))
                })?;
            let order = SortOrder::parse(direction).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "'order' must be 'asc' or 'desc', got '{}'",
                    direction
                ))
            })?;
            Ok(Some((column, order)))
        }
    }
}

fn page(index: Option<i64>, limit: Option<i64>) -> AppResult<Page> {
    let index = index.ok_or_else(|| {
        AppError::BadRequest("'index' is required when listing".to_string())
    })?;
    let limit = limit.ok_or_else(|| {
        AppError::BadRequest("'limit' is required when listing".to_string())
    })?;
    if index < 0 {
        return Err(AppError::BadRequest(
            "'index' must be zero or greater".to_string(),
        ));
    }
    if limit <= 0 {
        return Err(AppError::BadRequest(
            "'limit' must be greater than zero".to_string(),
        ));
    }
    Ok(Page { index, limit })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryQuery;

    fn paged_entry_query() -> EntryQuery {
        EntryQuery {
            index: Some(0),
            limit: Some(20),
            ..EntryQuery::default()
        }
    }

    #[test]
    fn exact_and_regex_for_same_field_is_rejected() {
        let query = EntryQuery {
            title: Some("bar".to_string()),
            title_regex: Some("foo".to_string()),
            ..paged_entry_query()
        };
        let error = entry_filter(&query).expect_err("mutually exclusive");
        assert!(matches!(error, AppError::BadRequest(_)));
        assert!(error.message().contains("titleRegex"));
    }

    #[test]
    fn invalid_regex_is_a_bad_request_naming_the_param() {
        let query = EntryQuery {
            body_regex: Some("(unclosed".to_string()),
            ..paged_entry_query()
        };
        let error = entry_filter(&query).expect_err("invalid regex");
        assert!(error.message().contains("bodyRegex"));
    }

    #[test]
    fn unparseable_date_names_the_field() {
        let query = EntryQuery {
            created_at_start: Some("not-a-date".to_string()),
            ..paged_entry_query()
        };
        let error = entry_filter(&query).expect_err("bad date");
        assert!(matches!(error, AppError::BadRequest(_)));
        assert!(error.message().contains("createdAtStart"));
    }

    #[test]
    fn one_sided_ranges_are_exclusive_and_two_sided_inclusive() {
        let start_only = EntryQuery {
            created_at_start: Some("2026-01-01T00:00:00Z".to_string()),
            ..paged_entry_query()
        };
        let descriptor = entry_filter(&start_only).expect("filter");
        let range = descriptor.created_at.expect("range");
        assert_eq!(range.lower.expect("lower").bound, Bound::Exclusive);
        assert!(range.upper.is_none());

        let end_only = EntryQuery {
            created_at_end: Some("2026-01-31T00:00:00Z".to_string()),
            ..paged_entry_query()
        };
        let descriptor = entry_filter(&end_only).expect("filter");
        let range = descriptor.created_at.expect("range");
        assert_eq!(range.upper.expect("upper").bound, Bound::Exclusive);
        assert!(range.lower.is_none());

        let both = EntryQuery {
            created_at_start: Some("2026-01-01T00:00:00Z".to_string()),
            created_at_end: Some("2026-01-31T00:00:00Z".to_string()),
            ..paged_entry_query()
        };
        let descriptor = entry_filter(&both).expect("filter");
        let range = descriptor.created_at.expect("range");
        assert_eq!(range.lower.expect("lower").bound, Bound::Inclusive);
        assert_eq!(range.upper.expect("upper").bound, Bound::Inclusive);
    }

    #[test]
    fn sort_key_and_order_must_come_together() {
        let only_key = EntryQuery {
            sort_by: Some("title".to_string()),
            ..paged_entry_query()
        };
        assert!(entry_filter(&only_key).is_err());

        let only_order = EntryQuery {
            order: Some("asc".to_string()),
            ..paged_entry_query()
        };
        assert!(entry_filter(&only_order).is_err());

        let both = EntryQuery {
            sort_by: Some("title".to_string()),
            order: Some("asc".to_string()),
            ..paged_entry_query()
        };
        let descriptor = entry_filter(&both).expect("filter");
        assert_eq!(descriptor.sort, Some(("title", SortOrder::Asc)));
    }

    #[test]
    fn unknown_sort_key_is_rejected() {
        let query = EntryQuery {
            sort_by: Some("password".to_string()),
            order: Some("asc".to_string()),
            ..paged_entry_query()
        };
        let error = entry_filter(&query).expect_err("unknown key");
        assert!(error.message().contains("sortable"));
    }

    #[test]
    fn listing_requires_both_index_and_limit() {
        let no_limit = EntryQuery {
            index: Some(0),
            ..EntryQuery::default()
        };
        assert!(entry_filter(&no_limit).is_err());

        let no_index = EntryQuery {
            limit: Some(10),
            ..EntryQuery::default()
        };
        assert!(entry_filter(&no_index).is_err());

        let zero_limit = EntryQuery {
            index: Some(0),
            limit: Some(0),
            ..EntryQuery::default()
        };
        assert!(entry_filter(&zero_limit).is_err());

        let negative_index = EntryQuery {
            index: Some(-1),
            limit: Some(10),
            ..EntryQuery::default()
        };
        assert!(entry_filter(&negative_index).is_err());
    }

    #[test]
    fn user_filter_checks_enum_membership() {
        let query = UserQuery {
            privilege: Some("overlord".to_string()),
            index: Some(0),
            limit: Some(10),
            ..UserQuery::default()
        };
        let error = user_filter(&query).expect_err("bad privilege");
        assert!(matches!(error, AppError::BadRequest(_)));

        let query = UserQuery {
            status: Some("active".to_string()),
            index: Some(0),
            limit: Some(10),
            ..UserQuery::default()
        };
        let descriptor = user_filter(&query).expect("filter");
        assert_eq!(
            descriptor.matches,
            vec![("status", FieldMatch::Exact("active".to_string()))]
        );
    }

    #[test]
    fn bulk_scope_filter_skips_pagination() {
        let query = EntryQuery {
            journal: Some("j-1".to_string()),
            ..EntryQuery::default()
        };
        let descriptor = entry_scope_filter(&query).expect("scope filter");
        assert!(descriptor.page.is_none());
        assert_eq!(
            descriptor.matches,
            vec![("journal", FieldMatch::Exact("j-1".to_string()))]
        );
    }
}
