use crate::errors::{AppError, AppResult};
use crate::models::{
    CreateEntryPayload, CreateJournalPayload, EntryQuery, JournalQuery, LoginPayload,
    ProtectedResponse, RegisterPayload, UpdateEntryPayload, UpdateJournalPayload,
    UpdateUserPayload, UserQuery, UserRecord,
};
use crate::service::AppCore;
use crate::session::SESSION_COOKIE;
use axum::extract::{Path, Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub core: AppCore,
    pub session_ttl_seconds: i64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/protected", get(protected))
        .route("/journals", get(list_journals).post(create_journal))
        .route(
            "/journals/{id}",
            get(get_journal).patch(update_journal).delete(delete_journal),
        )
        .route(
            "/entries",
            get(list_entries).post(create_entry).delete(bulk_delete_entries),
        )
        .route(
            "/entries/{id}",
            get(get_entry).patch(update_entry).delete(delete_entry),
        )
        .route("/users", get(list_users))
        .route("/users/{username}", get(get_user).patch(update_user))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Pulls the session token out of the request's Cookie header, if any.
fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

/// Resolves the caller, or None for anonymous requests. The validator
/// decides whether anonymity is acceptable for the operation.
fn principal(state: &AppState, headers: &HeaderMap) -> AppResult<Option<UserRecord>> {
    match session_token(headers) {
        Some(token) => state.core.sessions.resolve(&token),
        None => Ok(None),
    }
}

fn session_cookie(token: &str, max_age: i64) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, token, max_age
    )
}

fn created<T: serde::Serialize>(body: T) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

async fn healthz() -> &'static str {
    "ok"
}

// ─── Auth ───────────────────────────────────────────────────────────────────

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterPayload>,
) -> AppResult<Response> {
    Ok(created(state.core.register(&payload)?))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginPayload>,
) -> AppResult<Response> {
    let outcome = state.core.login(&payload)?;
    let cookie = session_cookie(&outcome.token, state.session_ttl_seconds);
    let body = Json(ProtectedResponse {
        status: 200,
        username: outcome.user.username,
    });
    Ok(([(SET_COOKIE, cookie)], body).into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session_token(&headers) {
        state.core.logout(&token)?;
    }
    let cookie = session_cookie("", 0);
    Ok(([(SET_COOKIE, cookie)], StatusCode::NO_CONTENT).into_response())
}

async fn protected(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let user = principal(&state, &headers)?
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;
    Ok(Json(ProtectedResponse {
        status: 200,
        username: user.username,
    })
    .into_response())
}

// ─── Journals ───────────────────────────────────────────────────────────────

async fn create_journal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateJournalPayload>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(created(state.core.create_journal(user.as_ref(), &payload)?))
}

async fn get_journal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.get_journal(user.as_ref(), &id)?).into_response())
}

async fn list_journals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<JournalQuery>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.list_journals(user.as_ref(), &query)?).into_response())
}

async fn update_journal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateJournalPayload>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.update_journal(user.as_ref(), &id, &payload)?).into_response())
}

async fn delete_journal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.delete_journal(user.as_ref(), &id)?).into_response())
}

// ─── Entries ────────────────────────────────────────────────────────────────

async fn create_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateEntryPayload>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(created(state.core.create_entry(user.as_ref(), &payload)?))
}

async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.get_entry(user.as_ref(), &id)?).into_response())
}

async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EntryQuery>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.list_entries(user.as_ref(), &query)?).into_response())
}

async fn update_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateEntryPayload>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.update_entry(user.as_ref(), &id, &payload)?).into_response())
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.delete_entry(user.as_ref(), &id)?).into_response())
}

async fn bulk_delete_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EntryQuery>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.bulk_delete_entries(user.as_ref(), &query)?).into_response())
}

// ─── Users ──────────────────────────────────────────────────────────────────

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.get_user(user.as_ref(), &username)?).into_response())
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UserQuery>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    Ok(Json(state.core.list_users(user.as_ref(), &query)?).into_response())
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserPayload>,
) -> AppResult<Response> {
    let user = principal(&state, &headers)?;
    let token = session_token(&headers);
    Ok(Json(state.core.update_user(
        user.as_ref(),
        &username,
        &payload,
        token.as_deref(),
    )?)
    .into_response())
}
