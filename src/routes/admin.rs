use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::WithRejection;
use chrono::{SecondsFormat, Utc};
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::models::{
    DataResponse, LoginRequest, LoginResponse, MessageResponse, SetupRequest, UserInfo,
    WaitlistEntry,
};
use crate::routes::auth::AdminAuth;
use crate::setup::{self, SetupError};
use crate::state::AppState;
use crate::storage::StorageError;
use crate::validation;

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const ALREADY_SET_UP: &str = "Admin account already exists";

// ─── Session ───

/// POST /api/admin/login
pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<Json<LoginResponse>, ApiError> {
    let creds = validation::validate_login(req)?;

    let user = state
        .storage
        .verify_admin_user(&creds.username, &creds.password)
        .await
        .map_err(|e| ApiError::internal("Login failed. Please try again later.", e))?
        .ok_or(ApiError::Unauthorized(INVALID_CREDENTIALS))?;

    let session = state.sessions.create_session(user.id).await;
    tracing::info!("Admin {} logged in", user.id);

    Ok(Json(LoginResponse {
        success: true,
        token: session.token,
        user: user.into(),
    }))
}

/// POST /api/admin/logout
pub async fn logout(State(state): State<AppState>, admin: AdminAuth) -> Json<MessageResponse> {
    state.sessions.revoke(&admin.token).await;
    Json(MessageResponse::ok("Logged out"))
}

/// GET /api/admin/me
pub async fn me(
    State(state): State<AppState>,
    admin: AdminAuth,
) -> Result<Json<DataResponse<UserInfo>>, ApiError> {
    let user = state
        .storage
        .get_user(admin.user_id)
        .await
        .map_err(|e| ApiError::internal("Failed to load account.", e))?
        .ok_or(ApiError::Unauthorized("Unauthorized"))?;

    Ok(Json(DataResponse::new(user.into())))
}

// ─── Waitlist management ───

/// GET /api/admin/waitlist
pub async fn list_waitlist(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<Json<DataResponse<Vec<WaitlistEntry>>>, ApiError> {
    let entries = state
        .storage
        .get_all_waitlist_entries()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch waitlist entries.", e))?;

    Ok(Json(DataResponse::new(entries)))
}

/// DELETE /api/admin/waitlist/{id}: succeeds whether or not the entry existed.
pub async fn delete_waitlist_entry(
    State(state): State<AppState>,
    admin: AdminAuth,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id: i32 = id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid waitlist entry ID".into()))?;

    state
        .storage
        .delete_waitlist_entry(id)
        .await
        .map_err(|e| ApiError::internal("Failed to delete waitlist entry.", e))?;

    tracing::info!("Admin {} deleted waitlist entry {id}", admin.user_id);
    Ok(Json(MessageResponse::ok("Waitlist entry deleted")))
}

/// GET /api/admin/export: the waitlist as a CSV download.
pub async fn export_waitlist(
    State(state): State<AppState>,
    _admin: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state
        .storage
        .get_all_waitlist_entries()
        .await
        .map_err(|e| ApiError::internal("Failed to export waitlist.", e))?;

    let filename = format!("waitlist-export-{}.csv", Utc::now().format("%Y-%m-%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        waitlist_csv(&entries),
    ))
}

fn waitlist_csv(entries: &[WaitlistEntry]) -> String {
    let mut out = String::from("ID,Full name,Email,Created at\n");
    for entry in entries {
        let row = [
            entry.id.to_string(),
            csv_field(&entry.full_name),
            csv_field(&entry.email),
            entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Quote per RFC 4180 when the value would otherwise break the row. Cells a
/// spreadsheet would read as a formula get a leading `'`.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(['=', '+', '-', '@']) {
        format!("'{value}")
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

// ─── First-run setup ───

/// POST /api/admin/setup: creates the first admin, then refuses forever after.
pub async fn setup(
    State(state): State<AppState>,
    body: Result<Json<SetupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<UserInfo>>), ApiError> {
    let _guard = state.setup_lock.lock().await;

    let configured = state
        .storage
        .has_admin()
        .await
        .map_err(|e| ApiError::internal("Failed to create admin account.", e))?;
    if configured {
        return Err(ApiError::Forbidden(ALREADY_SET_UP));
    }

    let Json(req) = body?;

    if let Some(expected) = state.setup_key.as_deref() {
        let provided = req.setup_key.as_deref().unwrap_or("");
        if !bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            tracing::warn!("Admin setup attempted with a wrong setup key");
            return Err(ApiError::Forbidden("Invalid setup key"));
        }
    }

    let creds = validation::validate_setup(req)?;

    let user = setup::claim_first_admin(state.storage.as_ref(), &creds.username, &creds.password)
        .await
        .map_err(|e| match e {
            SetupError::AlreadyConfigured => ApiError::Forbidden(ALREADY_SET_UP),
            SetupError::Storage(StorageError::DuplicateUsername) => {
                ApiError::Conflict("Username is already taken")
            }
            SetupError::Storage(e) => ApiError::internal("Failed to create admin account.", e),
        })?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(user.into()))))
}
