use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::WithRejection;

use crate::error::ApiError;
use crate::models::{CountResponse, RegisterResponse, WaitlistRequest};
use crate::state::AppState;
use crate::storage::StorageError;
use crate::validation;

const ALREADY_REGISTERED: &str = "This email is already registered on our waitlist.";
const REGISTER_FAILED: &str = "Failed to register to the waitlist. Please try again later.";

/// POST /api/waitlist/register
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<WaitlistRequest>, ApiError>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let entry = validation::validate_waitlist(req)?;

    // Fast path only; the unique constraint decides.
    let existing = state
        .storage
        .get_waitlist_entry_by_email(&entry.email)
        .await
        .map_err(|e| ApiError::internal(REGISTER_FAILED, e))?;
    if existing.is_some() {
        return Err(ApiError::Conflict(ALREADY_REGISTERED));
    }

    let created = state
        .storage
        .create_waitlist_entry(&entry.full_name, &entry.email)
        .await
        .map_err(|e| match e {
            StorageError::DuplicateEmail => ApiError::Conflict(ALREADY_REGISTERED),
            other => ApiError::internal(REGISTER_FAILED, other),
        })?;

    tracing::info!("New waitlist entry {}", created.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "Successfully added to waitlist!",
            data: created,
        }),
    ))
}

/// GET /api/waitlist/count
pub async fn count(State(state): State<AppState>) -> Result<Json<CountResponse>, ApiError> {
    let count = state
        .storage
        .get_waitlist_count()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch waitlist count.", e))?;

    Ok(Json(CountResponse {
        success: true,
        count,
    }))
}
