//! Account service routes
//!
//! Public routes cover the password-reset flow (the caller has lost their
//! session); everything else sits behind the JWT middleware. Every
//! notification email is sent after the state change commits and never
//! affects the response.

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::{
    AppState,
    error::ApiError,
    middleware::{AuthUser, auth_middleware},
    models::UserSettings,
    repositories::token::generate_code,
    validation,
};

/// Request to change the password of the authenticated user
#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Request for a password-reset code
#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Confirmation of a password reset with the emailed code
#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub otp: String,
    pub new_password: String,
}

/// Request for an email-change code
#[derive(Deserialize)]
pub struct EmailChangeRequest {
    pub new_email: String,
}

/// Confirmation of an email change with the emailed code
#[derive(Deserialize)]
pub struct EmailChangeConfirm {
    pub new_email: String,
    pub otp: String,
}

/// Account deletion, re-authenticated with the current password
#[derive(Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

/// Create the router for the account service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/password/change", post(change_password))
        .route("/email/change/request", post(request_email_change))
        .route("/email/change/confirm", post(confirm_email_change))
        .route("/settings", get(get_settings))
        .route("/settings", put(update_settings))
        .route("/account", delete(delete_account))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/password/reset/request", post(request_password_reset))
        .route("/password/reset/confirm", post(confirm_password_reset))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "account-service"
    }))
}

/// Change the authenticated user's password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_new_password(&payload.new_password).map_err(ApiError::Validation)?;

    let user = state
        .user_repository
        .find_by_id(auth.id)
        .await
        .map_err(|e| {
            error!("Failed to load user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::NotFound)?;

    let matches = state
        .user_repository
        .verify_password(&user, &payload.current_password)
        .map_err(|e| {
            error!("Failed to verify password for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    if !matches {
        return Err(ApiError::InvalidCredentials);
    }

    state
        .user_repository
        .update_password(user.id, &payload.new_password)
        .await
        .map_err(|e| {
            error!("Failed to update password for user {}: {}", user.id, e);
            ApiError::InternalServerError
        })?;

    state.mailer.send_async(
        user.email,
        "Your password was changed".to_string(),
        format!(
            "Hi {},\n\nThe password for your Stratus account was just changed.\n\
             If this wasn't you, reset your password immediately.\n",
            user.name
        ),
    );

    Ok(Json(json!({"message": "Password updated successfully"})))
}

/// Request a password-reset code
///
/// Responds 200 whether or not the address maps to an account, so the
/// endpoint cannot be used to probe for registered emails.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_email(&payload.email).map_err(ApiError::Validation)?;

    let rate_key = format!("password-reset:{}", payload.email);
    if !state.rate_limiter.is_allowed(&rate_key).await {
        return Err(ApiError::TooManyRequests);
    }

    let user = state
        .user_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up email for reset: {}", e);
            ApiError::InternalServerError
        })?;

    if let Some(user) = user {
        let code = generate_code();
        state
            .token_repository
            .upsert_password_reset(user.id, &code)
            .await
            .map_err(|e| {
                error!("Failed to store reset code for user {}: {}", user.id, e);
                ApiError::InternalServerError
            })?;

        state.mailer.send_async(
            user.email,
            "Your password reset code".to_string(),
            format!(
                "Hi {},\n\nYour password reset code is: {}\n\n\
                 It expires in 5 minutes. If you didn't request this, ignore this email.\n",
                user.name, code
            ),
        );
    } else {
        info!("Password reset requested for unknown email");
    }

    Ok(Json(json!({
        "message": "If that address matches an account, a reset code has been sent"
    })))
}

/// Confirm a password reset with the emailed code
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_new_password(&payload.new_password).map_err(ApiError::Validation)?;

    let user_id = state
        .token_repository
        .consume_password_reset(&payload.otp)
        .await
        .map_err(|e| {
            error!("Failed to consume reset code: {}", e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::InvalidOrExpired)?;

    state
        .user_repository
        .update_password(user_id, &payload.new_password)
        .await
        .map_err(|e| {
            error!("Failed to update password for user {}: {}", user_id, e);
            ApiError::InternalServerError
        })?;

    if let Ok(Some(user)) = state.user_repository.find_by_id(user_id).await {
        state.mailer.send_async(
            user.email,
            "Your password was reset".to_string(),
            format!(
                "Hi {},\n\nThe password for your Stratus account was just reset.\n\
                 If this wasn't you, contact support.\n",
                user.name
            ),
        );
    }

    Ok(Json(json!({"message": "Password reset successfully"})))
}

/// Request an email-change code, delivered to the new address
pub async fn request_email_change(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<EmailChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_email(&payload.new_email).map_err(ApiError::Validation)?;

    let rate_key = format!("email-change:{}", auth.id);
    if !state.rate_limiter.is_allowed(&rate_key).await {
        return Err(ApiError::TooManyRequests);
    }

    let taken = state
        .user_repository
        .email_taken(&payload.new_email, auth.id)
        .await
        .map_err(|e| {
            error!("Failed to check email uniqueness: {}", e);
            ApiError::InternalServerError
        })?;

    if taken {
        return Err(ApiError::Conflict(
            "Email address is already in use".to_string(),
        ));
    }

    let code = generate_code();
    state
        .token_repository
        .upsert_email_change(auth.id, &payload.new_email, &code)
        .await
        .map_err(|e| {
            error!("Failed to store email change code for {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    state.mailer.send_async(
        payload.new_email,
        "Confirm your new email address".to_string(),
        format!(
            "Your email confirmation code is: {}\n\n\
             It expires in 5 minutes. If you didn't request this, ignore this email.\n",
            code
        ),
    );

    Ok(Json(json!({
        "message": "A confirmation code has been sent to the new address"
    })))
}

/// Confirm an email change with the emailed code
pub async fn confirm_email_change(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<EmailChangeConfirm>,
) -> Result<impl IntoResponse, ApiError> {
    use crate::models::user::EmailChangeOutcome;

    let outcome = state
        .user_repository
        .change_email(auth.id, &payload.new_email, &payload.otp)
        .await
        .map_err(|e| {
            error!("Failed to change email for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    let old_email = match outcome {
        EmailChangeOutcome::Updated { old_email } => old_email,
        EmailChangeOutcome::InvalidToken => return Err(ApiError::InvalidOrExpired),
        EmailChangeOutcome::EmailTaken => {
            return Err(ApiError::Conflict(
                "Email address is already in use".to_string(),
            ));
        }
    };

    state.mailer.send_async(
        old_email,
        "Your email address was changed".to_string(),
        format!(
            "The email address on your Stratus account was changed to {}.\n\
             If this wasn't you, contact support.\n",
            payload.new_email
        ),
    );
    state.mailer.send_async(
        payload.new_email.clone(),
        "Email address confirmed".to_string(),
        "This address now receives notifications for your Stratus account.\n".to_string(),
    );

    Ok(Json(json!({"message": "Email address updated successfully"})))
}

/// Get the authenticated user's settings
pub async fn get_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state.settings_repository.get(auth.id).await.map_err(|e| {
        error!("Failed to load settings for user {}: {}", auth.id, e);
        ApiError::InternalServerError
    })?;

    Ok(Json(settings))
}

/// Replace the authenticated user's settings
pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<UserSettings>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .settings_repository
        .update(auth.id, &payload)
        .await
        .map_err(|e| {
            error!("Failed to update settings for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    Ok(Json(payload))
}

/// Delete the authenticated user's account
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<DeleteAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_repository
        .find_by_id(auth.id)
        .await
        .map_err(|e| {
            error!("Failed to load user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::NotFound)?;

    let matches = state
        .user_repository
        .verify_password(&user, &payload.password)
        .map_err(|e| {
            error!("Failed to verify password for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    if !matches {
        return Err(ApiError::InvalidCredentials);
    }

    state.user_repository.delete(user.id).await.map_err(|e| {
        error!("Failed to delete account {}: {}", user.id, e);
        ApiError::InternalServerError
    })?;

    Ok((
        StatusCode::OK,
        Json(json!({"message": "Account deleted"})),
    ))
}
