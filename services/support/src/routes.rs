//! Support service routes
//!
//! Every ticket route requires authentication. A non-admin caller only ever
//! sees their own tickets; a foreign ticket id answers 404 so existence is
//! not leaked. The admin listing is the one place that answers 403.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::{AuthUser, auth_middleware},
    models::{
        MessageOutcome, Ticket, TicketDetail, TicketPriority, TicketStatus, TransitionOutcome,
    },
    state::AppState,
    validation,
};

/// Request to open a new ticket
#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub category: String,
    pub priority: TicketPriority,
    pub message: String,
}

/// Request to append a message to a ticket's thread
#[derive(Deserialize)]
pub struct AddMessageRequest {
    pub message: String,
}

/// Request to close a ticket
#[derive(Deserialize, Default)]
pub struct CloseTicketRequest {
    pub reason: Option<String>,
}

/// Request to reopen a closed ticket
#[derive(Deserialize)]
pub struct ReopenTicketRequest {
    pub reason: String,
}

/// Status/priority filters accepted by the list endpoints
#[derive(Deserialize, Default)]
pub struct TicketListQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl TicketListQuery {
    fn parse(&self) -> Result<(Option<TicketStatus>, Option<TicketPriority>), ApiError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(ApiError::Validation)?;
        let priority = self
            .priority
            .as_deref()
            .map(str::parse)
            .transpose()
            .map_err(ApiError::Validation)?;
        Ok((status, priority))
    }
}

/// Create the router for the support service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/tickets", post(create_ticket))
        .route("/tickets", get(list_tickets))
        .route("/tickets/admin/all", get(admin_list_tickets))
        .route("/tickets/:id", get(get_ticket))
        .route("/tickets/:id/messages", post(add_message))
        .route("/tickets/:id/close", patch(close_ticket))
        .route("/tickets/:id/reopen", patch(reopen_ticket))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "support-service"
    }))
}

/// Load a ticket and enforce the caller's visibility on it
async fn load_visible_ticket(
    state: &AppState,
    auth: &AuthUser,
    ticket_id: Uuid,
) -> Result<Ticket, ApiError> {
    let ticket = state
        .ticket_repository
        .find_by_id(ticket_id)
        .await
        .map_err(|e| {
            error!("Failed to load ticket {}: {}", ticket_id, e);
            ApiError::InternalServerError
        })?
        .ok_or(ApiError::NotFound)?;

    if !auth.is_admin && ticket.user_id != auth.id {
        return Err(ApiError::NotFound);
    }

    Ok(ticket)
}

/// Open a new ticket with its initial message
pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_subject(&payload.subject).map_err(ApiError::Validation)?;
    validation::validate_message(&payload.message).map_err(ApiError::Validation)?;

    let ticket = state
        .ticket_repository
        .create(
            auth.id,
            payload.subject.trim(),
            &payload.category,
            payload.priority,
            payload.message.trim(),
        )
        .await
        .map_err(|e| {
            error!("Failed to create ticket for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    Ok((StatusCode::CREATED, Json(ticket)))
}

/// List the caller's own tickets
pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<TicketListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (status, priority) = query.parse()?;

    let tickets = state
        .ticket_repository
        .list(Some(auth.id), status, priority)
        .await
        .map_err(|e| {
            error!("Failed to list tickets for user {}: {}", auth.id, e);
            ApiError::InternalServerError
        })?;

    Ok(Json(tickets))
}

/// List all tickets plus aggregate counts (admin only)
pub async fn admin_list_tickets(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<TicketListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !auth.is_admin {
        return Err(ApiError::Forbidden);
    }

    let (status, priority) = query.parse()?;

    let tickets = state
        .ticket_repository
        .list(None, status, priority)
        .await
        .map_err(|e| {
            error!("Failed to list all tickets: {}", e);
            ApiError::InternalServerError
        })?;

    let stats = state.ticket_repository.stats().await.map_err(|e| {
        error!("Failed to load ticket stats: {}", e);
        ApiError::InternalServerError
    })?;

    Ok(Json(json!({
        "tickets": tickets,
        "stats": stats,
    })))
}

/// Get a ticket with its thread and status history
pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = load_visible_ticket(&state, &auth, id).await?;

    let messages = state.ticket_repository.messages(ticket.id).await.map_err(|e| {
        error!("Failed to load messages for ticket {}: {}", ticket.id, e);
        ApiError::InternalServerError
    })?;

    let history = state.ticket_repository.history(ticket.id).await.map_err(|e| {
        error!("Failed to load history for ticket {}: {}", ticket.id, e);
        ApiError::InternalServerError
    })?;

    Ok(Json(TicketDetail {
        ticket,
        messages,
        history,
    }))
}

/// Append a message to a ticket's thread
pub async fn add_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_message(&payload.message).map_err(ApiError::Validation)?;

    let ticket = load_visible_ticket(&state, &auth, id).await?;

    let outcome = state
        .ticket_repository
        .add_message(ticket.id, auth.id, payload.message.trim(), auth.is_admin)
        .await
        .map_err(|e| {
            error!("Failed to add message to ticket {}: {}", ticket.id, e);
            ApiError::InternalServerError
        })?;

    match outcome {
        MessageOutcome::Added(message) => Ok((StatusCode::CREATED, Json(message))),
        MessageOutcome::TicketClosed => Err(ApiError::InvalidState(
            "Ticket is closed; reopen it to continue the conversation".to_string(),
        )),
        MessageOutcome::NotFound => Err(ApiError::NotFound),
    }
}

/// Close a ticket
pub async fn close_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CloseTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ticket = load_visible_ticket(&state, &auth, id).await?;

    let outcome = state
        .ticket_repository
        .close(ticket.id, auth.id, payload.reason.as_deref())
        .await
        .map_err(|e| {
            error!("Failed to close ticket {}: {}", ticket.id, e);
            ApiError::InternalServerError
        })?;

    match outcome {
        TransitionOutcome::Done(ticket) => Ok(Json(ticket)),
        TransitionOutcome::InvalidState(status) => Err(ApiError::InvalidState(format!(
            "Cannot close a {} ticket",
            status
        ))),
        TransitionOutcome::NotFound => Err(ApiError::NotFound),
    }
}

/// Reopen a closed ticket
pub async fn reopen_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReopenTicketRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validation::validate_reason(&payload.reason).map_err(ApiError::Validation)?;

    let ticket = load_visible_ticket(&state, &auth, id).await?;

    let outcome = state
        .ticket_repository
        .reopen(ticket.id, auth.id, payload.reason.trim())
        .await
        .map_err(|e| {
            error!("Failed to reopen ticket {}: {}", ticket.id, e);
            ApiError::InternalServerError
        })?;

    match outcome {
        TransitionOutcome::Done(ticket) => Ok(Json(ticket)),
        TransitionOutcome::InvalidState(status) => Err(ApiError::InvalidState(format!(
            "Cannot reopen a {} ticket",
            status
        ))),
        TransitionOutcome::NotFound => Err(ApiError::NotFound),
    }
}
