//! Application state shared across handlers

use sqlx::PgPool;

use crate::{middleware::TokenVerifier, repositories::TicketRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub token_verifier: TokenVerifier,
    pub ticket_repository: TicketRepository,
}
