//! User model and related functionality

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of an email-change confirmation
///
/// The repository resolves the whole confirmation in one transaction; the
/// handler only has to map these cases to responses.
#[derive(Debug)]
pub enum EmailChangeOutcome {
    /// Email updated; the previous address, for the courtesy notification
    Updated { old_email: String },
    /// No stored token matched the (user, new_email, code) triple unexpired
    InvalidToken,
    /// Another account claimed the address between request and confirm
    EmailTaken,
}
