//! One-time code models for the password-reset and email-change flows
//!
//! Both tables are keyed by `user_id`, so a user holds at most one active
//! code per purpose; requesting a new code replaces the previous one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A pending password-reset code
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordResetToken {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A pending email-change code, bound to the requested new address
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailChangeToken {
    pub user_id: Uuid,
    pub new_email: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
