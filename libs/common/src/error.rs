//! Custom error types for the common library
//!
//! This module defines the database error taxonomy shared by the account
//! and support services, plus helpers for classifying driver errors that
//! the services must react to (unique-constraint violations).

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Check whether a sqlx error is a unique-constraint violation.
///
/// Postgres reports these with SQLSTATE 23505. The account service relies on
/// this to resolve the race between two email changes claiming the same
/// address: the loser's update trips the unique index on `users.email` and
/// must be surfaced as a conflict rather than a generic failure.
pub fn is_unique_violation(err: &SqlxError) -> bool {
    match err {
        SqlxError::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
