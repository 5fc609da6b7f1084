//! Account service models

pub mod settings;
pub mod token;
pub mod user;

// Re-export for convenience
pub use settings::UserSettings;
pub use token::{EmailChangeToken, PasswordResetToken};
pub use user::User;
