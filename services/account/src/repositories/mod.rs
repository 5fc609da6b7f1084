//! Account service repositories

pub mod settings;
pub mod token;
pub mod user;

pub use settings::SettingsRepository;
pub use token::TokenRepository;
pub use user::UserRepository;
