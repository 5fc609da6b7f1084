use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

mod error;
mod jwt;
mod mailer;
mod middleware;
mod models;
mod rate_limiter;
mod repositories;
mod routes;
mod validation;

use common::database::{DatabaseConfig, init_pool};
use sqlx::PgPool;

use crate::{
    jwt::{JwtConfig, JwtService},
    mailer::{Mailer, MailerConfig},
    rate_limiter::{RateLimiter, RateLimiterConfig},
    repositories::{SettingsRepository, TokenRepository, UserRepository},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub jwt_service: JwtService,
    pub mailer: Mailer,
    pub rate_limiter: RateLimiter,
    pub user_repository: UserRepository,
    pub token_repository: TokenRepository,
    pub settings_repository: SettingsRepository,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting account service");

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if common::database::health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    let jwt_service = JwtService::new(JwtConfig::from_env()?);
    let mailer = Mailer::new(&MailerConfig::from_env())?;
    let rate_limiter = RateLimiter::new(RateLimiterConfig::default());

    let user_repository = UserRepository::new(pool.clone());
    let token_repository = TokenRepository::new(pool.clone());
    let settings_repository = SettingsRepository::new(pool.clone());

    let app_state = AppState {
        db_pool: pool,
        jwt_service,
        mailer,
        rate_limiter,
        user_repository,
        token_repository,
        settings_repository,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let bind_addr =
        std::env::var("ACCOUNT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Account service listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
