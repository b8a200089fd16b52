use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use edu_sync::{AppConfig, AuthConfig, BackendMode, DatabaseConfig, StatsConfig};

#[derive(Parser)]
#[command(name = "edu-sync")]
#[command(about = "Role-based academic administration gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        #[arg(long, env = "EDU_SYNC_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Database URL; demo mode is used when unset
        #[arg(long, env = "SURREALDB_URL")]
        db_url: Option<String>,
        /// Force demo mode even if a database URL is set
        #[arg(long, env = "EDU_SYNC_DEMO_MODE")]
        demo: bool,
        /// Shared secret for HS256 session tokens
        #[arg(long, env = "EDU_SYNC_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
        /// JWKS endpoint URL for RS256/ES256 session tokens
        #[arg(long, env = "EDU_SYNC_JWKS_URL")]
        jwks_url: Option<String>,
        #[arg(long, env = "EDU_SYNC_JWT_ISSUER")]
        jwt_issuer: Option<String>,
        #[arg(long, env = "EDU_SYNC_JWT_AUDIENCE")]
        jwt_audience: Option<String>,
        /// Cookie carrying the session token when no bearer header is sent
        #[arg(long, env = "EDU_SYNC_SESSION_COOKIE", default_value = "edu_sync_session")]
        session_cookie: String,
    },
    /// Initialize the database schema
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("edu_sync=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            bind,
            db_url,
            demo,
            jwt_secret,
            jwks_url,
            jwt_issuer,
            jwt_audience,
            session_cookie,
        } => {
            let config = AppConfig {
                backend: BackendMode::select(demo, db_url),
                auth: AuthConfig {
                    jwt_secret,
                    jwt_issuer,
                    jwt_audience,
                    jwks_url,
                    session_cookie,
                    ..Default::default()
                },
                stats: StatsConfig::from_env(),
            };
            info!(
                "Starting edu-sync gateway on {} ({} mode)",
                bind,
                if config.backend.is_demo() { "demo" } else { "live" }
            );

            let app = edu_sync::build_app(&config).await?;
            let listener = tokio::net::TcpListener::bind(&bind).await?;

            info!("Listening on http://{}", bind);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
            info!("Server stopped");
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            let db = edu_sync::create_connection(db_config).await?;
            info!("Initializing database...");
            edu_sync::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
