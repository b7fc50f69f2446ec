use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_api::auth::{AppState, AppStateInner, AuthService};
use parley_api::messages::MessagingService;
use parley_api::routes;
use parley_store::{
    Database, SqliteConversationStore, SqliteCredentialStore, SqliteSessionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // One SQLite file backs all three stores; the services only see the
    // trait seams.
    let db = Arc::new(Database::open(&PathBuf::from(&db_path))?);
    let credentials = Arc::new(SqliteCredentialStore::new(db.clone()));
    let sessions = Arc::new(SqliteSessionStore::new(db.clone()));
    let conversations = Arc::new(SqliteConversationStore::new(db));

    let state: AppState = Arc::new(AppStateInner {
        auth: AuthService::new(credentials.clone(), sessions.clone()),
        messaging: MessagingService::new(credentials, sessions, conversations),
    });

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
