use axum::extract::State;
use axum::{http::Method, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod config;
mod database;
mod errors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use config::AppConfig;
use database::connection::{ensure_user_indexes, get_db_client};
use services::mail_service::MailService;
use services::otp_store::MongoOtpStore;
use services::reset_password::ResetPasswordService;
use services::user_directory::MongoUserDirectory;
use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env();

    let db = get_db_client(&config).await;
    let app_state = initialize_app_state(db, &config).await;

    let app = build_router(app_state);
    start_server(app, &config).await;
}

async fn initialize_app_state(db: mongodb::Database, config: &AppConfig) -> AppState {
    if let Err(e) = ensure_user_indexes(&db).await {
        tracing::warn!("Failed to create user indexes: {}", e);
    }

    let otp_store = MongoOtpStore::new(&db);
    if let Err(e) = otp_store.ensure_indexes().await {
        tracing::warn!("Failed to create reset_otps indexes: {}", e);
    }

    if config.mail_api_key.is_empty() {
        tracing::warn!("MAIL_API_KEY is not set, OTP mails will fail to send");
    }

    let reset_password = Arc::new(ResetPasswordService::new(
        Arc::new(MongoUserDirectory::new(&db)),
        Arc::new(otp_store),
        Arc::new(MailService::new(config)),
    ));

    tracing::info!("Reset-password service initialized");

    AppState::new(db, config.jwt_secret.clone(), reset_password)
}

fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .allow_credentials(false);

    Router::new()
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .nest("/api/auth", routes::auth::routes())
        .nest("/api/profile", routes::user_profile::routes(app_state.clone()))
        .nest("/api/username", routes::username::routes())
        .nest("/api/password-reset", routes::password_reset::routes())
        .fallback(no_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn start_server(app: Router, config: &AppConfig) {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST/PORT must form a valid socket address");

    tracing::info!("Server starting on {}", addr);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            axum::serve(listener, app).await.unwrap();
        }
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    }
}

async fn ping() -> Json<Value> {
    Json(json!({ "pong": "Hello World!" }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    use mongodb::bson::doc;

    let db_status = match state.db.run_command(doc! {"ping": 1}).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    Json(json!({
        "status": "healthy",
        "database": db_status,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn no_route() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": "Route not found",
            "success": false,
        })),
    )
}
