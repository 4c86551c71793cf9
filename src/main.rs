use std::sync::Arc;

use backchannel::{AppResult, AppState, db, dm, hub::Hub, include_res, push::LogGateway, session};
use axum::{
    debug_handler, http::StatusCode, response::{Html, IntoResponse, Response}, routing::get, Router
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(12)));

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(dotenv::var("DATABASE_URL").unwrap().as_str())
        .await.unwrap();
    db::init(&db_pool).await.unwrap();

    let app_state = AppState {
        db_pool,
        hub: Arc::new(Hub::new()),
        push: Arc::new(LogGateway),
    };

    let app = Router::new()
        .route("/", get(index))

        .nest("/dm", dm::router())

        .with_state(app_state)
        .layer(session_layer)
        .layer(CorsLayer::permissive());

    let addr = dotenv::var("BIND_ADDR").unwrap_or("0.0.0.0:8080".to_owned());
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    tracing::info!("listening on {addr}");
    axum::serve(listener, app).await.unwrap();
}

#[debug_handler]
async fn index(session: Session) -> AppResult<Response> {
    if session.get::<String>(session::USER_ID).await?.is_some() {
        Ok(
            Html(include_res!(str, "/pages/dm.html"))
            .into_response()
        )
    } else {
        // sign-in lives on the auth gateway, not here
        Ok(
            (StatusCode::UNAUTHORIZED, "no session")
                .into_response()
        )
    }
}
