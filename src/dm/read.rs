use axum::{debug_handler, extract::{Path, State}, http::StatusCode};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session, AppError, AppResult, AppState};

use super::store;

#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(conversation_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let caller = session::require_user(&session).await?;
    mark_conversation_read(&db_pool, caller, conversation_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Moves the caller's read cursor to now. A caller without a membership
/// row gets the same answer as any other non-participant access.
pub async fn mark_conversation_read(db_pool: &SqlitePool, caller: Uuid, conversation_id: Uuid) -> AppResult<()> {
    let updated = store::mark_read(db_pool, conversation_id, caller, OffsetDateTime::now_utc()).await?;
    if !updated {
        return Err(AppError::Forbidden);
    }

    Ok(())
}
