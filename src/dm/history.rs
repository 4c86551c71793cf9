use axum::{debug_handler, extract::{Path, Query, State}, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session, AppResult, AppState};

use super::{store, Message};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default, with = "time::serde::rfc3339::option")]
    before: Option<OffsetDateTime>,
    limit: Option<i64>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn history(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Path(conversation_id): Path<Uuid>,
    Query(HistoryQuery { before, limit }): Query<HistoryQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let caller = session::require_user(&session).await?;

    Ok(Json(fetch_history(&db_pool, caller, conversation_id, before, limit).await?))
}

/// Full (or cursored) history of one conversation, oldest first. Only
/// participants may read it.
pub async fn fetch_history(
    db_pool: &SqlitePool,
    caller: Uuid,
    conversation_id: Uuid,
    before: Option<OffsetDateTime>,
    limit: Option<i64>,
) -> AppResult<Vec<Message>> {
    store::assert_participant(db_pool, conversation_id, caller).await?;

    store::list_by_conversation(db_pool, conversation_id, before, limit).await
}
