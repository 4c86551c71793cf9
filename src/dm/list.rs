use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{session, AppResult, AppState};

use super::store;

/// One row of the conversation overview: who the chat is with, when it
/// was last active, and what to print under the name.
#[derive(Debug, Serialize)]
pub struct ConversationEntry {
    pub conversation_id: Uuid,
    pub other_participant: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
    pub preview: Option<Preview>,
}

#[derive(Debug, Serialize)]
pub struct Preview {
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    /// whether the caller sent it, for "You: ..." rendering
    pub is_own: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[debug_handler(state = AppState)]
pub(crate) async fn overview(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<ConversationEntry>>> {
    let caller = session::require_user(&session).await?;

    Ok(Json(list_conversations(&db_pool, caller).await?))
}

pub async fn list_conversations(db_pool: &SqlitePool, caller: Uuid) -> AppResult<Vec<ConversationEntry>> {
    let mut entries = Vec::new();

    for (conversation_id, other_participant, last_activity_at) in
        store::conversations_for(db_pool, caller).await?
    {
        let preview = store::latest_message(db_pool, conversation_id).await?.map(|m| Preview {
            is_own: m.sender_id == caller,
            text: m.text,
            attachment_url: m.attachment_url,
            created_at: m.created_at,
        });

        entries.push(ConversationEntry {
            conversation_id,
            other_participant,
            last_activity_at,
            preview,
        });
    }

    Ok(entries)
}
