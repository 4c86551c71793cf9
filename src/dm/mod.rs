mod history;
mod list;
mod read;
mod resolve;
mod send;
mod store;
mod ws;

use axum::{routing::{get, post}, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppState;

pub use history::fetch_history;
pub use list::{list_conversations, ConversationEntry, Preview};
pub use read::mark_conversation_read;
pub use resolve::resolve;
pub use send::send_message;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::overview))
        .route("/send", post(send::send))
        .route("/ws", get(ws::dm_ws))
        .route("/{uuid}", get(history::history))
        .route("/{uuid}/read", post(read::mark_read))
}

/// A persisted direct message. The same shape is returned from send and
/// history and pushed over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Message {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: Option<String>,
        attachment_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            receiver_id,
            text,
            attachment_url,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Either `conversation_id` (continue) or `target_id` (start-or-continue
/// with that user) must be present. A request with neither content field
/// only pins down the conversation.
#[derive(Debug, Default, Deserialize)]
pub struct SendRequest {
    pub conversation_id: Option<Uuid>,
    pub target_id: Option<Uuid>,
    pub text: Option<String>,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub conversation_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}
