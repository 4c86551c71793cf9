use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{hub::Hub, push::PushGateway, session, AppError, AppResult, AppState};

use super::{resolve, store, Message, SendOutcome, SendRequest};

#[debug_handler(state = AppState)]
pub(crate) async fn send(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    State(push): State<Arc<dyn PushGateway>>,
    session: Session,

    Json(req): Json<SendRequest>,
) -> AppResult<Json<SendOutcome>> {
    let caller = session::require_user(&session).await?;

    Ok(Json(send_message(&db_pool, &hub, push.as_ref(), caller, req).await?))
}

/// Validate, resolve, persist, then fan out. Everything after the insert
/// is best-effort: the stored message stands even when the room push or
/// the offline notification goes wrong.
pub async fn send_message(
    db_pool: &SqlitePool,
    hub: &Hub,
    push: &dyn PushGateway,
    caller: Uuid,
    req: SendRequest,
) -> AppResult<SendOutcome> {
    if req.target_id == Some(caller) {
        return Err(AppError::invalid("cannot message yourself"));
    }

    let conversation_id = resolve::resolve(db_pool, caller, &req).await?;
    if req.conversation_id.is_some() {
        // an explicit id is only trusted as far as the membership table
        store::assert_participant(db_pool, conversation_id, caller).await?;
    }

    let text = req.text.filter(|t| !t.is_empty());
    let attachment_url = req.attachment_url.filter(|u| !u.is_empty());
    if text.is_none() && attachment_url.is_none() {
        // contentless request: just pin down the conversation
        return Ok(SendOutcome { conversation_id, message: None });
    }

    let receiver = match req.target_id {
        Some(target) => target,
        None => store::other_participant(db_pool, conversation_id, caller)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("conversation {conversation_id} has no counterpart for {caller}")
            })?,
    };

    let message = Message::new(conversation_id, caller, receiver, text, attachment_url);
    store::append_message(db_pool, &message).await?;

    if let Err(err) = store::touch_activity(db_pool, conversation_id, message.created_at).await {
        tracing::warn!("could not bump activity on {conversation_id}: {err}");
    }

    let delivered = hub.publish(conversation_id, &message);
    tracing::debug!("message {} reached {delivered} live sessions", message.id);

    push.enqueue(receiver, message.text.as_deref().unwrap_or("sent an attachment"));

    Ok(SendOutcome { conversation_id, message: Some(message) })
}
