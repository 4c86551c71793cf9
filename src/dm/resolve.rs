use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::{store, SendRequest};

/// Maps a send request onto the one conversation it addresses. An explicit
/// conversation id wins (membership is checked downstream); otherwise the
/// caller/target pair is looked up and created on first contact.
pub async fn resolve(db_pool: &SqlitePool, caller: Uuid, req: &SendRequest) -> AppResult<Uuid> {
    if let Some(conversation_id) = req.conversation_id {
        return Ok(conversation_id);
    }

    let Some(target) = req.target_id else {
        return Err(AppError::invalid("need a conversation_id or a target_id"));
    };
    if target == caller {
        return Err(AppError::invalid("cannot open a conversation with yourself"));
    }

    if let Some(existing) = store::find_by_pair(db_pool, caller, target).await? {
        return Ok(existing);
    }

    store::create_conversation(db_pool, caller, target).await
}
