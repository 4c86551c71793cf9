use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{AppError, AppResult};

use super::Message;

/// Canonical key for an unordered participant pair: both ids, sorted.
/// The unique index on it makes two racing first-senders collapse onto
/// one conversation row.
pub(crate) fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

pub(crate) async fn find_by_pair(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT uuid FROM conversations WHERE pair_key=?")
        .bind(pair_key(a, b))
        .fetch_optional(db_pool)
        .await?;

    Ok(match row {
        Some((uuid,)) => Some(Uuid::parse_str(&uuid)?),
        None => None,
    })
}

/// Find-or-create as an upsert on the pair key; whoever loses the insert
/// race resolves to the winner's row. Both membership rows ride along
/// idempotently.
pub(crate) async fn create_conversation(db_pool: &SqlitePool, a: Uuid, b: Uuid) -> AppResult<Uuid> {
    let key = pair_key(a, b);

    sqlx::query("INSERT INTO conversations (uuid,pair_key,last_activity_at) VALUES (?,?,?) ON CONFLICT(pair_key) DO NOTHING")
        .bind(Uuid::now_v7().to_string())
        .bind(&key)
        .bind(OffsetDateTime::now_utc())
        .execute(db_pool)
        .await?;

    let (uuid,): (String,) = sqlx::query_as("SELECT uuid FROM conversations WHERE pair_key=?")
        .bind(&key)
        .fetch_one(db_pool)
        .await?;
    let conversation_id = Uuid::parse_str(&uuid)?;

    for user_id in [a, b] {
        sqlx::query("INSERT INTO participants (conversation_id,user_id) VALUES (?,?) ON CONFLICT DO NOTHING")
            .bind(conversation_id.to_string())
            .bind(user_id.to_string())
            .execute(db_pool)
            .await?;
    }

    Ok(conversation_id)
}

pub(crate) async fn is_participant(db_pool: &SqlitePool, conversation_id: Uuid, user_id: Uuid) -> AppResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM participants WHERE conversation_id=? AND user_id=?")
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(db_pool)
        .await?;

    Ok(row.is_some())
}

/// 403 for everyone without a membership row, including ids that don't
/// resolve to any conversation at all.
pub(crate) async fn assert_participant(db_pool: &SqlitePool, conversation_id: Uuid, user_id: Uuid) -> AppResult<()> {
    if is_participant(db_pool, conversation_id, user_id).await? {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// The counterpart membership row; `None` means the conversation is
/// missing or malformed.
pub(crate) async fn other_participant(db_pool: &SqlitePool, conversation_id: Uuid, user_id: Uuid) -> AppResult<Option<Uuid>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT user_id FROM participants WHERE conversation_id=? AND user_id!=?")
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(db_pool)
        .await?;

    Ok(match row {
        Some((user_id,)) => Some(Uuid::parse_str(&user_id)?),
        None => None,
    })
}

pub(crate) async fn append_message(db_pool: &SqlitePool, message: &Message) -> AppResult<()> {
    sqlx::query("INSERT INTO messages (id,conversation_id,sender_id,receiver_id,text,attachment_url,created_at) VALUES (?,?,?,?,?,?,?)")
        .bind(message.id.to_string())
        .bind(message.conversation_id.to_string())
        .bind(message.sender_id.to_string())
        .bind(message.receiver_id.to_string())
        .bind(message.text.as_deref())
        .bind(message.attachment_url.as_deref())
        .bind(message.created_at)
        .execute(db_pool)
        .await?;

    Ok(())
}

type MessageRow = (String, String, String, String, Option<String>, Option<String>, OffsetDateTime);

fn message_from_row(
    (id, conversation_id, sender_id, receiver_id, text, attachment_url, created_at): MessageRow,
) -> AppResult<Message> {
    Ok(Message {
        id: Uuid::parse_str(&id)?,
        conversation_id: Uuid::parse_str(&conversation_id)?,
        sender_id: Uuid::parse_str(&sender_id)?,
        receiver_id: Uuid::parse_str(&receiver_id)?,
        text,
        attachment_url,
        created_at,
    })
}

/// Oldest first; ties within one timestamp keep insertion order. A
/// negative limit means all of it (sqlite convention).
pub(crate) async fn list_by_conversation(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
    before: Option<OffsetDateTime>,
    limit: Option<i64>,
) -> AppResult<Vec<Message>> {
    let rows: Vec<MessageRow> = if let Some(before) = before {
        sqlx::query_as("SELECT id,conversation_id,sender_id,receiver_id,text,attachment_url,created_at FROM messages WHERE conversation_id=? AND created_at<? ORDER BY created_at ASC, rowid ASC LIMIT ?")
            .bind(conversation_id.to_string())
            .bind(before)
            .bind(limit.unwrap_or(-1))
            .fetch_all(db_pool)
            .await?
    } else {
        sqlx::query_as("SELECT id,conversation_id,sender_id,receiver_id,text,attachment_url,created_at FROM messages WHERE conversation_id=? ORDER BY created_at ASC, rowid ASC LIMIT ?")
            .bind(conversation_id.to_string())
            .bind(limit.unwrap_or(-1))
            .fetch_all(db_pool)
            .await?
    };

    rows.into_iter().map(message_from_row).collect()
}

pub(crate) async fn latest_message(db_pool: &SqlitePool, conversation_id: Uuid) -> AppResult<Option<Message>> {
    let row: Option<MessageRow> = sqlx::query_as("SELECT id,conversation_id,sender_id,receiver_id,text,attachment_url,created_at FROM messages WHERE conversation_id=? ORDER BY created_at DESC, rowid DESC LIMIT 1")
        .bind(conversation_id.to_string())
        .fetch_optional(db_pool)
        .await?;

    row.map(message_from_row).transpose()
}

pub(crate) async fn touch_activity(db_pool: &SqlitePool, conversation_id: Uuid, at: OffsetDateTime) -> AppResult<()> {
    sqlx::query("UPDATE conversations SET last_activity_at=? WHERE uuid=?")
        .bind(at)
        .bind(conversation_id.to_string())
        .execute(db_pool)
        .await?;

    Ok(())
}

/// Returns false when the caller has no membership row to update.
pub(crate) async fn mark_read(db_pool: &SqlitePool, conversation_id: Uuid, user_id: Uuid, at: OffsetDateTime) -> AppResult<bool> {
    let result = sqlx::query("UPDATE participants SET last_read_at=? WHERE conversation_id=? AND user_id=?")
        .bind(at)
        .bind(conversation_id.to_string())
        .bind(user_id.to_string())
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Conversations the user belongs to, most recently active first, each
/// paired with the other membership row.
pub(crate) async fn conversations_for(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<(Uuid, Uuid, OffsetDateTime)>> {
    let rows: Vec<(String, String, OffsetDateTime)> = sqlx::query_as(
        "SELECT c.uuid, o.user_id, c.last_activity_at
         FROM conversations c
         JOIN participants p ON p.conversation_id=c.uuid AND p.user_id=?
         JOIN participants o ON o.conversation_id=c.uuid AND o.user_id!=?
         ORDER BY c.last_activity_at DESC",
    )
    .bind(user_id.to_string())
    .bind(user_id.to_string())
    .fetch_all(db_pool)
    .await?;

    rows.into_iter()
        .map(|(conversation_id, other, at)| {
            Ok((Uuid::parse_str(&conversation_id)?, Uuid::parse_str(&other)?, at))
        })
        .collect()
}
