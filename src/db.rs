use sqlx::SqlitePool;

// Uuids are stored as text, timestamps as RFC 3339 text.
//
// conversations.pair_key is the two participant ids sorted and joined,
// so a pair can never own more than one conversation row.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS conversations (
    uuid TEXT PRIMARY KEY,
    pair_key TEXT NOT NULL UNIQUE,
    last_activity_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS participants (
    conversation_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    last_read_at TEXT,
    UNIQUE (conversation_id, user_id)
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    text TEXT,
    attachment_url TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS messages_by_conversation
    ON messages (conversation_id, created_at);
";

pub async fn init(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}
