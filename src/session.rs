use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

/// Session key the auth gateway writes the signed-in user's id under.
pub const USER_ID: &str = "user_id";

pub async fn require_user(session: &Session) -> AppResult<Uuid> {
    let Some(user_id) = session.get::<String>(USER_ID).await? else {
        return Err(AppError::Forbidden);
    };
    Ok(Uuid::parse_str(&user_id)?)
}
