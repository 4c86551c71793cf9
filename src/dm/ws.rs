use std::sync::Arc;

use axum::{debug_handler, extract::{State, WebSocketUpgrade}, response::{IntoResponse, Response}};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{hub::Hub, session, AppResult, AppState};

use super::store;

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientFrame {
    Join { conversation_id: Uuid },
    Leave { conversation_id: Uuid },
}

/// One socket per client session; the client joins and leaves rooms over
/// it. Every join is checked against the membership table, and a closed
/// socket leaves everything it had joined.
#[debug_handler(state = AppState)]
pub(crate) async fn dm_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let caller = session::require_user(&session).await?;

    Ok(ws.on_upgrade(async move |socket| {
        let session_id = Uuid::now_v7();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let (mut sender, mut receiver) = socket.split();

        let push_task = tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                if sender.send(payload.into()).await.is_err() {
                    break;
                }
            }
        });

        while let Some(Ok(frame)) = receiver.next().await {
            let Ok(frame) = serde_json::from_slice(&frame.into_data()) else {
                continue
            };

            match frame {
                ClientFrame::Join { conversation_id } => {
                    match store::is_participant(&db_pool, conversation_id, caller).await {
                        Ok(true) => hub.join(session_id, conversation_id, tx.clone()),
                        Ok(false) => {
                            tracing::debug!("{caller} tried to join {conversation_id} without membership");
                        }
                        Err(err) => tracing::warn!("join check failed for {conversation_id}: {err}"),
                    }
                }
                ClientFrame::Leave { conversation_id } => hub.leave(session_id, conversation_id),
            }
        }

        hub.leave_all(session_id);
        push_task.abort();
    }).into_response())
}
