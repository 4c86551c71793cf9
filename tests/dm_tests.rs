/// Messaging subsystem tests
/// Conversation resolution, ordered history, authorization, fan-out

use std::sync::Mutex;

use backchannel::db;
use backchannel::dm::{self, SendRequest};
use backchannel::hub::Hub;
use backchannel::push::{LogGateway, PushGateway};
use backchannel::AppError;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init(&pool).await.unwrap();
    pool
}

fn to_user(target: Uuid, text: &str) -> SendRequest {
    SendRequest {
        target_id: Some(target),
        text: Some(text.to_owned()),
        ..Default::default()
    }
}

fn to_conversation(conversation_id: Uuid, text: &str) -> SendRequest {
    SendRequest {
        conversation_id: Some(conversation_id),
        text: Some(text.to_owned()),
        ..Default::default()
    }
}

#[tokio::test]
async fn pair_resolves_to_one_conversation_in_both_directions() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let first = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hey"))
        .await
        .unwrap();
    let second = dm::send_message(&pool, &hub, &LogGateway, b, to_user(a, "hi back"))
        .await
        .unwrap();

    assert_eq!(first.conversation_id, second.conversation_id);

    let history = dm::fetch_history(&pool, a, first.conversation_id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn messaging_yourself_is_rejected() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();

    let err = dm::send_message(&pool, &hub, &LogGateway, a, to_user(a, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn request_without_addressing_is_rejected() {
    let pool = test_pool().await;
    let hub = Hub::new();

    let err = dm::send_message(&pool, &hub, &LogGateway, Uuid::now_v7(), SendRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

#[tokio::test]
async fn contentless_probe_creates_conversation_without_messages() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let probe = SendRequest { target_id: Some(b), ..Default::default() };
    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, probe).await.unwrap();
    assert!(outcome.message.is_none());

    let history = dm::fetch_history(&pool, a, outcome.conversation_id, None, None)
        .await
        .unwrap();
    assert!(history.is_empty());

    // probing again reuses the conversation
    let again = SendRequest { target_id: Some(b), ..Default::default() };
    let second = dm::send_message(&pool, &hub, &LogGateway, a, again).await.unwrap();
    assert_eq!(second.conversation_id, outcome.conversation_id);
}

#[tokio::test]
async fn empty_strings_count_as_no_content() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let req = SendRequest {
        target_id: Some(b),
        text: Some(String::new()),
        attachment_url: Some(String::new()),
        ..Default::default()
    };
    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, req).await.unwrap();
    assert!(outcome.message.is_none());
}

#[tokio::test]
async fn history_keeps_send_order() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let first = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "one"))
        .await
        .unwrap();
    let conversation_id = first.conversation_id;
    dm::send_message(&pool, &hub, &LogGateway, b, to_conversation(conversation_id, "two"))
        .await
        .unwrap();
    dm::send_message(&pool, &hub, &LogGateway, a, to_conversation(conversation_id, "three"))
        .await
        .unwrap();

    let history = dm::fetch_history(&pool, a, conversation_id, None, None)
        .await
        .unwrap();
    let texts: Vec<_> = history.iter().map(|m| m.text.as_deref().unwrap()).collect();
    assert_eq!(texts, ["one", "two", "three"]);
}

#[tokio::test]
async fn receiver_is_inferred_from_membership() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let first = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hey"))
        .await
        .unwrap();
    let reply = dm::send_message(&pool, &hub, &LogGateway, b, to_conversation(first.conversation_id, "hi back"))
        .await
        .unwrap();

    let message = reply.message.unwrap();
    assert_eq!(message.sender_id, b);
    assert_eq!(message.receiver_id, a);
}

#[tokio::test]
async fn outsiders_cannot_read_history() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    let c = Uuid::now_v7();

    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "secret"))
        .await
        .unwrap();

    let err = dm::fetch_history(&pool, c, outcome.conversation_id, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn outsiders_cannot_send_into_a_conversation() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    let c = Uuid::now_v7();

    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hey"))
        .await
        .unwrap();

    let err = dm::send_message(&pool, &hub, &LogGateway, c, to_conversation(outcome.conversation_id, "me too"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // an id that resolves to nothing looks exactly the same
    let err = dm::send_message(&pool, &hub, &LogGateway, c, to_conversation(Uuid::now_v7(), "hello?"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn send_pushes_to_joined_sessions_only() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    let c = Uuid::now_v7();

    let probe = SendRequest { target_id: Some(b), ..Default::default() };
    let ab = dm::send_message(&pool, &hub, &LogGateway, a, probe)
        .await
        .unwrap()
        .conversation_id;
    let probe = SendRequest { target_id: Some(c), ..Default::default() };
    let ac = dm::send_message(&pool, &hub, &LogGateway, a, probe)
        .await
        .unwrap()
        .conversation_id;

    let (tx_ab, mut rx_ab) = unbounded_channel();
    let (tx_ac, mut rx_ac) = unbounded_channel();
    hub.join(Uuid::now_v7(), ab, tx_ab);
    hub.join(Uuid::now_v7(), ac, tx_ac);

    let sent = dm::send_message(&pool, &hub, &LogGateway, a, to_conversation(ab, "hey"))
        .await
        .unwrap();

    let pushed: dm::Message = serde_json::from_str(&rx_ab.try_recv().unwrap()).unwrap();
    assert_eq!(pushed.id, sent.message.unwrap().id);
    assert_eq!(pushed.text.as_deref(), Some("hey"));
    assert!(rx_ac.try_recv().is_err());
}

#[tokio::test]
async fn delivery_failure_does_not_fail_the_send() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let first = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hey"))
        .await
        .unwrap();

    // a dead session in the room must not surface to the sender
    let (tx, rx) = unbounded_channel();
    drop(rx);
    hub.join(Uuid::now_v7(), first.conversation_id, tx);

    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, to_conversation(first.conversation_id, "still there?"))
        .await
        .unwrap();
    assert!(outcome.message.is_some());

    let history = dm::fetch_history(&pool, a, first.conversation_id, None, None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn overview_orders_by_activity_and_marks_own_previews() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    let c = Uuid::now_v7();

    let ab = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hello b"))
        .await
        .unwrap()
        .conversation_id;
    let ac = dm::send_message(&pool, &hub, &LogGateway, a, to_user(c, "hello c"))
        .await
        .unwrap()
        .conversation_id;

    let overview = dm::list_conversations(&pool, a).await.unwrap();
    assert_eq!(overview.len(), 2);
    assert_eq!(overview[0].conversation_id, ac);
    assert_eq!(overview[1].conversation_id, ab);

    // b answers, which bumps that conversation back to the top for a
    dm::send_message(&pool, &hub, &LogGateway, b, to_user(a, "hi a"))
        .await
        .unwrap();

    let overview = dm::list_conversations(&pool, a).await.unwrap();
    assert_eq!(overview[0].conversation_id, ab);
    assert_eq!(overview[0].other_participant, b);
    let preview = overview[0].preview.as_ref().unwrap();
    assert_eq!(preview.text.as_deref(), Some("hi a"));
    assert!(!preview.is_own);

    let overview = dm::list_conversations(&pool, b).await.unwrap();
    assert_eq!(overview.len(), 1);
    let preview = overview[0].preview.as_ref().unwrap();
    assert!(preview.is_own);
}

#[tokio::test]
async fn history_cursor_pages_by_created_at() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    let first = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "one"))
        .await
        .unwrap();
    let conversation_id = first.conversation_id;
    dm::send_message(&pool, &hub, &LogGateway, a, to_conversation(conversation_id, "two"))
        .await
        .unwrap();
    let third = dm::send_message(&pool, &hub, &LogGateway, a, to_conversation(conversation_id, "three"))
        .await
        .unwrap();

    let cursor = third.message.unwrap().created_at;
    let page = dm::fetch_history(&pool, a, conversation_id, Some(cursor), None)
        .await
        .unwrap();
    let texts: Vec<_> = page.iter().map(|m| m.text.as_deref().unwrap()).collect();
    assert_eq!(texts, ["one", "two"]);

    let page = dm::fetch_history(&pool, a, conversation_id, Some(cursor), Some(1))
        .await
        .unwrap();
    assert_eq!(page[0].text.as_deref(), Some("one"));
}

#[tokio::test]
async fn read_cursor_is_participants_only() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();
    let c = Uuid::now_v7();

    let outcome = dm::send_message(&pool, &hub, &LogGateway, a, to_user(b, "hey"))
        .await
        .unwrap();

    dm::mark_conversation_read(&pool, b, outcome.conversation_id)
        .await
        .unwrap();

    let err = dm::mark_conversation_read(&pool, c, outcome.conversation_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

struct CaptureGateway(Mutex<Vec<(Uuid, String)>>);

impl PushGateway for CaptureGateway {
    fn enqueue(&self, recipient: Uuid, preview: &str) {
        self.0.lock().unwrap().push((recipient, preview.to_owned()));
    }
}

#[tokio::test]
async fn offline_push_gets_recipient_and_preview() {
    let pool = test_pool().await;
    let hub = Hub::new();
    let gateway = CaptureGateway(Mutex::new(Vec::new()));
    let a = Uuid::now_v7();
    let b = Uuid::now_v7();

    dm::send_message(&pool, &hub, &gateway, a, to_user(b, "hey")).await.unwrap();

    let attachment = SendRequest {
        target_id: Some(b),
        attachment_url: Some("https://media.example/x.jpg".to_owned()),
        ..Default::default()
    };
    dm::send_message(&pool, &hub, &gateway, a, attachment).await.unwrap();

    let seen = gateway.0.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], (b, "hey".to_owned()));
    assert_eq!(seen[1].1, "sent an attachment");
}
