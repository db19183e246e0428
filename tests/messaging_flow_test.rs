//! End-to-end flows over direct conversations: creation idempotence,
//! delivery status progression, edit/delete semantics, reactions and
//! per-user visibility.

use realtime_messaging_service::error::AppError;
use realtime_messaging_service::models::DeliveryStatus;
use realtime_messaging_service::routes::messages::MessageDto;
use realtime_messaging_service::services::conversation_service::ConversationService;
use realtime_messaging_service::services::message_service::MessageService;
use realtime_messaging_service::services::reaction_service::ReactionService;
use realtime_messaging_service::store::ChatStore;
use realtime_messaging_service::websocket::ConnectionRegistry;
use uuid::Uuid;

fn fixture() -> (ChatStore, ConnectionRegistry) {
    (ChatStore::new(), ConnectionRegistry::new())
}

async fn direct(store: &ChatStore, a: Uuid, b: Uuid) -> Uuid {
    ConversationService::find_or_create_direct(store, None, a, b)
        .await
        .unwrap()
        .0
}

async fn send(
    store: &ChatStore,
    registry: &ConnectionRegistry,
    sender: Uuid,
    conv: Uuid,
    content: &str,
) -> MessageDto {
    MessageService::send(
        store,
        registry,
        sender,
        conv,
        content.to_string(),
        vec![],
        None,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn concurrent_direct_creation_yields_one_conversation() {
    let (store, _registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let mut handles = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        // Alternate argument order; the pair index is order-independent.
        let (x, y) = if i % 2 == 0 { (a, b) } else { (b, a) };
        handles.push(tokio::spawn(async move {
            ConversationService::find_or_create_direct(&store, None, x, y)
                .await
                .unwrap()
                .0
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1, "all racing calls must converge on one id");
}

#[tokio::test]
async fn direct_conversation_with_self_is_rejected() {
    let (store, _registry) = fixture();
    let a = Uuid::new_v4();
    let err = ConversationService::find_or_create_direct(&store, None, a, a)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn message_status_progresses_sent_delivered_read() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let sent = send(&store, &registry, a, conv, "hello").await;
    assert_eq!(sent.status, DeliveryStatus::Sent);
    assert_eq!(sent.seq, 1);

    // B's client acknowledges receipt.
    ConversationService::mark_delivered(&store, b, conv, sent.seq)
        .await
        .unwrap();
    let listed = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert_eq!(listed[0].status, DeliveryStatus::Delivered);

    // B opens the conversation.
    ConversationService::mark_read(&store, b, conv, sent.seq)
        .await
        .unwrap();
    let listed = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert_eq!(listed[0].status, DeliveryStatus::Read);
}

#[tokio::test]
async fn read_cursor_never_moves_backwards() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let m1 = send(&store, &registry, a, conv, "one").await;
    let m2 = send(&store, &registry, a, conv, "two").await;

    ConversationService::mark_read(&store, b, conv, m2.seq)
        .await
        .unwrap();
    // A stale ack must not regress the cursor.
    ConversationService::mark_read(&store, b, conv, m1.seq)
        .await
        .unwrap();

    let listed = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert!(listed.iter().all(|m| m.status == DeliveryStatus::Read));
}

#[tokio::test]
async fn idempotent_send_does_not_duplicate() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let first = MessageService::send(
        &store,
        &registry,
        a,
        conv,
        "retried".into(),
        vec![],
        Some("client-key-1".into()),
    )
    .await
    .unwrap();

    // Same key replayed after an unknown-outcome timeout.
    let second = MessageService::send(
        &store,
        &registry,
        a,
        conv,
        "retried".into(),
        vec![],
        Some("client-key-1".into()),
    )
    .await
    .unwrap();

    assert_eq!(first.id, second.id);
    let listed = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn empty_message_without_attachments_is_rejected() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let err = MessageService::send(&store, &registry, a, conv, "   ".into(), vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn only_the_author_may_edit() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let msg = send(&store, &registry, a, conv, "first").await;
    assert!(!msg.edited);

    let err = MessageService::edit(&store, &registry, b, msg.id, "hijack".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    MessageService::edit(&store, &registry, a, msg.id, "first, edited".into())
        .await
        .unwrap();
    let listed = MessageService::list_visible(&store, conv, b, None, None)
        .await
        .unwrap();
    assert!(listed[0].edited, "edited flag derives from updated_at");
    assert_eq!(listed[0].content.as_deref(), Some("first, edited"));
}

#[tokio::test]
async fn delete_for_everyone_tombstones_and_is_idempotent() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let msg = send(&store, &registry, a, conv, "remove me").await;
    let keeper = send(&store, &registry, a, conv, "keep me").await;

    // Only the author can delete for everyone.
    let err = MessageService::delete(&store, &registry, b, msg.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    MessageService::delete(&store, &registry, a, msg.id, true)
        .await
        .unwrap();
    // Deleting twice is a no-op, not an error.
    MessageService::delete(&store, &registry, a, msg.id, true)
        .await
        .unwrap();

    let listed = MessageService::list_visible(&store, conv, b, None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 2, "tombstone keeps its position");
    assert!(listed[0].deleted);
    assert_eq!(listed[0].content, None);
    assert!(!listed[1].deleted);
    assert_eq!(listed[1].id, keeper.id);

    // A tombstone can no longer be edited.
    let err = MessageService::edit(&store, &registry, a, msg.id, "resurrect".into())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn delete_for_me_hides_only_for_that_user() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let msg = send(&store, &registry, a, conv, "private cleanup").await;

    MessageService::delete(&store, &registry, b, msg.id, false)
        .await
        .unwrap();
    MessageService::delete(&store, &registry, b, msg.id, false)
        .await
        .unwrap();

    let for_b = MessageService::list_visible(&store, conv, b, None, None)
        .await
        .unwrap();
    assert!(for_b.is_empty());

    let for_a = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert_eq!(for_a.len(), 1, "the author still sees the message");
}

#[tokio::test]
async fn history_is_ascending_and_restartable() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    for i in 0..5 {
        send(&store, &registry, a, conv, &format!("message {i}")).await;
    }

    let all = MessageService::list_visible(&store, conv, b, None, None)
        .await
        .unwrap();
    let seqs: Vec<i64> = all.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

    // Resume after seq 3.
    let tail = MessageService::list_visible(&store, conv, b, Some(3), None)
        .await
        .unwrap();
    let seqs: Vec<i64> = tail.iter().map(|m| m.seq).collect();
    assert_eq!(seqs, vec![4, 5]);

    let page = MessageService::list_visible(&store, conv, b, None, Some(2))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
async fn clear_messages_is_per_user_cursor() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    send(&store, &registry, a, conv, "before clear").await;
    ConversationService::clear_messages(&store, b, conv)
        .await
        .unwrap();
    send(&store, &registry, a, conv, "after clear").await;

    let for_b = MessageService::list_visible(&store, conv, b, None, None)
        .await
        .unwrap();
    assert_eq!(for_b.len(), 1);
    assert_eq!(for_b[0].content.as_deref(), Some("after clear"));

    let for_a = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap();
    assert_eq!(for_a.len(), 2, "the other participant keeps full history");
}

#[tokio::test]
async fn reaction_toggle_is_self_inverse_and_replaces() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;
    let msg = send(&store, &registry, a, conv, "react to me").await;

    // 👍 then ❤️: exactly one reaction remains, the previous count drops.
    let grouped = ReactionService::toggle(&store, &registry, b, msg.id, "👍")
        .await
        .unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].emoji, "👍");
    assert_eq!(grouped[0].count, 1);
    assert!(grouped[0].has_reacted);

    let grouped = ReactionService::toggle(&store, &registry, b, msg.id, "❤️")
        .await
        .unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].emoji, "❤️");
    assert_eq!(grouped[0].count, 1);

    // Same emoji again: back to the original state.
    let grouped = ReactionService::toggle(&store, &registry, b, msg.id, "❤️")
        .await
        .unwrap();
    assert!(grouped.is_empty());
}

#[tokio::test]
async fn reactions_group_across_users_in_first_occurrence_order() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;
    let msg = send(&store, &registry, a, conv, "popular").await;

    ReactionService::toggle(&store, &registry, a, msg.id, "🎉")
        .await
        .unwrap();
    ReactionService::toggle(&store, &registry, b, msg.id, "🎉")
        .await
        .unwrap();

    let grouped = ReactionService::grouped_counts(&store, msg.id, a)
        .await
        .unwrap();
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].count, 2);
    assert!(grouped[0].has_reacted);

    let err = ReactionService::grouped_counts(&store, msg.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
}

#[tokio::test]
async fn reacting_to_a_tombstone_is_rejected() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;
    let msg = send(&store, &registry, a, conv, "short-lived").await;

    MessageService::delete(&store, &registry, a, msg.id, true)
        .await
        .unwrap();
    let err = ReactionService::toggle(&store, &registry, b, msg.id, "👍")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn events_fan_out_to_subscribers_and_mute_gates_notifications() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    let (_sub, mut rx_b) = registry.add_subscriber(conv, b).await;

    send(&store, &registry, a, conv, "ping").await;
    let event: serde_json::Value =
        serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
    assert_eq!(event["type"], "message_created");
    let event: serde_json::Value =
        serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
    assert_eq!(event["type"], "notification_created");

    // Muted: the message still arrives, the notification does not.
    ConversationService::set_muted(&store, b, conv, true)
        .await
        .unwrap();
    send(&store, &registry, a, conv, "quiet ping").await;
    let event: serde_json::Value =
        serde_json::from_str(&rx_b.recv().await.unwrap()).unwrap();
    assert_eq!(event["type"], "message_created");
    assert!(rx_b.try_recv().is_err(), "no notification while muted");
}

#[tokio::test]
async fn hidden_from_all_blocks_sending_until_reopened() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;

    send(&store, &registry, a, conv, "hello").await;

    // A deletes the direct conversation from every view.
    ConversationService::set_hidden(&store, &registry, a, conv, true, true)
        .await
        .unwrap();
    let err = MessageService::send(&store, &registry, a, conv, "still there?".into(), vec![], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    let err = MessageService::list_visible(&store, conv, a, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Explicitly reopening the conversation clears the flags.
    let (reopened, created) = ConversationService::find_or_create_direct(&store, None, a, b)
        .await
        .unwrap();
    assert_eq!(reopened, conv);
    assert!(!created);
    send(&store, &registry, a, conv, "I'm back").await;
}

#[tokio::test]
async fn view_local_hide_keeps_conversation_listed_under_include_hidden() {
    let (store, registry) = fixture();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let conv = direct(&store, a, b).await;
    send(&store, &registry, a, conv, "hi").await;

    ConversationService::set_hidden(&store, &registry, a, conv, true, false)
        .await
        .unwrap();

    let visible = ConversationService::list_conversations(&store, a, false).await;
    assert!(visible.is_empty());

    let all = ConversationService::list_conversations(&store, a, true).await;
    assert_eq!(all.len(), 1);
    assert!(all[0].hidden);

    // Hidden is view-local: history stays readable.
    assert_eq!(
        MessageService::list_visible(&store, conv, a, None, None)
            .await
            .unwrap()
            .len(),
        1
    );
}
