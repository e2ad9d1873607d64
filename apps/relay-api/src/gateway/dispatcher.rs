//! Queue dispatcher: consumes the `chat` and `message` subjects and
//! routes decoded events into the broker registry.
//!
//! A malformed payload is logged and skipped — one bad producer must
//! never stop the consume loop. Duplicate delivery is tolerated; the
//! broadcast layer makes no exactly-once claim anyway.

use async_nats::{Client, SubscribeError, Subscriber};
use futures_util::StreamExt;
use ripple_common::{ChatEvent, MessageEvent};

use super::registry::BrokerRegistry;

/// Queue subject carrying JSON-encoded [`ChatEvent`]s.
pub const CHAT_SUBJECT: &str = "chat";
/// Queue subject carrying JSON-encoded [`MessageEvent`]s.
pub const MESSAGE_SUBJECT: &str = "message";

/// Subscribe to both subjects and spawn the consume loops.
///
/// Subscription failure is returned to the caller: the service cannot
/// function without its event source and should fail fast.
pub async fn start(client: &Client, registry: &BrokerRegistry) -> Result<(), SubscribeError> {
    let chat_sub = client.subscribe(CHAT_SUBJECT).await?;
    let message_sub = client.subscribe(MESSAGE_SUBJECT).await?;

    tokio::spawn(consume_chats(chat_sub, registry.clone()));
    tokio::spawn(consume_messages(message_sub, registry.clone()));

    Ok(())
}

async fn consume_chats(mut subscriber: Subscriber, registry: BrokerRegistry) {
    while let Some(delivery) = subscriber.next().await {
        let Some(event) = decode_chat(&delivery.payload) else {
            continue;
        };
        registry.dispatch_chat(event).await;
    }
    tracing::warn!(subject = CHAT_SUBJECT, "queue subscription ended");
}

async fn consume_messages(mut subscriber: Subscriber, registry: BrokerRegistry) {
    while let Some(delivery) = subscriber.next().await {
        let Some(event) = decode_message(&delivery.payload) else {
            continue;
        };
        registry.dispatch_message(event).await;
    }
    tracing::warn!(subject = MESSAGE_SUBJECT, "queue subscription ended");
}

fn decode_chat(payload: &[u8]) -> Option<ChatEvent> {
    match serde_json::from_slice(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::error!(%err, subject = CHAT_SUBJECT, "malformed event, skipping");
            None
        }
    }
}

fn decode_message(payload: &[u8]) -> Option<MessageEvent> {
    match serde_json::from_slice(payload) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::error!(%err, subject = MESSAGE_SUBJECT, "malformed event, skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ripple_common::{ChatAction, MessageAction};
    use uuid::Uuid;

    #[test]
    fn decode_chat_accepts_producer_payload() {
        let chat_id = Uuid::new_v4();
        let user = Uuid::new_v4();
        let payload = format!(r#"{{"action":"addUsers","chatId":"{chat_id}","users":["{user}"]}}"#);

        let event = decode_chat(payload.as_bytes()).unwrap();
        assert_eq!(event.action, ChatAction::AddUsers);
        assert_eq!(event.chat_id, chat_id);
        assert_eq!(event.users, vec![user]);
    }

    #[test]
    fn decode_chat_rejects_garbage() {
        assert!(decode_chat(b"not json").is_none());
        assert!(decode_chat(br#"{"action":"noSuchAction","chatId":"x"}"#).is_none());
    }

    #[test]
    fn decode_message_accepts_producer_payload() {
        let chat_id = Uuid::new_v4();
        let payload = format!(
            r#"{{"action":"newMessage","payload":{{"messageId":"{}","authorID":"{}","text":"hi","datetime":"2025-04-13T08:30:00Z","chatId":"{chat_id}","isRedacted":false}}}}"#,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );

        let event = decode_message(payload.as_bytes()).unwrap();
        assert_eq!(event.action, MessageAction::NewMessage);
        assert_eq!(event.message.chat_id, chat_id);
        assert_eq!(event.message.text, "hi");
    }

    #[test]
    fn decode_message_rejects_wrong_shape() {
        // A chat event on the message subject must not crash the loop.
        let chat_payload = format!(r#"{{"action":"newChat","chatId":"{}"}}"#, Uuid::new_v4());
        assert!(decode_message(chat_payload.as_bytes()).is_none());
    }
}
