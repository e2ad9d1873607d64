//! Per-chat broadcast broker.
//!
//! One task per active chat. The broker exclusively owns its membership
//! set; everything else talks to it through its bounded inbox. It
//! terminates once membership drains, reporting back to the registry so
//! the chat transitions to absent.

use std::collections::HashSet;

use ripple_common::{ChatAction, ChatEvent, Envelope, MessageEvent};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::online::OnlineUsers;
use super::registry::Command;

/// Capacity of a broker's inbound event channel.
const INBOX_CAPACITY: usize = 10;

/// An event routed to a chat broker. Message events reuse the owning
/// chat broker's membership; they carry no membership of their own.
#[derive(Debug)]
pub(crate) enum BrokerEvent {
    Chat(ChatEvent),
    Message(MessageEvent),
}

pub(crate) struct ChatBroker {
    chat_id: Uuid,
    epoch: u64,
    members: HashSet<Uuid>,
    inbox: mpsc::Receiver<BrokerEvent>,
    online: OnlineUsers,
    registry: mpsc::Sender<Command>,
}

impl ChatBroker {
    /// Spawn a broker task onto `tasks` and return its inbox sender.
    pub(crate) fn spawn(
        chat_id: Uuid,
        epoch: u64,
        members: HashSet<Uuid>,
        online: OnlineUsers,
        registry: mpsc::Sender<Command>,
        tasks: &mut JoinSet<()>,
    ) -> mpsc::Sender<BrokerEvent> {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let broker = Self {
            chat_id,
            epoch,
            members,
            inbox: rx,
            online,
            registry,
        };
        tasks.spawn(broker.run());
        tx
    }

    async fn run(mut self) {
        tracing::debug!(chat_id = %self.chat_id, members = self.members.len(), "chat broker started");

        while let Some(event) = self.inbox.recv().await {
            let terminal = match event {
                BrokerEvent::Chat(event) => self.handle_chat(event),
                BrokerEvent::Message(event) => {
                    self.broadcast(Envelope::Message(event));
                    false
                }
            };
            if terminal || self.members.is_empty() {
                break;
            }
        }

        tracing::debug!(chat_id = %self.chat_id, "chat broker closing");

        // Best effort: during shutdown the registry may no longer be
        // draining its command channel, and a closed inbox is healed
        // lazily on the next dispatch anyway.
        let _ = self.registry.try_send(Command::Retired {
            chat_id: self.chat_id,
            epoch: self.epoch,
        });
    }

    /// Apply one chat event. Returns `true` when the broker must
    /// terminate regardless of remaining membership.
    fn handle_chat(&mut self, event: ChatEvent) -> bool {
        match event.action {
            ChatAction::AddWebSocketUser => {
                self.add_online_users(&event.users);
                false
            }
            ChatAction::NewChat | ChatAction::UpdateChat => {
                self.broadcast(Envelope::Chat(event));
                false
            }
            ChatAction::DeleteChat => {
                self.broadcast(Envelope::Chat(event));
                true
            }
            ChatAction::DeleteUsers => {
                let removed = event.users.clone();
                let notice = Envelope::Chat(ChatEvent::removal_notice(self.chat_id));
                for user_id in &removed {
                    self.online.send(user_id, notice.clone());
                }
                for user_id in &removed {
                    self.members.remove(user_id);
                }
                self.broadcast(Envelope::Chat(event));
                false
            }
            ChatAction::AddUsers => {
                self.add_online_users(&event.users);
                self.broadcast(Envelope::Chat(event));
                false
            }
            // Outbound-only marker; nothing to do if a producer ever
            // publishes it.
            ChatAction::UserRemoved => false,
        }
    }

    /// Track the given users, skipping those with no live connection
    /// (membership stays a subset of the online registry).
    fn add_online_users(&mut self, users: &[Uuid]) {
        for user_id in users {
            if self.online.is_online(user_id) {
                self.members.insert(*user_id);
            }
        }
    }

    /// Deliver the envelope to every member, evicting members whose
    /// connection is gone.
    fn broadcast(&mut self, envelope: Envelope) {
        let mut departed = Vec::new();
        for user_id in &self.members {
            if !self.online.send(user_id, envelope.clone()) {
                departed.push(*user_id);
            }
        }
        for user_id in departed {
            self.members.remove(&user_id);
            tracing::debug!(chat_id = %self.chat_id, %user_id, "evicted offline member");
        }
    }
}
