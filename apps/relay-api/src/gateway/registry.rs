//! Chat broker registry: a single-owner actor loop that routes events to
//! per-chat brokers, creating them lazily and dropping them once they
//! drain.
//!
//! All broker-map mutation happens inside one task; everything else
//! holds a cloneable [`BrokerRegistry`] handle over the command channel.

use std::collections::HashMap;
use std::sync::Arc;

use ripple_common::{ChatAction, ChatEvent, MessageEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::directory::{ChatDirectory, DirectoryError};

use super::broker::{BrokerEvent, ChatBroker};
use super::online::OnlineUsers;

/// Capacity of the registry's command channel. The dispatcher awaits
/// sends here, so this only absorbs short bursts.
const COMMAND_CAPACITY: usize = 256;

#[derive(Debug)]
pub(crate) enum Command {
    Chat(ChatEvent),
    Message(MessageEvent),
    Subscribe { user_id: Uuid, chat_ids: Vec<Uuid> },
    Retired { chat_id: Uuid, epoch: u64 },
    Shutdown { ack: oneshot::Sender<()> },
}

struct BrokerEntry {
    epoch: u64,
    inbox: mpsc::Sender<BrokerEvent>,
}

/// Cloneable handle to the registry actor. Stored in `AppState`.
#[derive(Clone)]
pub struct BrokerRegistry {
    commands: mpsc::Sender<Command>,
    directory: Arc<dyn ChatDirectory>,
}

impl BrokerRegistry {
    /// Start the registry actor and return its handle.
    pub fn spawn(directory: Arc<dyn ChatDirectory>, online: OnlineUsers) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);
        let task = RegistryTask {
            brokers: HashMap::new(),
            next_epoch: 1,
            online,
            directory: directory.clone(),
            commands: tx.clone(),
            inbox: rx,
            tasks: JoinSet::new(),
        };
        tokio::spawn(task.run());
        Self {
            commands: tx,
            directory,
        }
    }

    /// Route a chat event to its broker, creating the broker first if
    /// the chat has none.
    pub async fn dispatch_chat(&self, event: ChatEvent) {
        self.send(Command::Chat(event)).await;
    }

    /// Route a message event to the broker of the chat it belongs to.
    pub async fn dispatch_message(&self, event: MessageEvent) {
        self.send(Command::Message(event)).await;
    }

    /// Subscribe a freshly-connected user into the broker of every chat
    /// they belong to that is already active. Chats without a broker are
    /// left alone — there is nothing running to miss events from.
    pub async fn subscribe_user(&self, user_id: Uuid) -> Result<(), DirectoryError> {
        let chat_ids = self.directory.user_chats(user_id).await?;
        self.send(Command::Subscribe { user_id, chat_ids }).await;
        Ok(())
    }

    /// Stop the actor and drain every broker task.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        self.send(Command::Shutdown { ack }).await;
        let _ = done.await;
    }

    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            tracing::warn!("broker registry is gone, dropping command");
        }
    }
}

struct RegistryTask {
    brokers: HashMap<Uuid, BrokerEntry>,
    next_epoch: u64,
    online: OnlineUsers,
    directory: Arc<dyn ChatDirectory>,
    /// Handed to brokers so they can report retirement.
    commands: mpsc::Sender<Command>,
    inbox: mpsc::Receiver<Command>,
    tasks: JoinSet<()>,
}

impl RegistryTask {
    async fn run(mut self) {
        while let Some(command) = self.inbox.recv().await {
            match command {
                Command::Chat(event) => {
                    let chat_id = event.chat_id;
                    self.route(chat_id, BrokerEvent::Chat(event)).await;
                }
                Command::Message(event) => {
                    let chat_id = event.message.chat_id;
                    self.route(chat_id, BrokerEvent::Message(event)).await;
                }
                Command::Subscribe { user_id, chat_ids } => self.subscribe(user_id, &chat_ids),
                Command::Retired { chat_id, epoch } => {
                    // Only drop the entry the retiring broker actually
                    // owns; the chat may have been re-activated since.
                    if self.brokers.get(&chat_id).is_some_and(|e| e.epoch == epoch) {
                        self.brokers.remove(&chat_id);
                        tracing::debug!(%chat_id, "chat broker retired");
                    }
                }
                Command::Shutdown { ack } => {
                    self.drain().await;
                    let _ = ack.send(());
                    return;
                }
            }
        }
    }

    /// Deliver one event to the chat's broker, activating the chat if
    /// needed and healing an entry whose broker died under it.
    async fn route(&mut self, chat_id: Uuid, event: BrokerEvent) {
        if !self.brokers.contains_key(&chat_id) {
            if let Err(err) = self.activate(chat_id).await {
                tracing::warn!(%chat_id, %err, "cannot activate chat, dropping event");
                return;
            }
        }
        let Some(entry) = self.brokers.get(&chat_id) else {
            return;
        };

        match entry.inbox.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::warn!(%chat_id, ?event, "broker inbox full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                // The broker drained and exited before its retirement
                // was processed. Recreate and retry once.
                self.brokers.remove(&chat_id);
                if self.activate(chat_id).await.is_ok() {
                    if let Some(entry) = self.brokers.get(&chat_id) {
                        if entry.inbox.try_send(event).is_err() {
                            tracing::warn!(%chat_id, "fresh broker rejected event");
                        }
                    }
                }
            }
        }
    }

    /// Transition a chat to active: seed membership from the directory
    /// intersected with currently-online users, then spawn the broker.
    ///
    /// On directory failure nothing is committed; the next event for
    /// this chat retries.
    async fn activate(&mut self, chat_id: Uuid) -> Result<(), DirectoryError> {
        let members = self.directory.chat_members(chat_id).await?;
        let online_members = members
            .into_iter()
            .filter(|user_id| self.online.is_online(user_id))
            .collect();

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let inbox = ChatBroker::spawn(
            chat_id,
            epoch,
            online_members,
            self.online.clone(),
            self.commands.clone(),
            &mut self.tasks,
        );
        self.brokers.insert(chat_id, BrokerEntry { epoch, inbox });
        Ok(())
    }

    fn subscribe(&mut self, user_id: Uuid, chat_ids: &[Uuid]) {
        for chat_id in chat_ids {
            let Some(entry) = self.brokers.get(chat_id) else {
                continue;
            };
            let bootstrap = BrokerEvent::Chat(ChatEvent {
                action: ChatAction::AddWebSocketUser,
                chat_id: *chat_id,
                users: vec![user_id],
            });
            match entry.inbox.try_send(bootstrap) {
                Ok(()) => {
                    tracing::debug!(%user_id, %chat_id, "subscribed user into active broker")
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%user_id, %chat_id, "broker inbox full, subscription dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.brokers.remove(chat_id);
                }
            }
        }
    }

    /// Close every broker inbox and wait for the tasks to finish.
    async fn drain(&mut self) {
        let count = self.brokers.len();
        self.brokers.clear();
        while self.tasks.join_next().await.is_some() {}
        tracing::info!(brokers = count, "broker registry drained");
    }
}
