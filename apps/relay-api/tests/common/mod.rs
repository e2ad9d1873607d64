use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use relay_api::auth::{AuthError, SessionAuth};
use relay_api::config::Config;
use relay_api::directory::{ChatDirectory, DirectoryError};
use relay_api::gateway::online::OnlineUsers;
use relay_api::gateway::registry::BrokerRegistry;
use relay_api::AppState;

/// Token-to-user auth fake standing in for the auth service.
#[derive(Default)]
pub struct StaticAuth {
    tokens: Mutex<HashMap<String, Uuid>>,
}

impl StaticAuth {
    pub fn issue(&self, user_id: Uuid) -> String {
        let token = format!("tok_{user_id}");
        self.tokens.lock().unwrap().insert(token.clone(), user_id);
        token
    }
}

#[async_trait]
impl SessionAuth for StaticAuth {
    async fn resolve(&self, token: &str) -> Result<Uuid, AuthError> {
        self.tokens
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .ok_or(AuthError::Rejected)
    }
}

/// Membership fake standing in for the chat service.
#[derive(Default)]
pub struct StaticDirectory {
    members: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    chats: Mutex<HashMap<Uuid, Vec<Uuid>>>,
}

impl StaticDirectory {
    pub fn add_chat(&self, chat_id: Uuid, members: &[Uuid]) {
        self.members.lock().unwrap().insert(chat_id, members.to_vec());
        for user_id in members {
            self.chats
                .lock()
                .unwrap()
                .entry(*user_id)
                .or_default()
                .push(chat_id);
        }
    }
}

#[async_trait]
impl ChatDirectory for StaticDirectory {
    async fn user_chats(&self, user_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        Ok(self
            .chats
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn chat_members(&self, chat_id: Uuid) -> Result<Vec<Uuid>, DirectoryError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&chat_id)
            .cloned()
            .unwrap_or_default())
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    pub auth: Arc<StaticAuth>,
    pub directory: Arc<StaticDirectory>,
}

/// Start a real listener backed by in-memory collaborators. The NATS
/// dispatcher is not started — tests inject events through the registry
/// handle, exactly where the dispatcher would.
pub async fn start_app() -> TestApp {
    let auth = Arc::new(StaticAuth::default());
    let directory = Arc::new(StaticDirectory::default());

    let online = OnlineUsers::new();
    let registry = BrokerRegistry::spawn(directory.clone(), online.clone());

    let config = Config {
        nats_url: "nats://localhost:4222".to_string(),
        auth_url: "http://localhost:4001".to_string(),
        chat_url: "http://localhost:4002".to_string(),
        port: 0,
    };

    let state = AppState {
        config: Arc::new(config),
        auth: auth.clone(),
        online,
        registry,
    };

    let app = relay_api::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        addr,
        state,
        auth,
        directory,
    }
}

/// Wait for the user's connection handler to register them.
pub async fn wait_until_online(state: &AppState, user_id: Uuid) {
    for _ in 0..50 {
        if state.online.is_online(&user_id) {
            // Give the handler a beat to finish its broker subscriptions.
            tokio::time::sleep(Duration::from_millis(50)).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user {user_id} never came online");
}

/// Wait for the user's connection handler to unregister them.
pub async fn wait_until_offline(state: &AppState, user_id: Uuid) {
    for _ in 0..50 {
        if !state.online.is_online(&user_id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("user {user_id} never went offline");
}
