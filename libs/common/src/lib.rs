pub mod events;
pub mod id;

pub use events::{ChatAction, ChatEvent, Envelope, MessageAction, MessageEvent, MessagePayload};
