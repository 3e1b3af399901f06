//! External API clients

pub mod chat;

pub use chat::{ChatClient, ChatMessage, ChatTransport, HttpChatTransport, ProviderConfig};
