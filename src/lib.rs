pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod projector;
pub mod store;

pub use config::{Config, WritePolicy};
pub use engine::ConversationEngine;
pub use error::StoreError;
pub use store::{Message, MessageContent, MessageStore};
