//! New-conversation command implementation

use anyhow::Result;

use crate::engine::ConversationEngine;
use crate::store::MessageContent;

pub fn run(engine: &ConversationEngine, author: String, role: String, text: String) -> Result<()> {
    let root = engine.create_conversation(&author, &MessageContent::new(role, text))?;
    println!("Conversation created: {}", root.id);
    Ok(())
}
