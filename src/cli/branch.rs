//! Branch command implementation

use anyhow::Result;

use crate::engine::ConversationEngine;
use crate::store::MessageContent;

pub fn run(
    engine: &ConversationEngine,
    message_id: String,
    author: String,
    role: String,
    text: String,
) -> Result<()> {
    let message = engine.branch_from(&message_id, &author, &MessageContent::new(role, text))?;
    println!(
        "Branched from {}: new tip {} (conversation {})",
        message_id, message.id, message.root_id
    );
    Ok(())
}
