//! Post command implementation
//!
//! Appending under any existing message, tip or interior; the conversation
//! is resolved from the parent.

use anyhow::Result;

use crate::engine::ConversationEngine;
use crate::store::MessageContent;

pub fn run(
    engine: &ConversationEngine,
    parent_id: String,
    author: String,
    role: String,
    text: String,
) -> Result<()> {
    let parent = engine.store().get(&parent_id)?;
    let message = engine.post_message(
        &parent.root_id,
        &parent.id,
        &author,
        &MessageContent::new(role, text),
    )?;
    println!("Posted {} under {}", message.id, parent.id);
    Ok(())
}
