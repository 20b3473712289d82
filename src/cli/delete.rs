//! Delete command implementation

use anyhow::Result;

use crate::engine::ConversationEngine;

pub fn run(engine: &ConversationEngine, root_id: String, author: String) -> Result<()> {
    let removed = engine.delete_conversation(&root_id, &author)?;
    println!("Deleted conversation {} ({} messages)", root_id, removed);
    Ok(())
}
