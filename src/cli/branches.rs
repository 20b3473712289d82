//! Branches command implementation
//!
//! Lists every branch tip of a conversation, newest first.

use anyhow::Result;

use crate::cli::{preview, short};
use crate::engine::ConversationEngine;

pub fn run(engine: &ConversationEngine, root_id: String) -> Result<()> {
    let leaves = engine.list_leaves(&root_id)?;

    println!(
        "{:<10} {:<20} {:<10} {}",
        "Tip", "Created", "Author", "Last message"
    );
    println!("{}", "-".repeat(80));

    for leaf in leaves {
        println!(
            "{:<10} {:<20} {:<10} {}",
            short(&leaf.id),
            leaf.created_at.format("%Y-%m-%d %H:%M:%S"),
            leaf.author_ref,
            preview(&leaf.content.text, 35),
        );
    }

    Ok(())
}
