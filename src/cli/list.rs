//! List command implementation

use anyhow::Result;

use crate::cli::{preview, short};
use crate::engine::ConversationEngine;

pub fn run(engine: &ConversationEngine, author: Option<String>) -> Result<()> {
    let roots = engine.store().list_roots(author.as_deref())?;

    if roots.is_empty() {
        println!("No conversations found.");
        return Ok(());
    }

    println!(
        "{:<10} {:<20} {:<10} {:<8} {}",
        "ID", "Created", "Owner", "Branches", "First message"
    );
    println!("{}", "-".repeat(85));

    for root in roots {
        let branches = engine.store().leaves(&root.root_id)?.len();
        println!(
            "{:<10} {:<20} {:<10} {:<8} {}",
            short(&root.id),
            root.created_at.format("%Y-%m-%d %H:%M:%S"),
            root.author_ref,
            branches,
            preview(&root.content.text, 35),
        );
    }

    Ok(())
}
