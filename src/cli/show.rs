//! Show command implementation
//!
//! Prints one branch as a linear transcript, either for an explicit head
//! message or for the conversation's most recent branch.

use anyhow::Result;

use crate::cli::short;
use crate::engine::ConversationEngine;
use crate::projector;
use crate::store::Message;

pub fn run(
    engine: &ConversationEngine,
    head_id: Option<String>,
    latest: Option<String>,
    json: bool,
) -> Result<()> {
    let transcript = match (head_id, latest) {
        (Some(head), _) => projector::project(engine.store(), &head)?,
        (None, Some(root)) => projector::project_root(engine.store(), &root)?,
        (None, None) => {
            println!("Provide a head message id, or --latest <conversation-id>.");
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&transcript)?);
        return Ok(());
    }

    let head = transcript.last().map(|m| m.id.clone()).unwrap_or_default();
    println!("\n{}", "=".repeat(80));
    println!(
        "Conversation: {} | Branch head: {} | {} messages",
        short(&transcript[0].root_id),
        short(&head),
        transcript.len()
    );
    println!("{}", "=".repeat(80));

    for message in &transcript {
        print_message(message);
    }

    Ok(())
}

fn print_message(message: &Message) {
    println!(
        "\n[{}] {} ({})",
        message.content.role.to_uppercase(),
        message.author_ref,
        message.created_at.format("%Y-%m-%d %H:%M:%S"),
    );
    println!("{}", message.content.text);
    println!("{}", "-".repeat(40));
}
