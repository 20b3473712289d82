//! Tree command implementation

use anyhow::Result;

use crate::cli::{preview, short};
use crate::engine::ConversationEngine;
use crate::projector::{self, TreeNode};

pub fn run(engine: &ConversationEngine, root_id: String, json: bool) -> Result<()> {
    let tree = projector::tree(engine.store(), &root_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
        return Ok(());
    }

    println!(
        "Conversation {} ({} messages)",
        short(&root_id),
        tree.size()
    );
    print_node(&tree, 0);
    Ok(())
}

fn print_node(node: &TreeNode, depth: usize) {
    let marker = if node.children.is_empty() { "*" } else { "-" };
    println!(
        "{}{} {} [{}] {}",
        "  ".repeat(depth),
        marker,
        short(&node.message.id),
        node.message.content.role,
        preview(&node.message.content.text, 50),
    );
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
