use anyhow::Result;
use clap::{Parser, Subcommand};

use arbor::cli::{branch, branches, create, delete, list, post, show, tree};
use arbor::config::Config;
use arbor::engine::ConversationEngine;
use arbor::store::MessageStore;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Branching conversation store with transcript projection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "arbor.yaml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation
    New {
        /// Author identifier (conversation owner)
        #[arg(short, long)]
        author: String,

        /// Role recorded on the message
        #[arg(long, default_value = "user")]
        role: String,

        /// Message text
        text: String,
    },

    /// Post a message under an existing one
    Post {
        /// Parent message id
        parent_id: String,

        #[arg(short, long)]
        author: String,

        #[arg(long, default_value = "user")]
        role: String,

        text: String,
    },

    /// Fork a new branch from any message in a conversation
    Branch {
        /// Message to fork from (may be an interior message)
        message_id: String,

        #[arg(short, long)]
        author: String,

        #[arg(long, default_value = "user")]
        role: String,

        text: String,
    },

    /// Show one branch as a linear transcript
    Show {
        /// Head message id (branch tip or interior message)
        head_id: Option<String>,

        /// Show the most recent branch of this conversation instead
        #[arg(long)]
        latest: Option<String>,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a conversation's full branch tree
    Tree {
        /// Conversation (root message) id
        root_id: String,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List branch tips of a conversation, newest first
    Branches {
        /// Conversation (root message) id
        root_id: String,
    },

    /// List conversations
    List {
        /// Filter by owner
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Delete a conversation and every branch in it
    Delete {
        /// Conversation (root message) id
        root_id: String,

        /// Requesting author (must be the owner)
        #[arg(short, long)]
        author: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config
    let config = Config::load(&cli.config).unwrap_or_default();

    // Initialize store and engine
    let store = MessageStore::open(&config.database_path())?;
    let engine = ConversationEngine::new(store, config.write_policy());

    match cli.command {
        Commands::New { author, role, text } => {
            create::run(&engine, author, role, text)?;
        }
        Commands::Post {
            parent_id,
            author,
            role,
            text,
        } => {
            post::run(&engine, parent_id, author, role, text)?;
        }
        Commands::Branch {
            message_id,
            author,
            role,
            text,
        } => {
            branch::run(&engine, message_id, author, role, text)?;
        }
        Commands::Show {
            head_id,
            latest,
            json,
        } => {
            show::run(&engine, head_id, latest, json)?;
        }
        Commands::Tree { root_id, json } => {
            tree::run(&engine, root_id, json)?;
        }
        Commands::Branches { root_id } => {
            branches::run(&engine, root_id)?;
        }
        Commands::List { author } => {
            list::run(&engine, author)?;
        }
        Commands::Delete { root_id, author } => {
            delete::run(&engine, root_id, author)?;
        }
    }

    Ok(())
}
