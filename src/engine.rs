//! Conversation tree engine
//!
//! Owns every mutation of parent/child links and enforces the write
//! policy. Branching is structural: forking from an interior message is
//! the same append as continuing a tip, so there is no branch entity to
//! keep in sync with the tree.

use crate::config::WritePolicy;
use crate::error::{Result, StoreError};
use crate::store::{Message, MessageContent, MessageStore};

use uuid::Uuid;

pub struct ConversationEngine {
    store: MessageStore,
    policy: WritePolicy,
}

impl ConversationEngine {
    pub fn new(store: MessageStore, policy: WritePolicy) -> Self {
        Self { store, policy }
    }

    /// Read access for projection; the store's mutations stay behind the
    /// engine.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Create a conversation: a fresh root message whose id is the
    /// conversation id.
    pub fn create_conversation(&self, owner_ref: &str, content: &MessageContent) -> Result<Message> {
        let root_id = Uuid::new_v4().to_string();
        self.store.append(&root_id, None, owner_ref, content)
    }

    /// Append a message under `parent_id` in the given conversation. Both
    /// "continue the main thread" and "continue a branch" go through here.
    pub fn post_message(
        &self,
        root_id: &str,
        parent_id: &str,
        author_ref: &str,
        content: &MessageContent,
    ) -> Result<Message> {
        self.check_write(root_id, author_ref)?;
        self.store.append(root_id, Some(parent_id), author_ref, content)
    }

    /// Fork from any existing message. `message_id` may be an interior
    /// node; the new message becomes a sibling subtree next to the
    /// existing children.
    pub fn branch_from(
        &self,
        message_id: &str,
        author_ref: &str,
        content: &MessageContent,
    ) -> Result<Message> {
        let fork_point = self.store.get(message_id)?;
        self.post_message(&fork_point.root_id, message_id, author_ref, content)
    }

    /// Cascade-delete a conversation and every branch in it. Owner only,
    /// regardless of write policy. Returns the number of messages removed.
    pub fn delete_conversation(&self, root_id: &str, requester_ref: &str) -> Result<usize> {
        let owner = self.conversation_owner(root_id)?;
        if owner != requester_ref {
            return Err(StoreError::Forbidden(format!(
                "only the owner may delete conversation {}",
                root_id
            )));
        }
        self.store.delete_tree(root_id)
    }

    /// Single-message deletion is not part of the model: removing an
    /// interior message would orphan its descendants, and removing the
    /// root is delete_conversation's job.
    pub fn delete_message(&self, message_id: &str, requester_ref: &str) -> Result<()> {
        let message = self.store.get(message_id)?;
        let owner = self.conversation_owner(&message.root_id)?;
        if owner != requester_ref {
            return Err(StoreError::Forbidden(format!(
                "only the owner may modify conversation {}",
                message.root_id
            )));
        }
        if message.is_root() {
            Err(StoreError::UnsupportedOperation(format!(
                "message {} is a conversation root; use delete_conversation",
                message_id
            )))
        } else {
            Err(StoreError::UnsupportedOperation(format!(
                "deleting message {} would orphan its descendants",
                message_id
            )))
        }
    }

    /// Every branch tip of a conversation, newest first.
    pub fn list_leaves(&self, root_id: &str) -> Result<Vec<Message>> {
        // Resolve the conversation first so an unknown id is NotFound
        // rather than an empty listing
        self.conversation_owner(root_id)?;
        self.store.leaves(root_id)
    }

    /// Owner of a conversation: the author of its root message.
    pub fn conversation_owner(&self, root_id: &str) -> Result<String> {
        let root = self.store.get(root_id).map_err(|e| match e {
            StoreError::NotFound(_) => StoreError::NotFound(format!("conversation {}", root_id)),
            other => other,
        })?;
        if !root.is_root() {
            return Err(StoreError::NotFound(format!("conversation {}", root_id)));
        }
        Ok(root.author_ref)
    }

    fn check_write(&self, root_id: &str, author_ref: &str) -> Result<()> {
        let owner = self.conversation_owner(root_id)?;
        match self.policy {
            WritePolicy::OwnerOnly if owner != author_ref => Err(StoreError::Forbidden(format!(
                "conversation {} is owned by another author",
                root_id
            ))),
            _ => Ok(()),
        }
    }
}
