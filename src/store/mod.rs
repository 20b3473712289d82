//! Durable message storage with SQLite
//!
//! Append-only: a message is never mutated after creation, and the only
//! deletion is the whole-conversation cascade. The store is the single
//! source of truth for tree shape; everything above it is a derived view.

mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub use schema::SCHEMA;

/// Bounded retries for transient SQLITE_BUSY contention on the two
/// multi-row transactions (append, cascade delete).
const BUSY_RETRIES: usize = 3;

const MESSAGE_COLUMNS: &str = "id, root_id, parent_id, author_ref, role, body, created_at";

#[derive(Debug)]
pub struct MessageStore {
    conn: Connection,
}

impl MessageStore {
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ============================================
    // APPEND
    // ============================================

    /// Append a message to a conversation.
    ///
    /// With `parent_id = None` this creates the conversation: the new
    /// message is the root and its id equals `root_id`. Fails with
    /// `RootConflict` if the conversation already has a root, and with
    /// `InvalidParent` if a given parent is absent or belongs to a
    /// different conversation. The parent check and the insert run in one
    /// transaction, so an append can never race a cascade delete into a
    /// dangling parent.
    pub fn append(
        &self,
        root_id: &str,
        parent_id: Option<&str>,
        author_ref: &str,
        content: &MessageContent,
    ) -> Result<Message> {
        let mut attempt = 0;
        loop {
            match self.try_append(root_id, parent_id, author_ref, content) {
                Err(StoreError::Storage(e)) if is_busy(&e) && attempt < BUSY_RETRIES => {
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn try_append(
        &self,
        root_id: &str,
        parent_id: Option<&str>,
        author_ref: &str,
        content: &MessageContent,
    ) -> Result<Message> {
        let tx = self.conn.unchecked_transaction()?;

        let id = match parent_id {
            None => {
                let root_exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE root_id = ? AND parent_id IS NULL)",
                    params![root_id],
                    |row| row.get(0),
                )?;
                if root_exists {
                    return Err(StoreError::RootConflict(root_id.to_string()));
                }
                // The root message is the conversation id
                root_id.to_string()
            }
            Some(parent) => {
                let parent_root: Option<String> = tx
                    .query_row(
                        "SELECT root_id FROM messages WHERE id = ?",
                        params![parent],
                        |row| row.get(0),
                    )
                    .optional()?;
                match parent_root {
                    None => {
                        return Err(StoreError::InvalidParent(format!(
                            "parent message {} does not exist",
                            parent
                        )))
                    }
                    Some(ref r) if r != root_id => {
                        return Err(StoreError::InvalidParent(format!(
                            "parent message {} belongs to conversation {}, not {}",
                            parent, r, root_id
                        )))
                    }
                    Some(_) => {}
                }
                Uuid::new_v4().to_string()
            }
        };

        // Clamp the timestamp so created_at is strictly increasing within
        // the conversation; ordering and tie-breaks stay deterministic even
        // if the wall clock stalls or steps backwards.
        let prev: Option<i64> = tx.query_row(
            "SELECT MAX(created_at) FROM messages WHERE root_id = ?",
            params![root_id],
            |row| row.get(0),
        )?;
        let now = Utc::now().timestamp_micros();
        let created_at = match prev {
            Some(p) if now <= p => p + 1,
            _ => now,
        };

        tx.execute(
            "INSERT INTO messages (id, root_id, parent_id, author_ref, role, body, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                root_id,
                parent_id,
                author_ref,
                content.role,
                content.text,
                created_at
            ],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            root_id: root_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            author_ref: author_ref.to_string(),
            content: content.clone(),
            created_at: micros_to_datetime(created_at),
        })
    }

    // ============================================
    // READS
    // ============================================

    pub fn get(&self, message_id: &str) -> Result<Message> {
        let query = format!("SELECT {} FROM messages WHERE id = ?", MESSAGE_COLUMNS);
        self.conn
            .query_row(&query, params![message_id], map_message)
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message_id)))
    }

    /// Direct children of a message, oldest first (deterministic: ties on
    /// created_at break by id).
    pub fn children_of(&self, message_id: &str) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {} FROM messages WHERE parent_id = ? ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![message_id], map_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Every branch tip of a conversation, newest first.
    pub fn leaves(&self, root_id: &str) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {} FROM messages m
             WHERE m.root_id = ?
               AND NOT EXISTS (SELECT 1 FROM messages c WHERE c.parent_id = m.id)
             ORDER BY m.created_at DESC, m.id DESC",
            message_columns_qualified()
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![root_id], map_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Every message of a conversation across all branches, oldest first.
    pub fn messages_in(&self, root_id: &str) -> Result<Vec<Message>> {
        let query = format!(
            "SELECT {} FROM messages WHERE root_id = ? ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(params![root_id], map_message)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Root messages (one per conversation), newest first, optionally
    /// filtered by owner.
    pub fn list_roots(&self, author_ref: Option<&str>) -> Result<Vec<Message>> {
        let base = format!(
            "SELECT {} FROM messages WHERE parent_id IS NULL",
            MESSAGE_COLUMNS
        );
        let rows = match author_ref {
            Some(author) => {
                let query = format!("{} AND author_ref = ? ORDER BY created_at DESC, id DESC", base);
                let mut stmt = self.conn.prepare(&query)?;
                let rows = stmt.query_map(params![author], map_message)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let query = format!("{} ORDER BY created_at DESC, id DESC", base);
                let mut stmt = self.conn.prepare(&query)?;
                let rows = stmt.query_map([], map_message)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    // ============================================
    // CASCADE DELETE
    // ============================================

    /// Remove a conversation and every message reachable from its root, in
    /// one transaction. All-or-nothing: if any row cannot be removed (e.g.
    /// a foreign-key reference from outside this subsystem), no message is
    /// removed. Returns the number of messages deleted.
    pub fn delete_tree(&self, root_id: &str) -> Result<usize> {
        let mut attempt = 0;
        loop {
            match self.try_delete_tree(root_id) {
                Err(StoreError::Storage(e)) if is_busy(&e) && attempt < BUSY_RETRIES => {
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn try_delete_tree(&self, root_id: &str) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        let root_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ? AND parent_id IS NULL)",
            params![root_id],
            |row| row.get(0),
        )?;
        if !root_exists {
            return Err(StoreError::NotFound(format!("conversation {}", root_id)));
        }

        // Counted up front: the parent-link cascade makes the DELETE's own
        // change count unreliable for nested rows
        let total: usize = tx.query_row(
            "SELECT COUNT(*) FROM messages WHERE root_id = ?",
            params![root_id],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM messages WHERE root_id = ?", params![root_id])?;
        tx.commit()?;
        Ok(total)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn is_busy(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn message_columns_qualified() -> String {
    MESSAGE_COLUMNS
        .split(", ")
        .map(|c| format!("m.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn map_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        root_id: row.get(1)?,
        parent_id: row.get(2)?,
        author_ref: row.get(3)?,
        content: MessageContent {
            role: row.get(4)?,
            text: row.get(5)?,
        },
        created_at: micros_to_datetime(row.get(6)?),
    })
}

fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
    // created_at is always written from timestamp_micros(), so this is in
    // range for any value the store can contain
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ============================================
// RECORD TYPES
// ============================================

/// Opaque payload; the engine never interprets role or text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub role: String,
    pub text: String,
}

impl MessageContent {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub root_id: String,
    pub parent_id: Option<String>,
    pub author_ref: String,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// True for the first message of a conversation.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(text: &str) -> MessageContent {
        MessageContent::new("user", text)
    }

    fn new_root(store: &MessageStore, author: &str, text: &str) -> Message {
        let root_id = Uuid::new_v4().to_string();
        store.append(&root_id, None, author, &content(text)).unwrap()
    }

    #[test]
    fn test_root_id_equals_message_id() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "hello");
        assert_eq!(root.id, root.root_id);
        assert!(root.is_root());
    }

    #[test]
    fn test_second_root_is_a_conflict() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "hello");
        let err = store
            .append(&root.root_id, None, "alice", &content("again"))
            .unwrap_err();
        assert!(matches!(err, StoreError::RootConflict(_)));
    }

    #[test]
    fn test_append_missing_parent() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "hello");
        let err = store
            .append(&root.root_id, Some("no-such-id"), "alice", &content("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
    }

    #[test]
    fn test_append_parent_from_other_conversation() {
        let store = MessageStore::open_in_memory().unwrap();
        let a = new_root(&store, "alice", "conversation a");
        let b = new_root(&store, "alice", "conversation b");
        let err = store
            .append(&a.root_id, Some(&b.id), "alice", &content("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidParent(_)));
    }

    #[test]
    fn test_timestamps_strictly_increase_within_conversation() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let b = store
            .append(&root.root_id, Some(&root.id), "alice", &content("b"))
            .unwrap();
        let c = store
            .append(&root.root_id, Some(&b.id), "alice", &content("c"))
            .unwrap();
        assert!(root.created_at < b.created_at);
        assert!(b.created_at < c.created_at);
    }

    #[test]
    fn test_children_ordered_oldest_first() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let b = store
            .append(&root.root_id, Some(&root.id), "alice", &content("b"))
            .unwrap();
        let c = store
            .append(&root.root_id, Some(&root.id), "alice", &content("c"))
            .unwrap();

        let children = store.children_of(&root.id).unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].id, b.id);
        assert_eq!(children[1].id, c.id);
    }

    #[test]
    fn test_leaves_ordered_newest_first() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let t1 = store
            .append(&root.root_id, Some(&root.id), "alice", &content("t1"))
            .unwrap();
        let t2 = store
            .append(&root.root_id, Some(&root.id), "alice", &content("t2"))
            .unwrap();
        let t3 = store
            .append(&root.root_id, Some(&root.id), "alice", &content("t3"))
            .unwrap();

        let leaves = store.leaves(&root.root_id).unwrap();
        let ids: Vec<&str> = leaves.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![t3.id.as_str(), t2.id.as_str(), t1.id.as_str()]);
    }

    #[test]
    fn test_root_with_children_is_not_a_leaf() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let leaves = store.leaves(&root.root_id).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, root.id);

        let b = store
            .append(&root.root_id, Some(&root.id), "alice", &content("b"))
            .unwrap();
        let leaves = store.leaves(&root.root_id).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id, b.id);
    }

    #[test]
    fn test_list_roots_filters_by_author() {
        let store = MessageStore::open_in_memory().unwrap();
        let a = new_root(&store, "alice", "a");
        let _b = new_root(&store, "bob", "b");

        assert_eq!(store.list_roots(None).unwrap().len(), 2);
        let mine = store.list_roots(Some("alice")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);
    }

    #[test]
    fn test_list_roots_newest_first() {
        let store = MessageStore::open_in_memory().unwrap();
        let a = new_root(&store, "alice", "a");
        let b = new_root(&store, "alice", "b");
        let c = new_root(&store, "alice", "c");

        // Pin the timestamps so the ordering under test is unambiguous and
        // proves the sort is by creation time, not insertion order
        for (id, ts) in [(&a.id, 100_i64), (&b.id, 300), (&c.id, 200)] {
            store
                .connection()
                .execute(
                    "UPDATE messages SET created_at = ? WHERE id = ?",
                    params![ts, id],
                )
                .unwrap();
        }

        let roots = store.list_roots(None).unwrap();
        let ids: Vec<&str> = roots.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), c.id.as_str(), a.id.as_str()]);
    }

    #[test]
    fn test_messages_in_oldest_first() {
        let store = MessageStore::open_in_memory().unwrap();
        let a = new_root(&store, "alice", "a");
        let b = store
            .append(&a.root_id, Some(&a.id), "alice", &content("b"))
            .unwrap();
        let c = store
            .append(&a.root_id, Some(&b.id), "alice", &content("c"))
            .unwrap();
        let d = store
            .append(&a.root_id, Some(&a.id), "alice", &content("d"))
            .unwrap();

        // created_at strictly increases within a conversation, so the scan
        // order is exactly creation order across all branches
        let all = store.messages_in(&a.root_id).unwrap();
        let ids: Vec<&str> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![a.id.as_str(), b.id.as_str(), c.id.as_str(), d.id.as_str()]
        );
    }

    #[test]
    fn test_delete_tree_removes_every_message() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let b = store
            .append(&root.root_id, Some(&root.id), "alice", &content("b"))
            .unwrap();
        store
            .append(&root.root_id, Some(&b.id), "alice", &content("c"))
            .unwrap();
        store
            .append(&root.root_id, Some(&root.id), "alice", &content("d"))
            .unwrap();

        let removed = store.delete_tree(&root.root_id).unwrap();
        assert_eq!(removed, 4);
        assert!(matches!(
            store.get(&root.id).unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(store.messages_in(&root.root_id).unwrap().is_empty());
    }

    #[test]
    fn test_delete_tree_unknown_root() {
        let store = MessageStore::open_in_memory().unwrap();
        let err = store.delete_tree("missing").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_tree_is_all_or_nothing() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let b = store
            .append(&root.root_id, Some(&root.id), "alice", &content("b"))
            .unwrap();
        store
            .append(&root.root_id, Some(&b.id), "alice", &content("c"))
            .unwrap();

        // A reference from outside the subsystem makes one row undeletable;
        // the whole cascade must then leave the tree untouched.
        store
            .connection()
            .execute_batch(
                "CREATE TABLE pins (
                     id INTEGER PRIMARY KEY,
                     message_id TEXT NOT NULL REFERENCES messages(id)
                 );",
            )
            .unwrap();
        store
            .connection()
            .execute("INSERT INTO pins (message_id) VALUES (?)", params![b.id])
            .unwrap();

        let err = store.delete_tree(&root.root_id).unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        assert_eq!(store.messages_in(&root.root_id).unwrap().len(), 3);
    }

    #[test]
    fn test_append_never_leaves_partial_state_on_failure() {
        let store = MessageStore::open_in_memory().unwrap();
        let root = new_root(&store, "alice", "a");
        let before = store.messages_in(&root.root_id).unwrap().len();
        let _ = store
            .append(&root.root_id, Some("missing"), "alice", &content("x"))
            .unwrap_err();
        assert_eq!(store.messages_in(&root.root_id).unwrap().len(), before);
    }

    #[test]
    fn test_open_reports_unusable_database_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        // Parent "directory" is a regular file, so it cannot be created
        let err = MessageStore::open(&blocker.join("nested").join("arbor.db")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arbor.db");

        let root_id;
        {
            let store = MessageStore::open(&path).unwrap();
            let root = new_root(&store, "alice", "durable");
            root_id = root.root_id;
        }

        let store = MessageStore::open(&path).unwrap();
        let root = store.get(&root_id).unwrap();
        assert_eq!(root.content.text, "durable");
    }
}
