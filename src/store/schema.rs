//! SQLite schema definition
//!
//! One table holds every message of every conversation. Tree shape is the
//! only state: branches are paths, not rows, so there is nothing else to
//! keep consistent.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- ============================================
-- MESSAGES
-- ============================================

-- Every message of every conversation. A conversation is identified by the
-- id of its root message; the root row has root_id = id and a NULL parent.
CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,                   -- UUID
    root_id TEXT NOT NULL,                 -- id of the conversation root
    parent_id TEXT,                        -- NULL only for the root
    author_ref TEXT NOT NULL,              -- opaque identity from the caller
    role TEXT NOT NULL,                    -- 'user', 'assistant', ... (opaque)
    body TEXT NOT NULL,                    -- message text (opaque)
    created_at INTEGER NOT NULL,           -- epoch microseconds, strictly
                                           -- increasing within a conversation
    FOREIGN KEY(parent_id) REFERENCES messages(id) ON DELETE CASCADE
);

-- ============================================
-- INDEXES
-- ============================================

-- children_of and cascade delete
CREATE INDEX IF NOT EXISTS idx_messages_root_parent ON messages(root_id, parent_id);

-- leaves / whole-conversation scans
CREATE INDEX IF NOT EXISTS idx_messages_root ON messages(root_id);

-- at most one root per conversation
CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_one_root ON messages(root_id) WHERE parent_id IS NULL;
"#;
