//! v001: watch relation table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS watches (
    owner  TEXT NOT NULL,
    target TEXT NOT NULL,

    PRIMARY KEY (owner, target)
);

-- Inverse lookup: who watches a given target.
CREATE INDEX IF NOT EXISTS idx_watches_target ON watches(target);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
