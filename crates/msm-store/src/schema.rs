use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 100)?;

    // Fails on in-memory and brand-new databases; that is fine.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS nodes (
            node_id         TEXT PRIMARY KEY,
            symbol          TEXT NOT NULL,
            price_center    REAL NOT NULL,
            creation_ts     REAL NOT NULL,
            creation_reason TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS state_transitions (
            id      INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id TEXT NOT NULL REFERENCES nodes(node_id),
            ts      REAL NOT NULL,
            state   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS observations (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            node_id    TEXT NOT NULL REFERENCES nodes(node_id),
            token_type TEXT NOT NULL,
            timestamp  REAL NOT NULL,
            volume     REAL NOT NULL DEFAULT 0,
            duration   REAL NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_symbol ON nodes(symbol);
        CREATE INDEX IF NOT EXISTS idx_transitions_node ON state_transitions(node_id, ts);
        CREATE INDEX IF NOT EXISTS idx_observations_node ON observations(node_id, timestamp);
        ",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
