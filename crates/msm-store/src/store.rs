use std::path::Path;

use rusqlite::{Connection, params};

use msm_core::{LifecycleState, MemoryGraph, MemoryNode, StateTransition, TokenObservation};

use crate::error::{Result, StoreError};
use crate::schema;

/// SQLite-backed persistence for a [`MemoryGraph`].
///
/// The gateway never reads from the database directly: a graph is loaded
/// once and handed to the access layer read-only.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).ok();
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Counts ---

    pub fn node_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn observation_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // --- Save ---

    /// Replace the stored graph with `graph`.
    pub fn save_graph(&self, graph: &MemoryGraph) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute_batch(
            "DELETE FROM observations; DELETE FROM state_transitions; DELETE FROM nodes;",
        )?;

        for node in graph.nodes() {
            save_node_on(&tx, node)?;
        }

        tx.commit()?;
        tracing::info!(nodes = graph.len(), "graph saved");
        Ok(())
    }

    // --- Load ---

    pub fn load_graph(&self) -> Result<MemoryGraph> {
        let mut stmt = self.conn.prepare(
            "SELECT node_id, symbol, price_center, creation_ts, creation_reason
             FROM nodes ORDER BY node_id",
        )?;
        let rows: Vec<(String, String, f64, f64, String)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        let mut graph = MemoryGraph::new();
        for (node_id, symbol, price_center, creation_ts, creation_reason) in rows {
            let transitions = self.load_transitions(&node_id)?;
            let observations = self.load_observations(&node_id)?;
            graph.insert_node(MemoryNode {
                node_id,
                symbol,
                price_center,
                creation_ts,
                creation_reason,
                transitions,
                observations,
            });
        }
        Ok(graph)
    }

    fn load_transitions(&self, node_id: &str) -> Result<Vec<StateTransition>> {
        let mut stmt = self.conn.prepare(
            "SELECT ts, state FROM state_transitions WHERE node_id = ?1 ORDER BY ts, id",
        )?;
        let rows: Vec<(f64, String)> = stmt
            .query_map([node_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(ts, state)| {
                Ok(StateTransition {
                    ts,
                    state: parse_state(&state)?,
                })
            })
            .collect()
    }

    fn load_observations(&self, node_id: &str) -> Result<Vec<TokenObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT token_type, timestamp, volume, duration
             FROM observations WHERE node_id = ?1 ORDER BY timestamp, id",
        )?;
        let observations = stmt
            .query_map([node_id], |row| {
                Ok(TokenObservation {
                    token_type: row.get(0)?,
                    timestamp: row.get(1)?,
                    volume: row.get(2)?,
                    duration: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(observations)
    }
}

fn save_node_on(conn: &Connection, node: &MemoryNode) -> Result<()> {
    conn.execute(
        "INSERT INTO nodes (node_id, symbol, price_center, creation_ts, creation_reason)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            node.node_id,
            node.symbol,
            node.price_center,
            node.creation_ts,
            node.creation_reason,
        ],
    )?;

    let mut transition = conn.prepare_cached(
        "INSERT INTO state_transitions (node_id, ts, state) VALUES (?1, ?2, ?3)",
    )?;
    for t in &node.transitions {
        transition.execute(params![node.node_id, t.ts, t.state.as_str()])?;
    }

    let mut observation = conn.prepare_cached(
        "INSERT INTO observations (node_id, token_type, timestamp, volume, duration)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for o in &node.observations {
        observation.execute(params![
            node.node_id,
            o.token_type,
            o.timestamp,
            o.volume,
            o.duration
        ])?;
    }
    Ok(())
}

fn parse_state(s: &str) -> Result<LifecycleState> {
    LifecycleState::parse(s)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown lifecycle state '{s}'")))
}
