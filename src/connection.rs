//! The versioned connection: a compare-and-set cell over database
//! snapshots.
//!
//! Readers clone the current snapshot and never block. Writers run
//! the (pure) update function outside the lock, then install its
//! result only if the cell still holds the snapshot they started
//! from; otherwise they retry against the new head.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};
use umbra_durable::DEFAULT_REGION_SIZE;
use umbra_index::{Graph, GraphFlavor};
use umbra_types::{Result, UmbraError};

use crate::db::Database;
use crate::transact::{ordered_tx_data, split_ops, Journal, TxOp};

const TX_TIMEOUT_ENV: &str = "UMBRA_TX_TIMEOUT_MSEC";
const DEFAULT_TX_TIMEOUT_MSEC: u64 = 100_000;

#[derive(Clone, Debug)]
pub struct ConnectionOptions {
    pub tx_timeout: Duration,
    /// Region size for the durable stores' paged reader.
    pub region_size: u64,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        let msec = std::env::var(TX_TIMEOUT_ENV)
            .ok()
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TX_TIMEOUT_MSEC);
        Self {
            tx_timeout: Duration::from_millis(msec),
            region_size: DEFAULT_REGION_SIZE,
        }
    }
}

struct ConnState {
    db: Arc<Database>,
    /// Every snapshot in commit order, ending with `db`.
    history: Vec<Arc<Database>>,
}

pub struct Connection {
    name: String,
    flavor: GraphFlavor,
    state: Mutex<ConnState>,
    open: AtomicBool,
    tx_timeout: Duration,
    journal: Option<Journal>,
}

/// What a committed transaction reports back.
pub struct TxReport {
    pub db_before: Arc<Database>,
    pub db_after: Arc<Database>,
    /// Retractions first, then assertions, as applied.
    pub tx_data: Vec<TxOp>,
    /// Temporary-id resolutions from the entity encoder; empty for raw
    /// triple payloads.
    pub tempids: HashMap<String, umbra_types::NodeId>,
}

impl Connection {
    pub(crate) fn new(
        name: impl Into<String>,
        flavor: GraphFlavor,
        journal: Option<Journal>,
        options: &ConnectionOptions,
    ) -> Arc<Connection> {
        let db = Database::empty(flavor);
        Arc::new(Connection {
            name: name.into(),
            flavor,
            state: Mutex::new(ConnState {
                db: Arc::clone(&db),
                history: vec![db],
            }),
            open: AtomicBool::new(true),
            tx_timeout: options.tx_timeout,
            journal,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flavor(&self) -> GraphFlavor {
        self.flavor
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(UmbraError::DatabaseClosed)
        }
    }

    /// The latest database snapshot.
    pub fn db(&self) -> Result<Arc<Database>> {
        self.ensure_open()?;
        Ok(Arc::clone(&self.state.lock().db))
    }

    /// Applies a transaction payload of raw triple operations.
    pub fn transact(&self, ops: Vec<TxOp>) -> Result<TxReport> {
        let (retractions, assertions) = split_ops(&ops);
        let (db_before, db_after) = self.transact_update(|graph, tx| {
            Ok(graph.transact_triples(tx, &retractions, &assertions))
        })?;
        let tx_data = ordered_tx_data(ops);
        if let Some(journal) = &self.journal {
            journal.record(&db_after, &tx_data)?;
        }
        Ok(TxReport {
            db_before,
            db_after,
            tx_data,
            tempids: HashMap::new(),
        })
    }

    /// Runs a user-supplied update function against the current graph
    /// and installs the result, retrying on concurrent commits. The
    /// update function must be pure; it may run more than once.
    pub fn transact_update<F>(&self, update: F) -> Result<(Arc<Database>, Arc<Database>)>
    where
        F: Fn(&dyn Graph, u64) -> Result<Arc<dyn Graph>>,
    {
        let started = Instant::now();
        loop {
            self.ensure_open()?;
            let (db_before, next_tx) = {
                let state = self.state.lock();
                (Arc::clone(&state.db), state.history.len() as u64)
            };
            let graph_after = update(db_before.graph.as_ref(), next_tx)?;
            if started.elapsed() > self.tx_timeout {
                return Err(UmbraError::TransactionTimeout(
                    self.tx_timeout.as_millis() as u64,
                ));
            }
            let db_after = db_before.successor(graph_after);
            {
                let mut state = self.state.lock();
                if Arc::ptr_eq(&state.db, &db_before) {
                    state.db = Arc::clone(&db_after);
                    state.history.push(Arc::clone(&db_after));
                    debug!(
                        name = %self.name,
                        t = db_after.t,
                        triples = db_after.graph.triple_count(),
                        "conn.transact"
                    );
                    return Ok((db_before, db_after));
                }
            }
            trace!(name = %self.name, "conn.transact.retry");
        }
    }

    /// Empties the history and resets the timestamp, keeping the
    /// connection registered and open.
    pub(crate) fn reset(&self) -> Result<()> {
        self.ensure_open()?;
        let fresh = Database::empty(self.flavor);
        let mut state = self.state.lock();
        state.db = Arc::clone(&fresh);
        state.history = vec![fresh];
        debug!(name = %self.name, "conn.reset");
        Ok(())
    }

    /// Cleanup hook run by `release`: flushes the journal and refuses
    /// further operations.
    pub(crate) fn close(&self) -> Result<()> {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!(name = %self.name, "conn.close");
            if let Some(journal) = &self.journal {
                journal.force()?;
            }
        }
        Ok(())
    }
}
