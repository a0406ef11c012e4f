//! Transaction payloads and the durable journal.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use umbra_durable::{FlatStore, RecordStore, TxStore};
use umbra_index::Triple;
use umbra_types::codec::encode_value;
use umbra_types::{Result, Value};

use crate::db::Database;

/// One transaction operation over raw triples. Entity maps are turned
/// into these by the external entity encoder before they reach the
/// connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxOp {
    Add(Value, Value, Value),
    Retract(Value, Value, Value),
}

impl TxOp {
    pub fn add(s: impl Into<Value>, p: impl Into<Value>, o: impl Into<Value>) -> Self {
        TxOp::Add(s.into(), p.into(), o.into())
    }

    pub fn retract(s: impl Into<Value>, p: impl Into<Value>, o: impl Into<Value>) -> Self {
        TxOp::Retract(s.into(), p.into(), o.into())
    }

    pub fn triple(&self) -> Triple {
        match self {
            TxOp::Add(s, p, o) | TxOp::Retract(s, p, o) => {
                Triple::new(s.clone(), p.clone(), o.clone())
            }
        }
    }
}

/// Splits ops into `(retractions, assertions)`, preserving order
/// within each group.
pub(crate) fn split_ops(ops: &[TxOp]) -> (Vec<Triple>, Vec<Triple>) {
    let mut retractions = Vec::new();
    let mut assertions = Vec::new();
    for op in ops {
        match op {
            TxOp::Retract(..) => retractions.push(op.triple()),
            TxOp::Add(..) => assertions.push(op.triple()),
        }
    }
    (retractions, assertions)
}

/// Retractions before assertions, matching the order they are applied.
pub(crate) fn ordered_tx_data(ops: Vec<TxOp>) -> Vec<TxOp> {
    let (retracts, asserts): (Vec<TxOp>, Vec<TxOp>) = ops
        .into_iter()
        .partition(|op| matches!(op, TxOp::Retract(..)));
    let mut data = retracts;
    data.extend(asserts);
    data
}

const ROW_WORDS: usize = 4;
const TX_PAYLOAD_WORDS: usize = 2;

const OP_RETRACT: u64 = 0;
const OP_ADD: u64 = 1;

/// Append-only journal behind a durable connection: values go to the
/// flat store, triple rows to the records store, and one record per
/// transaction (timestamp plus row span) to the transaction store.
pub(crate) struct Journal {
    values: FlatStore,
    rows: RecordStore,
    txs: TxStore,
    /// Offsets already written for a value, so re-used values are
    /// stored once.
    interned: parking_lot::Mutex<HashMap<Value, u64>>,
}

impl Journal {
    pub(crate) fn open(dir: &Path, name: &str, region_size: u64) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            values: FlatStore::open(&dir.join(format!("{name}.flat")), region_size)?,
            rows: RecordStore::open(&dir.join(format!("{name}.rec")), ROW_WORDS, region_size)?,
            txs: TxStore::open(&dir.join(format!("{name}.tx")), TX_PAYLOAD_WORDS, region_size)?,
            interned: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    fn value_offset(&self, value: &Value) -> Result<u64> {
        if let Some(offset) = self.interned.lock().get(value) {
            return Ok(*offset);
        }
        let mut encoded = Vec::new();
        encode_value(value, &mut encoded);
        let offset = self.values.append(&encoded)?;
        self.interned.lock().insert(value.clone(), offset);
        Ok(offset)
    }

    pub(crate) fn record(&self, db_after: &Database, tx_data: &[TxOp]) -> Result<()> {
        let first_row = self.rows.row_count();
        for op in tx_data {
            let (tag, triple) = match op {
                TxOp::Retract(..) => (OP_RETRACT, op.triple()),
                TxOp::Add(..) => (OP_ADD, op.triple()),
            };
            let row = [
                self.value_offset(&triple.s)?,
                self.value_offset(&triple.p)?,
                self.value_offset(&triple.o)?,
                tag,
            ];
            self.rows.append_row(&row)?;
        }
        let row_count = self.rows.row_count() - first_row;
        self.txs.append(
            db_after.timestamp.timestamp_millis() as u64,
            &[first_row, row_count],
        )?;
        self.force()?;
        debug!(t = db_after.t, rows = row_count, "journal.record");
        Ok(())
    }

    pub(crate) fn force(&self) -> Result<()> {
        self.values.force()?;
        self.rows.force()?;
        self.txs.force()
    }
}
