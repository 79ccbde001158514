// crates/studybank-core/src/simulated.rs
// ============================================================================
// Module: Simulated Store Backend
// Description: In-memory stand-in for the embedded engine.
// Purpose: Keep the application usable when no real engine can be opened.
// Dependencies: crate::backend, crate::statement, tracing
// ============================================================================

//! ## Overview
//! [`SimulatedStore`] emulates the small relational subset the application
//! issues, driven by [`StatementKind`]. It favors functional continuity over
//! engine fidelity, and keeps these named approximations:
//! - `UPDATE` / `DELETE` report `rows_affected = 1` and change nothing.
//! - An `INSERT` slot holding an expression (`lower(?)`) stores its first
//!   bound parameter unevaluated. Placeholders after the last tuple (upsert
//!   clauses) are accepted and ignored.
//! - `SELECT` ignores filters and returns at most [`SIMULATED_SELECT_LIMIT`]
//!   rows in insertion order.
//! - Batches run sequentially without rollback; effects of statements before
//!   a failure stay visible.
//! - Data lives in memory only and does not survive a restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::backend::BackendKind;
use crate::backend::StoreBackend;
use crate::error::BackendError;
use crate::result::BatchStatement;
use crate::result::QueryResult;
use crate::result::Row;
use crate::result::SqlValue;
use crate::statement::InsertStatement;
use crate::statement::InsertValue;
use crate::statement::SelectStatement;
use crate::statement::StatementKind;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum rows returned by a simulated `SELECT`.
pub const SIMULATED_SELECT_LIMIT: usize = 100;

/// Column populated with the row id when an insert omits it.
const ID_COLUMN: &str = "id";

// ============================================================================
// SECTION: Store
// ============================================================================

/// Stored row with its simulated row id.
#[derive(Debug, Clone)]
struct SimulatedRow {
    /// Monotonic per-table row id.
    rowid: i64,
    /// Column values.
    values: Row,
}

/// In-memory table.
#[derive(Debug, Default)]
struct SimulatedTable {
    /// Rows in insertion order.
    rows: Vec<SimulatedRow>,
}

impl SimulatedTable {
    /// Returns `max(existing rowid) + 1`.
    fn next_rowid(&self) -> i64 {
        self.rows.iter().map(|row| row.rowid).max().unwrap_or(0).saturating_add(1)
    }
}

/// In-memory simulated backend.
///
/// # Invariants
/// - Table names are stored lower-cased.
/// - Row ids within a table strictly increase.
#[derive(Debug, Default)]
pub struct SimulatedStore {
    /// Tables keyed by lower-cased name.
    tables: Mutex<BTreeMap<String, SimulatedTable>>,
    /// Set once the handle is closed.
    closed: AtomicBool,
}

impl SimulatedStore {
    /// Creates an empty simulated store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows held for `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        self.lock_tables().get(&table.to_ascii_lowercase()).map_or(0, |table| table.rows.len())
    }

    /// Locks the table map, recovering from poisoning.
    fn lock_tables(&self) -> MutexGuard<'_, BTreeMap<String, SimulatedTable>> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails when the handle has been closed.
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }

    /// Runs a classified statement.
    fn run(&self, kind: StatementKind, params: &[SqlValue]) -> Result<QueryResult, BackendError> {
        match kind {
            StatementKind::Select(select) => Ok(self.select(&select)),
            StatementKind::Insert(insert) => self.insert(insert, params),
            StatementKind::Update {
                ..
            }
            | StatementKind::Delete {
                ..
            } => Ok(QueryResult::affected(1, None)),
            StatementKind::CreateTable {
                table,
            } => {
                self.lock_tables().entry(table).or_default();
                Ok(QueryResult::empty())
            }
            StatementKind::DropTable {
                table,
            } => {
                self.lock_tables().remove(&table);
                Ok(QueryResult::empty())
            }
            StatementKind::Pragma {
                ..
            }
            | StatementKind::Ddl
            | StatementKind::Transaction
            | StatementKind::Maintenance
            | StatementKind::Unknown => Ok(QueryResult::empty()),
        }
    }

    /// Reads rows or a row count from a table.
    fn select(&self, select: &SelectStatement) -> QueryResult {
        let tables = self.lock_tables();
        let table = select.table.as_deref().and_then(|name| tables.get(name));
        if let Some(alias) = &select.count_alias {
            let count = table.map_or(0, |table| table.rows.len());
            let mut row = Row::new();
            row.insert(alias.clone(), SqlValue::Integer(i64::try_from(count).unwrap_or(i64::MAX)));
            return QueryResult::from_rows(vec![row]);
        }
        let rows = table.map_or_else(Vec::new, |table| {
            table.rows.iter().take(SIMULATED_SELECT_LIMIT).map(|row| row.values.clone()).collect()
        });
        QueryResult::from_rows(rows)
    }

    /// Appends one row per values tuple, assigning the next row ids.
    fn insert(
        &self,
        insert: InsertStatement,
        params: &[SqlValue],
    ) -> Result<QueryResult, BackendError> {
        let placeholders = insert.placeholder_count();
        if placeholders != params.len() {
            return Err(BackendError::Statement(format!(
                "insert into {} expects {placeholders} parameters, got {}",
                insert.table,
                params.len()
            )));
        }
        let tuples = if insert.rows.is_empty() { vec![Vec::new()] } else { insert.rows };
        if let Some(tuple) = tuples
            .iter()
            .find(|tuple| !insert.columns.is_empty() && insert.columns.len() != tuple.len())
        {
            return Err(BackendError::Statement(format!(
                "insert into {} lists {} columns but {} values",
                insert.table,
                insert.columns.len(),
                tuple.len()
            )));
        }
        let mut bound = params.iter();
        let mut tables = self.lock_tables();
        let table = tables.entry(insert.table).or_default();
        let mut inserted = 0_u64;
        let mut last_rowid = None;
        for tuple in tuples {
            let mut values = Row::new();
            for (index, slot) in tuple.into_iter().enumerate() {
                let column = insert
                    .columns
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| format!("column{}", index + 1));
                values.insert(column, bind_slot(slot, &mut bound));
            }
            let rowid = table.next_rowid();
            values.entry(ID_COLUMN.to_string()).or_insert(SqlValue::Integer(rowid));
            table.rows.push(SimulatedRow {
                rowid,
                values,
            });
            inserted += 1;
            last_rowid = Some(rowid);
        }
        Ok(QueryResult::affected(inserted, last_rowid))
    }
}

/// Resolves one insert slot, consuming its placeholders from `bound`.
fn bind_slot<'a>(slot: InsertValue, bound: &mut impl Iterator<Item = &'a SqlValue>) -> SqlValue {
    match slot {
        InsertValue::Placeholder => bound.next().cloned().unwrap_or_default(),
        InsertValue::Literal(value) => value,
        InsertValue::Expression {
            placeholders,
        } => bound
            .take(placeholders)
            .fold(None, |first: Option<SqlValue>, value| first.or_else(|| Some(value.clone())))
            .unwrap_or_default(),
    }
}

impl StoreBackend for SimulatedStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<QueryResult, BackendError> {
        self.ensure_open()?;
        let kind = StatementKind::classify(statement);
        if matches!(kind, StatementKind::Unknown) {
            debug!(statement, "simulated store ignoring unrecognized statement");
        }
        self.run(kind, params)
    }

    fn execute_batch(&self, statements: &[BatchStatement]) -> Result<(), BackendError> {
        self.ensure_open()?;
        for (index, statement) in statements.iter().enumerate() {
            let kind = StatementKind::classify(&statement.text);
            self.run(kind, &statement.params).map_err(|err| BackendError::Batch {
                index,
                source: Box::new(err),
            })?;
        }
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
