use super::storage;
use crate::error::{AppError, Result};
use rusqlite::{Connection, Transaction};

/// One SQLite transaction covering a logical write.
///
/// Dropping an uncommitted unit of work rolls it back.
pub struct UnitOfWork<'conn> {
    tx: Option<Transaction<'conn>>,
    operation: &'static str,
}

impl<'conn> UnitOfWork<'conn> {
    pub(crate) fn begin(conn: &'conn mut Connection, operation: &'static str) -> Result<Self> {
        let tx = conn.transaction().map_err(storage("begin transaction"))?;
        Ok(Self {
            tx: Some(tx),
            operation,
        })
    }

    /// Connection bound to this transaction.
    pub fn connection(&self) -> Result<&Connection> {
        self.tx
            .as_deref()
            .ok_or_else(|| AppError::Storage(format!("{} already finished", self.operation)))
    }

    /// Commit. A failed commit is rolled back and reported.
    pub fn commit(mut self) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        let operation = self.operation;
        tx.commit().map_err(|e| {
            tracing::error!(operation, error = %e, "Commit failed, changes rolled back");
            AppError::Storage(format!("Failed to commit {}: {}", operation, e))
        })
    }

    /// Discard every change made in this unit of work.
    pub fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().map_err(storage("roll back transaction")),
            None => Ok(()),
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            tracing::error!(operation = self.operation, "Unit of work dropped, rolling back");
            if let Err(e) = tx.rollback() {
                tracing::error!(operation = self.operation, error = %e, "Rollback failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v INTEGER);").unwrap();
        conn
    }

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_commit_persists() {
        let mut conn = counter();
        let uow = UnitOfWork::begin(&mut conn, "insert").unwrap();
        uow.connection()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
        uow.commit().unwrap();
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let mut conn = counter();
        {
            let uow = UnitOfWork::begin(&mut conn, "insert").unwrap();
            uow.connection()
                .unwrap()
                .execute("INSERT INTO t VALUES (1)", [])
                .unwrap();
        }
        assert_eq!(count(&conn), 0);

        let uow = UnitOfWork::begin(&mut conn, "insert").unwrap();
        uow.connection()
            .unwrap()
            .execute("INSERT INTO t VALUES (1)", [])
            .unwrap();
        uow.rollback().unwrap();
        assert_eq!(count(&conn), 0);
    }
}
