//! Transaction sequencing.
//!
//! Status transitions are driven only by the byte in `ReadyForQuery`; BEGIN
//! requires an idle connection and COMMIT/ROLLBACK require an open
//! transaction, failed or not.
use std::fmt;

use crate::{
    connection::Connection,
    error::{protocol, ProtocolError, Result, TransactionError},
    statement::{ExecResult, Rows, Statement},
    value::Value,
};

/// Backend transaction status, from the `ReadyForQuery` status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    InTransaction,
    FailedTransaction,
}

impl TransactionStatus {
    pub(crate) fn from_byte(status: u8) -> Result<Self, ProtocolError> {
        match status {
            b'I' => Ok(Self::Idle),
            b'T' => Ok(Self::InTransaction),
            b'E' => Ok(Self::FailedTransaction),
            other => Err(protocol!("unknown transaction status {:?}", other as char)),
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Idle => 'I',
            Self::InTransaction => 'T',
            Self::FailedTransaction => 'E',
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::InTransaction => "idle in transaction",
            Self::FailedTransaction => "in a failed transaction",
        })
    }
}

impl Connection {
    fn is_in_transaction(&self) -> bool {
        matches!(
            self.txn_status,
            TransactionStatus::InTransaction | TransactionStatus::FailedTransaction,
        )
    }

    fn check_is_in_transaction(&self, intxn: bool) -> Result<(), TransactionError> {
        if self.is_in_transaction() != intxn {
            return Err(TransactionError::UnexpectedStatus(self.txn_status.as_char()));
        }
        Ok(())
    }

    /// Begin a transaction.
    ///
    /// The connection must be idle. The returned guard rolls back on drop
    /// unless [`commit`][Transaction::commit] ran.
    pub fn begin(&mut self) -> Result<Transaction<'_>> {
        self.check_is_in_transaction(false)?;
        let (_, tag) = self.simple_exec("BEGIN")?;
        if tag != "BEGIN" {
            return Err(TransactionError::UnexpectedTag { got: tag, want: "BEGIN" }.into());
        }
        if self.txn_status != TransactionStatus::InTransaction {
            return Err(TransactionError::UnexpectedStatus(self.txn_status.as_char()).into());
        }
        Ok(Transaction { conn: self, finished: false })
    }

    fn commit_tx(&mut self) -> Result<()> {
        self.check_is_in_transaction(true)?;

        // The caller must not think everything is okay when it commits a
        // failed transaction. The server would refuse the COMMIT and roll
        // back anyway, so abort here and report it; afterwards the
        // connection is idle again.
        if self.txn_status == TransactionStatus::FailedTransaction {
            self.rollback_tx()?;
            return Err(TransactionError::InFailedTransaction.into());
        }

        let (_, tag) = self.simple_exec("COMMIT")?;
        if tag != "COMMIT" {
            return Err(TransactionError::UnexpectedTag { got: tag, want: "COMMIT" }.into());
        }
        self.check_is_in_transaction(false)?;
        Ok(())
    }

    fn rollback_tx(&mut self) -> Result<()> {
        self.check_is_in_transaction(true)?;
        let (_, tag) = self.simple_exec("ROLLBACK")?;
        if tag != "ROLLBACK" {
            return Err(TransactionError::UnexpectedTag { got: tag, want: "ROLLBACK" }.into());
        }
        self.check_is_in_transaction(false)?;
        Ok(())
    }
}

/// An RAII implementation of transaction scope.
///
/// Statements run through the guard while it lives. If not commited, the
/// transaction is rolled back when the guard drops.
pub struct Transaction<'c> {
    conn: &'c mut Connection,
    finished: bool,
}

impl Transaction<'_> {
    /// Commit the transaction.
    ///
    /// Committing a transaction the server already marked failed rolls it
    /// back instead and reports
    /// [`TransactionError::InFailedTransaction`].
    pub fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.conn.commit_tx()
    }

    /// Roll the transaction back.
    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.conn.rollback_tx()
    }

    /// See [`Connection::prepare`].
    pub fn prepare(&mut self, query: &str) -> Result<Statement<'_>> {
        self.conn.prepare(query)
    }

    /// See [`Connection::query`].
    pub fn query(&mut self, query: &str) -> Result<Rows<'_>> {
        self.conn.query(query)
    }

    /// See [`Connection::execute`].
    pub fn execute(&mut self, query: &str, params: &[Value]) -> Result<ExecResult> {
        self.conn.execute(query, params)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.conn.rollback_tx() {
            log::error!("rollback error: {err:#?}");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_bytes() {
        assert_eq!(TransactionStatus::from_byte(b'I').unwrap(), TransactionStatus::Idle);
        assert_eq!(TransactionStatus::from_byte(b'T').unwrap(), TransactionStatus::InTransaction);
        assert_eq!(TransactionStatus::from_byte(b'E').unwrap(), TransactionStatus::FailedTransaction);
        assert!(TransactionStatus::from_byte(b'X').is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(TransactionStatus::Idle.to_string(), "idle");
        assert_eq!(TransactionStatus::InTransaction.to_string(), "idle in transaction");
        assert_eq!(TransactionStatus::FailedTransaction.to_string(), "in a failed transaction");
    }
}
