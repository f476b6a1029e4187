//! Transaction coordinator: demarcates transactions for exactly one
//! persistence unit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use polystore_domain::error::{PolystoreError, TransactionError};

use crate::datasource::TxConn;
use crate::executor::Conn;
use crate::unit::PersistenceUnit;

pub struct TransactionCoordinator {
    name: String,
    unit: Arc<PersistenceUnit>,
    active: Arc<AtomicUsize>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("name", &self.name)
            .field("unit", &self.unit.name())
            .field("active", &self.active_transactions())
            .finish_non_exhaustive()
    }
}

impl TransactionCoordinator {
    #[must_use]
    pub fn new(name: impl Into<String>, unit: Arc<PersistenceUnit>) -> Self {
        Self {
            name: name.into(),
            unit,
            active: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The unit whose transactions this coordinator demarcates.
    #[must_use]
    pub fn unit(&self) -> &Arc<PersistenceUnit> {
        &self.unit
    }

    /// Transactions begun and not yet finished.
    #[must_use]
    pub fn active_transactions(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Begin a transaction on a connection of the unit's datasource.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::CoordinatorClosed`] after [`Self::close`],
    /// or a storage error when no connection can be acquired.
    pub async fn begin(&self) -> Result<Tx, PolystoreError> {
        if self.is_closed() {
            return Err(TransactionError::CoordinatorClosed(self.name.clone()).into());
        }

        let conn = self.unit.datasource().begin().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(coordinator = %self.name, tx = id, "transaction begun");

        Ok(Tx {
            conn,
            guard: ActiveGuard {
                id,
                unit: self.unit.name().to_string(),
                coordinator: self.name.clone(),
                active: Arc::clone(&self.active),
                finished: false,
            },
        })
    }

    /// Commit `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::ForeignUnit`] when `tx` was begun by another
    /// coordinator (it is then rolled back), or a storage error when the
    /// commit fails.
    pub async fn commit(&self, tx: Tx) -> Result<(), PolystoreError> {
        let Tx { conn, mut guard } = self.claim(tx)?;
        guard.finished = true;
        conn.commit().await?;
        tracing::debug!(coordinator = %self.name, tx = guard.id, "transaction committed");
        Ok(())
    }

    /// Roll `tx` back.
    ///
    /// # Errors
    ///
    /// Same as [`Self::commit`].
    pub async fn rollback(&self, tx: Tx) -> Result<(), PolystoreError> {
        let Tx { conn, mut guard } = self.claim(tx)?;
        guard.finished = true;
        conn.rollback().await?;
        tracing::debug!(coordinator = %self.name, tx = guard.id, "transaction rolled back");
        Ok(())
    }

    fn claim(&self, tx: Tx) -> Result<Tx, TransactionError> {
        if tx.guard.coordinator == self.name && tx.guard.unit == self.unit.name() {
            Ok(tx)
        } else {
            Err(TransactionError::ForeignUnit {
                expected: self.unit.name().to_string(),
                actual: tx.guard.unit.clone(),
            })
        }
    }

    /// Refuse new transactions. Open ones stay usable until finished.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let active = self.active_transactions();
        if active > 0 {
            tracing::warn!(coordinator = %self.name, active, "closing with open transactions");
        }
        tracing::info!(coordinator = %self.name, "transaction coordinator closed");
    }
}

/// An open transaction. Dropping it unfinished rolls it back.
pub struct Tx {
    conn: TxConn,
    guard: ActiveGuard,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("id", &self.guard.id)
            .field("unit", &self.guard.unit)
            .finish_non_exhaustive()
    }
}

impl Tx {
    /// Name of the persistence unit the transaction belongs to.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.guard.unit
    }

    #[must_use]
    pub fn coordinator(&self) -> &str {
        &self.guard.coordinator
    }

    pub(crate) fn conn(&mut self) -> Conn<'_> {
        self.conn.conn()
    }
}

struct ActiveGuard {
    id: u64,
    unit: String,
    coordinator: String,
    active: Arc<AtomicUsize>,
    finished: bool,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
        if !self.finished {
            tracing::warn!(
                coordinator = %self.coordinator,
                tx = self.id,
                "transaction dropped without commit, rolling back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_domain::catalog::EntityCatalog;
    use polystore_domain::namespace::Namespace;

    use crate::config::{DatasourceConfig, SchemaAction};
    use crate::datasource::Datasource;

    async fn coordinator(name: &str, unit: &str) -> TransactionCoordinator {
        let ds = Datasource::build(name, &DatasourceConfig::from_url("sqlite::memory:"))
            .await
            .unwrap();
        let unit = PersistenceUnit::build(
            Arc::new(ds),
            Namespace::parse("library::entity").unwrap(),
            unit,
            &EntityCatalog::builtin(),
            SchemaAction::Create,
        )
        .await
        .unwrap();
        TransactionCoordinator::new(format!("{name}TransactionManager"), Arc::new(unit))
    }

    #[tokio::test]
    async fn should_track_active_transactions() {
        let coordinator = coordinator("library", "libraryUnit").await;
        let tx = coordinator.begin().await.unwrap();
        assert_eq!(tx.unit(), "libraryUnit");
        assert_eq!(coordinator.active_transactions(), 1);

        coordinator.commit(tx).await.unwrap();
        assert_eq!(coordinator.active_transactions(), 0);
    }

    #[tokio::test]
    async fn should_release_transaction_when_dropped() {
        let coordinator = coordinator("library", "libraryUnit").await;
        {
            let _tx = coordinator.begin().await.unwrap();
            assert_eq!(coordinator.active_transactions(), 1);
        }
        assert_eq!(coordinator.active_transactions(), 0);
    }

    #[tokio::test]
    async fn should_reject_transaction_from_another_unit() {
        let library = coordinator("library", "libraryUnit").await;
        let accounts = coordinator("accounts", "accountsUnit").await;

        let tx = accounts.begin().await.unwrap();
        let result = library.commit(tx).await;
        assert!(matches!(
            result,
            Err(PolystoreError::Transaction(TransactionError::ForeignUnit { .. }))
        ));
        assert_eq!(accounts.active_transactions(), 0);
    }

    #[tokio::test]
    async fn should_refuse_to_begin_after_close() {
        let coordinator = coordinator("library", "libraryUnit").await;
        coordinator.close();
        assert!(coordinator.is_closed());

        let result = coordinator.begin().await;
        assert!(matches!(
            result,
            Err(PolystoreError::Transaction(
                TransactionError::CoordinatorClosed(_)
            ))
        ));
    }
}
