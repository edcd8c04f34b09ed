//! Unit of work: one store session shared by a group of repository calls.
//!
//! # Invariants
//! - One unit of work maps to one SQLite transaction.
//! - A unit of work is consumed by `commit`/`rollback`; dropping it
//!   uncommitted rolls back.
//! - Units of work never nest; each service call opens its own.

use super::{
    Collection, RepoError, RepoResult, SqliteArtifactRepository, SqliteDocumentRepository,
};
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use uuid::Uuid;

/// Scoped session over one connection.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    session_id: Uuid,
}

impl<'conn> UnitOfWork<'conn> {
    /// Starts a write session; takes the store write lock up front.
    pub fn begin(conn: &'conn Connection) -> RepoResult<Self> {
        Self::start(conn, TransactionBehavior::Immediate)
    }

    /// Starts a read session.
    pub fn begin_read(conn: &'conn Connection) -> RepoResult<Self> {
        Self::start(conn, TransactionBehavior::Deferred)
    }

    fn start(conn: &'conn Connection, behavior: TransactionBehavior) -> RepoResult<Self> {
        let tx = Transaction::new_unchecked(conn, behavior)?;
        let session_id = Uuid::new_v4();
        debug!("event=uow_begin module=repo status=ok session_id={session_id}");
        Ok(Self { tx, session_id })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn experiments(&self) -> SqliteDocumentRepository<'_> {
        self.documents(Collection::Experiments)
    }

    pub fn models(&self) -> SqliteDocumentRepository<'_> {
        self.documents(Collection::Models)
    }

    pub fn documents(&self, collection: Collection) -> SqliteDocumentRepository<'_> {
        SqliteDocumentRepository::bound(&self.tx, collection)
    }

    pub fn artifacts(&self) -> SqliteArtifactRepository<'_> {
        SqliteArtifactRepository::bound(&self.tx)
    }

    pub fn commit(self) -> RepoResult<()> {
        let session_id = self.session_id;
        self.tx.commit()?;
        debug!("event=uow_commit module=repo status=ok session_id={session_id}");
        Ok(())
    }

    pub fn rollback(self) -> RepoResult<()> {
        let session_id = self.session_id;
        self.tx.rollback()?;
        debug!("event=uow_rollback module=repo status=ok session_id={session_id}");
        Ok(())
    }

    /// Runs `body` in a write session: commit on `Ok`, roll back on `Err`.
    pub fn run<T, E, F>(conn: &'conn Connection, body: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&UnitOfWork<'conn>) -> Result<T, E>,
    {
        Self::finish(Self::begin(conn)?, body)
    }

    /// Runs `body` in a read session.
    pub fn run_read<T, E, F>(conn: &'conn Connection, body: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&UnitOfWork<'conn>) -> Result<T, E>,
    {
        Self::finish(Self::begin_read(conn)?, body)
    }

    fn finish<T, E, F>(uow: Self, body: F) -> Result<T, E>
    where
        E: From<RepoError>,
        F: FnOnce(&UnitOfWork<'conn>) -> Result<T, E>,
    {
        match body(&uow) {
            Ok(value) => {
                uow.commit()?;
                Ok(value)
            }
            Err(err) => {
                let session_id = uow.session_id;
                if let Err(rollback_err) = uow.rollback() {
                    warn!(
                        "event=uow_rollback module=repo status=error session_id={session_id} error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }
}
