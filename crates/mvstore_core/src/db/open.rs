//! Connection bootstrap for the document store.
//!
//! # Invariants
//! - Returned connections carry the configured busy timeout.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::DbResult;
use crate::config::{StoreConfig, StoreLocation};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::Instant;

/// Opens the store described by `config` and applies pending migrations.
///
/// # Side effects
/// - Emits `db_open` events with mode, duration and status.
pub fn open_store(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = config.mode_label();
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match &config.location {
        StoreLocation::Memory => Connection::open_in_memory(),
        StoreLocation::File(path) => Connection::open(path),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err.into());
        }
    };

    if let Err(err) = configure(&mut conn, config) {
        error!(
            "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} timeout_ms={} duration_ms={}",
        config.timeout_ms,
        started_at.elapsed().as_millis()
    );
    Ok(conn)
}

/// Opens a file-backed store with default connection options.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store(&StoreConfig::file(path.as_ref()))
}

/// Opens a private in-memory store with default connection options.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_store(&StoreConfig::in_memory())
}

fn configure(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    conn.busy_timeout(config.timeout())?;
    if let Some(mode) = config.journal_mode {
        // journal_mode returns the resulting mode as a row.
        conn.query_row(
            &format!("PRAGMA journal_mode = {};", mode.pragma_value()),
            [],
            |_| Ok(()),
        )?;
    }
    if let Some(sync) = config.synchronous {
        conn.execute_batch(&format!("PRAGMA synchronous = {};", sync.pragma_value()))?;
    }
    apply_migrations(conn)?;
    Ok(())
}
