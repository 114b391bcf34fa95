// ==========================================
// Precast tracking backend - SQLite connections
// ==========================================
// Goals:
// - every connection gets the same PRAGMAs (foreign keys, busy_timeout)
// - import workers check a connection out per unit of work and give it
//   back immediately; no connection is held across batches
// ==========================================

use rusqlite::Connection;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Default busy_timeout (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Apply the uniform PRAGMAs to a connection.
///
/// foreign_keys and busy_timeout are per-connection settings in SQLite.
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// Open a SQLite connection with the uniform configuration applied.
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

// ==========================================
// ConnectionPool
// ==========================================

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("connection pool exhausted: no connection within {0:?}")]
    Exhausted(Duration),

    #[error("connection pool closed")]
    Closed,

    #[error("failed to open database connection: {0}")]
    Open(#[from] rusqlite::Error),
}

struct PoolInner {
    db_path: String,
    max_size: usize,
    acquire_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
    permits: Arc<Semaphore>,
}

/// Process-wide pool of SQLite connections.
///
/// At most `max_size` connections are checked out at once; `acquire`
/// waits up to `acquire_timeout` for a free slot and otherwise reports
/// the pool as exhausted.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool and validate the database path by opening the first
    /// connection (WAL journal mode is enabled on it, which persists in the file).
    pub fn new(db_path: &str, max_size: usize, acquire_timeout: Duration) -> rusqlite::Result<Self> {
        let max_size = max_size.max(1);
        let first = open_sqlite_connection(db_path)?;
        let _mode: String =
            first.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;

        Ok(Self {
            inner: Arc::new(PoolInner {
                db_path: db_path.to_string(),
                max_size,
                acquire_timeout,
                idle: Mutex::new(vec![first]),
                permits: Arc::new(Semaphore::new(max_size)),
            }),
        })
    }

    pub fn db_path(&self) -> &str {
        &self.inner.db_path
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Number of connections currently checked out.
    pub fn in_use(&self) -> usize {
        self.inner.max_size - self.inner.permits.available_permits()
    }

    /// Check a connection out of the pool.
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let timeout = self.inner.acquire_timeout;
        let permit = tokio::time::timeout(timeout, self.inner.permits.clone().acquire_owned())
            .await
            .map_err(|_| PoolError::Exhausted(timeout))?
            .map_err(|_| PoolError::Closed)?;

        let reused = self.inner.idle.lock().ok().and_then(|mut idle| idle.pop());
        let conn = match reused {
            Some(conn) => conn,
            None => open_sqlite_connection(&self.inner.db_path)?,
        };

        Ok(PooledConnection {
            conn: ManuallyDrop::new(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Stop handing out connections; waiters fail with `PoolError::Closed`.
    pub fn close(&self) {
        self.inner.permits.close();
    }
}

/// A checked-out connection; returned to the pool on drop.
pub struct PooledConnection {
    conn: ManuallyDrop<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // SAFETY: `conn` is taken exactly once, here, and never touched again.
        let conn = unsafe { ManuallyDrop::take(&mut self.conn) };
        // A poisoned idle list just means the connection is closed instead of reused.
        if let Ok(mut idle) = self.pool.idle.lock() {
            idle.push(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_configure_sets_foreign_keys() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[tokio::test]
    async fn test_pool_reuses_connections() {
        let file = NamedTempFile::new().unwrap();
        let pool =
            ConnectionPool::new(file.path().to_str().unwrap(), 2, Duration::from_millis(100))
                .unwrap();

        {
            let a = pool.acquire().await.unwrap();
            let _b = pool.acquire().await.unwrap();
            assert_eq!(pool.in_use(), 2);
            a.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        }
        assert_eq!(pool.in_use(), 0);

        let c = pool.acquire().await.unwrap();
        let n: i64 = c
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_released_connection_is_handed_out_again() {
        let file = NamedTempFile::new().unwrap();
        let pool =
            ConnectionPool::new(file.path().to_str().unwrap(), 1, Duration::from_millis(100))
                .unwrap();

        {
            let conn = pool.acquire().await.unwrap();
            // temp tables live only on the connection that created them
            conn.execute_batch("CREATE TEMP TABLE marker (x INTEGER)").unwrap();
        }
        assert_eq!(pool.inner.idle.lock().unwrap().len(), 1);

        let conn = pool.acquire().await.unwrap();
        assert!(pool.inner.idle.lock().unwrap().is_empty());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM temp.marker", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_times_out() {
        let file = NamedTempFile::new().unwrap();
        let pool =
            ConnectionPool::new(file.path().to_str().unwrap(), 1, Duration::from_millis(50))
                .unwrap();

        let _held = pool.acquire().await.unwrap();
        let err = pool.acquire().await.err().unwrap();
        assert!(matches!(err, PoolError::Exhausted(_)));
    }
}
