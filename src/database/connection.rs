/*!
 * Checkpoint database connection.
 *
 * One SQLite connection behind a `parking_lot` mutex. The async entry points
 * hop onto the blocking pool so pipeline tasks never wait on disk I/O.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

const DATA_SUBDIR: &str = "pdfdual";
const CHECKPOINT_FILE: &str = "checkpoints.db";

/// Shared handle to the checkpoint database
#[derive(Clone)]
pub struct DatabaseConnection {
    location: PathBuf,
    inner: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DatabaseConnection").field(&self.location).finish()
    }
}

impl DatabaseConnection {
    /// Open the checkpoint store in the user's data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (or create) the checkpoint store at `db_path`, creating missing directories
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let location = db_path.as_ref().to_path_buf();
        if let Some(dir) = location.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("Cannot create checkpoint directory {:?}", dir))?;
        }

        info!("Checkpoint store: {:?}", location);
        let conn =
            Connection::open(&location).with_context(|| format!("Cannot open checkpoint store {:?}", location))?;
        Self::prepare(conn, location)
    }

    pub fn new_in_memory() -> Result<Self> {
        debug!("Using in-memory checkpoint store");
        let conn = Connection::open_in_memory().context("Cannot open in-memory checkpoint store")?;
        Self::prepare(conn, PathBuf::from(":memory:"))
    }

    fn prepare(conn: Connection, location: PathBuf) -> Result<Self> {
        schema::initialize_schema(&conn)?;
        Ok(Self {
            location,
            inner: Arc::new(Mutex::new(conn)),
        })
    }

    /// `<data dir>/pdfdual/checkpoints.db`
    pub fn default_database_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| anyhow!("No user data directory on this platform; set checkpoint.path"))?;
        Ok(data_dir.join(DATA_SUBDIR).join(CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Run `f` against the connection on the calling thread
    pub fn execute<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.inner.lock())
    }

    /// Run `f` against the connection on tokio's blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| f(conn)).await
    }

    /// Like `execute_async`, inside a transaction committed when `f` returns `Ok`
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let value = f(&tx)?;
            tx.commit().context("Checkpoint commit failed")?;
            Ok(value)
        })
        .await
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&mut inner.lock()))
            .await
            .context("Checkpoint store task panicked")?
    }
}
