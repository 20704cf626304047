//! SQLite-backed hash cache database.
//!
//! One writer connection serializes every write; reads go through a small
//! pool of read-only connections. The database runs in WAL mode, so readers
//! see the last committed state and never a half-written batch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags};
use serde::Serialize;

use super::entry::{CacheEntry, CacheKey};
use crate::scanner::{DigestKind, Hash};

/// Current on-disk schema version. Older databases are dropped and rebuilt,
/// since every entry can be recomputed.
const SCHEMA_VERSION: i64 = 1;

/// Keys per `IN (...)` lookup query.
const LOOKUP_CHUNK: usize = 500;

/// Idle read connections kept for reuse.
const MAX_IDLE_READERS: usize = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS hash_cache (
    path       BLOB    NOT NULL,
    size       INTEGER NOT NULL,
    mtime_ns   INTEGER NOT NULL,
    kind       INTEGER NOT NULL,
    digest     BLOB    NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (path, size, mtime_ns, kind)
) WITHOUT ROWID;
";

/// Errors raised by the hash cache.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The database file is not a valid SQLite database.
    #[error("Cache database is corrupt: {path}")]
    Corrupt {
        /// Database file
        path: PathBuf,
        /// Error reported by SQLite
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure.
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem error around the database file.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A thread panicked while holding a cache connection.
    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Summary of cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Stored digests of either kind
    pub entries: u64,
    /// Stored partial digests
    pub partial_entries: u64,
    /// Stored full digests
    pub full_entries: u64,
    /// Distinct (path, size, mtime) versions
    pub file_versions: u64,
    /// Sum of file sizes over distinct versions
    pub cached_bytes: u64,
    /// Creation time of the oldest entry
    pub oldest: Option<DateTime<Utc>>,
    /// Creation time of the newest entry
    pub newest: Option<DateTime<Utc>>,
    /// Size of the database file plus its WAL, zero in memory
    pub database_bytes: u64,
}

/// Persistent cache for file digests using SQLite.
pub struct HashCache {
    path: Option<PathBuf>,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl std::fmt::Debug for HashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashCache").field("path", &self.path).finish()
    }
}

impl HashCache {
    /// Opens or creates a hash cache at the specified path.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupt`] if the file exists but is not a usable
    /// database, or another [`CacheError`] if it cannot be created.
    pub fn new(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| classify(path, e))?;
        configure(&conn).map_err(|e| classify(path, e))?;
        migrate(&conn).map_err(|e| classify(path, e))?;
        log::debug!("Opened hash cache at {}", path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Opens a cache that lives only as long as this value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if SQLite cannot allocate the database.
    pub fn in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            path: None,
            writer: Mutex::new(conn),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Opens the cache, recreating it from scratch if the file is corrupt.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache cannot be opened even after the
    /// corrupt file was removed.
    pub fn open_or_recover(path: &Path) -> CacheResult<Self> {
        match Self::new(path) {
            Err(CacheError::Corrupt { source, .. }) => {
                log::warn!(
                    "Hash cache {} is corrupt ({}), recreating it",
                    path.display(),
                    source
                );
                remove_database_files(path)?;
                Self::new(path)
            }
            other => other,
        }
    }

    /// Database file, `None` for an in-memory cache.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn map_err(&self, error: rusqlite::Error) -> CacheError {
        match &self.path {
            Some(path) => classify(path, error),
            None => CacheError::Database(error),
        }
    }

    /// Run a read-only closure on a pooled reader connection.
    fn with_reader<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> CacheResult<T> {
        let Some(path) = &self.path else {
            let conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
            return f(&conn).map_err(CacheError::Database);
        };

        let pooled = self
            .readers
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => open_reader(path).map_err(|e| classify(path, e))?,
        };

        let result = f(&conn);
        if let Ok(mut pool) = self.readers.lock() {
            if pool.len() < MAX_IDLE_READERS {
                pool.push(conn);
            }
        }
        result.map_err(|e| classify(path, e))
    }

    /// Look up digests of one kind for many file versions at once.
    ///
    /// Only exact (path, size, mtime) matches are returned; keys without a
    /// stored digest are absent from the map. Rows whose digest has the wrong
    /// width are ignored and will be overwritten by the next store.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be read.
    pub fn lookup_batch(
        &self,
        kind: DigestKind,
        keys: &[CacheKey],
    ) -> CacheResult<HashMap<CacheKey, Hash>> {
        let mut found = HashMap::with_capacity(keys.len());
        if keys.is_empty() {
            return Ok(found);
        }

        self.with_reader(|conn| {
            for chunk in keys.chunks(LOOKUP_CHUNK) {
                let wanted: HashMap<(Vec<u8>, i64, i64), &CacheKey> = chunk
                    .iter()
                    .map(|key| ((path_to_blob(&key.path), size_to_sql(key.size), key.mtime_ns), key))
                    .collect();

                let placeholders = vec!["?"; chunk.len()].join(", ");
                let sql = format!(
                    "SELECT path, size, mtime_ns, digest FROM hash_cache \
                     WHERE kind = ? AND path IN ({placeholders})"
                );
                let mut stmt = conn.prepare_cached(&sql)?;

                let mut values = Vec::with_capacity(chunk.len() + 1);
                values.push(Value::Integer(kind.code()));
                values.extend(chunk.iter().map(|key| Value::Blob(path_to_blob(&key.path))));

                let mut rows = stmt.query(params_from_iter(values.iter()))?;
                while let Some(row) = rows.next()? {
                    let path: Vec<u8> = row.get(0)?;
                    let size: i64 = row.get(1)?;
                    let mtime_ns: i64 = row.get(2)?;
                    let Some(key) = wanted.get(&(path, size, mtime_ns)) else {
                        continue;
                    };
                    let digest: Vec<u8> = row.get(3)?;
                    match <Hash>::try_from(digest.as_slice()) {
                        Ok(hash) => {
                            found.insert((*key).clone(), hash);
                        }
                        Err(_) => log::warn!(
                            "Ignoring malformed cache entry for {}",
                            key.path.display()
                        ),
                    }
                }
            }
            Ok(())
        })?;

        log::trace!(
            "Cache lookup ({}): {} of {} keys found",
            kind,
            found.len(),
            keys.len()
        );
        Ok(found)
    }

    /// Store many digests in one transaction.
    ///
    /// Entries are upserted by (path, size, mtime, kind). Entries for older
    /// versions of the same path are left in place until explicitly pruned.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the transaction fails; nothing is written then.
    pub fn store_batch(&self, entries: &[CacheEntry]) -> CacheResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
        let created_at = Utc::now().timestamp();

        let tx = conn.transaction().map_err(|e| self.map_err(e))?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO hash_cache (path, size, mtime_ns, kind, digest, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(path, size, mtime_ns, kind) DO UPDATE SET
                         digest = excluded.digest,
                         created_at = excluded.created_at",
                )
                .map_err(|e| self.map_err(e))?;

            for entry in entries {
                stmt.execute(params![
                    path_to_blob(&entry.key.path),
                    size_to_sql(entry.key.size),
                    entry.key.mtime_ns,
                    entry.kind.code(),
                    &entry.digest[..],
                    created_at,
                ])
                .map_err(|e| self.map_err(e))?;
            }
        }
        tx.commit().map_err(|e| self.map_err(e))?;

        log::trace!("Stored {} cache entries", entries.len());
        Ok(entries.len())
    }

    /// Summarize the cache contents.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be read.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let mut stats = self.with_reader(|conn| {
            let (entries, partial_entries, full_entries, oldest, newest) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(kind = 0), 0),
                        COALESCE(SUM(kind = 1), 0),
                        MIN(created_at),
                        MAX(created_at)
                 FROM hash_cache",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )?;
            let (file_versions, cached_bytes) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0)
                 FROM (SELECT DISTINCT path, size, mtime_ns FROM hash_cache)",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;

            Ok(CacheStats {
                entries: entries.unsigned_abs(),
                partial_entries: partial_entries.unsigned_abs(),
                full_entries: full_entries.unsigned_abs(),
                file_versions: file_versions.unsigned_abs(),
                cached_bytes: cached_bytes.unsigned_abs(),
                oldest: oldest.and_then(|secs| DateTime::from_timestamp(secs, 0)),
                newest: newest.and_then(|secs| DateTime::from_timestamp(secs, 0)),
                database_bytes: 0,
            })
        })?;

        if let Some(path) = &self.path {
            stats.database_bytes = [path.clone(), sidecar(path, "-wal")]
                .iter()
                .filter_map(|p| fs::metadata(p).ok())
                .map(|m| m.len())
                .sum();
        }
        Ok(stats)
    }

    /// Delete every entry. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn clear(&self) -> CacheResult<usize> {
        let conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
        let removed = conn
            .execute("DELETE FROM hash_cache", [])
            .map_err(|e| self.map_err(e))?;
        log::info!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Delete every entry for one path, whatever its size or mtime.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn invalidate(&self, path: &Path) -> CacheResult<usize> {
        let conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
        conn.execute(
            "DELETE FROM hash_cache WHERE path = ?1",
            params![path_to_blob(path)],
        )
        .map_err(|e| self.map_err(e))
    }

    /// Delete every entry at or below a directory.
    ///
    /// Matching is by path component: `/a/b` covers `/a/b/c` but not `/a/bc`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn invalidate_prefix(&self, prefix: &Path) -> CacheResult<usize> {
        let exact = path_to_blob(prefix);
        let mut below = exact.clone();
        let separator = std::path::MAIN_SEPARATOR as u8;
        if below.last() != Some(&separator) {
            below.push(separator);
        }
        let below_len = i64::try_from(below.len()).unwrap_or(i64::MAX);

        let conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
        let removed = conn
            .execute(
                "DELETE FROM hash_cache WHERE path = ?1 OR substr(path, 1, ?3) = ?2",
                params![exact, below, below_len],
            )
            .map_err(|e| self.map_err(e))?;
        log::debug!(
            "Invalidated {} cache entries under {}",
            removed,
            prefix.display()
        );
        Ok(removed)
    }

    /// Delete entries whose file no longer exists.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be read or written.
    pub fn prune_missing(&self) -> CacheResult<usize> {
        let paths: Vec<Vec<u8>> = self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT path FROM hash_cache")?;
            let paths = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(paths)
        })?;

        let missing: Vec<Vec<u8>> = paths
            .into_iter()
            .filter(|blob| !blob_to_path(blob).exists())
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let mut conn = self.writer.lock().map_err(|_| CacheError::Poisoned)?;
        let tx = conn.transaction().map_err(|e| self.map_err(e))?;
        let mut removed = 0;
        {
            let mut stmt = tx
                .prepare_cached("DELETE FROM hash_cache WHERE path = ?1")
                .map_err(|e| self.map_err(e))?;
            for blob in &missing {
                removed += stmt.execute(params![blob]).map_err(|e| self.map_err(e))?;
            }
        }
        tx.commit().map_err(|e| self.map_err(e))?;

        log::info!(
            "Pruned {} cache entries for {} missing files",
            removed,
            missing.len()
        );
        Ok(removed)
    }

    /// Close every connection, flushing the WAL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if SQLite reports an error while closing.
    pub fn close(self) -> CacheResult<()> {
        let readers = self.readers.into_inner().map_err(|_| CacheError::Poisoned)?;
        for reader in readers {
            reader.close().map_err(|(_, e)| CacheError::Database(e))?;
        }
        let writer = self.writer.into_inner().map_err(|_| CacheError::Poisoned)?;
        writer.close().map_err(|(_, e)| CacheError::Database(e))
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )
}

/// Check the schema version and rebuild if it is older than this build.
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version == SCHEMA_VERSION {
        return conn.execute_batch(SCHEMA);
    }

    log::debug!(
        "Cache schema version {} != {}, rebuilding",
        version,
        SCHEMA_VERSION
    );
    conn.execute_batch(&format!(
        "DROP TABLE IF EXISTS hash_cache;
         {SCHEMA}
         PRAGMA user_version = {SCHEMA_VERSION};"
    ))
}

fn open_reader(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn classify(path: &Path, error: rusqlite::Error) -> CacheError {
    match error.sqlite_error_code() {
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => CacheError::Corrupt {
            path: path.to_path_buf(),
            source: error,
        },
        _ => CacheError::Database(error),
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_database_files(path: &Path) -> CacheResult<()> {
    for file in [path.to_path_buf(), sidecar(path, "-wal"), sidecar(path, "-shm")] {
        match fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CacheError::Io { path: file, source }),
        }
    }
    Ok(())
}

fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

#[cfg(unix)]
fn path_to_blob(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_to_blob(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn blob_to_path(blob: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(blob))
}

#[cfg(not(unix))]
fn blob_to_path(blob: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(blob).into_owned())
}
