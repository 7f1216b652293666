use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};

/// Schema for the lineup core. Directory tables (`venues`, `artists`,
/// `promoters`) carry no foreign keys from the core tables: they stand in for
/// external collaborators and may be served from elsewhere.
const SCHEMA: &[(&str, &str)] = &[
    (
        "venues table",
        r#"
        CREATE TABLE IF NOT EXISTS venues (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            address TEXT,
            capacity INTEGER
        )
        "#,
    ),
    (
        "artists table",
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            user_id INTEGER
        )
        "#,
    ),
    (
        "promoters table",
        r#"
        CREATE TABLE IF NOT EXISTS promoters (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            user_id INTEGER
        )
        "#,
    ),
    (
        "events table",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            date INTEGER,
            address TEXT,
            venue INTEGER,
            hash TEXT NOT NULL UNIQUE,
            owner_user_id INTEGER NOT NULL,
            lineup_public INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "event_stage table",
        r#"
        CREATE TABLE IF NOT EXISTS event_stage (
            id INTEGER PRIMARY KEY,
            event INTEGER NOT NULL REFERENCES events(id),
            name TEXT NOT NULL,
            venue INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "event_stage_artists table",
        r#"
        CREATE TABLE IF NOT EXISTS event_stage_artists (
            id INTEGER PRIMARY KEY,
            event INTEGER NOT NULL REFERENCES events(id),
            stage INTEGER NOT NULL REFERENCES event_stage(id),
            artist INTEGER NOT NULL,
            set_start INTEGER NOT NULL,
            set_end INTEGER NOT NULL,
            CHECK (set_start < set_end)
        )
        "#,
    ),
    (
        "event_stage_artists insert overlap trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS event_stage_artists_no_overlap_insert
        BEFORE INSERT ON event_stage_artists
        WHEN EXISTS (
            SELECT 1 FROM event_stage_artists e
            WHERE e.event = NEW.event
              AND (e.stage = NEW.stage OR e.artist = NEW.artist)
              AND e.set_start < NEW.set_end
              AND NEW.set_start < e.set_end
        )
        BEGIN
            SELECT RAISE(ABORT, 'scheduling_conflict');
        END
        "#,
    ),
    (
        "event_stage_artists update overlap trigger",
        r#"
        CREATE TRIGGER IF NOT EXISTS event_stage_artists_no_overlap_update
        BEFORE UPDATE OF stage, artist, set_start, set_end ON event_stage_artists
        WHEN EXISTS (
            SELECT 1 FROM event_stage_artists e
            WHERE e.id != NEW.id
              AND e.event = NEW.event
              AND (e.stage = NEW.stage OR e.artist = NEW.artist)
              AND e.set_start < NEW.set_end
              AND NEW.set_start < e.set_end
        )
        BEGIN
            SELECT RAISE(ABORT, 'scheduling_conflict');
        END
        "#,
    ),
    (
        "requests table",
        r#"
        CREATE TABLE IF NOT EXISTS requests (
            id INTEGER PRIMARY KEY,
            invited_to_entity TEXT NOT NULL CHECK (invited_to_entity IN ('artist', 'promoter')),
            invited_to_entity_id INTEGER NOT NULL,
            invitee_entity TEXT NOT NULL CHECK (invitee_entity IN ('artist', 'promoter')),
            invitee_entity_id INTEGER NOT NULL,
            inviter_user_id INTEGER NOT NULL,
            invitee_user_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'denied', 'cancelled')),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "pending request uniqueness index",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_requests_one_pending
        ON requests (inviter_user_id, invited_to_entity, invited_to_entity_id, invitee_entity, invitee_entity_id)
        WHERE status = 'pending'
        "#,
    ),
    (
        "promoters_artists table",
        r#"
        CREATE TABLE IF NOT EXISTS promoters_artists (
            id INTEGER PRIMARY KEY,
            promoter INTEGER NOT NULL,
            artist INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (promoter, artist)
        )
        "#,
    ),
    (
        "promoters_venues table",
        r#"
        CREATE TABLE IF NOT EXISTS promoters_venues (
            id INTEGER PRIMARY KEY,
            promoter INTEGER NOT NULL,
            venue INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE (promoter, venue)
        )
        "#,
    ),
    (
        "stage index",
        "CREATE INDEX IF NOT EXISTS idx_event_stage_event ON event_stage(event)",
    ),
    (
        "assignment event index",
        "CREATE INDEX IF NOT EXISTS idx_esa_event_start ON event_stage_artists(event, set_start)",
    ),
    (
        "assignment stage index",
        "CREATE INDEX IF NOT EXISTS idx_esa_stage_start ON event_stage_artists(stage, set_start)",
    ),
    (
        "assignment artist index",
        "CREATE INDEX IF NOT EXISTS idx_esa_artist_start ON event_stage_artists(artist, set_start)",
    ),
    (
        "request invitee index",
        "CREATE INDEX IF NOT EXISTS idx_requests_invitee ON requests(invitee_user_id, status)",
    ),
];

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// SQLite-backed store shared by every service in the crate.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Connect to a database URL such as `sqlite:data/lineup.db`.
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Self> {
        if url.contains(":memory:") {
            return Self::new_in_memory().await;
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::ConfigurationError(format!("Invalid database URL {}: {}", url, e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect to {}: {}", url, e)))?;

        info!(url, max_connections, "connected to sqlite");
        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// A private in-memory database. Pinned to one connection that never
    /// expires, since every new in-memory connection would be an empty database.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::ConfigurationError(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.initialize().await?;
        Ok(db)
    }

    /// Create tables, triggers and indexes if they do not exist yet.
    pub async fn initialize(&self) -> AppResult<()> {
        for (what, ddl) in SCHEMA {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to create {}: {}", what, e)))?;
            debug!(object = what, "schema object ready");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a read-then-write transaction with `BEGIN IMMEDIATE`. The write
    /// lock is held from the first read, so a second writer waits on
    /// `busy_timeout` and then reads the first writer's committed rows.
    pub async fn begin_write(&self) -> AppResult<WriteTx> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to begin write transaction: {}", e)))?;
        Ok(WriteTx { conn: Some(conn) })
    }

    /// Health check to verify database connectivity
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Database health check failed: {}", e)))?;
        Ok(())
    }

    /// (idle, total) connections
    pub fn pool_stats(&self) -> (u32, u32) {
        (self.pool.num_idle() as u32, self.pool.size())
    }
}

/// An open `BEGIN IMMEDIATE` transaction. End it with [`WriteTx::finish`],
/// [`WriteTx::commit`] or [`WriteTx::rollback`]; if it is dropped first, the
/// rollback runs on the runtime before the connection goes back to the pool.
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    pub fn conn(&mut self) -> AppResult<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::DatabaseError("write transaction already finished".to_string()))
    }

    /// Commit when `result` is `Ok`, roll back otherwise, and pass it through.
    pub async fn finish<T>(self, result: AppResult<T>) -> AppResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.rollback().await {
                    warn!(error = %e, "rollback after failed write did not complete");
                }
                Err(err)
            }
        }
    }

    pub async fn commit(mut self) -> AppResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
            let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
            return Err(AppError::DatabaseError(format!("Failed to commit transaction: {}", e)));
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> AppResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };
        sqlx::query("ROLLBACK")
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to roll back transaction: {}", e)))?;
        Ok(())
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                        warn!(error = %e, "rollback of abandoned write transaction failed");
                    }
                });
            }
            // no runtime left to roll back on; close the connection instead
            Err(_) => drop(conn.detach()),
        }
    }
}
