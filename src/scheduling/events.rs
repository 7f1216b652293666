// Event catalog - events own stages and lineups; the creating promoter account is the only writer

use base64::Engine;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{current_time_millis, from_millis, to_millis, EventId, UserId, VenueId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CurrentUser, Directories, IdGenerator, SqliteDatabase};
use crate::models::{Event, NewEvent};

const EVENT_COLUMNS: &str =
    "id, name, date, address, venue, hash, owner_user_id, lineup_public, created_at";
const HASH_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct EventCatalog {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
    directories: Directories,
}

impl EventCatalog {
    pub fn new(db: Arc<SqliteDatabase>, ids: Arc<IdGenerator>, directories: Directories) -> Self {
        Self {
            db,
            ids,
            directories,
        }
    }

    pub async fn create_event(&self, viewer: &dyn CurrentUser, new: NewEvent) -> AppResult<Event> {
        let owner = viewer.require_user()?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("event name is required".to_string()));
        }
        if let Some(venue_id) = new.venue_id {
            self.ensure_venue(venue_id).await?;
        }

        let id = EventId::new(self.ids.next_id());
        let created_at = current_time_millis();

        for attempt in 1..=HASH_ATTEMPTS {
            let hash = generate_hash();
            let result = sqlx::query(
                "INSERT INTO events (id, name, date, address, venue, hash, owner_user_id, lineup_public, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?)",
            )
            .bind(id.value())
            .bind(name)
            .bind(new.date.map(to_millis))
            .bind(new.address.as_deref())
            .bind(new.venue_id.map(VenueId::value))
            .bind(&hash)
            .bind(owner.value())
            .bind(created_at)
            .execute(self.db.pool())
            .await;

            match result {
                Ok(_) => {
                    info!(event_id = %id, %hash, owner = %owner, "event created");
                    return self.get_event(id).await;
                }
                Err(e) if AppError::is_unique_violation(&e) && attempt < HASH_ATTEMPTS => {
                    warn!(attempt, "event hash collision, regenerating");
                }
                Err(e) => {
                    return Err(AppError::DatabaseError(format!(
                        "Failed to create event: {}",
                        e
                    )))
                }
            }
        }
        Err(AppError::DatabaseError(
            "Failed to allocate a unique event hash".to_string(),
        ))
    }

    pub async fn get_event(&self, id: EventId) -> AppResult<Event> {
        let mut conn = self.acquire().await?;
        fetch_event(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))
    }

    pub async fn get_event_by_hash(&self, hash: &str) -> AppResult<Event> {
        let sql = format!("SELECT {} FROM events WHERE hash = ?", EVENT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(hash)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get event by hash: {}", e)))?;
        match row {
            Some(row) => event_from_row(&row),
            None => Err(AppError::NotFound(format!("Event '{}' not found", hash))),
        }
    }

    /// Change the venue stages inherit from. Existing stages keep the venue
    /// they were created with.
    pub async fn set_event_venue(
        &self,
        viewer: &dyn CurrentUser,
        id: EventId,
        venue_id: Option<VenueId>,
    ) -> AppResult<Event> {
        let user = viewer.require_user()?;
        if let Some(venue_id) = venue_id {
            self.ensure_venue(venue_id).await?;
        }

        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let event = fetch_event(conn, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;
            require_owner(&event, user)?;

            sqlx::query("UPDATE events SET venue = ? WHERE id = ?")
                .bind(venue_id.map(VenueId::value))
                .bind(id.value())
                .execute(&mut *conn)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to update event venue: {}", e)))?;
            Ok::<_, AppError>(())
        }
        .await;
        tx.finish(written).await?;

        self.get_event(id).await
    }

    pub async fn set_lineup_public(
        &self,
        viewer: &dyn CurrentUser,
        id: EventId,
        public: bool,
    ) -> AppResult<Event> {
        let user = viewer.require_user()?;
        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let event = fetch_event(conn, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", id)))?;
            require_owner(&event, user)?;

            sqlx::query("UPDATE events SET lineup_public = ? WHERE id = ?")
                .bind(public)
                .bind(id.value())
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to update lineup visibility: {}", e))
                })?;
            Ok::<_, AppError>(())
        }
        .await;
        tx.finish(written).await?;

        self.get_event(id).await
    }

    async fn ensure_venue(&self, venue_id: VenueId) -> AppResult<()> {
        self.directories
            .venues
            .get_venue(venue_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Venue {} not found", venue_id)))
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }
}

pub(crate) async fn fetch_event(conn: &mut SqliteConnection, id: EventId) -> AppResult<Option<Event>> {
    let sql = format!("SELECT {} FROM events WHERE id = ?", EVENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get event {}: {}", id, e)))?;
    row.as_ref().map(event_from_row).transpose()
}

pub(crate) fn require_owner(event: &Event, user: UserId) -> AppResult<()> {
    if event.owner_user_id != user {
        return Err(AppError::Forbidden(format!(
            "only the event's promoter may change event {}",
            event.id
        )));
    }
    Ok(())
}

fn event_from_row(row: &SqliteRow) -> AppResult<Event> {
    Ok(Event {
        id: EventId::new(row.try_get("id")?),
        name: row.try_get("name")?,
        date: row
            .try_get::<Option<i64>, _>("date")?
            .map(from_millis)
            .transpose()?,
        address: row.try_get("address")?,
        venue_id: row.try_get::<Option<i64>, _>("venue")?.map(VenueId::new),
        hash: row.try_get("hash")?,
        owner_user_id: UserId::new(row.try_get("owner_user_id")?),
        lineup_public: row.try_get("lineup_public")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

/// 12-character URL-safe slug.
fn generate_hash() -> String {
    let bytes: [u8; 9] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
