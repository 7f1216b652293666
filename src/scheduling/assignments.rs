// Assignment store - artist-to-stage bookings, validated against every booking of the event before each write

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{from_millis, to_millis, ArtistId, AssignmentId, EventId, StageId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CurrentUser, Directories, IdGenerator, SqliteDatabase};
use crate::models::{Assignment, AssignmentPatch};
use crate::scheduling::conflict::{ensure_no_conflicts, find_conflicts, Candidate, TimeSlot};
use crate::scheduling::events::{fetch_event, require_owner};
use crate::scheduling::stages::fetch_stage;

const ASSIGNMENT_COLUMNS: &str = "id, event, stage, artist, set_start, set_end";

#[derive(Clone)]
pub struct AssignmentStore {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
    directories: Directories,
}

impl AssignmentStore {
    pub fn new(db: Arc<SqliteDatabase>, ids: Arc<IdGenerator>, directories: Directories) -> Self {
        Self {
            db,
            ids,
            directories,
        }
    }

    /// Bookings of an event, optionally narrowed to one stage, ordered by
    /// `set_start` ascending.
    pub async fn list_assignments(
        &self,
        event_id: EventId,
        stage_id: Option<StageId>,
    ) -> AppResult<Vec<Assignment>> {
        let mut conn = self.acquire().await?;
        if fetch_event(&mut conn, event_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Event {} not found", event_id)));
        }
        match stage_id {
            Some(stage_id) => assignments_for_stage(&mut conn, event_id, stage_id).await,
            None => assignments_for_event(&mut conn, event_id).await,
        }
    }

    pub async fn get_assignment(&self, id: AssignmentId) -> AppResult<Assignment> {
        let mut conn = self.acquire().await?;
        fetch_assignment(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", id)))
    }

    /// Book `artist_id` on `stage_id` for `[start, end)`. The check and the
    /// insert run under one write lock, so of two racing bookings for the
    /// same slot the second sees the first and gets `SchedulingConflict`.
    pub async fn assign(
        &self,
        viewer: &dyn CurrentUser,
        event_id: EventId,
        artist_id: ArtistId,
        stage_id: StageId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Assignment> {
        let user = viewer.require_user()?;
        let slot = TimeSlot::new(start, end)?;
        if self.directories.artists.get_artist(artist_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Artist {} not found", artist_id)));
        }

        let candidate = Candidate {
            stage_id,
            artist_id,
            slot,
            exclude: None,
        };
        let id = AssignmentId::new(self.ids.next_id());

        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let event = fetch_event(conn, event_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?;
            require_owner(&event, user)?;
            ensure_stage_in_event(conn, stage_id, event_id).await?;

            let existing = assignments_for_event(conn, event_id).await?;
            if let Err(err) = ensure_no_conflicts(&candidate, &existing) {
                debug!(event_id = %event_id, stage_id = %stage_id, artist_id = %artist_id, "booking rejected: {}", err);
                return Err(err);
            }

            let inserted = sqlx::query(
                "INSERT INTO event_stage_artists (id, event, stage, artist, set_start, set_end) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id.value())
            .bind(event_id.value())
            .bind(stage_id.value())
            .bind(artist_id.value())
            .bind(to_millis(slot.start))
            .bind(to_millis(slot.end))
            .execute(&mut *conn)
            .await;
            if let Err(e) = inserted {
                return Err(store_write_error(conn, e, event_id, &candidate).await);
            }
            Ok::<_, AppError>(())
        }
        .await;
        tx.finish(written).await?;

        info!(assignment_id = %id, event_id = %event_id, stage_id = %stage_id, artist_id = %artist_id, "artist booked");
        Ok(Assignment {
            id,
            event_id,
            stage_id,
            artist_id,
            set_start: slot.start,
            set_end: slot.end,
        })
    }

    /// Move a booking to another stage and/or time. The proposed booking is
    /// checked against every other booking of the event.
    pub async fn update(
        &self,
        viewer: &dyn CurrentUser,
        assignment_id: AssignmentId,
        patch: AssignmentPatch,
    ) -> AppResult<Assignment> {
        let user = viewer.require_user()?;

        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let current = fetch_assignment(conn, assignment_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Assignment {} not found", assignment_id)))?;
            let event = fetch_event(conn, current.event_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", current.event_id)))?;
            require_owner(&event, user)?;

            let stage_id = patch.stage_id.unwrap_or(current.stage_id);
            if stage_id != current.stage_id {
                ensure_stage_in_event(conn, stage_id, current.event_id).await?;
            }
            let slot = TimeSlot::new(
                patch.set_start.unwrap_or(current.set_start),
                patch.set_end.unwrap_or(current.set_end),
            )?;

            let candidate = Candidate {
                stage_id,
                artist_id: current.artist_id,
                slot,
                exclude: Some(assignment_id),
            };
            let existing = assignments_for_event(conn, current.event_id).await?;
            ensure_no_conflicts(&candidate, &existing)?;

            let updated = sqlx::query(
                "UPDATE event_stage_artists SET stage = ?, set_start = ?, set_end = ? WHERE id = ?",
            )
            .bind(stage_id.value())
            .bind(to_millis(slot.start))
            .bind(to_millis(slot.end))
            .bind(assignment_id.value())
            .execute(&mut *conn)
            .await;
            if let Err(e) = updated {
                return Err(store_write_error(conn, e, current.event_id, &candidate).await);
            }

            Ok::<_, AppError>(Assignment {
                stage_id,
                set_start: slot.start,
                set_end: slot.end,
                ..current
            })
        }
        .await;
        let moved = tx.finish(written).await?;

        info!(assignment_id = %assignment_id, stage_id = %moved.stage_id, "booking updated");
        Ok(moved)
    }

    /// Delete a booking. Returns `false` when there was nothing to delete.
    pub async fn remove(&self, viewer: &dyn CurrentUser, assignment_id: AssignmentId) -> AppResult<bool> {
        let user = viewer.require_user()?;

        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let Some(current) = fetch_assignment(conn, assignment_id).await? else {
                return Ok(false);
            };
            let event = fetch_event(conn, current.event_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", current.event_id)))?;
            require_owner(&event, user)?;

            sqlx::query("DELETE FROM event_stage_artists WHERE id = ?")
                .bind(assignment_id.value())
                .execute(&mut *conn)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!("Failed to remove assignment {}: {}", assignment_id, e))
                })?;
            Ok::<_, AppError>(true)
        }
        .await;
        let removed = tx.finish(written).await?;

        if removed {
            info!(assignment_id = %assignment_id, "booking removed");
        }
        Ok(removed)
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }
}

/// Map a failed write. An overlap trigger abort only undoes the statement, so
/// the bookings are re-read inside the same transaction to name the collisions.
async fn store_write_error(
    conn: &mut SqliteConnection,
    err: sqlx::Error,
    event_id: EventId,
    candidate: &Candidate,
) -> AppError {
    if !AppError::is_store_conflict(&err) {
        return AppError::DatabaseError(format!("Failed to write assignment: {}", err));
    }

    let conflicting = match assignments_for_event(conn, event_id).await {
        Ok(existing) => find_conflicts(candidate, &existing),
        Err(_) => Vec::new(),
    };
    info!(event_id = %event_id, ?conflicting, "store rejected overlapping booking");
    AppError::SchedulingConflict { conflicting }
}

async fn ensure_stage_in_event(
    conn: &mut SqliteConnection,
    stage_id: StageId,
    event_id: EventId,
) -> AppResult<()> {
    let stage = fetch_stage(conn, stage_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Stage {} not found", stage_id)))?;
    if stage.event_id != event_id {
        return Err(AppError::Validation(format!(
            "stage {} does not belong to event {}",
            stage_id, event_id
        )));
    }
    Ok(())
}

pub(crate) async fn fetch_assignment(
    conn: &mut SqliteConnection,
    id: AssignmentId,
) -> AppResult<Option<Assignment>> {
    let sql = format!("SELECT {} FROM event_stage_artists WHERE id = ?", ASSIGNMENT_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get assignment {}: {}", id, e)))?;
    row.as_ref().map(assignment_from_row).transpose()
}

/// Every booking of an event sorted by `set_start`, the order the conflict
/// detector relies on.
pub(crate) async fn assignments_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> AppResult<Vec<Assignment>> {
    let sql = format!(
        "SELECT {} FROM event_stage_artists WHERE event = ? ORDER BY set_start ASC, id ASC",
        ASSIGNMENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(event_id.value())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list assignments: {}", e)))?;
    rows.iter().map(assignment_from_row).collect()
}

async fn assignments_for_stage(
    conn: &mut SqliteConnection,
    event_id: EventId,
    stage_id: StageId,
) -> AppResult<Vec<Assignment>> {
    let sql = format!(
        "SELECT {} FROM event_stage_artists WHERE event = ? AND stage = ? ORDER BY set_start ASC, id ASC",
        ASSIGNMENT_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(event_id.value())
        .bind(stage_id.value())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list stage assignments: {}", e)))?;
    rows.iter().map(assignment_from_row).collect()
}

pub(crate) fn assignment_from_row(row: &SqliteRow) -> AppResult<Assignment> {
    Ok(Assignment {
        id: AssignmentId::new(row.try_get("id")?),
        event_id: EventId::new(row.try_get("event")?),
        stage_id: StageId::new(row.try_get("stage")?),
        artist_id: ArtistId::new(row.try_get("artist")?),
        set_start: from_millis(row.try_get("set_start")?)?,
        set_end: from_millis(row.try_get("set_end")?)?,
    })
}
