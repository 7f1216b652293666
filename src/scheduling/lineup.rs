// Lineup view - read models over stages and bookings

use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{from_millis, ArtistId, AssignmentId, EventId, StageId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{Directories, SqliteDatabase};
use crate::models::{Event, Lineup, LineupStage, Performer, ScheduledSet};
use crate::scheduling::assignments::assignments_for_event;
use crate::scheduling::conflict::{overlapping_pairs, ConflictPair, TimeSlot};
use crate::scheduling::events::fetch_event;
use crate::scheduling::stages::stages_for_event;
use crate::scheduling::EventCatalog;

#[derive(Clone)]
pub struct LineupView {
    db: Arc<SqliteDatabase>,
    events: EventCatalog,
    directories: Directories,
}

impl LineupView {
    pub fn new(db: Arc<SqliteDatabase>, events: EventCatalog, directories: Directories) -> Self {
        Self {
            db,
            events,
            directories,
        }
    }

    /// Full lineup: every stage with its performers in set order.
    pub async fn lineup(&self, event_id: EventId) -> AppResult<Lineup> {
        let event = self.events.get_event(event_id).await?;
        self.build(event).await
    }

    /// Lineup by slug, only once the promoter has published it.
    pub async fn public_lineup(&self, hash: &str) -> AppResult<Lineup> {
        let event = self.events.get_event_by_hash(hash).await?;
        if !event.lineup_public {
            return Err(AppError::NotFound(format!("Event '{}' not found", hash)));
        }
        self.build(event).await
    }

    /// Every set an artist plays, across events, ordered by start.
    pub async fn artist_schedule(&self, artist_id: ArtistId) -> AppResult<Vec<ScheduledSet>> {
        let rows = sqlx::query(
            "SELECT a.id, a.event, e.name AS event_name, e.hash, a.stage, s.name AS stage_name, a.set_start, a.set_end \
             FROM event_stage_artists a \
             JOIN events e ON e.id = a.event \
             JOIN event_stage s ON s.id = a.stage \
             WHERE a.artist = ? \
             ORDER BY a.set_start ASC, a.id ASC",
        )
        .bind(artist_id.value())
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get artist schedule: {}", e)))?;

        rows.iter()
            .map(|row| -> AppResult<ScheduledSet> {
                Ok(ScheduledSet {
                    assignment_id: AssignmentId::new(row.try_get("id")?),
                    event_id: EventId::new(row.try_get("event")?),
                    event_name: row.try_get("event_name")?,
                    event_hash: row.try_get("hash")?,
                    stage_id: StageId::new(row.try_get("stage")?),
                    stage_name: row.try_get("stage_name")?,
                    set_start: from_millis(row.try_get("set_start")?)?,
                    set_end: from_millis(row.try_get("set_end")?)?,
                })
            })
            .collect()
    }

    /// Pairs of stored bookings that overlap on a stage or for an artist.
    pub async fn conflict_report(&self, event_id: EventId) -> AppResult<Vec<ConflictPair>> {
        let mut conn = self.acquire().await?;
        if fetch_event(&mut conn, event_id).await?.is_none() {
            return Err(AppError::NotFound(format!("Event {} not found", event_id)));
        }
        let bookings = assignments_for_event(&mut conn, event_id).await?;
        Ok(overlapping_pairs(&bookings))
    }

    async fn build(&self, event: Event) -> AppResult<Lineup> {
        let (stages, bookings) = {
            let mut conn = self.acquire().await?;
            let stages = stages_for_event(&mut conn, event.id).await?;
            let bookings = assignments_for_event(&mut conn, event.id).await?;
            (stages, bookings)
        };

        let mut names: HashMap<ArtistId, Option<String>> = HashMap::new();
        for booking in &bookings {
            if !names.contains_key(&booking.artist_id) {
                let artist = self.directories.artists.get_artist(booking.artist_id).await?;
                names.insert(booking.artist_id, artist.map(|a| a.name));
            }
        }

        let mut capacities = HashMap::new();
        let mut lineup_stages = Vec::with_capacity(stages.len());
        for mut stage in stages {
            if !capacities.contains_key(&stage.venue_id) {
                let venue = self.directories.venues.get_venue(stage.venue_id).await?;
                capacities.insert(stage.venue_id, venue.and_then(|v| v.capacity));
            }
            stage.venue_capacity = capacities.get(&stage.venue_id).copied().flatten();

            // bookings are already in set order
            let performers = bookings
                .iter()
                .filter(|b| b.stage_id == stage.id)
                .map(|b| Performer {
                    assignment_id: b.id,
                    artist_id: b.artist_id,
                    artist_name: names.get(&b.artist_id).cloned().flatten(),
                    set_start: b.set_start,
                    set_end: b.set_end,
                    duration_minutes: TimeSlot::from(b).duration_minutes(),
                })
                .collect();
            lineup_stages.push(LineupStage { stage, performers });
        }

        Ok(Lineup {
            event,
            stages: lineup_stages,
        })
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }
}
