// Stage registry - named performance areas of one event, each bound to a venue

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::core::{current_time_millis, EventId, StageId, VenueId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CurrentUser, Directories, IdGenerator, SqliteDatabase};
use crate::models::Stage;
use crate::scheduling::events::{fetch_event, require_owner};

#[derive(Clone)]
pub struct StageRegistry {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
    directories: Directories,
}

impl StageRegistry {
    pub fn new(db: Arc<SqliteDatabase>, ids: Arc<IdGenerator>, directories: Directories) -> Self {
        Self {
            db,
            ids,
            directories,
        }
    }

    /// Add a stage to an event. Without an explicit venue the stage inherits
    /// the event's venue; with neither available this fails `MissingVenue`.
    pub async fn create_stage(
        &self,
        viewer: &dyn CurrentUser,
        event_id: EventId,
        name: &str,
        venue_id: Option<VenueId>,
    ) -> AppResult<Stage> {
        let user = viewer.require_user()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("stage name is required".to_string()));
        }

        let event = {
            let mut conn = self.acquire().await?;
            fetch_event(&mut conn, event_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Event {} not found", event_id)))?
        };
        require_owner(&event, user)?;

        let venue_id = venue_id.or(event.venue_id).ok_or_else(|| {
            AppError::MissingVenue(format!(
                "no venue given for stage '{}' and event {} has no venue",
                name, event_id
            ))
        })?;
        let venue = self
            .directories
            .venues
            .get_venue(venue_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Venue {} not found", venue_id)))?;

        let id = StageId::new(self.ids.next_id());
        sqlx::query("INSERT INTO event_stage (id, event, name, venue, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(id.value())
            .bind(event_id.value())
            .bind(name)
            .bind(venue_id.value())
            .bind(current_time_millis())
            .execute(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create stage: {}", e)))?;

        info!(stage_id = %id, event_id = %event_id, venue_id = %venue_id, "stage created");
        Ok(Stage {
            id,
            event_id,
            name: name.to_string(),
            venue_id,
            venue_capacity: venue.capacity,
        })
    }

    /// All stages of an event with their venue capacity filled in.
    pub async fn list_stages(&self, event_id: EventId) -> AppResult<Vec<Stage>> {
        let mut stages = {
            let mut conn = self.acquire().await?;
            if fetch_event(&mut conn, event_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Event {} not found", event_id)));
            }
            stages_for_event(&mut conn, event_id).await?
        };

        let mut capacities: HashMap<VenueId, Option<i64>> = HashMap::new();
        for stage in &mut stages {
            let capacity = match capacities.get(&stage.venue_id) {
                Some(capacity) => *capacity,
                None => {
                    let capacity = self
                        .directories
                        .venues
                        .get_venue(stage.venue_id)
                        .await?
                        .and_then(|v| v.capacity);
                    capacities.insert(stage.venue_id, capacity);
                    capacity
                }
            };
            stage.venue_capacity = capacity;
        }
        Ok(stages)
    }

    pub async fn get_stage(&self, stage_id: StageId) -> AppResult<Stage> {
        let stage = {
            let mut conn = self.acquire().await?;
            fetch_stage(&mut conn, stage_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Stage {} not found", stage_id)))?
        };
        let capacity = self
            .directories
            .venues
            .get_venue(stage.venue_id)
            .await?
            .and_then(|v| v.capacity);
        Ok(Stage {
            venue_capacity: capacity,
            ..stage
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

pub(crate) async fn fetch_stage(conn: &mut SqliteConnection, id: StageId) -> AppResult<Option<Stage>> {
    let row = sqlx::query("SELECT id, event, name, venue FROM event_stage WHERE id = ?")
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get stage {}: {}", id, e)))?;
    row.as_ref().map(stage_from_row).transpose()
}

pub(crate) async fn stages_for_event(
    conn: &mut SqliteConnection,
    event_id: EventId,
) -> AppResult<Vec<Stage>> {
    let rows = sqlx::query("SELECT id, event, name, venue FROM event_stage WHERE event = ? ORDER BY created_at, id")
        .bind(event_id.value())
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to list stages: {}", e)))?;
    rows.iter().map(stage_from_row).collect()
}

fn stage_from_row(row: &SqliteRow) -> AppResult<Stage> {
    Ok(Stage {
        id: StageId::new(row.try_get("id")?),
        event_id: EventId::new(row.try_get("event")?),
        name: row.try_get("name")?,
        venue_id: VenueId::new(row.try_get("venue")?),
        venue_capacity: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::UserId;
    use crate::infrastructure::{SqliteDirectory, ViewerContext};
    use crate::models::NewEvent;
    use crate::scheduling::EventCatalog;

    struct Fixture {
        events: EventCatalog,
        stages: StageRegistry,
        dir: Arc<SqliteDirectory>,
        owner: ViewerContext,
    }

    async fn fixture() -> Fixture {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        let ids = Arc::new(IdGenerator::new(2).unwrap());
        let dir = Arc::new(SqliteDirectory::new(db.clone(), ids.clone()));
        let dirs = Directories::from_single(dir.clone());
        Fixture {
            events: EventCatalog::new(db.clone(), ids.clone(), dirs.clone()),
            stages: StageRegistry::new(db, ids, dirs),
            dir,
            owner: ViewerContext::new(UserId::new(1)),
        }
    }

    #[tokio::test]
    async fn test_stage_inherits_event_venue() {
        let f = fixture().await;
        let venue = f.dir.register_venue("Depot", None, Some(900)).await.unwrap();
        let event = f
            .events
            .create_event(
                &f.owner,
                NewEvent { name: "Fest".into(), venue_id: Some(venue.id), ..Default::default() },
            )
            .await
            .unwrap();

        let stage = f.stages.create_stage(&f.owner, event.id, "Main", None).await.unwrap();
        assert_eq!(stage.venue_id, venue.id);
        assert_eq!(stage.venue_capacity, Some(900));
    }

    #[tokio::test]
    async fn test_missing_venue() {
        let f = fixture().await;
        let event = f
            .events
            .create_event(&f.owner, NewEvent { name: "Fest".into(), ..Default::default() })
            .await
            .unwrap();

        let err = f.stages.create_stage(&f.owner, event.id, "Main", None).await.unwrap_err();
        assert!(matches!(err, AppError::MissingVenue(_)));
        assert!(f.stages.list_stages(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explicit_venue_overrides_and_capacity_enrichment() {
        let f = fixture().await;
        let hall = f.dir.register_venue("Hall", None, Some(300)).await.unwrap();
        let yard = f.dir.register_venue("Yard", None, Some(5000)).await.unwrap();
        let event = f
            .events
            .create_event(
                &f.owner,
                NewEvent { name: "Fest".into(), venue_id: Some(hall.id), ..Default::default() },
            )
            .await
            .unwrap();

        f.stages.create_stage(&f.owner, event.id, "Main", None).await.unwrap();
        f.stages.create_stage(&f.owner, event.id, "Outdoor", Some(yard.id)).await.unwrap();

        let stages = f.stages.list_stages(event.id).await.unwrap();
        let capacities: Vec<_> = stages.iter().map(|s| (s.name.as_str(), s.venue_capacity)).collect();
        assert_eq!(capacities, vec![("Main", Some(300)), ("Outdoor", Some(5000))]);
    }

    #[tokio::test]
    async fn test_stage_writes_are_owner_only() {
        let f = fixture().await;
        let venue = f.dir.register_venue("Depot", None, None).await.unwrap();
        let event = f
            .events
            .create_event(
                &f.owner,
                NewEvent { name: "Fest".into(), venue_id: Some(venue.id), ..Default::default() },
            )
            .await
            .unwrap();

        let stranger = ViewerContext::new(UserId::new(99));
        assert!(matches!(
            f.stages.create_stage(&stranger, event.id, "Main", None).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            f.stages.create_stage(&f.owner, event.id, "   ", None).await,
            Err(AppError::Validation(_))
        ));
    }
}
