// Directories - black-box lookups for venues, artists and promoters
// The core only reads these records; profile management happens elsewhere.

use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

use crate::core::{ArtistId, EntityKind, EntityRef, PromoterId, UserId, VenueId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{IdGenerator, SqliteDatabase};
use crate::models::{Artist, Promoter, Venue};

#[async_trait]
pub trait VenueDirectory: Send + Sync {
    async fn get_venue(&self, id: VenueId) -> AppResult<Option<Venue>>;
}

#[async_trait]
pub trait ArtistDirectory: Send + Sync {
    async fn get_artist(&self, id: ArtistId) -> AppResult<Option<Artist>>;
}

#[async_trait]
pub trait PromoterDirectory: Send + Sync {
    async fn get_promoter(&self, id: PromoterId) -> AppResult<Option<Promoter>>;
}

/// The three lookups bundled, so services can resolve an `EntityRef` of any kind.
#[derive(Clone)]
pub struct Directories {
    pub venues: Arc<dyn VenueDirectory>,
    pub artists: Arc<dyn ArtistDirectory>,
    pub promoters: Arc<dyn PromoterDirectory>,
}

impl Directories {
    pub fn from_single<D>(directory: Arc<D>) -> Self
    where
        D: VenueDirectory + ArtistDirectory + PromoterDirectory + 'static,
    {
        Self {
            venues: directory.clone(),
            artists: directory.clone(),
            promoters: directory,
        }
    }

    /// Account owning the referenced profile. Fails `NotFound` for unknown
    /// entities and `Validation` for unclaimed profiles or venues.
    pub async fn owner_of(&self, entity: EntityRef) -> AppResult<UserId> {
        let owner = match entity.kind {
            EntityKind::Artist => self
                .artists
                .get_artist(ArtistId::new(entity.id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Artist {} not found", entity.id)))?
                .user_id,
            EntityKind::Promoter => self
                .promoters
                .get_promoter(PromoterId::new(entity.id))
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Promoter {} not found", entity.id)))?
                .user_id,
            EntityKind::Venue => {
                return Err(AppError::Validation(
                    "venues are not owned by a user account".to_string(),
                ))
            }
        };
        owner.ok_or_else(|| AppError::Validation(format!("{} has no owning user", entity)))
    }
}

/// Directory backed by the `venues`, `artists` and `promoters` tables.
#[derive(Clone)]
pub struct SqliteDirectory {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
}

impl SqliteDirectory {
    pub fn new(db: Arc<SqliteDatabase>, ids: Arc<IdGenerator>) -> Self {
        Self { db, ids }
    }

    pub async fn register_venue(
        &self,
        name: &str,
        address: Option<&str>,
        capacity: Option<i64>,
    ) -> AppResult<Venue> {
        let id = VenueId::new(self.ids.next_id());
        sqlx::query("INSERT INTO venues (id, name, address, capacity) VALUES (?, ?, ?, ?)")
            .bind(id.value())
            .bind(name)
            .bind(address)
            .bind(capacity)
            .execute(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to register venue: {}", e)))?;
        Ok(Venue {
            id,
            name: name.to_string(),
            address: address.map(str::to_string),
            capacity,
        })
    }

    pub async fn register_artist(&self, name: &str, user_id: Option<UserId>) -> AppResult<Artist> {
        let id = ArtistId::new(self.ids.next_id());
        sqlx::query("INSERT INTO artists (id, name, user_id) VALUES (?, ?, ?)")
            .bind(id.value())
            .bind(name)
            .bind(user_id.map(UserId::value))
            .execute(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to register artist: {}", e)))?;
        Ok(Artist {
            id,
            name: name.to_string(),
            user_id,
        })
    }

    pub async fn register_promoter(
        &self,
        name: &str,
        user_id: Option<UserId>,
    ) -> AppResult<Promoter> {
        let id = PromoterId::new(self.ids.next_id());
        sqlx::query("INSERT INTO promoters (id, name, user_id) VALUES (?, ?, ?)")
            .bind(id.value())
            .bind(name)
            .bind(user_id.map(UserId::value))
            .execute(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to register promoter: {}", e)))?;
        Ok(Promoter {
            id,
            name: name.to_string(),
            user_id,
        })
    }
}

#[async_trait]
impl VenueDirectory for SqliteDirectory {
    async fn get_venue(&self, id: VenueId) -> AppResult<Option<Venue>> {
        let row = sqlx::query("SELECT id, name, address, capacity FROM venues WHERE id = ?")
            .bind(id.value())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get venue {}: {}", id, e)))?;

        row.map(|row| -> AppResult<Venue> {
            Ok(Venue {
                id: VenueId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                address: row.try_get("address")?,
                capacity: row.try_get("capacity")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ArtistDirectory for SqliteDirectory {
    async fn get_artist(&self, id: ArtistId) -> AppResult<Option<Artist>> {
        let row = sqlx::query("SELECT id, name, user_id FROM artists WHERE id = ?")
            .bind(id.value())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to get artist {}: {}", id, e)))?;

        row.map(|row| -> AppResult<Artist> {
            Ok(Artist {
                id: ArtistId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            })
        })
        .transpose()
    }
}

#[async_trait]
impl PromoterDirectory for SqliteDirectory {
    async fn get_promoter(&self, id: PromoterId) -> AppResult<Option<Promoter>> {
        let row = sqlx::query("SELECT id, name, user_id FROM promoters WHERE id = ?")
            .bind(id.value())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get promoter {}: {}", id, e))
            })?;

        row.map(|row| -> AppResult<Promoter> {
            Ok(Promoter {
                id: PromoterId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                user_id: row.try_get::<Option<i64>, _>("user_id")?.map(UserId::new),
            })
        })
        .transpose()
    }
}
