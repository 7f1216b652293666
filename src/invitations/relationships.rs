//! Materialized promoter-side relationships.
//!
//! Each [`RelationshipKind`] maps to one adapter in a [`RelationshipRegistry`];
//! the adapters own their table's SQL so no identifier is ever assembled from
//! an entity tag at runtime.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::{
    current_time_millis, from_millis, EntityKind, EntityRef, PromoterId, RelationshipId,
    RequestId,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{IdGenerator, SqliteDatabase};
use crate::models::{Relationship, RelationshipKind, RequestStatus};

/// Storage for one relationship kind. Every method runs on a caller-supplied
/// connection so it can join an open transaction.
#[async_trait]
pub trait RelationshipAdapter: Send + Sync {
    fn kind(&self) -> RelationshipKind;

    async fn find(
        &self,
        conn: &mut SqliteConnection,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<Option<Relationship>>;

    /// Insert unless the pair already exists. Returns whether a row was written.
    async fn insert_if_absent(
        &self,
        conn: &mut SqliteConnection,
        id: RelationshipId,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<bool>;

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<bool>;

    async fn list(&self, conn: &mut SqliteConnection, promoter: PromoterId) -> AppResult<Vec<Relationship>>;
}

/// Adapter over a two-column edge table with a UNIQUE (promoter, member) key.
pub struct EdgeTable {
    kind: RelationshipKind,
    select_one: &'static str,
    insert: &'static str,
    delete: &'static str,
    list: &'static str,
}

pub const PROMOTERS_ARTISTS: EdgeTable = EdgeTable {
    kind: RelationshipKind::PromoterArtist,
    select_one: "SELECT id, promoter, artist AS member, created_at FROM promoters_artists WHERE promoter = ? AND artist = ?",
    insert: "INSERT INTO promoters_artists (id, promoter, artist, created_at) VALUES (?, ?, ?, ?) ON CONFLICT (promoter, artist) DO NOTHING",
    delete: "DELETE FROM promoters_artists WHERE promoter = ? AND artist = ?",
    list: "SELECT id, promoter, artist AS member, created_at FROM promoters_artists WHERE promoter = ? ORDER BY created_at, id",
};

pub const PROMOTERS_VENUES: EdgeTable = EdgeTable {
    kind: RelationshipKind::PromoterVenue,
    select_one: "SELECT id, promoter, venue AS member, created_at FROM promoters_venues WHERE promoter = ? AND venue = ?",
    insert: "INSERT INTO promoters_venues (id, promoter, venue, created_at) VALUES (?, ?, ?, ?) ON CONFLICT (promoter, venue) DO NOTHING",
    delete: "DELETE FROM promoters_venues WHERE promoter = ? AND venue = ?",
    list: "SELECT id, promoter, venue AS member, created_at FROM promoters_venues WHERE promoter = ? ORDER BY created_at, id",
};

impl EdgeTable {
    fn from_row(&self, row: &SqliteRow) -> AppResult<Relationship> {
        Ok(Relationship {
            id: RelationshipId::new(row.try_get("id")?),
            kind: self.kind,
            promoter_id: PromoterId::new(row.try_get("promoter")?),
            member: EntityRef::new(self.kind.member_kind(), row.try_get("member")?),
            created_at: from_millis(row.try_get("created_at")?)?,
        })
    }
}

#[async_trait]
impl RelationshipAdapter for EdgeTable {
    fn kind(&self) -> RelationshipKind {
        self.kind
    }

    async fn find(
        &self,
        conn: &mut SqliteConnection,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<Option<Relationship>> {
        let row = sqlx::query(self.select_one)
            .bind(promoter.value())
            .bind(member)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read {} relationship: {}", self.kind, e)))?;
        row.map(|row| self.from_row(&row)).transpose()
    }

    async fn insert_if_absent(
        &self,
        conn: &mut SqliteConnection,
        id: RelationshipId,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(self.insert)
            .bind(id.value())
            .bind(promoter.value())
            .bind(member)
            .bind(current_time_millis())
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create {} relationship: {}", self.kind, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(
        &self,
        conn: &mut SqliteConnection,
        promoter: PromoterId,
        member: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(self.delete)
            .bind(promoter.value())
            .bind(member)
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to delete {} relationship: {}", self.kind, e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, conn: &mut SqliteConnection, promoter: PromoterId) -> AppResult<Vec<Relationship>> {
        let rows = sqlx::query(self.list)
            .bind(promoter.value())
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list {} relationships: {}", self.kind, e)))?;
        rows.iter().map(|row| self.from_row(row)).collect()
    }
}

/// Kind -> adapter dispatch table.
#[derive(Clone)]
pub struct RelationshipRegistry {
    adapters: HashMap<RelationshipKind, Arc<dyn RelationshipAdapter>>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            adapters: HashMap::new(),
        };
        registry.register(Arc::new(PROMOTERS_ARTISTS));
        registry.register(Arc::new(PROMOTERS_VENUES));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn RelationshipAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn adapter(&self, kind: RelationshipKind) -> AppResult<&Arc<dyn RelationshipAdapter>> {
        self.adapters.get(&kind).ok_or_else(|| {
            AppError::ConfigurationError(format!("no adapter registered for {} relationships", kind))
        })
    }
}

impl Default for RelationshipRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize an unordered entity pair into (kind, promoter, member id).
pub fn classify(a: EntityRef, b: EntityRef) -> AppResult<(RelationshipKind, PromoterId, i64)> {
    use EntityKind::*;
    match (a.kind, b.kind) {
        (Promoter, Artist) => Ok((RelationshipKind::PromoterArtist, PromoterId::new(a.id), b.id)),
        (Artist, Promoter) => Ok((RelationshipKind::PromoterArtist, PromoterId::new(b.id), a.id)),
        (Promoter, Venue) => Ok((RelationshipKind::PromoterVenue, PromoterId::new(a.id), b.id)),
        (Venue, Promoter) => Ok((RelationshipKind::PromoterVenue, PromoterId::new(b.id), a.id)),
        (x, y) => Err(AppError::Validation(format!(
            "no relationship exists between {} and {}",
            x, y
        ))),
    }
}

#[derive(Clone)]
pub struct RelationshipStore {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
    registry: RelationshipRegistry,
}

impl RelationshipStore {
    pub fn new(db: Arc<SqliteDatabase>, ids: Arc<IdGenerator>, registry: RelationshipRegistry) -> Self {
        Self { db, ids, registry }
    }

    /// Idempotent: linking an existing pair returns the stored edge.
    pub async fn link(&self, a: EntityRef, b: EntityRef) -> AppResult<Relationship> {
        let mut conn = self.acquire().await?;
        self.link_in(&mut conn, a, b).await
    }

    /// Removes the edge if present; absence is not an error.
    pub async fn unlink(&self, a: EntityRef, b: EntityRef) -> AppResult<bool> {
        let (kind, promoter, member) = classify(a, b)?;
        let mut conn = self.acquire().await?;
        let removed = self.registry.adapter(kind)?.delete(&mut conn, promoter, member).await?;
        if removed {
            info!(%kind, promoter_id = %promoter, member, "relationship removed");
        }
        Ok(removed)
    }

    pub async fn exists(&self, a: EntityRef, b: EntityRef) -> AppResult<bool> {
        let mut conn = self.acquire().await?;
        self.exists_in(&mut conn, a, b).await
    }

    pub async fn list_for_promoter(
        &self,
        promoter: PromoterId,
        kind: RelationshipKind,
    ) -> AppResult<Vec<Relationship>> {
        let mut conn = self.acquire().await?;
        self.registry.adapter(kind)?.list(&mut conn, promoter).await
    }

    /// Drop the edge between the two parties of a request. Only accepted
    /// requests ever materialized one, so other statuses are a no-op.
    pub async fn unlink_by_request(&self, request_id: RequestId) -> AppResult<bool> {
        let (a, b) = {
            let mut conn = self.acquire().await?;
            let row = sqlx::query(
                "SELECT invited_to_entity, invited_to_entity_id, invitee_entity, invitee_entity_id, status \
                 FROM requests WHERE id = ?",
            )
            .bind(request_id.value())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to read request {}: {}", request_id, e)))?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", request_id)))?;

            let status: String = row.try_get("status")?;
            if status != RequestStatus::Accepted.as_str() {
                debug!(%request_id, status = %status, "request never linked its parties");
                return Ok(false);
            }
            (
                entity_from_row(&row, "invited_to_entity", "invited_to_entity_id")?,
                entity_from_row(&row, "invitee_entity", "invitee_entity_id")?,
            )
        };
        self.unlink(a, b).await
    }

    pub(crate) async fn link_in(
        &self,
        conn: &mut SqliteConnection,
        a: EntityRef,
        b: EntityRef,
    ) -> AppResult<Relationship> {
        let (kind, promoter, member) = classify(a, b)?;
        let adapter = self.registry.adapter(kind)?;

        let id = RelationshipId::new(self.ids.next_id());
        if adapter.insert_if_absent(conn, id, promoter, member).await? {
            info!(%kind, promoter_id = %promoter, member, "relationship created");
        } else {
            debug!(%kind, promoter_id = %promoter, member, "relationship already present");
        }

        adapter.find(conn, promoter, member).await?.ok_or_else(|| {
            AppError::DatabaseError(format!(
                "{} relationship {}:{} missing after upsert",
                kind, promoter, member
            ))
        })
    }

    pub(crate) async fn exists_in(
        &self,
        conn: &mut SqliteConnection,
        a: EntityRef,
        b: EntityRef,
    ) -> AppResult<bool> {
        let (kind, promoter, member) = classify(a, b)?;
        Ok(self
            .registry
            .adapter(kind)?
            .find(conn, promoter, member)
            .await?
            .is_some())
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }
}

/// Read an `EntityRef` stored as a (kind tag, id) column pair.
pub(crate) fn entity_from_row(row: &SqliteRow, kind_col: &str, id_col: &str) -> AppResult<EntityRef> {
    let tag: String = row.try_get(kind_col)?;
    let kind = tag.parse::<EntityKind>().map_err(AppError::DatabaseError)?;
    Ok(EntityRef::new(kind, row.try_get(id_col)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ArtistId, VenueId};

    async fn store() -> RelationshipStore {
        let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
        RelationshipStore::new(db, Arc::new(IdGenerator::new(4).unwrap()), RelationshipRegistry::new())
    }

    #[test]
    fn test_classify_is_order_insensitive() {
        let p = EntityRef::promoter(PromoterId::new(1));
        let a = EntityRef::artist(ArtistId::new(2));
        let v = EntityRef::venue(VenueId::new(3));

        assert_eq!(classify(p, a).unwrap(), (RelationshipKind::PromoterArtist, PromoterId::new(1), 2));
        assert_eq!(classify(a, p).unwrap(), classify(p, a).unwrap());
        assert_eq!(classify(v, p).unwrap(), (RelationshipKind::PromoterVenue, PromoterId::new(1), 3));
        assert!(matches!(classify(a, a), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_link_twice_keeps_one_edge() {
        let store = store().await;
        let p = EntityRef::promoter(PromoterId::new(1));
        let a = EntityRef::artist(ArtistId::new(2));

        let first = store.link(p, a).await.unwrap();
        let second = store.link(a, p).await.unwrap();
        assert_eq!(first, second);

        let edges = store
            .list_for_promoter(PromoterId::new(1), RelationshipKind::PromoterArtist)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert!(store.exists(p, a).await.unwrap());
    }

    #[tokio::test]
    async fn test_unlink_absent_is_not_an_error() {
        let store = store().await;
        let p = EntityRef::promoter(PromoterId::new(1));
        let v = EntityRef::venue(VenueId::new(9));

        assert!(!store.unlink(p, v).await.unwrap());
        store.link(p, v).await.unwrap();
        assert!(store.unlink(p, v).await.unwrap());
        assert!(!store.exists(p, v).await.unwrap());
    }

    #[tokio::test]
    async fn test_kinds_are_stored_separately() {
        let store = store().await;
        let p = EntityRef::promoter(PromoterId::new(1));
        store.link(p, EntityRef::artist(ArtistId::new(5))).await.unwrap();

        // same numeric id, different kind
        assert!(!store.exists(p, EntityRef::venue(VenueId::new(5))).await.unwrap());
        let venues = store
            .list_for_promoter(PromoterId::new(1), RelationshipKind::PromoterVenue)
            .await
            .unwrap();
        assert!(venues.is_empty());
    }
}
