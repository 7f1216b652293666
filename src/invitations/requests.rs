// Invitation service - request lifecycle between promoters and artists, with
// acceptance materializing the relationship in the same transaction

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::{current_time_millis, from_millis, EntityKind, EntityRef, RequestId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{CurrentUser, Directories, IdGenerator, SqliteDatabase};
use crate::invitations::relationships::{entity_from_row, RelationshipStore};
use crate::invitations::state_machine::transition;
use crate::models::{NewRequest, Request, RequestAction, RequestStatus};

const REQUEST_COLUMNS: &str = "id, invited_to_entity, invited_to_entity_id, invitee_entity, invitee_entity_id, \
     inviter_user_id, invitee_user_id, status, created_at, updated_at";

#[derive(Clone)]
pub struct InvitationService {
    db: Arc<SqliteDatabase>,
    ids: Arc<IdGenerator>,
    directories: Directories,
    relationships: RelationshipStore,
}

impl InvitationService {
    pub fn new(
        db: Arc<SqliteDatabase>,
        ids: Arc<IdGenerator>,
        directories: Directories,
        relationships: RelationshipStore,
    ) -> Self {
        Self {
            db,
            ids,
            directories,
            relationships,
        }
    }

    /// Propose linking `invitee` to `invited_to`, which the viewer must own.
    /// A second call for the same pair while the first is pending returns the
    /// pending request unchanged.
    pub async fn create(&self, viewer: &dyn CurrentUser, new: NewRequest) -> AppResult<Request> {
        let user = viewer.require_user()?;
        ensure_pairing(new.invited_to, new.invitee)?;

        let owner = self.directories.owner_of(new.invited_to).await?;
        if owner != user {
            return Err(AppError::Forbidden(format!(
                "user {} cannot send invitations on behalf of {}",
                user, new.invited_to
            )));
        }
        let invitee_user = self.directories.owner_of(new.invitee).await?;

        if self.relationships.exists(new.invited_to, new.invitee).await? {
            return Err(AppError::Validation(format!(
                "{} and {} are already linked",
                new.invited_to, new.invitee
            )));
        }
        if let Some(existing) = self.find_pending(user, new.invited_to, new.invitee).await? {
            debug!(request_id = %existing.id, "pending request already exists");
            return Ok(existing);
        }

        let id = RequestId::new(self.ids.next_id());
        let now = current_time_millis();
        let inserted = sqlx::query(
            "INSERT INTO requests (id, invited_to_entity, invited_to_entity_id, invitee_entity, invitee_entity_id, \
             inviter_user_id, invitee_user_id, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(id.value())
        .bind(new.invited_to.kind.as_str())
        .bind(new.invited_to.id)
        .bind(new.invitee.kind.as_str())
        .bind(new.invitee.id)
        .bind(user.value())
        .bind(invitee_user.value())
        .bind(now)
        .bind(now)
        .execute(self.db.pool())
        .await;

        match inserted {
            Ok(_) => {}
            // lost a race with an identical create; the partial index kept one row
            Err(e) if AppError::is_unique_violation(&e) => {
                return self
                    .find_pending(user, new.invited_to, new.invitee)
                    .await?
                    .ok_or_else(|| {
                        AppError::DatabaseError(format!("pending request vanished after conflict: {}", e))
                    });
            }
            Err(e) => {
                return Err(AppError::DatabaseError(format!("Failed to create request: {}", e)));
            }
        }

        info!(request_id = %id, inviter = %user, invitee = %new.invitee, invited_to = %new.invited_to, "request created");
        Ok(Request {
            id,
            invited_to: new.invited_to,
            invitee: new.invitee,
            inviter_user_id: user,
            invitee_user_id: invitee_user,
            status: RequestStatus::Pending,
            created_at: from_millis(now)?,
            updated_at: from_millis(now)?,
        })
    }

    /// Invitee accepts; the relationship is written in the same transaction.
    pub async fn accept(&self, viewer: &dyn CurrentUser, id: RequestId) -> AppResult<Request> {
        self.respond(viewer, id, RequestAction::Accept).await
    }

    pub async fn deny(&self, viewer: &dyn CurrentUser, id: RequestId) -> AppResult<Request> {
        self.respond(viewer, id, RequestAction::Deny).await
    }

    pub async fn cancel(&self, viewer: &dyn CurrentUser, id: RequestId) -> AppResult<Request> {
        self.respond(viewer, id, RequestAction::Cancel).await
    }

    pub async fn get(&self, id: RequestId) -> AppResult<Request> {
        self.load(id).await
    }

    /// Re-materialize the relationship of an accepted request. Returns whether
    /// anything had to be written. Only runs when asked for: an edge removed
    /// with `unlink` stays removed on reads.
    pub async fn repair_accepted(&self, id: RequestId) -> AppResult<bool> {
        let request = self.load(id).await?;
        if request.status != RequestStatus::Accepted {
            return Ok(false);
        }
        self.repair(&request).await
    }

    /// The pending request from `inviter` for this pair, if any.
    pub async fn find_pending(
        &self,
        inviter: UserId,
        invited_to: EntityRef,
        invitee: EntityRef,
    ) -> AppResult<Option<Request>> {
        let sql = format!(
            "SELECT {} FROM requests \
             WHERE inviter_user_id = ? AND invited_to_entity = ? AND invited_to_entity_id = ? \
             AND invitee_entity = ? AND invitee_entity_id = ? AND status = 'pending'",
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(inviter.value())
            .bind(invited_to.kind.as_str())
            .bind(invited_to.id)
            .bind(invitee.kind.as_str())
            .bind(invitee.id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to look up pending request: {}", e)))?;
        row.map(|row| request_from_row(&row)).transpose()
    }

    /// Requests the user has sent, newest first.
    pub async fn sent_by(&self, user: UserId) -> AppResult<Vec<Request>> {
        self.query_by_user("inviter_user_id = ?", user, None).await
    }

    /// Requests addressed to the user, newest first.
    pub async fn received_by(&self, user: UserId) -> AppResult<Vec<Request>> {
        self.query_by_user("invitee_user_id = ?", user, None).await
    }

    /// Pending requests addressed to the user where the invitee is of the
    /// given kind: `Artist` lists promoter invitations an artist received,
    /// `Promoter` lists join requests a promoter received.
    pub async fn pending_received(&self, user: UserId, invitee_kind: EntityKind) -> AppResult<Vec<Request>> {
        self.query_by_user(
            "invitee_user_id = ? AND status = 'pending' AND invitee_entity = ?",
            user,
            Some(invitee_kind),
        )
        .await
    }

    async fn respond(&self, viewer: &dyn CurrentUser, id: RequestId, action: RequestAction) -> AppResult<Request> {
        let user = viewer.require_user()?;

        let mut tx = self.db.begin_write().await?;
        let written = async {
            let conn = tx.conn()?;
            let request = fetch_request(conn, id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))?;

            let actor = match action {
                RequestAction::Accept | RequestAction::Deny => request.invitee_user_id,
                RequestAction::Cancel => request.inviter_user_id,
            };
            if user != actor {
                return Err(AppError::Forbidden(format!(
                    "user {} cannot {} request {}",
                    user, action, id
                )));
            }
            if request.status.is_terminal() {
                return Err(AppError::NotPending {
                    id,
                    status: request.status,
                });
            }
            let next = transition(request.status, action)?;

            let now = current_time_millis();
            let updated = sqlx::query(
                "UPDATE requests SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
            )
            .bind(next.as_str())
            .bind(now)
            .bind(id.value())
            .execute(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to {} request {}: {}", action, id, e)))?;

            if updated.rows_affected() == 0 {
                // answered by another writer since the read
                let status = fetch_request(conn, id)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(request.status);
                return Err(AppError::NotPending { id, status });
            }

            if next == RequestStatus::Accepted {
                self.relationships
                    .link_in(conn, request.invited_to, request.invitee)
                    .await?;
            }
            Ok::<_, AppError>((request, next, now))
        }
        .await;
        let (request, next, now) = tx.finish(written).await?;

        info!(request_id = %id, %action, status = %next, user = %user, "request answered");
        Ok(Request {
            status: next,
            updated_at: from_millis(now)?,
            ..request
        })
    }

    async fn repair(&self, request: &Request) -> AppResult<bool> {
        let mut conn = self.acquire().await?;
        if self
            .relationships
            .exists_in(&mut conn, request.invited_to, request.invitee)
            .await?
        {
            return Ok(false);
        }
        self.relationships
            .link_in(&mut conn, request.invited_to, request.invitee)
            .await?;
        warn!(request_id = %request.id, "re-created relationship missing for accepted request");
        Ok(true)
    }

    async fn load(&self, id: RequestId) -> AppResult<Request> {
        let mut conn = self.acquire().await?;
        fetch_request(&mut conn, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))
    }

    async fn query_by_user(
        &self,
        filter: &str,
        user: UserId,
        invitee_kind: Option<EntityKind>,
    ) -> AppResult<Vec<Request>> {
        let sql = format!(
            "SELECT {} FROM requests WHERE {} ORDER BY created_at DESC, id DESC",
            REQUEST_COLUMNS, filter
        );
        let mut query = sqlx::query(&sql).bind(user.value());
        if let Some(kind) = invitee_kind {
            query = query.bind(kind.as_str());
        }
        let rows = query
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list requests for user {}: {}", user, e)))?;
        rows.iter().map(request_from_row).collect()
    }

    async fn acquire(&self) -> AppResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        self.db
            .pool()
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to acquire connection: {}", e)))
    }
}

/// Requests connect exactly one promoter with one artist.
fn ensure_pairing(invited_to: EntityRef, invitee: EntityRef) -> AppResult<()> {
    match (invited_to.kind, invitee.kind) {
        (EntityKind::Promoter, EntityKind::Artist) | (EntityKind::Artist, EntityKind::Promoter) => Ok(()),
        (a, b) => Err(AppError::Validation(format!(
            "requests must pair a promoter with an artist, got {} and {}",
            a, b
        ))),
    }
}

pub(crate) async fn fetch_request(conn: &mut SqliteConnection, id: RequestId) -> AppResult<Option<Request>> {
    let sql = format!("SELECT {} FROM requests WHERE id = ?", REQUEST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.value())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to get request {}: {}", id, e)))?;
    row.map(|row| request_from_row(&row)).transpose()
}

fn request_from_row(row: &SqliteRow) -> AppResult<Request> {
    let status: String = row.try_get("status")?;
    Ok(Request {
        id: RequestId::new(row.try_get("id")?),
        invited_to: entity_from_row(row, "invited_to_entity", "invited_to_entity_id")?,
        invitee: entity_from_row(row, "invitee_entity", "invitee_entity_id")?,
        inviter_user_id: UserId::new(row.try_get("inviter_user_id")?),
        invitee_user_id: UserId::new(row.try_get("invitee_user_id")?),
        status: status.parse().map_err(AppError::DatabaseError)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: from_millis(row.try_get("updated_at")?)?,
    })
}
