// HTTP surface - thin JSON handlers over the scheduling and invitation services

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    app_state::AppState,
    core::{ArtistId, AssignmentId, EntityKind, EventId, PromoterId, RequestId, StageId, VenueId},
    error::{AppError, AppResult},
    infrastructure::{viewer_context_middleware, CurrentUser, Vc},
    models::{
        Assignment, AssignmentPatch, Event, Lineup, NewEvent, NewRequest, Relationship,
        RelationshipKind, Request, ScheduledSet, Stage,
    },
    scheduling::ConflictPair,
};

#[derive(Debug, Deserialize)]
pub struct CreateStageBody {
    pub name: String,
    pub venue_id: Option<VenueId>,
}

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentBody {
    pub artist_id: ArtistId,
    pub stage_id: StageId,
    pub set_start: DateTime<Utc>,
    pub set_end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListAssignmentsQuery {
    pub stage_id: Option<StageId>,
}

#[derive(Debug, Deserialize)]
pub struct SetVenueBody {
    pub venue_id: Option<VenueId>,
}

#[derive(Debug, Deserialize)]
pub struct SetPublicBody {
    pub public: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReceivedQuery {
    /// Only pending requests whose invitee is of this kind.
    pub pending: Option<EntityKind>,
}

#[derive(Debug, Deserialize)]
pub struct RelationshipsQuery {
    pub kind: RelationshipKind,
}

// HTTP Handlers

pub async fn health_handler(State(state): State<AppState>) -> AppResult<Json<Value>> {
    state.db.health_check().await?;
    let (idle, total) = state.db.pool_stats();
    Ok(Json(json!({
        "status": "ok",
        "pool": { "idle": idle, "total": total }
    })))
}

pub async fn create_event_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<NewEvent>,
) -> AppResult<(StatusCode, Json<Event>)> {
    let event = state.events.create_event(&vc, body).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn get_event_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<EventId>,
) -> AppResult<Json<Event>> {
    Ok(Json(state.events.get_event(id).await?))
}

pub async fn set_event_venue_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<EventId>,
    Json(body): Json<SetVenueBody>,
) -> AppResult<Json<Event>> {
    Ok(Json(state.events.set_event_venue(&vc, id, body.venue_id).await?))
}

pub async fn set_lineup_public_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<EventId>,
    Json(body): Json<SetPublicBody>,
) -> AppResult<Json<Event>> {
    Ok(Json(state.events.set_lineup_public(&vc, id, body.public).await?))
}

pub async fn create_stage_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(event_id): AxumPath<EventId>,
    Json(body): Json<CreateStageBody>,
) -> AppResult<(StatusCode, Json<Stage>)> {
    let stage = state
        .stages
        .create_stage(&vc, event_id, &body.name, body.venue_id)
        .await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn list_stages_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<EventId>,
) -> AppResult<Json<Vec<Stage>>> {
    Ok(Json(state.stages.list_stages(event_id).await?))
}

pub async fn get_stage_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<StageId>,
) -> AppResult<Json<Stage>> {
    Ok(Json(state.stages.get_stage(id).await?))
}

pub async fn list_assignments_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<EventId>,
    Query(params): Query<ListAssignmentsQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    Ok(Json(
        state.assignments.list_assignments(event_id, params.stage_id).await?,
    ))
}

pub async fn create_assignment_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(event_id): AxumPath<EventId>,
    Json(body): Json<CreateAssignmentBody>,
) -> AppResult<(StatusCode, Json<Assignment>)> {
    let assignment = state
        .assignments
        .assign(&vc, event_id, body.artist_id, body.stage_id, body.set_start, body.set_end)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn get_assignment_handler(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<AssignmentId>,
) -> AppResult<Json<Assignment>> {
    Ok(Json(state.assignments.get_assignment(id).await?))
}

pub async fn update_assignment_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<AssignmentId>,
    Json(patch): Json<AssignmentPatch>,
) -> AppResult<Json<Assignment>> {
    if patch.is_empty() {
        return Err(AppError::Validation("patch must change stage_id, set_start or set_end".to_string()));
    }
    Ok(Json(state.assignments.update(&vc, id, patch).await?))
}

pub async fn delete_assignment_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<AssignmentId>,
) -> AppResult<Json<Value>> {
    let deleted = state.assignments.remove(&vc, id).await?;
    Ok(Json(json!({ "id": id, "deleted": deleted })))
}

pub async fn lineup_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<EventId>,
) -> AppResult<Json<Lineup>> {
    Ok(Json(state.lineup.lineup(event_id).await?))
}

pub async fn public_lineup_handler(
    State(state): State<AppState>,
    AxumPath(hash): AxumPath<String>,
) -> AppResult<Json<Lineup>> {
    Ok(Json(state.lineup.public_lineup(&hash).await?))
}

pub async fn conflict_report_handler(
    State(state): State<AppState>,
    AxumPath(event_id): AxumPath<EventId>,
) -> AppResult<Json<Vec<ConflictPair>>> {
    Ok(Json(state.lineup.conflict_report(event_id).await?))
}

pub async fn artist_schedule_handler(
    State(state): State<AppState>,
    AxumPath(artist_id): AxumPath<ArtistId>,
) -> AppResult<Json<Vec<ScheduledSet>>> {
    Ok(Json(state.lineup.artist_schedule(artist_id).await?))
}

pub async fn create_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    Json(body): Json<NewRequest>,
) -> AppResult<Json<Request>> {
    Ok(Json(state.invitations.create(&vc, body).await?))
}

pub async fn get_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<RequestId>,
) -> AppResult<Json<Request>> {
    let request = state.invitations.get(id).await?;
    ensure_party(&vc, &request)?;
    Ok(Json(request))
}

pub async fn accept_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<RequestId>,
) -> AppResult<Json<Request>> {
    Ok(Json(state.invitations.accept(&vc, id).await?))
}

pub async fn deny_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<RequestId>,
) -> AppResult<Json<Request>> {
    Ok(Json(state.invitations.deny(&vc, id).await?))
}

pub async fn cancel_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<RequestId>,
) -> AppResult<Json<Request>> {
    Ok(Json(state.invitations.cancel(&vc, id).await?))
}

/// Remove the relationship an accepted request created.
pub async fn unlink_request_handler(
    State(state): State<AppState>,
    vc: Vc,
    AxumPath(id): AxumPath<RequestId>,
) -> AppResult<Json<Value>> {
    let request = state.invitations.get(id).await?;
    ensure_party(&vc, &request)?;
    let removed = state.relationships.unlink_by_request(id).await?;
    Ok(Json(json!({ "request_id": id, "removed": removed })))
}

pub async fn sent_requests_handler(
    State(state): State<AppState>,
    vc: Vc,
) -> AppResult<Json<Vec<Request>>> {
    let user = vc.require_user()?;
    Ok(Json(state.invitations.sent_by(user).await?))
}

pub async fn received_requests_handler(
    State(state): State<AppState>,
    vc: Vc,
    Query(params): Query<ReceivedQuery>,
) -> AppResult<Json<Vec<Request>>> {
    let user = vc.require_user()?;
    let requests = match params.pending {
        Some(kind) => state.invitations.pending_received(user, kind).await?,
        None => state.invitations.received_by(user).await?,
    };
    Ok(Json(requests))
}

pub async fn promoter_relationships_handler(
    State(state): State<AppState>,
    AxumPath(promoter_id): AxumPath<PromoterId>,
    Query(params): Query<RelationshipsQuery>,
) -> AppResult<Json<Vec<Relationship>>> {
    Ok(Json(
        state.relationships.list_for_promoter(promoter_id, params.kind).await?,
    ))
}

/// Requests are visible to their two parties only.
fn ensure_party(vc: &Vc, request: &Request) -> AppResult<()> {
    let user = vc.require_user()?;
    if user != request.inviter_user_id && user != request.invitee_user_id {
        return Err(AppError::Forbidden(format!("request {} belongs to other users", request.id)));
    }
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))

        // Events
        .route("/events", post(create_event_handler))
        .route("/events/{id}", get(get_event_handler))
        .route("/events/{id}/venue", put(set_event_venue_handler))
        .route("/events/{id}/public", put(set_lineup_public_handler))
        .route("/events/{id}/lineup", get(lineup_handler))
        .route("/events/{id}/conflicts", get(conflict_report_handler))
        .route("/events/by-hash/{hash}/lineup", get(public_lineup_handler))

        // Stages and bookings
        .route("/events/{id}/stages", post(create_stage_handler).get(list_stages_handler))
        .route("/stages/{id}", get(get_stage_handler))
        .route(
            "/events/{id}/assignments",
            get(list_assignments_handler).post(create_assignment_handler),
        )
        .route(
            "/assignments/{id}",
            get(get_assignment_handler)
                .patch(update_assignment_handler)
                .delete(delete_assignment_handler),
        )
        .route("/artists/{id}/schedule", get(artist_schedule_handler))

        // Invitations
        .route("/requests", post(create_request_handler))
        .route("/requests/sent", get(sent_requests_handler))
        .route("/requests/received", get(received_requests_handler))
        .route("/requests/{id}", get(get_request_handler))
        .route("/requests/{id}/accept", post(accept_request_handler))
        .route("/requests/{id}/deny", post(deny_request_handler))
        .route("/requests/{id}/cancel", post(cancel_request_handler))
        .route("/requests/{id}/relationship", delete(unlink_request_handler))
        .route("/promoters/{id}/relationships", get(promoter_relationships_handler))

        .layer(middleware::from_fn(viewer_context_middleware))
        .with_state(state)
}
