use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use lineup_core::{
    app_state::AppState,
    config::Config,
    core::{ArtistId, EntityRef, EventId, StageId, UserId},
    infrastructure::{SqliteDatabase, ViewerContext},
    models::{Assignment, NewEvent, NewRequest, RelationshipKind, RequestStatus},
    AppError, AppResult,
};

const WRITERS: usize = 8;
const OWNER: i64 = 1;

// Keeps the directory alive for as long as the pool uses the file.
struct FileBacked {
    _dir: TempDir,
    state: AppState,
}

async fn file_backed() -> FileBacked {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("lineup.db").display());
    let db = Arc::new(SqliteDatabase::connect(&url, WRITERS as u32).await.unwrap());
    let state = AppState::with_database(db, Config::in_memory()).unwrap();
    FileBacked { _dir: dir, state }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 10, hour, minute, 0).unwrap()
}

async fn event_with_stages(state: &AppState, stages: usize) -> (EventId, Vec<StageId>) {
    let owner = ViewerContext::new(UserId::new(OWNER));
    let venue = state.directory.register_venue("Warehouse", None, Some(800)).await.unwrap();
    let event = state
        .events
        .create_event(
            &owner,
            NewEvent {
                name: "Night Shift".to_string(),
                venue_id: Some(venue.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let mut ids = Vec::new();
    for n in 0..stages {
        let stage = state
            .stages
            .create_stage(&owner, event.id, &format!("Room {}", n), None)
            .await
            .unwrap();
        ids.push(stage.id);
    }
    (event.id, ids)
}

async fn artists(state: &AppState, count: usize) -> Vec<ArtistId> {
    let mut ids = Vec::new();
    for n in 0..count {
        ids.push(state.directory.register_artist(&format!("DJ {}", n), None).await.unwrap().id);
    }
    ids
}

async fn book_concurrently(
    state: &AppState,
    event: EventId,
    bookings: Vec<(ArtistId, StageId)>,
) -> Vec<AppResult<Assignment>> {
    let mut handles = Vec::new();
    for (artist, stage) in bookings {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let owner = ViewerContext::new(UserId::new(OWNER));
            state
                .assignments
                .assign(&owner, event, artist, stage, at(22, 0), at(23, 0))
                .await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_bookings_on_separate_stages_all_succeed() {
    let x = file_backed().await;
    let (event, stages) = event_with_stages(&x.state, WRITERS).await;
    let artists = artists(&x.state, WRITERS).await;

    let results = book_concurrently(&x.state, event, artists.into_iter().zip(stages).collect()).await;
    for result in &results {
        assert!(result.is_ok(), "booking failed: {:?}", result);
    }

    let stored = x.state.assignments.list_assignments(event, None).await.unwrap();
    assert_eq!(stored.len(), WRITERS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_bookings_for_one_slot_leave_a_single_winner() {
    let x = file_backed().await;
    let (event, stages) = event_with_stages(&x.state, 1).await;
    let artists = artists(&x.state, WRITERS).await;

    let bookings = artists.into_iter().map(|artist| (artist, stages[0])).collect();
    let results = book_concurrently(&x.state, event, bookings).await;

    let winners: Vec<&Assignment> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "results: {:?}", results);
    let winner = winners[0].id;

    for result in results.iter().filter(|r| r.is_err()) {
        match result {
            Err(AppError::SchedulingConflict { conflicting }) => assert_eq!(conflicting, &vec![winner]),
            other => panic!("expected a scheduling conflict, got {:?}", other),
        }
    }

    let stored = x.state.assignments.list_assignments(event, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(x.state.lineup.conflict_report(event).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_accepts_on_a_shared_file_link_once() {
    let x = file_backed().await;
    let promoter = x
        .state
        .directory
        .register_promoter("Collective", Some(UserId::new(10)))
        .await
        .unwrap();
    let artist = x
        .state
        .directory
        .register_artist("Headliner", Some(UserId::new(20)))
        .await
        .unwrap();
    let request = x
        .state
        .invitations
        .create(
            &ViewerContext::new(UserId::new(10)),
            NewRequest {
                invited_to: EntityRef::promoter(promoter.id),
                invitee: EntityRef::artist(artist.id),
            },
        )
        .await
        .unwrap();

    let id = request.id;
    let mut handles = Vec::new();
    for _ in 0..WRITERS {
        let state = x.state.clone();
        handles.push(tokio::spawn(async move {
            let invitee = ViewerContext::new(UserId::new(20));
            state.invitations.accept(&invitee, id).await
        }));
    }
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "results: {:?}", results);
    for result in results.iter().filter(|r| r.is_err()) {
        match result {
            Err(AppError::NotPending { id: seen, status }) => {
                assert_eq!(*seen, id);
                assert_eq!(*status, RequestStatus::Accepted);
            }
            other => panic!("expected NotPending, got {:?}", other),
        }
    }

    let edges = x
        .state
        .relationships
        .list_for_promoter(promoter.id, RelationshipKind::PromoterArtist)
        .await
        .unwrap();
    assert_eq!(edges.len(), 1);
}
