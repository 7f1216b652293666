use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

use lineup_core::{
    app_state::AppState,
    config::Config,
    core::{ArtistId, EventId, StageId, UserId},
    infrastructure::{SqliteDatabase, ViewerContext},
    models::{AssignmentPatch, NewEvent},
    AppError,
};

struct Festival {
    state: AppState,
    owner: ViewerContext,
    event: EventId,
    main: StageId,
    second: StageId,
    a1: ArtistId,
    a2: ArtistId,
}

async fn festival() -> Festival {
    let db = Arc::new(SqliteDatabase::new_in_memory().await.unwrap());
    let state = AppState::with_database(db, Config::in_memory()).unwrap();
    let owner = ViewerContext::new(UserId::new(1));

    let venue = state.directory.register_venue("Field", None, Some(5000)).await.unwrap();
    let a1 = state.directory.register_artist("A1", Some(UserId::new(2))).await.unwrap();
    let a2 = state.directory.register_artist("A2", Some(UserId::new(3))).await.unwrap();

    let event = state
        .events
        .create_event(
            &owner,
            NewEvent {
                name: "Open Air".to_string(),
                venue_id: Some(venue.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let main = state.stages.create_stage(&owner, event.id, "Main", None).await.unwrap();
    let second = state.stages.create_stage(&owner, event.id, "Second", None).await.unwrap();

    Festival {
        state,
        owner,
        event: event.id,
        main: main.id,
        second: second.id,
        a1: a1.id,
        a2: a2.id,
    }
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 10, hour, minute, 0).unwrap()
}

#[tokio::test]
async fn artist_cannot_play_two_stages_at_once() {
    let f = festival().await;
    let first = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();

    let err = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.second, at(20, 30), at(21, 30))
        .await
        .unwrap_err();
    match err {
        AppError::SchedulingConflict { conflicting } => assert_eq!(conflicting, vec![first.id]),
        other => panic!("expected a scheduling conflict, got {:?}", other),
    }
}

#[tokio::test]
async fn back_to_back_sets_share_a_stage() {
    let f = festival().await;
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a2, f.main, at(21, 0), at(22, 0))
        .await
        .unwrap();

    let listed = f.state.assignments.list_assignments(f.event, Some(f.main)).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0].set_start < listed[1].set_start);
}

#[tokio::test]
async fn stage_overlap_is_rejected_for_different_artists() {
    let f = festival().await;
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();
    let err = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a2, f.main, at(20, 59), at(22, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SchedulingConflict { .. }));
    assert!(err.is_expected());
}

#[tokio::test]
async fn update_checks_against_everything_but_itself() {
    let f = festival().await;
    let first = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a2, f.main, at(21, 0), at(22, 0))
        .await
        .unwrap();

    // shrinking inside its own slot is fine
    let moved = f
        .state
        .assignments
        .update(
            &f.owner,
            first.id,
            AssignmentPatch {
                set_start: Some(at(20, 15)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.set_start, at(20, 15));

    let err = f
        .state
        .assignments
        .update(
            &f.owner,
            first.id,
            AssignmentPatch {
                set_end: Some(at(21, 30)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::SchedulingConflict { .. }));

    // moving to the empty stage clears the clash
    let moved = f
        .state
        .assignments
        .update(
            &f.owner,
            first.id,
            AssignmentPatch {
                stage_id: Some(f.second),
                set_end: Some(at(21, 30)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.stage_id, f.second);
}

#[tokio::test]
async fn invalid_interval_and_foreign_writer_are_rejected() {
    let f = festival().await;
    let err = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(21, 0), at(21, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let stranger = ViewerContext::new(UserId::new(99));
    let err = f
        .state
        .assignments
        .assign(&stranger, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn bookings_never_overlap_after_a_sequence_of_writes() {
    let f = festival().await;
    let artists = [f.a1, f.a2];
    let stages = [f.main, f.second];
    let base = at(18, 0);

    // a deterministic mix of accepted and rejected writes
    for i in 0..24i64 {
        let artist = artists[(i % 2) as usize];
        let stage = stages[((i / 3) % 2) as usize];
        let start = base + Duration::minutes((i * 37) % 300);
        let end = start + Duration::minutes(30 + (i * 13) % 60);
        let _ = f
            .state
            .assignments
            .assign(&f.owner, f.event, artist, stage, start, end)
            .await;
    }

    let all = f.state.assignments.list_assignments(f.event, None).await.unwrap();
    assert!(!all.is_empty());
    for (i, x) in all.iter().enumerate() {
        for y in &all[i + 1..] {
            let overlap = x.set_start < y.set_end && y.set_start < x.set_end;
            assert!(!(overlap && x.stage_id == y.stage_id), "stage overlap {:?} {:?}", x, y);
            assert!(!(overlap && x.artist_id == y.artist_id), "artist overlap {:?} {:?}", x, y);
        }
    }
    assert!(f.state.lineup.conflict_report(f.event).await.unwrap().is_empty());
}

#[tokio::test]
async fn stage_without_any_venue_is_rejected() {
    let f = festival().await;
    let event = f
        .state
        .events
        .create_event(
            &f.owner,
            NewEvent {
                name: "Pop-up".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = f
        .state
        .stages
        .create_stage(&f.owner, event.id, "Corner", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingVenue(_)));
}

#[tokio::test]
async fn lineup_groups_performers_by_stage() {
    let f = festival().await;
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a2, f.main, at(21, 0), at(22, 30))
        .await
        .unwrap();
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();

    let lineup = f.state.lineup.lineup(f.event).await.unwrap();
    let main = lineup.stages.iter().find(|s| s.stage.id == f.main).unwrap();
    assert_eq!(main.stage.venue_capacity, Some(5000));
    assert_eq!(main.performers.len(), 2);
    assert_eq!(main.performers[0].artist_name.as_deref(), Some("A1"));
    assert_eq!(main.performers[1].duration_minutes, 90);

    let second = lineup.stages.iter().find(|s| s.stage.id == f.second).unwrap();
    assert!(second.performers.is_empty());
}

#[tokio::test]
async fn public_lineup_requires_publishing() {
    let f = festival().await;
    let event = f.state.events.get_event(f.event).await.unwrap();

    let err = f.state.lineup.public_lineup(&event.hash).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    f.state.events.set_lineup_public(&f.owner, f.event, true).await.unwrap();
    let lineup = f.state.lineup.public_lineup(&event.hash).await.unwrap();
    assert_eq!(lineup.event.id, f.event);
}

#[tokio::test]
async fn artist_schedule_spans_events() {
    let f = festival().await;
    let other = f
        .state
        .events
        .create_event(
            &f.owner,
            NewEvent {
                name: "Afterparty".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let venue = f.state.directory.register_venue("Basement", None, None).await.unwrap();
    let stage = f
        .state
        .stages
        .create_stage(&f.owner, other.id, "Floor", Some(venue.id))
        .await
        .unwrap();

    f.state
        .assignments
        .assign(&f.owner, other.id, f.a1, stage.id, at(23, 0), at(23, 59))
        .await
        .unwrap();
    f.state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();

    let schedule = f.state.lineup.artist_schedule(f.a1).await.unwrap();
    assert_eq!(schedule.len(), 2);
    assert_eq!(schedule[0].event_id, f.event);
    assert_eq!(schedule[1].event_name, "Afterparty");
    assert_eq!(schedule[1].stage_name, "Floor");
}

#[tokio::test]
async fn removing_a_booking_frees_the_slot() {
    let f = festival().await;
    let booked = f
        .state
        .assignments
        .assign(&f.owner, f.event, f.a1, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();

    assert!(f.state.assignments.remove(&f.owner, booked.id).await.unwrap());
    assert!(!f.state.assignments.remove(&f.owner, booked.id).await.unwrap());

    f.state
        .assignments
        .assign(&f.owner, f.event, f.a2, f.main, at(20, 0), at(21, 0))
        .await
        .unwrap();
}
