// Demo data - one small festival so a fresh server has something to show

use chrono::{Duration, TimeZone, Utc};
use tracing::info;

use crate::{
    app_state::AppState,
    core::{EntityRef, UserId},
    error::{AppError, AppResult},
    infrastructure::ViewerContext,
    models::{Event, NewEvent, NewRequest},
};

pub const DEMO_PROMOTER_USER: UserId = UserId(1);
pub const DEMO_ARTIST_USERS: [UserId; 3] = [UserId(2), UserId(3), UserId(4)];

/// Registers a venue, a promoter and three artists, links the artists through
/// accepted invitations and books a published two-stage lineup.
pub async fn seed_demo(state: &AppState) -> AppResult<Event> {
    let promoter_vc = ViewerContext::new(DEMO_PROMOTER_USER);

    let venue = state
        .directory
        .register_venue("Harbour Warehouse", Some("12 Quay Road"), Some(1500))
        .await?;
    let promoter = state
        .directory
        .register_promoter("Low Tide Collective", Some(DEMO_PROMOTER_USER))
        .await?;

    let mut artists = Vec::new();
    for (name, user) in ["Mara Sol", "Static Bloom", "Kid Tern"].into_iter().zip(DEMO_ARTIST_USERS) {
        let artist = state.directory.register_artist(name, Some(user)).await?;
        let request = state
            .invitations
            .create(
                &promoter_vc,
                NewRequest {
                    invited_to: EntityRef::promoter(promoter.id),
                    invitee: EntityRef::artist(artist.id),
                },
            )
            .await?;
        state
            .invitations
            .accept(&ViewerContext::new(user), request.id)
            .await?;
        artists.push(artist);
    }

    let doors = Utc
        .with_ymd_and_hms(2026, 7, 18, 18, 0, 0)
        .single()
        .ok_or_else(|| AppError::ConfigurationError("invalid demo date".to_string()))?;
    let event = state
        .events
        .create_event(
            &promoter_vc,
            NewEvent {
                name: "Low Tide Summer Session".to_string(),
                date: Some(doors),
                address: Some("12 Quay Road".to_string()),
                venue_id: Some(venue.id),
            },
        )
        .await?;

    let main = state.stages.create_stage(&promoter_vc, event.id, "Main", None).await?;
    let dock = state.stages.create_stage(&promoter_vc, event.id, "Dock", None).await?;

    let hour = Duration::hours(1);
    let sets = [
        (&artists[0], main.id, doors, doors + hour),
        (&artists[1], main.id, doors + hour, doors + hour * 2),
        (&artists[2], dock.id, doors, doors + hour + Duration::minutes(30)),
        (&artists[0], dock.id, doors + hour * 2, doors + hour * 3),
    ];
    for (artist, stage_id, start, end) in sets {
        state
            .assignments
            .assign(&promoter_vc, event.id, artist.id, stage_id, start, end)
            .await?;
    }

    let event = state.events.set_lineup_public(&promoter_vc, event.id, true).await?;
    info!(event_id = %event.id, hash = %event.hash, "demo lineup seeded");
    Ok(event)
}
