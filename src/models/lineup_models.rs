// Lineup models - events, stages, booked sets and the read models built from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ArtistId, AssignmentId, EventId, PromoterId, StageId, UserId, VenueId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub address: Option<String>,
    pub capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
    /// Account that manages this artist profile, if claimed.
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promoter {
    pub id: PromoterId,
    pub name: String,
    pub user_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub date: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub venue_id: Option<VenueId>,
    /// Unique URL slug.
    pub hash: String,
    /// The promoter account that created the event and is the only writer of its lineup.
    pub owner_user_id: UserId,
    pub lineup_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub date: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub venue_id: Option<VenueId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub event_id: EventId,
    pub name: String,
    pub venue_id: VenueId,
    /// Filled from the venue directory by `list_stages`.
    pub venue_capacity: Option<i64>,
}

/// One artist booked on one stage for the half-open window `[set_start, set_end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub event_id: EventId,
    pub stage_id: StageId,
    pub artist_id: ArtistId,
    pub set_start: DateTime<Utc>,
    pub set_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub stage_id: Option<StageId>,
    pub set_start: Option<DateTime<Utc>>,
    pub set_end: Option<DateTime<Utc>>,
}

impl AssignmentPatch {
    pub fn is_empty(&self) -> bool {
        self.stage_id.is_none() && self.set_start.is_none() && self.set_end.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Performer {
    pub assignment_id: AssignmentId,
    pub artist_id: ArtistId,
    pub artist_name: Option<String>,
    pub set_start: DateTime<Utc>,
    pub set_end: DateTime<Utc>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineupStage {
    pub stage: Stage,
    /// Ordered by `set_start`.
    pub performers: Vec<Performer>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Lineup {
    pub event: Event,
    pub stages: Vec<LineupStage>,
}

/// A single set in an artist's schedule across events.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledSet {
    pub assignment_id: AssignmentId,
    pub event_id: EventId,
    pub event_name: String,
    pub event_hash: String,
    pub stage_id: StageId,
    pub stage_name: String,
    pub set_start: DateTime<Utc>,
    pub set_end: DateTime<Utc>,
}
