// Core types and primitives

pub mod strong_types;
pub mod timestamps;

pub use strong_types::{
    ArtistId, AssignmentId, EntityKind, EntityRef, EventId, PromoterId, RelationshipId, RequestId,
    StageId, UserId, VenueId,
};
pub use timestamps::{current_time_millis, from_millis, to_millis, truncate_to_millis};
