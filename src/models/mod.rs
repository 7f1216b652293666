// Domain models shared by the scheduling and invitation services

pub mod lineup_models;
pub mod request_models;

pub use lineup_models::{
    Artist, Assignment, AssignmentPatch, Event, Lineup, LineupStage, NewEvent, Performer,
    Promoter, ScheduledSet, Stage, Venue,
};
pub use request_models::{
    NewRequest, Relationship, RelationshipKind, Request, RequestAction, RequestStatus,
};
