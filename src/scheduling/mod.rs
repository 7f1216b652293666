// Lineup scheduling - events, stages and double-booking-free artist sets

pub mod assignments;
pub mod conflict;
pub mod events;
pub mod lineup;
pub mod stages;

pub use assignments::AssignmentStore;
pub use conflict::{find_conflicts, overlapping_pairs, Candidate, ConflictPair, ConflictReason, TimeSlot};
pub use events::EventCatalog;
pub use lineup::LineupView;
pub use stages::StageRegistry;
