// Invitations - promoter/artist requests and the relationships they create

pub mod relationships;
pub mod requests;
pub mod state_machine;

pub use relationships::{classify, RelationshipAdapter, RelationshipRegistry, RelationshipStore};
pub use requests::InvitationService;
pub use state_machine::transition;
