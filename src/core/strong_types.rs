// Strong Types - newtype identifiers so an ArtistId can never be bound where a StageId is expected

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! strong_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            /// Raw value, used when binding to SQL.
            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

strong_id!(
    /// Identity of an event.
    EventId
);
strong_id!(StageId);
strong_id!(
    /// A booked set (row of `event_stage_artists`).
    AssignmentId
);
strong_id!(ArtistId);
strong_id!(PromoterId);
strong_id!(VenueId);
strong_id!(RequestId);
strong_id!(RelationshipId);
strong_id!(
    /// Authenticated account identity, distinct from the artist/promoter
    /// profile the account owns.
    UserId
);

/// Closed set of entity kinds that can take part in requests and relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Artist,
    Promoter,
    Venue,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Promoter => "promoter",
            EntityKind::Venue => "venue",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artist" => Ok(EntityKind::Artist),
            "promoter" => Ok(EntityKind::Promoter),
            "venue" => Ok(EntityKind::Venue),
            other => Err(format!("unknown entity kind '{}'", other)),
        }
    }
}

/// Typed reference to a single entity: kind plus id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn artist(id: ArtistId) -> Self {
        Self::new(EntityKind::Artist, id.value())
    }

    pub fn promoter(id: PromoterId) -> Self {
        Self::new(EntityKind::Promoter, id.value())
    }

    pub fn venue(id: VenueId) -> Self {
        Self::new(EntityKind::Venue, id.value())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
