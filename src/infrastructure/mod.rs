// Core infrastructure modules
pub mod sqlite_database;       // SQLite pool, schema and transactions
pub mod id_generator;          // ID generation system
pub mod viewer;                // Viewer context / current user port
pub mod directory;             // Venue, artist and promoter lookups
pub mod middleware;            // HTTP viewer extraction

pub use sqlite_database::SqliteDatabase;
pub use id_generator::IdGenerator;
pub use viewer::{CurrentUser, ViewerContext};
pub use directory::{ArtistDirectory, Directories, PromoterDirectory, SqliteDirectory, VenueDirectory};
pub use middleware::{viewer_context_middleware, Vc};
