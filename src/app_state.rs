use std::sync::Arc;
use tracing::info;

use crate::{
    config::Config,
    error::AppResult,
    infrastructure::{Directories, IdGenerator, SqliteDatabase, SqliteDirectory},
    invitations::{InvitationService, RelationshipRegistry, RelationshipStore},
    scheduling::{AssignmentStore, EventCatalog, LineupView, StageRegistry},
};

/// Every service of the lineup core, wired over one database and one id
/// generator. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqliteDatabase>,
    pub directory: Arc<SqliteDirectory>,
    pub events: EventCatalog,
    pub stages: StageRegistry,
    pub assignments: AssignmentStore,
    pub lineup: LineupView,
    pub relationships: RelationshipStore,
    pub invitations: InvitationService,
    pub config: Config,
}

impl AppState {
    pub async fn new(config: Config) -> AppResult<Self> {
        let db = SqliteDatabase::connect(&config.database.url, config.database.max_connections).await?;
        Self::with_database(Arc::new(db), config)
    }

    pub fn with_database(db: Arc<SqliteDatabase>, config: Config) -> AppResult<Self> {
        let ids = Arc::new(IdGenerator::new(config.ids.shard)?);
        let directory = Arc::new(SqliteDirectory::new(db.clone(), ids.clone()));
        let directories = Directories::from_single(directory.clone());

        let events = EventCatalog::new(db.clone(), ids.clone(), directories.clone());
        let stages = StageRegistry::new(db.clone(), ids.clone(), directories.clone());
        let assignments = AssignmentStore::new(db.clone(), ids.clone(), directories.clone());
        let lineup = LineupView::new(db.clone(), events.clone(), directories.clone());
        let relationships = RelationshipStore::new(db.clone(), ids.clone(), RelationshipRegistry::new());
        let invitations = InvitationService::new(db.clone(), ids, directories, relationships.clone());

        info!(shard = config.ids.shard, "lineup services ready");
        Ok(Self {
            db,
            directory,
            events,
            stages,
            assignments,
            lineup,
            relationships,
            invitations,
            config,
        })
    }
}
