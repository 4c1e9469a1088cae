use crate::categorize::LlmConfig;
use crate::config::AppConfig;
use crate::error::IdentityError;
use crate::identity::{IdentityService, LocalIdentity, LoggingSmsSender};
use crate::seed::Catalog;
use crate::store::{DocumentStore, SqliteDocumentStore};
use std::sync::Arc;

/// Handles every action and query runs against.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identity: Arc<dyn IdentityService>,
    pub catalog: Arc<Catalog>,
    pub llm: Option<LlmConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityService>,
        llm: Option<LlmConfig>,
    ) -> Self {
        Self {
            store,
            identity,
            catalog: Arc::new(Catalog::builtin()),
            llm,
        }
    }

    /// Local store and identity sharing one SQLite file.
    pub fn open(config: &AppConfig) -> Result<Self, IdentityError> {
        let store = SqliteDocumentStore::open(&config.db_path)?;
        let identity = LocalIdentity::open(
            &config.db_path,
            config.identity.clone(),
            Arc::new(LoggingSmsSender),
        )?;
        Ok(Self::new(Arc::new(store), Arc::new(identity), config.llm.clone()))
    }
}
