use std::sync::Arc;

use application::{InMemoryPartyRepository, InMemoryProfileRepository, PartyRepository, ProfileRepository};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    /// 未配置时使用进程内存储
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 按配置选择的存储后端
#[derive(Clone)]
pub struct Infrastructure {
    pub profiles: Arc<dyn ProfileRepository>,
    pub parties: Arc<dyn PartyRepository>,
    pub backend: &'static str,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let Some(database_url) = config.database_url.as_deref() else {
            tracing::warn!("no database configured, state will not survive restarts");
            return Ok(Self::in_memory());
        };

        let pool = create_pg_pool(database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(max_connections = config.max_connections, "postgres storage ready");

        let storage = PgStorage::new(pool);
        Ok(Self {
            profiles: storage.profile_repository,
            parties: storage.party_repository,
            backend: "postgres",
        })
    }

    pub fn in_memory() -> Self {
        Self {
            profiles: Arc::new(InMemoryProfileRepository::new()),
            parties: Arc::new(InMemoryPartyRepository::new()),
            backend: "memory",
        }
    }
}
