//! High-level handle wiring configuration, backend and primitives together

use keystone_core::Result;
use keystone_engine::{EntityStore, KeystoneConfig};
use keystone_primitives::{
    install_schemas, Clock, HierarchyDenormalizer, LeaseCoordinator, SavedSearches,
};
use keystone_storage::MemoryDatabase;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

type Backend = Arc<MemoryDatabase>;

/// Configured in-memory Keystone instance
#[derive(Debug, Clone)]
pub struct Keystone {
    config: KeystoneConfig,
    store: EntityStore<Backend>,
}

impl Keystone {
    /// In-memory instance with every table registered
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if `config` fails validation.
    pub fn ephemeral(config: KeystoneConfig) -> Result<Self> {
        config.validate()?;
        let db = MemoryDatabase::new().with_retry(config.retry.clone());
        install_schemas(&db)?;
        let store = EntityStore::new(Arc::new(db)).with_pagination(config.pagination.clone());
        info!(
            target: "keystone::store",
            max_retries = config.retry.max_retries,
            workers = config.denormalizer.workers,
            "Opened ephemeral instance"
        );
        Ok(Self { config, store })
    }

    /// In-memory instance configured from `path`, writing the default
    /// configuration there first if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written, read or validated.
    pub fn ephemeral_from_config_file(path: &Path) -> Result<Self> {
        KeystoneConfig::write_default_if_missing(path)?;
        Self::ephemeral(KeystoneConfig::from_file(path)?)
    }

    /// Active configuration
    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    /// Entity store over the backend
    pub fn store(&self) -> &EntityStore<Backend> {
        &self.store
    }

    /// Backend, for inspection
    pub fn database(&self) -> &MemoryDatabase {
        self.store.database()
    }

    /// Lease coordinator on the wall clock with the configured default TTL
    pub fn leases(&self) -> LeaseCoordinator<Backend> {
        LeaseCoordinator::new(self.store.clone()).with_default_ttl(self.config.lease.default_ttl())
    }

    /// Lease coordinator on a custom clock
    pub fn leases_with_clock(&self, clock: Arc<dyn Clock>) -> LeaseCoordinator<Backend> {
        LeaseCoordinator::with_clock(self.store.clone(), clock)
            .with_default_ttl(self.config.lease.default_ttl())
    }

    /// Hierarchy denormalizer with the configured pipeline settings
    pub fn denormalizer(&self) -> HierarchyDenormalizer<Backend> {
        HierarchyDenormalizer::new(self.store.clone(), self.config.denormalizer.clone())
    }

    /// Saved search operations
    pub fn saved_searches(&self) -> SavedSearches<Backend> {
        SavedSearches::new(self.store.clone())
    }
}
