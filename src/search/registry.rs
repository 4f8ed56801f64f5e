//! Registration of indexed record types and dispatch of their lifecycle events

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use super::error::SearchError;
use super::index::SharedIndex;
use super::manager::{IndexDeclaration, IndexManager};
use crate::config::IndexConfig;
use crate::models::{Record, RecordType};

/// Owns the index managers of every registered record type.
///
/// Created once by the application, it routes save and delete events of
/// real-time types to their manager until `shutdown` is called.
pub struct SyncRegistry {
    config: IndexConfig,
    locations: RwLock<HashMap<PathBuf, Arc<SharedIndex>>>,
    managers: RwLock<HashMap<String, Arc<IndexManager>>>,
    subscriptions: RwLock<HashMap<String, Arc<IndexManager>>>,
}

impl SyncRegistry {
    pub fn new(config: IndexConfig) -> Self {
        Self {
            config,
            locations: RwLock::new(HashMap::new()),
            managers: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn shared_index(&self) -> Result<Arc<SharedIndex>, SearchError> {
        let location = self.config.storage_dir.clone();
        let mut locations = self.locations.write()?;
        let shared = locations.entry(location.clone()).or_insert_with(|| {
            Arc::new(SharedIndex::new(location, self.config.writer_heap_bytes))
        });
        Ok(Arc::clone(shared))
    }

    /// Register `record_type`, creating its index if needed.
    ///
    /// Real-time types are subscribed to save and delete events. Registering
    /// a type again replaces its manager.
    pub fn register(
        &self,
        record_type: RecordType,
        declaration: IndexDeclaration,
    ) -> Result<Arc<IndexManager>, SearchError> {
        let shared = self.shared_index()?;
        let manager = Arc::new(IndexManager::register(record_type, declaration, shared)?);
        let type_name = manager.type_name().to_string();

        self.managers
            .write()?
            .insert(type_name.clone(), Arc::clone(&manager));

        let mut subscriptions = self.subscriptions.write()?;
        if manager.is_real_time() {
            subscriptions.insert(type_name.clone(), Arc::clone(&manager));
        } else {
            subscriptions.remove(&type_name);
        }

        log::info!(
            "Registered {} for indexing (real time: {})",
            type_name,
            manager.is_real_time()
        );
        Ok(manager)
    }

    /// Register `R` using its own field definitions
    pub fn register_record<R: Record>(
        &self,
        declaration: IndexDeclaration,
    ) -> Result<Arc<IndexManager>, SearchError> {
        self.register(R::record_type(), declaration)
    }

    pub fn manager(&self, type_name: &str) -> Option<Arc<IndexManager>> {
        self.managers.read().ok()?.get(type_name).cloned()
    }

    pub fn is_subscribed(&self, type_name: &str) -> bool {
        self.subscriptions
            .read()
            .map(|subscriptions| subscriptions.contains_key(type_name))
            .unwrap_or(false)
    }

    fn subscription(&self, type_name: &str) -> Result<Option<Arc<IndexManager>>, SearchError> {
        Ok(self.subscriptions.read()?.get(type_name).cloned())
    }

    /// Save event from the record store
    pub fn record_saved<R: Record>(&self, record: &R, created: bool) -> Result<(), SearchError> {
        match self.subscription(R::TYPE_NAME)? {
            Some(manager) => manager.sync_saved(record, created),
            None => {
                log::debug!("No index subscription for {}; save ignored", R::TYPE_NAME);
                Ok(())
            }
        }
    }

    /// Delete event from the record store
    pub fn record_deleted<R: Record>(&self, record: &R) -> Result<(), SearchError> {
        match self.subscription(R::TYPE_NAME)? {
            Some(manager) => manager.sync_deleted(record),
            None => {
                log::debug!("No index subscription for {}; delete ignored", R::TYPE_NAME);
                Ok(())
            }
        }
    }

    /// Drop every subscription, manager and cached index handle
    pub fn shutdown(&self) -> Result<(), SearchError> {
        self.subscriptions.write()?.clear();
        self.managers.write()?.clear();

        let mut locations = self.locations.write()?;
        for shared in locations.values() {
            shared.invalidate()?;
        }
        locations.clear();

        log::info!("Index sync registry shut down");
        Ok(())
    }
}
