use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use log::info;
use crate::engine::{EmbeddedCollection, Persistence};
use crate::{DocumentCollection, DocumentDatabase, DocumentStore};

/// The embedded `database -> collection` namespace.
///
/// Handles are created on first lookup and cached for the registry's lifetime. The
/// registry owns no document state; the files under its data directory do. Build one
/// at startup and share it (usually as `Arc<dyn DocumentStore>`).
pub struct Registry {
    persistence: Arc<Persistence>,
    databases: RwLock<HashMap<String, Arc<EmbeddedDatabase>>>,
}

impl Registry {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            persistence: Arc::new(Persistence::new(data_dir)),
            databases: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.persistence.data_dir()
    }

    /// Returns the database called `name`, creating and caching it if needed.
    pub fn get_database(&self, name: &str) -> Arc<EmbeddedDatabase> {
        if let Some(db) = self.databases.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return db.clone();
        }

        let mut databases = self.databases.write().unwrap_or_else(|e| e.into_inner());
        databases
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("Opening database {:?} under {:?}", name, self.persistence.data_dir());
                Arc::new(EmbeddedDatabase::new(name, self.persistence.clone()))
            })
            .clone()
    }

    /// Shorthand for `get_database(db).get_collection(name)`.
    pub fn get_collection(&self, db: &str, name: &str) -> Arc<EmbeddedCollection> {
        self.get_database(db).get_collection(name)
    }
}

impl DocumentStore for Registry {
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase> {
        self.get_database(name)
    }
}

/// A lazily populated group of [`EmbeddedCollection`]s.
pub struct EmbeddedDatabase {
    name: String,
    persistence: Arc<Persistence>,
    collections: RwLock<HashMap<String, Arc<EmbeddedCollection>>>,
}

impl EmbeddedDatabase {
    fn new(name: &str, persistence: Arc<Persistence>) -> Self {
        Self {
            name: name.to_string(),
            persistence,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the collection called `name`, creating and caching it if needed.
    ///
    /// Every caller gets the same handle, so they share its write lock.
    pub fn get_collection(&self, name: &str) -> Arc<EmbeddedCollection> {
        if let Some(c) = self.collections.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return c.clone();
        }

        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(EmbeddedCollection::new(&self.name, name, self.persistence.clone())))
            .clone()
    }
}

impl DocumentDatabase for EmbeddedDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection> {
        self.get_collection(name)
    }
}
