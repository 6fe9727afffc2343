use std::sync::Arc;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use crate::document::{distinct_values, ensure_id, values_equal};
use crate::engine::Persistence;
use crate::{
    DeleteResult, Document, DocumentCollection, Error, Filter, InsertManyResult, InsertOneResult,
    Result, Update, UpdateResult, ID_FIELD,
};

/// A file-backed collection.
///
/// No documents are cached: every call reads the whole file, and every mutating call
/// rewrites it. The mutex serializes read-modify-write cycles of callers sharing this
/// handle; writers in other processes are not coordinated.
pub struct EmbeddedCollection {
    db: String,
    name: String,
    persistence: Arc<Persistence>,
    write_lock: Mutex<()>,
}

impl EmbeddedCollection {
    pub fn new(db: &str, name: &str, persistence: Arc<Persistence>) -> Self {
        Self {
            db: db.to_string(),
            name: name.to_string(),
            persistence,
            write_lock: Mutex::new(()),
        }
    }

    pub fn database_name(&self) -> &str {
        &self.db
    }

    async fn load(&self) -> Result<Vec<Document>> {
        let p = self.persistence.clone();
        let (db, name) = (self.db.clone(), self.name.clone());
        tokio::task::spawn_blocking(move || p.load_collection(&db, &name))
            .await
            .map_err(|e| Error::Internal(format!("load task failed: {}", e)))?
    }

    /// Loads the collection, lets `f` change it and writes it back.
    ///
    /// If `f` fails the file is left untouched.
    async fn read_modify_write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<Document>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        let p = self.persistence.clone();
        let (db, name) = (self.db.clone(), self.name.clone());
        tokio::task::spawn_blocking(move || {
            let mut docs = p.load_collection(&db, &name)?;
            let out = f(&mut docs)?;
            p.save_collection(&db, &name, &docs)?;
            Ok(out)
        })
        .await
        .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
    }
}

fn duplicate_id(collection: &str, id: &Value) -> Error {
    Error::Validation(format!(
        "duplicate {} {} in collection {:?}",
        ID_FIELD, id, collection
    ))
}

#[async_trait]
impl DocumentCollection for EmbeddedCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: &Filter) -> Result<Vec<Document>> {
        let docs = self.load().await?;
        if filter.is_empty() {
            return Ok(docs);
        }
        Ok(docs.into_iter().filter(|d| filter.matches(d)).collect())
    }

    async fn insert_one(&self, mut document: Document) -> Result<InsertOneResult> {
        let id = ensure_id(&mut document)?;
        let name = self.name.clone();
        self.read_modify_write(move |docs| {
            if docs.iter().any(|d| d.get(ID_FIELD).map_or(false, |existing| values_equal(existing, &id))) {
                return Err(duplicate_id(&name, &id));
            }
            docs.push(document);
            Ok(InsertOneResult { inserted_id: id })
        })
        .await
    }

    async fn insert_many(&self, mut documents: Vec<Document>) -> Result<InsertManyResult> {
        let mut inserted_ids = Vec::with_capacity(documents.len());
        for doc in documents.iter_mut() {
            let id = ensure_id(doc)?;
            if inserted_ids.iter().any(|seen| values_equal(seen, &id)) {
                return Err(duplicate_id(&self.name, &id));
            }
            inserted_ids.push(id);
        }

        let name = self.name.clone();
        self.read_modify_write(move |docs| {
            if let Some(id) = docs
                .iter()
                .filter_map(|d| d.get(ID_FIELD))
                .find(|id| inserted_ids.iter().any(|new| values_equal(new, id)))
            {
                return Err(duplicate_id(&name, id));
            }
            docs.append(&mut documents);
            Ok(InsertManyResult { inserted_ids })
        })
        .await
    }

    async fn update_one(&self, filter: &Filter, update: Update) -> Result<UpdateResult> {
        update.validate()?;
        let filter = filter.clone();
        self.read_modify_write(move |docs| match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(doc) => {
                let changed = update.apply(doc)?;
                Ok(UpdateResult { matched_count: 1, modified_count: changed as u64 })
            }
            None => Ok(UpdateResult { matched_count: 0, modified_count: 0 }),
        })
        .await
    }

    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult> {
        let filter = filter.clone();
        self.read_modify_write(move |docs| {
            let deleted_count = match docs.iter().position(|d| filter.matches(d)) {
                Some(i) => {
                    docs.remove(i);
                    1
                }
                None => 0,
            };
            Ok(DeleteResult { deleted_count })
        })
        .await
    }

    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult> {
        let filter = filter.clone();
        self.read_modify_write(move |docs| {
            let before = docs.len();
            docs.retain(|d| !filter.matches(d));
            Ok(DeleteResult { deleted_count: (before - docs.len()) as u64 })
        })
        .await
    }

    async fn drop_collection(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let p = self.persistence.clone();
        let (db, name) = (self.db.clone(), self.name.clone());
        tokio::task::spawn_blocking(move || p.save_collection(&db, &name, &[]))
            .await
            .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
    }

    async fn distinct(&self, field: &str) -> Result<Vec<Value>> {
        let docs = self.load().await?;
        Ok(distinct_values(&docs, field))
    }
}
