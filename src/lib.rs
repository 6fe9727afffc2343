//! Flatdoc is a small document store that keeps each collection in a flat JSON file.
//!
//! It exposes the same `database -> collection -> document` addressing as a networked
//! document database, so application code can be written once against the
//! [`DocumentStore`] traits and run either against the embedded engine or against a
//! remote `flatdoc-stored` daemon without changes.
//!
//! ## Core Components
//! - [`document`]: Documents, equality filters, update expressions and write results.
//! - [`engine`]: The embedded backend (whole-file JSON persistence per collection).
//! - [`sdk`]: Backend selection from configuration and the remote (TCP) client.
//! - [`server`]: TCP daemon implementation.

pub mod document;
pub mod engine;
pub mod sdk;
pub mod server;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use document::{
    DeleteResult, Document, Filter, InsertManyResult, InsertOneResult, Update, UpdateResult,
};

/// Errors returned by Flatdoc.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller supplied a malformed document, filter, update or name.
    #[error("validation error: {0}")]
    Validation(String),
    /// A collection file exists but does not hold a JSON array of documents.
    #[error("corrupt collection file {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    /// An I/O error occurred during persistence or network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The remote daemon rejected the request.
    #[error("remote error: {0}")]
    Remote(String),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Flatdoc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Name of the identity field every stored document carries.
pub const ID_FIELD: &str = "_id";

/// CRUD and equality querying over one named collection.
///
/// Implemented by the embedded engine ([`engine::EmbeddedCollection`]) and by the
/// remote client ([`sdk::client::RemoteCollection`]).
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// The collection's name within its database.
    fn name(&self) -> &str;

    /// Returns every document matching `filter`, in stored order.
    async fn find(&self, filter: &Filter) -> Result<Vec<Document>>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(&self, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.find(filter).await?.into_iter().next())
    }

    /// Appends a document, assigning an identity if it has none.
    async fn insert_one(&self, document: Document) -> Result<InsertOneResult>;

    /// Appends several documents with a single write.
    async fn insert_many(&self, documents: Vec<Document>) -> Result<InsertManyResult>;

    /// Applies `update` to the first document matching `filter`.
    async fn update_one(&self, filter: &Filter, update: Update) -> Result<UpdateResult>;

    /// Removes the first document matching `filter`.
    async fn delete_one(&self, filter: &Filter) -> Result<DeleteResult>;

    /// Removes every document matching `filter`.
    async fn delete_many(&self, filter: &Filter) -> Result<DeleteResult>;

    /// Empties the collection; the driver-level `drop`.
    async fn drop_collection(&self) -> Result<()>;

    /// Number of documents [`find`](Self::find) would return for `filter`.
    async fn count_documents(&self, filter: &Filter) -> Result<u64> {
        Ok(self.find(filter).await?.len() as u64)
    }

    /// Unique values of `field` across the collection. Documents without the field are skipped.
    async fn distinct(&self, field: &str) -> Result<Vec<Value>>;
}

/// A named group of collections.
pub trait DocumentDatabase: Send + Sync {
    /// The database's name.
    fn name(&self) -> &str;

    /// Returns the collection called `name`, creating the handle on first use.
    fn collection(&self, name: &str) -> Arc<dyn DocumentCollection>;
}

/// The top-level namespace: database name to [`DocumentDatabase`].
///
/// Selected once at startup by [`sdk::new`]; callers never branch on the backend.
pub trait DocumentStore: Send + Sync {
    /// Returns the database called `name`, creating the handle on first use.
    fn database(&self, name: &str) -> Arc<dyn DocumentDatabase>;

    /// Shorthand for `database(db).collection(name)`.
    fn collection(&self, db: &str, name: &str) -> Arc<dyn DocumentCollection> {
        self.database(db).collection(name)
    }
}
